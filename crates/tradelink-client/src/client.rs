//! Main client implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;

use tradelink_notify::{NotificationKind, Notifier};

use crate::api::{AuthApi, HealthApi, TradingApi};
use crate::error::{Error, Result};

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry budget advertised to callers.
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between caller-driven retries.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Notice emitted when the backend rejects the current credentials.
pub const SESSION_EXPIRED_NOTICE: &str = "Session expired. Please sign in again.";

/// Source of the access token attached to outgoing requests.
///
/// Implemented by the credential store; the client only ever reads through
/// this seam, except for [`TokenSource::clear`], which is invoked as a
/// last-resort teardown when a 401 arrives before any unauthorized handler
/// has been registered.
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Current access token, if one is stored.
    fn access_token(&self) -> Option<String>;

    /// Remove all stored credentials.
    fn clear(&self);
}

/// Callback invoked when a response comes back 401.
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

/// Per-request overrides for [`TradelinkClient::request`].
#[derive(Debug, Default)]
pub struct RequestOptions {
    /// Extra headers; these win over the client's defaults on conflict.
    pub headers: HeaderMap,
    /// Overrides the client-wide timeout for this request only.
    pub timeout: Option<Duration>,
}

/// Retry budget for callers that choose to retry. The client itself never
/// retries a failed request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Tradelink API client.
///
/// Wraps every outgoing request with the JSON content-type default, the
/// current `Authorization` bearer token, and a per-request timeout, and
/// classifies failures into the [`Error`] taxonomy. A 401 response triggers
/// the registered unauthorized handler before the error reaches the caller.
///
/// # Example
///
/// ```no_run
/// use tradelink_client::TradelinkClient;
///
/// # async fn example() -> tradelink_client::Result<()> {
/// let client = TradelinkClient::builder()
///     .base_url("http://localhost:8080")
///     .build()?;
///
/// let holdings = client.trading().holdings().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TradelinkClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// HTTP client.
    http: reqwest::Client,
    /// Base URL for API requests; mutable via `set_base_url`.
    base_url: RwLock<Url>,
    /// Request timeout; mutable via `set_timeout`.
    timeout: RwLock<Duration>,
    /// Retry budget advertised to callers.
    retry: RetryPolicy,
    /// Where the bearer token comes from.
    token_source: RwLock<Option<Arc<dyn TokenSource>>>,
    /// Registered 401 callback.
    unauthorized_handler: RwLock<Option<UnauthorizedHandler>>,
    /// Channel for user-facing notices.
    notifier: Notifier,
}

impl TradelinkClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> Url {
        self.inner.base_url.read().clone()
    }

    /// Replace the base URL.
    pub fn set_base_url(&self, url: &str) -> Result<()> {
        *self.inner.base_url.write() = normalize_base_url(url)?;
        Ok(())
    }

    /// Get the client-wide request timeout.
    pub fn timeout(&self) -> Duration {
        *self.inner.timeout.read()
    }

    /// Replace the client-wide request timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.inner.timeout.write() = timeout;
    }

    /// Retry budget for callers that choose to retry.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// The notification channel this client emits on.
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Replace the token source.
    pub fn set_token_source(&self, source: Arc<dyn TokenSource>) {
        *self.inner.token_source.write() = Some(source);
    }

    /// Register the callback invoked on a 401 response.
    ///
    /// The session controller registers its teardown here at construction
    /// time. The callback runs before the error propagates to the caller, so
    /// a caller's failure handler always observes already-cleared credentials.
    pub fn set_unauthorized_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.inner.unauthorized_handler.write() = Some(Arc::new(handler));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the authentication API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    /// Access the trading API.
    pub fn trading(&self) -> TradingApi {
        TradingApi::new(self.clone())
    }

    /// Access the health API.
    pub fn health(&self) -> HealthApi {
        HealthApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner
            .base_url
            .read()
            .join(&format!("api/v1/{}", path))
            .map_err(Error::from)
    }

    /// Make a request with full control over method, body, and headers.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: Option<RequestOptions>,
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = self.url(path)?;
        let mut builder = self.prepare(method, url, options);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.dispatch(builder).await?;
        self.handle_response(response).await
    }

    /// Make a GET request.
    pub async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None::<&()>, None).await
    }

    /// Make a GET request with query parameters.
    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = self.url(path)?;
        let builder = self.prepare(Method::GET, url, None).query(query);
        let response = self.dispatch(builder).await?;
        self.handle_response(response).await
    }

    /// Make a POST request.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body), None).await
    }

    /// Make a POST request with no body, discarding the response body.
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        let response = self.dispatch(self.prepare(Method::POST, url, None)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.classify_failure(response).await)
        }
    }

    /// Make a PUT request.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body), None).await
    }

    /// Make a PATCH request.
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body), None).await
    }

    /// Make a DELETE request.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        let response = self
            .dispatch(self.prepare(Method::DELETE, url, None))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.classify_failure(response).await)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Assemble the request: merged headers and timeout.
    ///
    /// Header precedence, later wins: JSON content-type default, bearer token
    /// when one is stored, caller-supplied headers.
    fn prepare(
        &self,
        method: Method,
        url: Url,
        options: Option<RequestOptions>,
    ) -> reqwest::RequestBuilder {
        let options = options.unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = self.current_access_token() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    tracing::warn!("stored access token is not a valid header value, skipping");
                }
            }
        }

        for (name, value) in options.headers.iter() {
            headers.insert(name, value.clone());
        }

        let timeout = options.timeout.unwrap_or_else(|| self.timeout());

        self.inner
            .http
            .request(method, url)
            .headers(headers)
            .timeout(timeout)
    }

    fn current_access_token(&self) -> Option<String> {
        self.inner
            .token_source
            .read()
            .as_ref()
            .and_then(|source| source.access_token())
    }

    /// Send the request, mapping transport failures into the error taxonomy.
    async fn dispatch(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        match builder.send().await {
            Ok(response) => Ok(response),
            Err(e) if e.is_timeout() => Err(Error::Timeout),
            Err(e) if e.is_connect() => Err(Error::Network(e.to_string())),
            Err(e) => Err(Error::Http(e)),
        }
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            response.json().await.map_err(Error::Http)
        } else {
            Err(self.classify_failure(response).await)
        }
    }

    /// Turn a non-2xx response into an [`Error::Api`], running the
    /// unauthorized protocol first when the status is 401.
    async fn classify_failure(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        let raw = response.text().await.unwrap_or_default();
        let body: Option<serde_json::Value> = if is_json {
            serde_json::from_str(&raw).ok()
        } else if raw.is_empty() {
            None
        } else {
            Some(serde_json::Value::String(raw))
        };

        let message = body
            .as_ref()
            .and_then(|b| b.get("message").or_else(|| b.get("error")))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {}", status));

        tracing::debug!(status, %message, "request failed");

        // A 401 is unconditionally an authentication failure; the status code
        // alone decides, never the error text. Teardown runs before the error
        // is handed back so the caller observes already-cleared credentials.
        if status == 401 {
            self.handle_unauthorized();
        }

        Error::Api {
            status,
            message,
            body,
        }
    }

    fn handle_unauthorized(&self) {
        tracing::warn!("received 401, tearing down session");

        let handler = self.inner.unauthorized_handler.read().clone();
        match handler {
            Some(handler) => handler(),
            None => {
                // Nothing registered yet; drop the rejected credentials
                // ourselves so they are never replayed.
                if let Some(source) = self.inner.token_source.read().clone() {
                    source.clear();
                }
            }
        }

        self.inner
            .notifier
            .emit(SESSION_EXPIRED_NOTICE, NotificationKind::Warning, None);
    }
}

/// Normalize a base URL so that `Url::join` treats it as a directory.
fn normalize_base_url(url: &str) -> Result<Url> {
    let mut url = Url::parse(url)?;
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}

/// Builder for creating a [`TradelinkClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    user_agent: Option<String>,
    notifier: Option<Notifier>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            user_agent: None,
            notifier: None,
            token_source: None,
        }
    }

    /// Set the base URL for the backend.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget advertised to callers.
    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Share a notification channel with the rest of the application.
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the source of the bearer token.
    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<TradelinkClient> {
        let base_url = normalize_base_url(&self.base_url)?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("tradelink-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder().user_agent(user_agent).build()?;

        Ok(TradelinkClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: RwLock::new(base_url),
                timeout: RwLock::new(self.timeout),
                retry: RetryPolicy {
                    attempts: self.retry_attempts,
                    delay: self.retry_delay,
                },
                token_source: RwLock::new(self.token_source),
                unauthorized_handler: RwLock::new(None),
                notifier: self.notifier.unwrap_or_default(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = ClientBuilder::new().build().unwrap();

        assert_eq!(client.base_url().as_str(), "http://localhost:8080/");
        assert_eq!(client.timeout(), Duration::from_secs(30));
        assert_eq!(client.retry_policy().attempts, 3);
        assert_eq!(client.retry_policy().delay, Duration::from_secs(1));
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:9090")
            .build()
            .unwrap();

        assert_eq!(client.base_url().as_str(), "http://localhost:9090/");
    }

    #[test]
    fn test_builder_rejects_garbage_url() {
        let result = ClientBuilder::new().base_url("not a url").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_url_building() {
        let client = ClientBuilder::new().build().unwrap();

        let url = client.url("holdings").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v1/holdings");

        let url = client.url("/holdings").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v1/holdings");
    }

    #[test]
    fn test_set_base_url_and_timeout() {
        let client = ClientBuilder::new().build().unwrap();

        client.set_base_url("https://api.example.com").unwrap();
        client.set_timeout(Duration::from_secs(5));

        assert_eq!(client.base_url().as_str(), "https://api.example.com/");
        assert_eq!(client.timeout(), Duration::from_secs(5));
        assert_eq!(
            client.url("auth/login").unwrap().as_str(),
            "https://api.example.com/api/v1/auth/login"
        );
    }
}
