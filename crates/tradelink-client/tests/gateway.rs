//! Gateway behavior against a mocked backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tradelink_client::{
    Error, LoginRequest, RefreshRequest, RequestOptions, SESSION_EXPIRED_NOTICE, SignupRequest,
    TokenSource, TradelinkClient,
};

#[derive(Debug, Default)]
struct FakeTokenSource {
    token: Mutex<Option<String>>,
}

impl FakeTokenSource {
    fn with_token(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(Some(token.to_string())),
        })
    }

    fn current(&self) -> Option<String> {
        self.token.lock().clone()
    }
}

impl TokenSource for FakeTokenSource {
    fn access_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn clear(&self) {
        *self.token.lock() = None;
    }
}

fn client_for(server: &MockServer) -> TradelinkClient {
    TradelinkClient::builder()
        .base_url(server.uri())
        .build()
        .unwrap()
}

fn holdings_body() -> serde_json::Value {
    json!({
        "holdings": [{
            "symbol": "AAPL",
            "quantity": 10.0,
            "average_price": 150.0,
            "current_price": 170.0,
            "pnl": 200.0,
            "pnl_percent": 13.3
        }],
        "pnl_card": {
            "total_pnl": 200.0,
            "total_pnl_percent": 13.3,
            "day_pnl": 12.0,
            "day_pnl_percent": 0.8,
            "realized_pnl": 0.0,
            "unrealized_pnl": 200.0
        }
    })
}

#[tokio::test]
async fn attaches_bearer_token_when_stored() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/holdings"))
        .and(header("authorization", "Bearer tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(holdings_body()))
        .mount(&server)
        .await;

    let source = FakeTokenSource::with_token("tok123");
    let client = TradelinkClient::builder()
        .base_url(server.uri())
        .token_source(source)
        .build()
        .unwrap();

    let response = client.trading().holdings().await.unwrap();
    assert_eq!(response.holdings[0].symbol, "AAPL");
}

#[tokio::test]
async fn omits_authorization_header_without_token() {
    let server = MockServer::start().await;

    // Any request carrying an Authorization header would hit this mock,
    // which must never fire.
    Mock::given(method("GET"))
        .and(path("/api/v1/holdings"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/holdings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(holdings_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.trading().holdings().await.unwrap();
}

#[tokio::test]
async fn caller_headers_win_over_defaults() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/holdings"))
        .and(header("content-type", "text/plain"))
        .and(header("x-broker", "zerodha"))
        .respond_with(ResponseTemplate::new(200).set_body_json(holdings_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("text/plain"));
    headers.insert("x-broker", HeaderValue::from_static("zerodha"));

    let options = RequestOptions {
        headers,
        timeout: None,
    };

    let _: serde_json::Value = client
        .request(Method::GET, "holdings", None::<&()>, Some(options))
        .await
        .unwrap();
}

#[tokio::test]
async fn unauthorized_invokes_handler_once_before_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/positions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "token is expired"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_handler = calls.clone();
    client.set_unauthorized_handler(move || {
        calls_in_handler.fetch_add(1, Ordering::SeqCst);
    });

    let mut notices = client.notifier().subscribe();

    let err = client.trading().positions().await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }));
    // The handler already ran by the time the caller sees the error.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.message, SESSION_EXPIRED_NOTICE);
}

#[tokio::test]
async fn unauthorized_without_handler_clears_token_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/orderbook"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "unauthorized"})))
        .mount(&server)
        .await;

    let source = FakeTokenSource::with_token("stale");
    let client = TradelinkClient::builder()
        .base_url(server.uri())
        .token_source(source.clone())
        .build()
        .unwrap();

    let mut notices = client.notifier().subscribe();

    let err = client.trading().orderbook().await.unwrap_err();
    assert!(err.is_auth_error());
    assert_eq!(source.current(), None);
    assert_eq!(notices.try_recv().unwrap().message, SESSION_EXPIRED_NOTICE);
}

#[tokio::test]
async fn timeout_is_distinct_and_leaves_tokens_alone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/holdings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(holdings_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let source = FakeTokenSource::with_token("still-here");
    let client = TradelinkClient::builder()
        .base_url(server.uri())
        .timeout(Duration::from_millis(100))
        .token_source(source.clone())
        .build()
        .unwrap();

    let err = client.trading().holdings().await.unwrap_err();
    assert!(err.is_timeout());
    // A timeout alone must never tear the session down.
    assert_eq!(source.current(), Some("still-here".to_string()));
}

#[tokio::test]
async fn connection_failure_is_network_error() {
    // Nothing listens on port 9.
    let client = TradelinkClient::builder()
        .base_url("http://127.0.0.1:9")
        .build()
        .unwrap();

    let err = client.trading().holdings().await.unwrap_err();
    assert!(err.is_network_error(), "got {err:?}");
}

#[tokio::test]
async fn error_message_prefers_server_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/holdings"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/positions"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nothing here"))
        .mount(&server)
        .await;

    let client = client_for(&server);

    match client.trading().holdings().await.unwrap_err() {
        Error::Api {
            status, message, ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    match client.trading().positions().await.unwrap_err() {
        Error::Api {
            status, message, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "HTTP 404");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn login_maps_rejections_to_form_messages() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad creds"})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/signup"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "taken"})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client
        .auth()
        .login(&LoginRequest {
            email: "u@x.com".into(),
            password: "nope".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid email or password");

    let err = client
        .auth()
        .signup(&SignupRequest {
            email: "u@x.com".into(),
            password: "nope".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "User already exists or invalid data");

    let err = client
        .auth()
        .refresh(&RefreshRequest {
            refresh_token: "r1".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Session expired. Please login again.");
}

#[tokio::test]
async fn login_returns_token_pair() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a.b.c",
            "refresh_token": "r1",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tokens = client
        .auth()
        .login(&LoginRequest {
            email: "u@x.com".into(),
            password: "secret1".into(),
        })
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "a.b.c");
    assert_eq!(tokens.refresh_token, "r1");
    assert_eq!(tokens.expires_in, 3600);
}

#[tokio::test]
async fn logout_posts_without_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.auth().logout().await.unwrap();
}
