//! Request and response types for the tradelink API.
//!
//! These types mirror the backend's wire contract.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/signup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair returned by login, signup, and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Subject info, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// Subject info attached to an [`AuthResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub email: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trading
// ─────────────────────────────────────────────────────────────────────────────

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Pricing mode of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderCategory {
    Market,
    Limit,
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Completed,
    Pending,
    Cancelled,
    Rejected,
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionType {
    Long,
    Short,
}

/// A settled holding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
}

/// An open intraday position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
    pub position_type: PositionType,
}

/// An order in the orderbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub order_type: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub status: OrderStatus,
    /// Placement time (ISO 8601).
    pub order_time: String,
    /// Execution time, once filled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_time: Option<String>,
}

/// Aggregate P&L figures shown alongside each trading view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlSummary {
    pub total_pnl: f64,
    pub total_pnl_percent: f64,
    pub day_pnl: f64,
    pub day_pnl_percent: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

/// Response for `GET /holdings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingsResponse {
    pub holdings: Vec<Holding>,
    pub pnl_card: PnlSummary,
}

/// Response for `GET /orderbook`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookResponse {
    pub orders: Vec<Order>,
    pub pnl_card: PnlSummary,
}

/// Response for `GET /positions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
    pub pnl_card: PnlSummary,
}

/// Request body for `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub order_category: OrderCategory,
}

/// Acknowledgement for a placed order. Brokers differ in what they return,
/// so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
