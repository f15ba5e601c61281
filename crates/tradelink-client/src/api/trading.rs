//! Trading API.

use crate::client::TradelinkClient;
use crate::error::Result;
use crate::types::{
    HoldingsResponse, OrderRequest, OrderReceipt, OrderbookResponse, PositionsResponse,
};

/// Trading API client.
pub struct TradingApi {
    client: TradelinkClient,
}

impl TradingApi {
    pub(crate) fn new(client: TradelinkClient) -> Self {
        Self { client }
    }

    /// Fetch settled holdings with the aggregate P&L card.
    pub async fn holdings(&self) -> Result<HoldingsResponse> {
        self.client.get("holdings").await
    }

    /// Fetch the orderbook with the aggregate P&L card.
    pub async fn orderbook(&self) -> Result<OrderbookResponse> {
        self.client.get("orderbook").await
    }

    /// Fetch open positions with the aggregate P&L card.
    pub async fn positions(&self) -> Result<PositionsResponse> {
        self.client.get("positions").await
    }

    /// Place an order.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt> {
        self.client.post("orders", order).await
    }
}
