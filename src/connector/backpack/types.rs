use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

/// GET /api/v1/ticker
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: String,
    pub last_price: Decimal,
}

/// GET /api/v1/markets entry
#[derive(Debug, Deserialize)]
pub struct Market {
    pub symbol: String,
    pub filters: MarketFilters,
}

#[derive(Debug, Deserialize)]
pub struct MarketFilters {
    pub price: PriceFilter,
    pub quantity: QuantityFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFilter {
    pub tick_size: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityFilter {
    pub step_size: Decimal,
    pub min_quantity: Decimal,
}

/// Order as returned by /api/v1/order and /wapi/v1/history/orders
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub executed_quantity: Option<Decimal>,
    #[serde(default)]
    pub executed_quote_quantity: Option<Decimal>,
}

impl OrderResponse {
    /// executedQuoteQuantity / executedQuantity, when anything executed
    pub fn avg_price(&self) -> Option<Decimal> {
        match (self.executed_quantity, self.executed_quote_quantity) {
            (Some(qty), Some(quote)) if qty > Decimal::ZERO && quote > Decimal::ZERO => Some(quote / qty),
            _ => None,
        }
    }
}

/// GET /wapi/v1/history/fills entry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub order_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// GET /api/v1/capital: asset -> balance
pub type CapitalResponse = HashMap<String, CapitalEntry>;

#[derive(Debug, Deserialize)]
pub struct CapitalEntry {
    pub available: Decimal,
    pub locked: Decimal,
    #[serde(default)]
    pub staked: Decimal,
}

/// Error body: {"code": "INVALID_ORDER", "message": "..."}
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}
