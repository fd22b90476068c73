pub mod aster;
pub mod backpack;
pub mod gateway;
pub mod sizing;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::bot::{OrderSide, Venue};

pub use gateway::{ExecutionGateway, GatewayPair, TakeProfitOrder, VenueGateway};
pub use sizing::SymbolRules;

/// Normalized order status across venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Parse a venue status string ("NEW", "PartiallyFilled", "CANCELED", "Expired", ...)
    pub fn from_venue_str(status: &str) -> Option<Self> {
        let normalized: String = status
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "NEW" | "TRIGGERPENDING" => Some(OrderStatus::New),
            "PARTIALLYFILLED" => Some(OrderStatus::PartiallyFilled),
            "FILLED" => Some(OrderStatus::Filled),
            "CANCELED" | "CANCELLED" | "EXPIRED" => Some(OrderStatus::Cancelled),
            "REJECTED" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }

    /// Gone from the book without (fully) filling
    pub fn is_dead(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Rejected)
    }
}

/// Venue acknowledgement of a submitted order
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub status: OrderStatus,
    /// Average fill price, when the venue reports it inline
    pub avg_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusReport {
    pub status: OrderStatus,
    pub avg_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetBalance {
    pub asset: String,
    pub available: Decimal,
    pub total: Decimal,
}

/// Raw, fallible venue REST operations.
///
/// Symbols passed in are venue-native (see `venue_symbol`). Errors are plain
/// `anyhow` errors; `VenueGateway` decides what to retry and what to swallow.
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn venue(&self) -> Venue;

    /// Map a canonical symbol ("SOL-USDT") to the venue's naming
    fn venue_symbol(&self, symbol: &str) -> String;

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal>;

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &str,
        reduce_only: bool,
    ) -> Result<OrderAck>;

    /// Good-till-cancelled limit order
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &str,
        price: &str,
        reduce_only: bool,
    ) -> Result<OrderAck>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    async fn order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatusReport>;

    /// Average fill price of an order from order/fill history.
    ///
    /// `Ok(None)` means the fill is not visible yet.
    async fn fill_price(&self, symbol: &str, order_id: &str) -> Result<Option<Decimal>>;

    async fn balances(&self) -> Result<Vec<AssetBalance>>;
}

/// Ticker price of a canonical symbol, with the venue-native symbol it was quoted under
pub async fn venue_quote<C: VenueClient + ?Sized>(client: &C, symbol: &str) -> Result<(String, Decimal)> {
    let venue_symbol = client.venue_symbol(symbol);
    let price = client.ticker_price(&venue_symbol).await?;
    Ok((venue_symbol, price))
}

/// Weighted average price over (price, quantity) fills
pub fn weighted_average_price(fills: &[(Decimal, Decimal)]) -> Option<Decimal> {
    let total_qty: Decimal = fills.iter().map(|(_, q)| *q).sum();
    if total_qty <= Decimal::ZERO {
        return None;
    }
    let total_value: Decimal = fills.iter().map(|(p, q)| *p * *q).sum();
    Some(total_value / total_qty)
}
