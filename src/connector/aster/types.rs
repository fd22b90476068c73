use rust_decimal::Decimal;
use serde::Deserialize;

/// GET /fapi/v1/ticker/price
#[derive(Debug, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// GET /fapi/v1/exchangeInfo (only the parts we use)
#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: Decimal,
        #[serde(rename = "minQty")]
        min_qty: Decimal,
    },
    #[serde(rename = "PRICE_FILTER")]
    PriceFilter {
        #[serde(rename = "tickSize")]
        tick_size: Decimal,
    },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional {
        #[serde(alias = "minNotional")]
        notional: Decimal,
    },
    #[serde(other)]
    Other,
}

/// Order as returned by POST/GET/DELETE /fapi/v1/order
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
}

/// GET /fapi/v1/userTrades
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTrade {
    pub order_id: u64,
    pub price: Decimal,
    pub qty: Decimal,
}

/// GET /fapi/v2/balance
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub asset: String,
    pub balance: Decimal,
    pub available_balance: Decimal,
}

/// Error body: {"code": -2019, "msg": "Margin is insufficient."}
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}
