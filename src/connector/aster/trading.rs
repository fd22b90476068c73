use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, info};

use super::types::*;
use crate::bot::{OrderSide, Venue};
use crate::config::VenueConfig;
use crate::connector::{
    weighted_average_price, AssetBalance, OrderAck, OrderStatus, OrderStatusReport, SymbolRules,
    VenueClient,
};

const MAINNET_REST_URL: &str = "https://fapi.asterdex.com";

type HmacSha256 = Hmac<Sha256>;

/// Credentials for Aster futures trading
#[derive(Debug, Clone)]
pub struct AsterCredentials {
    pub api_key: String,
    pub secret_key: String,
}

impl AsterCredentials {
    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_key = std::env::var("ASTER_API_KEY")
            .context("ASTER_API_KEY not found in environment")?;
        let secret_key = std::env::var("ASTER_SECRET_KEY")
            .context("ASTER_SECRET_KEY not found in environment")?;

        Ok(Self { api_key, secret_key })
    }
}

/// HMAC-SHA256 of the query string, hex encoded
pub fn sign_query(secret_key: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| anyhow!("Invalid Aster secret key: {}", e))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// "SOL-USDT" -> "SOLUSDT"
pub fn map_symbol(symbol: &str) -> String {
    symbol.replace(['-', '_', '/'], "").to_uppercase()
}

/// Aster (Binance-style USDT futures) REST client
pub struct AsterClient {
    credentials: AsterCredentials,
    rest_url: String,
    recv_window_ms: u64,
    symbol_override: Option<String>,
    min_notional_floor: Option<Decimal>,
    client: reqwest::Client,
}

impl AsterClient {
    pub fn new(credentials: AsterCredentials, config: &VenueConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build Aster HTTP client")?;

        let rest_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| MAINNET_REST_URL.to_string());
        info!("[ASTER] REST client ready ({})", rest_url);

        Ok(Self {
            credentials,
            rest_url,
            recv_window_ms: config.recv_window_ms,
            symbol_override: config.symbol.clone(),
            min_notional_floor: config.min_notional,
            client,
        })
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        let url = if query.is_empty() {
            format!("{}{}", self.rest_url, path)
        } else {
            format!("{}{}?{}", self.rest_url, path, query)
        };
        debug!("[ASTER] GET {}", url);

        let response = self.client.get(&url).send().await?;
        Self::parse_response(response).await
    }

    /// Signed request; params are sent in the query string
    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        query.push(format!("recvWindow={}", self.recv_window_ms));
        query.push(format!("timestamp={}", timestamp));
        let query = query.join("&");

        let signature = sign_query(&self.credentials.secret_key, &query)?;
        let url = format!("{}{}?{}&signature={}", self.rest_url, path, query, signature);
        debug!("[ASTER] {} {}{}?{}", method, self.rest_url, path, query);

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return match serde_json::from_str::<ApiError>(&body) {
                Ok(err) => Err(anyhow!("HTTP {}: {} (code {})", status.as_u16(), err.msg, err.code)),
                Err(_) => Err(anyhow!("HTTP {}: {}", status.as_u16(), body)),
            };
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to parse Aster response: {}", body))
    }

    fn ack(order: OrderResponse) -> Result<OrderAck> {
        let status = OrderStatus::from_venue_str(&order.status)
            .with_context(|| format!("Unknown Aster order status: {}", order.status))?;
        Ok(OrderAck {
            order_id: order.order_id.to_string(),
            status,
            avg_price: order.avg_price.filter(|p| *p > Decimal::ZERO),
        })
    }
}

#[async_trait]
impl VenueClient for AsterClient {
    fn venue(&self) -> Venue {
        Venue::Aster
    }

    fn venue_symbol(&self, symbol: &str) -> String {
        self.symbol_override
            .clone()
            .unwrap_or_else(|| map_symbol(symbol))
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: TickerPrice = self
            .public_get("/fapi/v1/ticker/price", &format!("symbol={}", symbol))
            .await?;
        debug!("[ASTER] {} price {}", ticker.symbol, ticker.price);
        Ok(ticker.price)
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        let info: ExchangeInfo = self.public_get("/fapi/v1/exchangeInfo", "").await?;
        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .with_context(|| format!("Symbol {} not listed on Aster", symbol))?;

        let mut step_size = None;
        let mut min_qty = Decimal::ZERO;
        let mut tick_size = Decimal::ZERO;
        let mut min_notional = Decimal::ZERO;

        for filter in symbol_info.filters {
            match filter {
                SymbolFilter::LotSize { step_size: step, min_qty: min } => {
                    step_size = Some(step);
                    min_qty = min;
                }
                SymbolFilter::PriceFilter { tick_size: tick } => tick_size = tick,
                SymbolFilter::MinNotional { notional } => min_notional = notional,
                SymbolFilter::Other => {}
            }
        }

        let step_size = step_size.with_context(|| format!("No LOT_SIZE filter for {}", symbol))?;
        if let Some(floor) = self.min_notional_floor {
            min_notional = min_notional.max(floor);
        }

        Ok(SymbolRules {
            step_size,
            min_qty,
            tick_size,
            min_notional,
        })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &str,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let order: OrderResponse = self.signed_request(Method::POST, "/fapi/v1/order", &params).await?;
        info!(
            "[ASTER] Market {} {} {} -> order {} ({})",
            side.as_str(),
            quantity,
            order.symbol,
            order.order_id,
            order.status
        );
        Self::ack(order)
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &str,
        price: &str,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", quantity.to_string()),
            ("price", price.to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let order: OrderResponse = self.signed_request(Method::POST, "/fapi/v1/order", &params).await?;
        info!(
            "[ASTER] Limit {} {} {} @ {} -> order {} ({})",
            side.as_str(),
            quantity,
            order.symbol,
            price,
            order.order_id,
            order.status
        );
        Self::ack(order)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let _: OrderResponse = self
            .signed_request(Method::DELETE, "/fapi/v1/order", &params)
            .await?;
        Ok(())
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatusReport> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let order: OrderResponse = self.signed_request(Method::GET, "/fapi/v1/order", &params).await?;
        let ack = Self::ack(order)?;
        Ok(OrderStatusReport {
            status: ack.status,
            avg_price: ack.avg_price,
        })
    }

    async fn fill_price(&self, symbol: &str, order_id: &str) -> Result<Option<Decimal>> {
        let report = self.order_status(symbol, order_id).await?;
        if let Some(price) = report.avg_price {
            if report.status == OrderStatus::Filled || report.status == OrderStatus::PartiallyFilled {
                return Ok(Some(price));
            }
        }

        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let trades: Vec<UserTrade> = self
            .signed_request(Method::GET, "/fapi/v1/userTrades", &params)
            .await?;
        let fills: Vec<(Decimal, Decimal)> = trades
            .iter()
            .filter(|t| t.order_id.to_string() == order_id)
            .map(|t| (t.price, t.qty))
            .collect();

        Ok(weighted_average_price(&fills))
    }

    async fn balances(&self) -> Result<Vec<AssetBalance>> {
        let entries: Vec<BalanceEntry> = self.signed_request(Method::GET, "/fapi/v2/balance", &[]).await?;
        Ok(entries
            .into_iter()
            .filter(|b| !b.balance.is_zero())
            .map(|b| AssetBalance {
                asset: b.asset,
                available: b.available_balance,
                total: b.balance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_query_matches_reference_vector() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign_query(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_map_symbol() {
        assert_eq!(map_symbol("SOL-USDT"), "SOLUSDT");
        assert_eq!(map_symbol("btc_usdt"), "BTCUSDT");
    }

    #[test]
    fn test_parse_exchange_info_filters() {
        let json = r#"{"symbols":[{"symbol":"SOLUSDT","filters":[
            {"filterType":"PRICE_FILTER","minPrice":"0.01","maxPrice":"100000","tickSize":"0.01"},
            {"filterType":"LOT_SIZE","stepSize":"0.01","minQty":"0.01","maxQty":"10000"},
            {"filterType":"MARKET_LOT_SIZE","stepSize":"0.01","minQty":"0.01","maxQty":"1000"},
            {"filterType":"MIN_NOTIONAL","notional":"5"}
        ]}]}"#;
        let info: ExchangeInfo = serde_json::from_str(json).unwrap();
        let filters = &info.symbols[0].filters;
        assert_eq!(filters.len(), 4);
        assert!(matches!(filters[2], SymbolFilter::Other));
        assert!(matches!(filters[3], SymbolFilter::MinNotional { notional } if notional == Decimal::new(5, 0)));
    }

    #[test]
    fn test_parse_order_response() {
        let json = r#"{"orderId":123456,"symbol":"SOLUSDT","status":"FILLED","avgPrice":"150.12000","executedQty":"0.33","side":"BUY"}"#;
        let ack = AsterClient::ack(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(ack.order_id, "123456");
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.avg_price, Some(Decimal::new(15012, 2)));

        let json = r#"{"orderId":7,"symbol":"SOLUSDT","status":"NEW","avgPrice":"0.00000"}"#;
        let ack = AsterClient::ack(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(ack.avg_price, None);
    }
}
