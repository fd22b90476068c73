use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::types::*;
use crate::bot::{OrderSide, Venue};
use crate::config::VenueConfig;
use crate::connector::{
    weighted_average_price, AssetBalance, OrderAck, OrderStatus, OrderStatusReport, SymbolRules,
    VenueClient,
};

const MAINNET_REST_URL: &str = "https://api.backpack.exchange";

/// Credentials for Backpack trading
#[derive(Debug, Clone)]
pub struct BackpackCredentials {
    pub api_key: String,    // Base64 ED25519 public key
    pub secret_key: String, // Base64 ED25519 32-byte seed
}

impl BackpackCredentials {
    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_key = std::env::var("BACKPACK_API_KEY")
            .context("BACKPACK_API_KEY not found in environment")?;
        let secret_key = std::env::var("BACKPACK_SECRET_KEY")
            .context("BACKPACK_SECRET_KEY not found in environment")?;

        Ok(Self { api_key, secret_key })
    }

    fn signing_key(&self) -> Result<SigningKey> {
        let seed_bytes = STANDARD
            .decode(self.secret_key.trim())
            .context("Failed to decode Backpack secret key")?;

        if seed_bytes.len() != 32 {
            anyhow::bail!(
                "Invalid Backpack secret key length: expected 32 bytes, got {}",
                seed_bytes.len()
            );
        }

        let seed: [u8; 32] = seed_bytes[..]
            .try_into()
            .context("Failed to extract seed from secret key")?;
        Ok(SigningKey::from_bytes(&seed))
    }
}

/// "SOL-USDT" -> "SOL_USDC"
pub fn map_symbol(symbol: &str) -> String {
    let upper = symbol.replace(['-', '/'], "_").to_uppercase();
    match upper.strip_suffix("_USDT") {
        Some(base) => format!("{}_USDC", base),
        None => upper,
    }
}

/// `instruction=<name>&<params sorted by key>&timestamp=<ms>&window=<ms>`
pub fn signing_payload(instruction: &str, params: &BTreeMap<String, Value>, timestamp: i64, window: u64) -> String {
    let mut parts = vec![format!("instruction={}", instruction)];
    for (key, value) in params {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(format!("{}={}", key, value));
    }
    parts.push(format!("timestamp={}", timestamp));
    parts.push(format!("window={}", window));
    parts.join("&")
}

/// Backpack exchange REST client
pub struct BackpackClient {
    credentials: BackpackCredentials,
    signing_key: SigningKey,
    rest_url: String,
    window_ms: u64,
    symbol_override: Option<String>,
    min_notional_floor: Option<Decimal>,
    client: reqwest::Client,
}

impl BackpackClient {
    pub fn new(credentials: BackpackCredentials, config: &VenueConfig) -> Result<Self> {
        let signing_key = credentials.signing_key()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build Backpack HTTP client")?;

        let rest_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| MAINNET_REST_URL.to_string());
        info!("[BACKPACK] REST client ready ({})", rest_url);

        Ok(Self {
            credentials,
            signing_key,
            rest_url,
            window_ms: config.recv_window_ms,
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
        debug!("[BACKPACK] GET {}", url);

        let response = self.client.get(&url).send().await?;
        Self::parse_response(response).await
    }

    /// Signed request. GET params go in the query string, others in a JSON body.
    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        instruction: &str,
        params: BTreeMap<String, Value>,
    ) -> Result<T> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let payload = signing_payload(instruction, &params, timestamp, self.window_ms);
        let signature = STANDARD.encode(self.signing_key.sign(payload.as_bytes()).to_bytes());

        debug!("[BACKPACK] {} {} ({})", method, path, instruction);

        let url = format!("{}{}", self.rest_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("X-API-Key", &self.credentials.api_key)
            .header("X-Signature", signature)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Window", self.window_ms.to_string());

        if method == Method::GET {
            let query: Vec<(String, String)> = params
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect();
            request = request.query(&query);
        } else if !params.is_empty() {
            let body: Map<String, Value> = params.into_iter().collect();
            request = request.json(&body);
        }

        let response = request.send().await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return match serde_json::from_str::<ApiError>(&body) {
                Ok(err) => Err(anyhow!("HTTP {}: {} ({})", status.as_u16(), err.message, err.code)),
                Err(_) => Err(anyhow!("HTTP {}: {}", status.as_u16(), body)),
            };
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to parse Backpack response: {}", body))
    }

    fn side_str(side: OrderSide) -> &'static str {
        match side {
            OrderSide::Buy => "Bid",
            OrderSide::Sell => "Ask",
        }
    }

    fn ack(order: &OrderResponse) -> Result<OrderAck> {
        let status = OrderStatus::from_venue_str(&order.status)
            .with_context(|| format!("Unknown Backpack order status: {}", order.status))?;
        Ok(OrderAck {
            order_id: order.id.clone(),
            status,
            avg_price: order.avg_price(),
        })
    }

    async fn execute_order(&self, params: BTreeMap<String, Value>) -> Result<OrderAck> {
        let order: OrderResponse = self
            .signed_request(Method::POST, "/api/v1/order", "orderExecute", params)
            .await?;
        info!("[BACKPACK] {} order {} ({})", order.symbol, order.id, order.status);
        Self::ack(&order)
    }

    /// Look the order up in history once it is no longer open
    async fn order_from_history(&self, symbol: &str, order_id: &str) -> Result<OrderResponse> {
        let params = BTreeMap::from([
            ("orderId".to_string(), Value::from(order_id)),
            ("symbol".to_string(), Value::from(symbol)),
        ]);
        let orders: Vec<OrderResponse> = self
            .signed_request(Method::GET, "/wapi/v1/history/orders", "orderHistoryQueryAll", params)
            .await?;
        orders
            .into_iter()
            .find(|o| o.id == order_id)
            .with_context(|| format!("Order {} not found in Backpack history", order_id))
    }
}

#[async_trait]
impl VenueClient for BackpackClient {
    fn venue(&self) -> Venue {
        Venue::Backpack
    }

    fn venue_symbol(&self, symbol: &str) -> String {
        self.symbol_override
            .clone()
            .unwrap_or_else(|| map_symbol(symbol))
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: Ticker = self
            .public_get("/api/v1/ticker", &format!("symbol={}", symbol))
            .await?;
        debug!("[BACKPACK] {} price {}", ticker.symbol, ticker.last_price);
        Ok(ticker.last_price)
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        let markets: Vec<Market> = self.public_get("/api/v1/markets", "").await?;
        let market = markets
            .into_iter()
            .find(|m| m.symbol == symbol)
            .with_context(|| format!("Market {} not listed on Backpack", symbol))?;

        Ok(SymbolRules {
            step_size: market.filters.quantity.step_size,
            min_qty: market.filters.quantity.min_quantity,
            tick_size: market.filters.price.tick_size,
            min_notional: self.min_notional_floor.unwrap_or(Decimal::ZERO),
        })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &str,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let mut params = BTreeMap::from([
            ("orderType".to_string(), Value::from("Market")),
            ("quantity".to_string(), Value::from(quantity)),
            ("side".to_string(), Value::from(Self::side_str(side))),
            ("symbol".to_string(), Value::from(symbol)),
        ]);
        if reduce_only {
            params.insert("reduceOnly".to_string(), Value::Bool(true));
        }
        self.execute_order(params).await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &str,
        price: &str,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let mut params = BTreeMap::from([
            ("orderType".to_string(), Value::from("Limit")),
            ("price".to_string(), Value::from(price)),
            ("quantity".to_string(), Value::from(quantity)),
            ("side".to_string(), Value::from(Self::side_str(side))),
            ("symbol".to_string(), Value::from(symbol)),
            ("timeInForce".to_string(), Value::from("GTC")),
        ]);
        if reduce_only {
            params.insert("reduceOnly".to_string(), Value::Bool(true));
        }
        self.execute_order(params).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        let params = BTreeMap::from([
            ("orderId".to_string(), Value::from(order_id)),
            ("symbol".to_string(), Value::from(symbol)),
        ]);
        let _: OrderResponse = self
            .signed_request(Method::DELETE, "/api/v1/order", "orderCancel", params)
            .await?;
        Ok(())
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatusReport> {
        let params = BTreeMap::from([
            ("orderId".to_string(), Value::from(order_id)),
            ("symbol".to_string(), Value::from(symbol)),
        ]);

        // The open-order endpoint 404s once the order left the book
        let order = match self
            .signed_request::<OrderResponse>(Method::GET, "/api/v1/order", "orderQuery", params)
            .await
        {
            Ok(order) => order,
            Err(e) if e.to_string().contains("HTTP 404") => self.order_from_history(symbol, order_id).await?,
            Err(e) => return Err(e),
        };

        let ack = Self::ack(&order)?;
        Ok(OrderStatusReport {
            status: ack.status,
            avg_price: ack.avg_price,
        })
    }

    async fn fill_price(&self, symbol: &str, order_id: &str) -> Result<Option<Decimal>> {
        if let Ok(order) = self.order_from_history(symbol, order_id).await {
            if let Some(price) = order.avg_price() {
                return Ok(Some(price));
            }
        }

        let params = BTreeMap::from([
            ("orderId".to_string(), Value::from(order_id)),
            ("symbol".to_string(), Value::from(symbol)),
        ]);
        let fills: Vec<Fill> = self
            .signed_request(Method::GET, "/wapi/v1/history/fills", "fillHistoryQueryAll", params)
            .await?;
        let fills: Vec<(Decimal, Decimal)> = fills
            .iter()
            .filter(|f| f.order_id == order_id)
            .map(|f| (f.price, f.quantity))
            .collect();

        Ok(weighted_average_price(&fills))
    }

    async fn balances(&self) -> Result<Vec<AssetBalance>> {
        let capital: CapitalResponse = self
            .signed_request(Method::GET, "/api/v1/capital", "balanceQuery", BTreeMap::new())
            .await?;

        let mut balances: Vec<AssetBalance> = capital
            .into_iter()
            .map(|(asset, entry)| AssetBalance {
                asset,
                available: entry.available,
                total: entry.available + entry.locked + entry.staked,
            })
            .filter(|b| !b.total.is_zero())
            .collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(balances)
    }
}
