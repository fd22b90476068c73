use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{OrderStatusReport, SymbolRules, VenueClient};
use crate::bot::{Position, PositionSide, Venue};
use crate::util::{is_transient_error, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};

/// Resting take-profit order placed on a venue
#[derive(Debug, Clone, PartialEq)]
pub struct TakeProfitOrder {
    pub order_id: String,
    pub price: Decimal,
}

/// Venue-agnostic order execution used by the hedge engine.
///
/// Symbols are canonical ("SOL-USDT"). Venue failures never escape as errors:
/// they come back as `false` / `None` after being logged.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    fn venue(&self) -> Venue;

    async fn fetch_price(&self, symbol: &str) -> Result<Decimal>;

    /// Size `notional_usd` at the current price, submit a market order and
    /// resolve the actual fill price
    async fn open_position(&self, symbol: &str, side: PositionSide, notional_usd: Decimal) -> Option<Position>;

    /// Reduce-only market order for the full position quantity
    async fn close_position(&self, position: &Position) -> bool;

    /// GTC reduce-only limit at `entry * (1 ± target_rate)`
    async fn set_take_profit_limit(&self, position: &Position, target_rate: Decimal) -> Option<TakeProfitOrder>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> bool;

    async fn order_status(&self, symbol: &str, order_id: &str) -> Option<OrderStatusReport>;
}

/// `ExecutionGateway` over any `VenueClient`.
///
/// Owns symbol rule caching, sizing, retry policies and the venue's circuit breaker.
pub struct VenueGateway<C: VenueClient> {
    client: C,
    breaker: Mutex<CircuitBreaker>,
    fill_price_retry: RetryPolicy,
    order_retry: RetryPolicy,
    rules_cache: Mutex<HashMap<String, SymbolRules>>,
}

impl<C: VenueClient> VenueGateway<C> {
    pub fn new(
        client: C,
        fill_price_retry: RetryPolicy,
        order_retry: RetryPolicy,
        breaker_config: &CircuitBreakerConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(client.venue().as_str().to_uppercase(), breaker_config);
        Self {
            client,
            breaker: Mutex::new(breaker),
            fill_price_retry,
            order_retry: order_retry.with_classifier(is_transient_error),
            rules_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn breaker_state(&self) -> crate::util::BreakerState {
        self.breaker.lock().state()
    }

    fn tag(&self) -> String {
        format!("[{}]", self.client.venue().as_str().to_uppercase())
    }

    /// Run one venue call through the circuit breaker
    async fn guarded<T, Fut>(&self, what: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send,
    {
        {
            let mut breaker = self.breaker.lock();
            if !breaker.allow() {
                return Err(anyhow!(
                    "{} circuit breaker open, {} skipped ({}s until probe)",
                    self.tag(),
                    what,
                    breaker.remaining_open().as_secs()
                ));
            }
        }

        let result = call.await;
        let mut breaker = self.breaker.lock();
        match &result {
            Ok(_) => breaker.record_success(),
            Err(_) => breaker.record_failure(),
        }
        result
    }

    async fn rules(&self, venue_symbol: &str) -> Result<SymbolRules> {
        let cached = self.rules_cache.lock().get(venue_symbol).cloned();
        if let Some(rules) = cached {
            return Ok(rules);
        }

        let rules = self
            .guarded("symbol rules", self.client.symbol_rules(venue_symbol))
            .await?;
        debug!(
            "{} {} rules: step {} min qty {} tick {} min notional {}",
            self.tag(),
            venue_symbol,
            rules.step_size,
            rules.min_qty,
            rules.tick_size,
            rules.min_notional
        );
        self.rules_cache
            .lock()
            .insert(venue_symbol.to_string(), rules.clone());
        Ok(rules)
    }

    async fn lookup_fill_price(&self, venue_symbol: &str, order_id: &str) -> Result<Decimal> {
        self.fill_price_retry
            .run("fill price lookup", |_| async move {
                match self
                    .guarded("fill price", self.client.fill_price(venue_symbol, order_id))
                    .await?
                {
                    Some(price) if price > Decimal::ZERO => Ok(price),
                    _ => Err(anyhow!("fill for order {} not visible yet", order_id)),
                }
            })
            .await
    }
}

#[async_trait]
impl<C: VenueClient> ExecutionGateway for VenueGateway<C> {
    fn venue(&self) -> Venue {
        self.client.venue()
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Decimal> {
        let venue_symbol = self.client.venue_symbol(symbol);
        let price = self
            .guarded("ticker price", self.client.ticker_price(&venue_symbol))
            .await?;
        if price <= Decimal::ZERO {
            return Err(anyhow!("{} invalid ticker price {} for {}", self.tag(), price, venue_symbol));
        }
        Ok(price)
    }

    async fn open_position(&self, symbol: &str, side: PositionSide, notional_usd: Decimal) -> Option<Position> {
        let venue_symbol = self.client.venue_symbol(symbol);

        let quoted_price = match self.fetch_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!("{} Cannot open {} {}: price unavailable: {:#}", self.tag(), side, venue_symbol, e);
                return None;
            }
        };

        let rules = match self.rules(&venue_symbol).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("{} Cannot open {} {}: symbol rules unavailable: {:#}", self.tag(), side, venue_symbol, e);
                return None;
            }
        };

        let quantity = match rules.quantity_for_notional(notional_usd, quoted_price) {
            Ok(quantity) => quantity,
            Err(e) => {
                warn!("{} Cannot open {} {}: {}", self.tag(), side, venue_symbol, e);
                return None;
            }
        };
        let quantity_str = rules.format_quantity(quantity);
        let order_side = side.entry_order_side();

        info!(
            "{} Opening {} {} {} @ ~{} (${} notional)",
            self.tag(),
            side,
            quantity_str,
            venue_symbol,
            quoted_price,
            notional_usd
        );

        let ack = {
            let venue_symbol = venue_symbol.as_str();
            let quantity_str = quantity_str.as_str();
            self.order_retry
                .run("open market order", move |_| {
                    self.guarded(
                        "market order",
                        self.client.place_market_order(venue_symbol, order_side, quantity_str, false),
                    )
                })
                .await
        };

        let ack = match ack {
            Ok(ack) if ack.status.is_dead() => {
                warn!("{} Opening order {} was {:?}", self.tag(), ack.order_id, ack.status);
                return None;
            }
            Ok(ack) => ack,
            Err(e) => {
                warn!("{} Failed to open {} {}: {:#}", self.tag(), side, venue_symbol, e);
                return None;
            }
        };

        let mut position = match Position::open(self.venue(), symbol, side, quantity, quoted_price, ack.order_id.clone()) {
            Ok(position) => position,
            Err(e) => {
                warn!("{} Opening order {} produced an invalid position: {}", self.tag(), ack.order_id, e);
                return None;
            }
        };

        let inline_fill = ack.avg_price.filter(|p| *p > Decimal::ZERO);
        let fill_price = match inline_fill {
            Some(price) => Ok(price),
            None => self.lookup_fill_price(&venue_symbol, &ack.order_id).await,
        };

        match fill_price {
            Ok(price) => {
                position.confirm_entry_price(price);
                info!(
                    "{} Opened {} {} {} (order {}) fill {} (quoted {})",
                    self.tag(),
                    side,
                    quantity_str,
                    venue_symbol,
                    ack.order_id,
                    price,
                    quoted_price
                );
            }
            Err(e) => {
                warn!(
                    "{} Fill price for order {} unavailable, keeping quoted price {}: {:#}",
                    self.tag(),
                    ack.order_id,
                    quoted_price,
                    e
                );
            }
        }

        Some(position)
    }

    async fn close_position(&self, position: &Position) -> bool {
        let venue_symbol = self.client.venue_symbol(&position.symbol);
        let quantity = match self.rules(&venue_symbol).await {
            Ok(rules) => rules.format_quantity(position.quantity),
            Err(_) => position.quantity.normalize().to_string(),
        };
        let order_side = position.side.exit_order_side();

        info!(
            "{} Closing {} {} {} with {} market order",
            self.tag(),
            position.side,
            quantity,
            venue_symbol,
            order_side.as_str()
        );

        match self
            .guarded(
                "close market order",
                self.client.place_market_order(&venue_symbol, order_side, &quantity, true),
            )
            .await
        {
            Ok(ack) if ack.status.is_dead() => {
                warn!("{} Close order {} was {:?}", self.tag(), ack.order_id, ack.status);
                false
            }
            Ok(ack) => {
                info!("{} Close order {} accepted ({:?})", self.tag(), ack.order_id, ack.status);
                true
            }
            Err(e) => {
                warn!("{} Failed to close {} {}: {:#}", self.tag(), position.side, venue_symbol, e);
                false
            }
        }
    }

    async fn set_take_profit_limit(&self, position: &Position, target_rate: Decimal) -> Option<TakeProfitOrder> {
        let venue_symbol = self.client.venue_symbol(&position.symbol);
        let rules = match self.rules(&venue_symbol).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("{} Cannot place take-profit on {}: {:#}", self.tag(), venue_symbol, e);
                return None;
            }
        };

        let price = rules.round_price(position.take_profit_price(target_rate));
        let price_str = rules.format_price(price);
        let quantity_str = rules.format_quantity(position.quantity);
        let order_side = position.side.exit_order_side();

        match self
            .guarded(
                "take-profit limit order",
                self.client
                    .place_limit_order(&venue_symbol, order_side, &quantity_str, &price_str, true),
            )
            .await
        {
            Ok(ack) if ack.status.is_dead() => {
                warn!("{} Take-profit order {} was {:?}", self.tag(), ack.order_id, ack.status);
                None
            }
            Ok(ack) => {
                info!(
                    "{} Take-profit {} {} {} @ {} resting (order {})",
                    self.tag(),
                    order_side.as_str(),
                    quantity_str,
                    venue_symbol,
                    price_str,
                    ack.order_id
                );
                Some(TakeProfitOrder { order_id: ack.order_id, price })
            }
            Err(e) => {
                warn!("{} Failed to place take-profit on {}: {:#}", self.tag(), venue_symbol, e);
                None
            }
        }
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> bool {
        let venue_symbol = self.client.venue_symbol(symbol);
        match self
            .guarded("cancel order", self.client.cancel_order(&venue_symbol, order_id))
            .await
        {
            Ok(()) => {
                info!("{} Cancelled order {}", self.tag(), order_id);
                true
            }
            Err(e) => {
                warn!("{} Failed to cancel order {}: {:#}", self.tag(), order_id, e);
                false
            }
        }
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> Option<OrderStatusReport> {
        let venue_symbol = self.client.venue_symbol(symbol);
        match self
            .guarded("order status", self.client.order_status(&venue_symbol, order_id))
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                debug!("{} Order status for {} unavailable: {:#}", self.tag(), order_id, e);
                None
            }
        }
    }
}

/// The two venue gateways of a hedge, addressable by venue
#[derive(Clone)]
pub struct GatewayPair {
    aster: Arc<dyn ExecutionGateway>,
    backpack: Arc<dyn ExecutionGateway>,
}

impl GatewayPair {
    pub fn new(first: Arc<dyn ExecutionGateway>, second: Arc<dyn ExecutionGateway>) -> Result<Self> {
        match (first.venue(), second.venue()) {
            (Venue::Aster, Venue::Backpack) => Ok(Self { aster: first, backpack: second }),
            (Venue::Backpack, Venue::Aster) => Ok(Self { aster: second, backpack: first }),
            (a, b) => Err(anyhow!("gateways must cover both venues, got {} and {}", a, b)),
        }
    }

    pub fn get(&self, venue: Venue) -> &dyn ExecutionGateway {
        match venue {
            Venue::Aster => self.aster.as_ref(),
            Venue::Backpack => self.backpack.as_ref(),
        }
    }
}
