//! Scripted venues and a recording sink shared by the unit tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::bot::{OrderSide, Position, PositionSide, Venue};
use crate::connector::{
    AssetBalance, ExecutionGateway, GatewayPair, OrderAck, OrderStatus, OrderStatusReport, SymbolRules,
    TakeProfitOrder, VenueClient,
};
use crate::events::{EventSink, HedgeEvent};

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Collects every emitted event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<HedgeEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<HedgeEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&HedgeEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: &HedgeEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Call counters of a `MockGateway`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GatewayCalls {
    pub price_fetches: u32,
    pub opens: u32,
    pub closes: u32,
    pub take_profits: u32,
    pub cancels: u32,
    pub status_queries: u32,
}

/// In-memory `ExecutionGateway` with scripted answers
pub struct MockGateway {
    venue: Venue,
    /// None = fetch fails
    price: Mutex<Option<Decimal>>,
    /// Entry price and whether the fill was confirmed; None = open fails
    open_fill: Mutex<Option<(Decimal, bool)>>,
    /// Scripted close results, `true` once exhausted
    close_results: Mutex<VecDeque<bool>>,
    /// Scripted status answers, resting `New` once exhausted
    statuses: Mutex<VecDeque<Option<OrderStatusReport>>>,
    /// Scripted cancel results, `true` once exhausted
    cancel_results: Mutex<VecDeque<bool>>,
    take_profit_fails: Mutex<bool>,
    calls: Mutex<GatewayCalls>,
}

impl MockGateway {
    pub fn new(venue: Venue, price: &str) -> Self {
        let price = dec(price);
        Self {
            venue,
            price: Mutex::new(Some(price)),
            open_fill: Mutex::new(Some((price, true))),
            close_results: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            cancel_results: Mutex::new(VecDeque::new()),
            take_profit_fails: Mutex::new(false),
            calls: Mutex::new(GatewayCalls::default()),
        }
    }

    pub fn set_price(&self, price: Option<&str>) {
        *self.price.lock() = price.map(dec);
    }

    pub fn fail_open(&self) {
        *self.open_fill.lock() = None;
    }

    /// Open at the quoted price without a confirmed fill
    pub fn open_unconfirmed(&self) {
        let price = self.price.lock().unwrap_or(Decimal::ONE);
        *self.open_fill.lock() = Some((price, false));
    }

    pub fn script_closes(&self, results: &[bool]) {
        self.close_results.lock().extend(results.iter().copied());
    }

    pub fn script_cancels(&self, results: &[bool]) {
        self.cancel_results.lock().extend(results.iter().copied());
    }

    pub fn script_statuses(&self, statuses: Vec<Option<OrderStatusReport>>) {
        self.statuses.lock().extend(statuses);
    }

    pub fn fail_take_profits(&self, fail: bool) {
        *self.take_profit_fails.lock() = fail;
    }

    pub fn calls(&self) -> GatewayCalls {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ExecutionGateway for MockGateway {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn fetch_price(&self, _symbol: &str) -> Result<Decimal> {
        self.calls.lock().price_fetches += 1;
        let price = *self.price.lock();
        price.ok_or_else(|| anyhow!("{} ticker timed out", self.venue))
    }

    async fn open_position(&self, symbol: &str, side: PositionSide, notional_usd: Decimal) -> Option<Position> {
        let id = {
            let mut calls = self.calls.lock();
            calls.opens += 1;
            calls.opens
        };
        let (entry, confirmed) = (*self.open_fill.lock())?;
        let quantity = (notional_usd / entry).round_dp(2);
        let mut position = Position::open(self.venue, symbol, side, quantity, entry, format!("open-{}", id)).ok()?;
        if confirmed {
            position.confirm_entry_price(entry);
        }
        Some(position)
    }

    async fn close_position(&self, _position: &Position) -> bool {
        self.calls.lock().closes += 1;
        self.close_results.lock().pop_front().unwrap_or(true)
    }

    async fn set_take_profit_limit(&self, position: &Position, target_rate: Decimal) -> Option<TakeProfitOrder> {
        let n = {
            let mut calls = self.calls.lock();
            calls.take_profits += 1;
            calls.take_profits
        };
        if *self.take_profit_fails.lock() {
            return None;
        }
        Some(TakeProfitOrder {
            order_id: format!("tp-{}", n),
            price: position.take_profit_price(target_rate),
        })
    }

    async fn cancel_order(&self, _symbol: &str, _order_id: &str) -> bool {
        self.calls.lock().cancels += 1;
        self.cancel_results.lock().pop_front().unwrap_or(true)
    }

    async fn order_status(&self, _symbol: &str, _order_id: &str) -> Option<OrderStatusReport> {
        self.calls.lock().status_queries += 1;
        self.statuses.lock().pop_front().unwrap_or(Some(OrderStatusReport {
            status: OrderStatus::New,
            avg_price: None,
        }))
    }
}

pub fn mock_pair(aster_price: &str, backpack_price: &str) -> (Arc<MockGateway>, Arc<MockGateway>, GatewayPair) {
    let aster = Arc::new(MockGateway::new(Venue::Aster, aster_price));
    let backpack = Arc::new(MockGateway::new(Venue::Backpack, backpack_price));
    let pair = GatewayPair::new(aster.clone(), backpack.clone()).unwrap();
    (aster, backpack, pair)
}

/// Order submitted to a `MockVenueClient`
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub side: OrderSide,
    pub quantity: String,
    pub price: Option<String>,
    pub reduce_only: bool,
}

/// In-memory `VenueClient` with scripted REST answers
pub struct MockVenueClient {
    venue: Venue,
    price: Decimal,
    rules: SymbolRules,
    /// Scripted market order answers; accepted `New` without fill once exhausted
    market_results: Mutex<VecDeque<Result<OrderAck, String>>>,
    /// Scripted fill lookups; `Ok(None)` once exhausted
    fill_results: Mutex<VecDeque<Result<Option<Decimal>, String>>>,
    ticker_error: Mutex<Option<String>>,
    pub orders: Mutex<Vec<SubmittedOrder>>,
    pub fill_lookups: Mutex<u32>,
    pub ticker_calls: Mutex<u32>,
    /// Symbols passed to `ticker_price`
    pub ticker_symbols: Mutex<Vec<String>>,
}

impl MockVenueClient {
    pub fn new(venue: Venue, price: &str) -> Self {
        Self {
            venue,
            price: dec(price),
            rules: SymbolRules {
                step_size: dec("0.01"),
                min_qty: dec("0.01"),
                tick_size: dec("0.01"),
                min_notional: dec("5"),
            },
            market_results: Mutex::new(VecDeque::new()),
            fill_results: Mutex::new(VecDeque::new()),
            ticker_error: Mutex::new(None),
            orders: Mutex::new(Vec::new()),
            fill_lookups: Mutex::new(0),
            ticker_calls: Mutex::new(0),
            ticker_symbols: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rules(mut self, rules: SymbolRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn script_market(&self, results: Vec<Result<OrderAck, String>>) {
        self.market_results.lock().extend(results);
    }

    pub fn script_fills(&self, results: Vec<Result<Option<Decimal>, String>>) {
        self.fill_results.lock().extend(results);
    }

    pub fn fail_ticker(&self, error: Option<&str>) {
        *self.ticker_error.lock() = error.map(str::to_string);
    }

    pub fn orders(&self) -> Vec<SubmittedOrder> {
        self.orders.lock().clone()
    }
}

pub fn ack(order_id: &str, status: OrderStatus, avg_price: Option<&str>) -> OrderAck {
    OrderAck {
        order_id: order_id.to_string(),
        status,
        avg_price: avg_price.map(dec),
    }
}

#[async_trait]
impl VenueClient for MockVenueClient {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn venue_symbol(&self, symbol: &str) -> String {
        symbol.replace('-', "")
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        *self.ticker_calls.lock() += 1;
        self.ticker_symbols.lock().push(symbol.to_string());
        if let Some(e) = self.ticker_error.lock().clone() {
            return Err(anyhow!(e));
        }
        Ok(self.price)
    }

    async fn symbol_rules(&self, _symbol: &str) -> Result<SymbolRules> {
        Ok(self.rules.clone())
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        side: OrderSide,
        quantity: &str,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let n = {
            let mut orders = self.orders.lock();
            orders.push(SubmittedOrder {
                side,
                quantity: quantity.to_string(),
                price: None,
                reduce_only,
            });
            orders.len()
        };
        match self.market_results.lock().pop_front() {
            Some(Ok(ack)) => Ok(ack),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(ack(&format!("m-{}", n), OrderStatus::New, None)),
        }
    }

    async fn place_limit_order(
        &self,
        _symbol: &str,
        side: OrderSide,
        quantity: &str,
        price: &str,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let n = {
            let mut orders = self.orders.lock();
            orders.push(SubmittedOrder {
                side,
                quantity: quantity.to_string(),
                price: Some(price.to_string()),
                reduce_only,
            });
            orders.len()
        };
        Ok(ack(&format!("l-{}", n), OrderStatus::New, None))
    }

    async fn cancel_order(&self, _symbol: &str, _order_id: &str) -> Result<()> {
        Ok(())
    }

    async fn order_status(&self, _symbol: &str, _order_id: &str) -> Result<OrderStatusReport> {
        Ok(OrderStatusReport {
            status: OrderStatus::New,
            avg_price: None,
        })
    }

    async fn fill_price(&self, _symbol: &str, _order_id: &str) -> Result<Option<Decimal>> {
        *self.fill_lookups.lock() += 1;
        match self.fill_results.lock().pop_front() {
            Some(Ok(price)) => Ok(price),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(None),
        }
    }

    async fn balances(&self) -> Result<Vec<AssetBalance>> {
        Ok(Vec::new())
    }
}
