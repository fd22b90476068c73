use colored::Colorize;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::bot::{CloseReason, PositionLedger};
use crate::connector::GatewayPair;
use crate::error::HedgeError;
use crate::events::{EventSink, HedgeEvent};
use crate::services::price_oracle::PriceOracle;
use crate::strategy::{ClosingPolicy, HedgeState};
use crate::util::ShutdownSignal;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    /// Force-close after this many ticks
    pub max_ticks: u32,
    /// Force-close after this much wall-clock time
    pub max_duration: Option<Duration>,
}

/// Why the monitor loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    AllClosed,
    Shutdown,
    TickCeiling,
    TimeCeiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorReport {
    pub exit: MonitorExit,
    pub ticks: u32,
    /// False when a forced close left some leg open on its venue
    pub all_closed: bool,
}

/// Polls prices, updates the ledger and runs the closing policy every
/// `interval` until no leg is left open.
pub struct MonitorLoop<'a> {
    symbol: String,
    oracle: &'a PriceOracle,
    policy: &'a ClosingPolicy,
    gateways: &'a GatewayPair,
    sink: &'a dyn EventSink,
    shutdown: ShutdownSignal,
    settings: MonitorSettings,
}

impl<'a> MonitorLoop<'a> {
    pub fn new(
        symbol: impl Into<String>,
        oracle: &'a PriceOracle,
        policy: &'a ClosingPolicy,
        gateways: &'a GatewayPair,
        sink: &'a dyn EventSink,
        shutdown: ShutdownSignal,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            oracle,
            policy,
            gateways,
            sink,
            shutdown,
            settings,
        }
    }

    pub async fn run(&self, ledger: &mut PositionLedger) -> MonitorReport {
        let started = Instant::now();
        let mut ticks: u32 = 0;

        loop {
            if self.shutdown.is_triggered() {
                info!("[MONITOR] Stop requested after {} ticks, force-closing", ticks);
                let all_closed = self.force_close(ledger, CloseReason::ForceClose).await;
                return MonitorReport { exit: MonitorExit::Shutdown, ticks, all_closed };
            }

            if !ledger.has_active() {
                self.policy.cancel_stale_take_profits(ledger, self.gateways).await;
                return MonitorReport { exit: MonitorExit::AllClosed, ticks, all_closed: true };
            }

            if ticks >= self.settings.max_ticks {
                warn!("[MONITOR] Reached {} ticks, force-closing remaining legs", ticks);
                let all_closed = self.force_close(ledger, CloseReason::TickCeiling).await;
                return MonitorReport { exit: MonitorExit::TickCeiling, ticks, all_closed };
            }

            if let Some(max_duration) = self.settings.max_duration {
                if started.elapsed() >= max_duration {
                    warn!(
                        "[MONITOR] Round exceeded {}s, force-closing remaining legs",
                        max_duration.as_secs()
                    );
                    let all_closed = self.force_close(ledger, CloseReason::TickCeiling).await;
                    return MonitorReport { exit: MonitorExit::TimeCeiling, ticks, all_closed };
                }
            }

            ticks += 1;
            if let Err(e) = self.tick(ticks, ledger).await {
                self.sink
                    .emit(&HedgeEvent::TickSkipped { tick: ticks, error: e.to_string() })
                    .await;
            }

            if !ledger.has_active() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = self.shutdown.wait() => {
                    debug!("[MONITOR] Woken by stop signal");
                }
            }
        }
    }

    /// One tick: prices -> ledger -> closing policy.
    ///
    /// When both price fetches fail the ledger is left untouched.
    pub async fn tick(&self, tick: u32, ledger: &mut PositionLedger) -> Result<HedgeState, HedgeError> {
        let quote = self.oracle.get_prices(&self.symbol).await?;

        for venue in ledger.active_venues() {
            if let Some(price) = quote.get(venue) {
                ledger.update_price(venue, price);
            }
        }

        self.print_status(tick, ledger);

        Ok(self.policy.evaluate(ledger, self.gateways, self.sink).await)
    }

    async fn force_close(&self, ledger: &mut PositionLedger, reason: CloseReason) -> bool {
        let all_closed = self
            .policy
            .force_close_all(ledger, reason, self.gateways, self.sink)
            .await;
        if !all_closed {
            for position in ledger.active_positions() {
                warn!(
                    "[MONITOR] {} {} {} {} still open after {}",
                    position.venue, position.side, position.quantity, position.symbol, reason
                );
            }
        }
        all_closed
    }

    fn print_status(&self, tick: u32, ledger: &PositionLedger) {
        let mut parts = Vec::new();
        for position in ledger.active_positions() {
            let ratio = (position.pnl_ratio() * Decimal::ONE_HUNDRED).round_dp(3);
            let pnl = position.pnl().round_dp(4);
            let pnl_str = if pnl >= Decimal::ZERO {
                format!("{:+} ({:+}%)", pnl, ratio).green()
            } else {
                format!("{:+} ({:+}%)", pnl, ratio).red()
            };
            let tp = match &position.limit_order_id {
                Some(_) => " TP".cyan().to_string(),
                None => String::new(),
            };
            parts.push(format!(
                "{} {} @ {} {}{}",
                position.venue, position.side, position.current_price, pnl_str, tp
            ));
        }

        tprintln!(
            "{} #{} {}",
            format!("[{} MONITOR]", self.symbol).bright_white().bold(),
            tick,
            parts.join(" | ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{Position, PositionSide, Venue};
    use crate::test_support::{dec, mock_pair, RecordingSink};

    fn settings(max_ticks: u32) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::ZERO,
            max_ticks,
            max_duration: None,
        }
    }

    fn hedged() -> PositionLedger {
        let mut ledger = PositionLedger::new();
        for (venue, side) in [(Venue::Aster, PositionSide::Long), (Venue::Backpack, PositionSide::Short)] {
            ledger.record(Position::open(venue, "SOL-USDT", side, dec("1"), dec("150"), "1").unwrap());
        }
        ledger
    }

    fn policy() -> ClosingPolicy {
        ClosingPolicy::new(dec("0.008"), dec("0.003"))
    }

    #[tokio::test]
    async fn test_tick_skipped_when_no_price() {
        let (aster, backpack, pair) = mock_pair("148", "148");
        aster.set_price(None);
        backpack.set_price(None);
        let oracle = PriceOracle::new(pair.clone());
        let policy = policy();
        let sink = RecordingSink::default();
        let monitor = MonitorLoop::new("SOL-USDT", &oracle, &policy, &pair, &sink, ShutdownSignal::new(), settings(10));
        let mut ledger = hedged();

        let result = monitor.tick(1, &mut ledger).await;

        assert!(matches!(result, Err(HedgeError::NoPriceAvailable { .. })));
        for position in ledger.positions() {
            assert!(position.is_active());
            assert_eq!(position.current_price, dec("150"));
        }
        assert_eq!(aster.calls().closes + backpack.calls().closes, 0);
    }

    #[tokio::test]
    async fn test_one_sided_price_updates_only_that_leg() {
        let (aster, _backpack, pair) = mock_pair("150", "149.4");
        aster.set_price(None);
        let oracle = PriceOracle::new(pair.clone());
        let policy = policy();
        let sink = RecordingSink::default();
        let monitor = MonitorLoop::new("SOL-USDT", &oracle, &policy, &pair, &sink, ShutdownSignal::new(), settings(10));
        let mut ledger = hedged();

        let state = monitor.tick(1, &mut ledger).await.unwrap();

        assert_eq!(state, HedgeState::TwoActive);
        assert_eq!(ledger.get(Venue::Aster).unwrap().current_price, dec("150"));
        assert_eq!(ledger.get(Venue::Backpack).unwrap().current_price, dec("149.4"));
    }

    #[tokio::test]
    async fn test_run_until_all_closed() {
        let (aster, backpack, pair) = mock_pair("148", "148");
        let oracle = PriceOracle::new(pair.clone());
        let policy = policy();
        let sink = RecordingSink::default();
        let monitor = MonitorLoop::new("SOL-USDT", &oracle, &policy, &pair, &sink, ShutdownSignal::new(), settings(10));
        let mut ledger = hedged();

        // Tick 1 stops out the long; tick 2 sees the take-profit filled
        backpack.script_statuses(vec![Some(crate::connector::OrderStatusReport {
            status: crate::connector::OrderStatus::Filled,
            avg_price: None,
        })]);
        let report = monitor.run(&mut ledger).await;

        assert_eq!(report, MonitorReport { exit: MonitorExit::AllClosed, ticks: 2, all_closed: true });
        assert_eq!(aster.calls().closes, 1);
        assert_eq!(ledger.get(Venue::Backpack).unwrap().exit_price, Some(dec("149.55")));
    }

    #[tokio::test]
    async fn test_take_profit_left_by_failed_cancel_is_swept() {
        let (_aster, backpack, pair) = mock_pair("148", "151.3");
        backpack.script_cancels(&[false]);
        let oracle = PriceOracle::new(pair.clone());
        let policy = policy();
        let sink = RecordingSink::default();
        let monitor = MonitorLoop::new("SOL-USDT", &oracle, &policy, &pair, &sink, ShutdownSignal::new(), settings(10));
        let mut ledger = hedged();
        ledger.get_mut(Venue::Backpack).unwrap().limit_order_id = Some("tp-9".to_string());

        let report = monitor.run(&mut ledger).await;

        assert_eq!(report, MonitorReport { exit: MonitorExit::AllClosed, ticks: 2, all_closed: true });
        assert_eq!(backpack.calls().cancels, 2);
        assert_eq!(ledger.get(Venue::Backpack).unwrap().limit_order_id, None);
    }

    #[tokio::test]
    async fn test_skipped_ticks_count_towards_ceiling() {
        let (aster, backpack, pair) = mock_pair("150", "150");
        aster.set_price(None);
        backpack.set_price(None);
        let oracle = PriceOracle::new(pair.clone());
        let policy = policy();
        let sink = RecordingSink::default();
        let monitor = MonitorLoop::new("SOL-USDT", &oracle, &policy, &pair, &sink, ShutdownSignal::new(), settings(3));
        let mut ledger = hedged();

        let report = monitor.run(&mut ledger).await;

        assert_eq!(report.exit, MonitorExit::TickCeiling);
        assert_eq!(report.ticks, 3);
        assert!(report.all_closed);
        assert_eq!(sink.count(|e| matches!(e, HedgeEvent::TickSkipped { .. })), 3);
        assert!(ledger
            .positions()
            .all(|p| p.close_reason == Some(CloseReason::TickCeiling)));
    }

    #[tokio::test]
    async fn test_shutdown_force_closes() {
        let (_aster, backpack, pair) = mock_pair("150", "150");
        backpack.script_closes(&[false]);
        let oracle = PriceOracle::new(pair.clone());
        let policy = policy();
        let sink = RecordingSink::default();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let monitor = MonitorLoop::new("SOL-USDT", &oracle, &policy, &pair, &sink, shutdown, settings(10));
        let mut ledger = hedged();

        let report = monitor.run(&mut ledger).await;

        assert_eq!(report.exit, MonitorExit::Shutdown);
        assert_eq!(report.ticks, 0);
        assert!(!report.all_closed);
        assert_eq!(
            ledger.get(Venue::Aster).unwrap().close_reason,
            Some(CloseReason::ForceClose)
        );
        assert!(ledger.get(Venue::Backpack).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_time_ceiling() {
        let (_aster, _backpack, pair) = mock_pair("150", "150");
        let oracle = PriceOracle::new(pair.clone());
        let policy = policy();
        let sink = RecordingSink::default();
        let settings = MonitorSettings {
            interval: Duration::ZERO,
            max_ticks: 1_000,
            max_duration: Some(Duration::ZERO),
        };
        let monitor = MonitorLoop::new("SOL-USDT", &oracle, &policy, &pair, &sink, ShutdownSignal::new(), settings);
        let mut ledger = hedged();

        let report = monitor.run(&mut ledger).await;
        assert_eq!(report.exit, MonitorExit::TimeCeiling);
        assert!(report.all_closed);
    }
}
