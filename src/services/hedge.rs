use chrono::Utc;
use colored::Colorize;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bot::{PositionLedger, PositionSide, Venue};
use crate::config::Config;
use crate::connector::GatewayPair;
use crate::error::HedgeError;
use crate::events::{EventSink, HedgeEvent, LegSummary, RoundOutcome, RoundSummary};
use crate::services::monitor::{MonitorExit, MonitorLoop, MonitorSettings};
use crate::services::price_oracle::PriceOracle;
use crate::strategy::ClosingPolicy;
use crate::util::ShutdownSignal;

/// Parameters of one hedge round
#[derive(Debug, Clone)]
pub struct HedgeSettings {
    pub symbol: String,
    pub position_size_usd: Decimal,
    pub long_venue: Venue,
    pub stop_loss_threshold: Decimal,
    pub profit_target_rate: Decimal,
    pub total_fee_rate: Decimal,
    pub min_price_move: Decimal,
    pub monitor: MonitorSettings,
}

impl From<&Config> for HedgeSettings {
    fn from(config: &Config) -> Self {
        Self {
            symbol: config.symbol.clone(),
            position_size_usd: config.position_size_usd,
            long_venue: config.long_venue,
            stop_loss_threshold: config.stop_loss_threshold,
            profit_target_rate: config.profit_target_rate,
            total_fee_rate: config.total_fee_rate,
            min_price_move: config.min_price_move,
            monitor: MonitorSettings {
                interval: config.monitoring_interval(),
                max_ticks: config.max_ticks,
                max_duration: config.max_round_duration(),
            },
        }
    }
}

/// Executes hedge rounds: open both legs, monitor, summarize.
///
/// All round state lives in a fresh `PositionLedger` per round.
pub struct HedgeEngine {
    settings: HedgeSettings,
    gateways: GatewayPair,
    oracle: PriceOracle,
    policy: ClosingPolicy,
    sink: Arc<dyn EventSink>,
    shutdown: ShutdownSignal,
}

impl HedgeEngine {
    pub fn new(
        settings: HedgeSettings,
        gateways: GatewayPair,
        sink: Arc<dyn EventSink>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let oracle = PriceOracle::new(gateways.clone());
        let policy = ClosingPolicy::new(settings.stop_loss_threshold, settings.profit_target_rate);
        Self {
            settings,
            gateways,
            oracle,
            policy,
            sink,
            shutdown,
        }
    }

    pub fn settings(&self) -> &HedgeSettings {
        &self.settings
    }

    /// One full hedge round. Errors only when no leg could be opened.
    pub async fn run_round(&self) -> Result<RoundSummary, HedgeError> {
        let round_id = Uuid::new_v4().to_string()[..8].to_string();
        let started_at = Utc::now();
        let symbol = self.settings.symbol.as_str();
        let long_venue = self.settings.long_venue;
        let short_venue = long_venue.other();
        let notional = self.settings.position_size_usd;

        self.sink
            .emit(&HedgeEvent::RoundStarted {
                round_id: round_id.clone(),
                symbol: symbol.to_string(),
                long_venue,
            })
            .await;

        // Both legs at once to keep the entry prices close
        let (long, short) = tokio::join!(
            self.gateways
                .get(long_venue)
                .open_position(symbol, PositionSide::Long, notional),
            self.gateways
                .get(short_venue)
                .open_position(symbol, PositionSide::Short, notional),
        );

        let mut ledger = PositionLedger::with_min_price_move(self.settings.min_price_move);
        for (venue, side, opened) in [
            (long_venue, PositionSide::Long, long),
            (short_venue, PositionSide::Short, short),
        ] {
            match opened {
                Some(position) => {
                    if !position.entry_price_confirmed {
                        self.sink
                            .emit(&HedgeEvent::FillPriceFallback {
                                venue,
                                order_id: position.order_id.clone(),
                                quoted_price: position.entry_price,
                            })
                            .await;
                    }
                    self.sink
                        .emit(&HedgeEvent::PositionOpened { position: position.clone() })
                        .await;
                    ledger.record(position);
                }
                None => {
                    self.sink.emit(&HedgeEvent::LegOpenFailed { venue, side }).await;
                }
            }
        }

        match ledger.active_venues().as_slice() {
            [] => {
                return Err(HedgeError::NoLegOpened {
                    symbol: symbol.to_string(),
                })
            }
            [surviving] => {
                self.sink
                    .emit(&HedgeEvent::DegradedSingleLeg { surviving: *surviving })
                    .await;
            }
            _ => {}
        }

        let monitor = MonitorLoop::new(
            symbol,
            &self.oracle,
            &self.policy,
            &self.gateways,
            self.sink.as_ref(),
            self.shutdown.clone(),
            self.settings.monitor.clone(),
        );
        let report = monitor.run(&mut ledger).await;

        let outcome = if !report.all_closed {
            RoundOutcome::Unresolved
        } else {
            match report.exit {
                MonitorExit::AllClosed => RoundOutcome::Completed,
                MonitorExit::Shutdown => RoundOutcome::ForceClosed,
                MonitorExit::TickCeiling | MonitorExit::TimeCeiling => RoundOutcome::CeilingReached,
            }
        };

        let legs: Vec<LegSummary> = ledger.positions().map(LegSummary::from).collect();
        let realized_pnl: Decimal = legs.iter().map(|l| l.pnl).sum();
        let fee_estimate = notional * self.settings.total_fee_rate;
        let summary = RoundSummary {
            round_id,
            symbol: symbol.to_string(),
            legs,
            realized_pnl,
            fee_estimate,
            net_pnl: realized_pnl - fee_estimate,
            ticks: report.ticks,
            outcome,
            started_at,
            finished_at: Utc::now(),
        };

        self.sink
            .emit(&HedgeEvent::RoundCompleted(summary.clone()))
            .await;
        Ok(summary)
    }
}

/// Cumulative statistics across rounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub rounds_completed: u32,
    pub rounds_failed: u32,
    /// Closed legs
    pub completed_trades: u32,
    /// Closed legs with positive PnL
    pub profitable_trades: u32,
    /// Sum of leg PnL before fees
    pub total_pnl: Decimal,
    pub total_fees: Decimal,
}

impl SessionStats {
    pub fn record(&mut self, summary: &RoundSummary) {
        self.rounds_completed += 1;
        for leg in summary.legs.iter().filter(|l| l.close_reason.is_some()) {
            self.completed_trades += 1;
            if leg.pnl > Decimal::ZERO {
                self.profitable_trades += 1;
            }
        }
        self.total_pnl += summary.realized_pnl;
        self.total_fees += summary.fee_estimate;
    }

    pub fn record_failure(&mut self) {
        self.rounds_failed += 1;
    }

    pub fn net_profit(&self) -> Decimal {
        self.total_pnl - self.total_fees
    }

    /// Percentage of closed legs that made money
    pub fn win_rate(&self) -> Decimal {
        if self.completed_trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.profitable_trades) / Decimal::from(self.completed_trades) * Decimal::ONE_HUNDRED
    }
}

/// Round driver: runs `rounds` rounds (or until stopped) with pauses in between
pub struct HedgeSession {
    engine: HedgeEngine,
    shutdown: ShutdownSignal,
    round_pause: Duration,
    failed_round_pause: Duration,
    stats: SessionStats,
}

impl HedgeSession {
    pub fn new(
        engine: HedgeEngine,
        shutdown: ShutdownSignal,
        round_pause: Duration,
        failed_round_pause: Duration,
    ) -> Self {
        Self {
            engine,
            shutdown,
            round_pause,
            failed_round_pause,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub async fn run(&mut self, rounds: Option<u32>) -> &SessionStats {
        let symbol = self.engine.settings().symbol.clone();
        let tag = format!("[{} SESSION]", symbol).bright_white().bold();
        let mut round: u32 = 0;

        loop {
            if self.shutdown.is_triggered() {
                info!("[SESSION] Stop requested, not starting another round");
                break;
            }
            if rounds.map(|n| round >= n).unwrap_or(false) {
                break;
            }
            round += 1;

            match rounds {
                Some(n) => tprintln!("{} Round {}/{}", tag, round, n),
                None => tprintln!("{} Round {}", tag, round),
            }

            let pause = match self.engine.run_round().await {
                Ok(summary) => {
                    self.stats.record(&summary);
                    tprintln!(
                        "{} Round {} {}: net {} (cumulative {})",
                        tag,
                        summary.round_id,
                        summary.outcome.as_str(),
                        summary.net_pnl.round_dp(4),
                        self.stats.net_profit().round_dp(4)
                    );
                    self.round_pause
                }
                Err(e) => {
                    warn!("[SESSION] Round {} failed: {}", round, e);
                    self.stats.record_failure();
                    self.failed_round_pause
                }
            };

            let more_rounds = rounds.map(|n| round < n).unwrap_or(true);
            if more_rounds && !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = self.shutdown.wait() => {}
                }
            }
        }

        &self.stats
    }

    pub fn print_report(&self) {
        let s = &self.stats;
        let net = s.net_profit().round_dp(4);
        let net_str = if net >= Decimal::ZERO {
            format!("{:+}", net).green().bold()
        } else {
            format!("{:+}", net).red().bold()
        };

        tprintln!("{}", "═══════════════════════════════════════════════════".bright_cyan().bold());
        tprintln!("{}", "  Hedge session report".bright_cyan().bold());
        tprintln!("{}", "═══════════════════════════════════════════════════".bright_cyan().bold());
        tprintln!("  Rounds completed: {}", s.rounds_completed);
        tprintln!("  Rounds failed:    {}", s.rounds_failed);
        tprintln!("  Closed legs:      {}", s.completed_trades);
        tprintln!("  Profitable legs:  {}", s.profitable_trades);
        tprintln!("  Win rate:         {}%", s.win_rate().round_dp(1));
        tprintln!("  Gross PnL:        {}", s.total_pnl.round_dp(4));
        tprintln!("  Fees (est.):      {}", s.total_fees.round_dp(4));
        tprintln!("  Net profit:       {}", net_str);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::CloseReason;

    fn leg(pnl: i64, reason: Option<CloseReason>) -> LegSummary {
        LegSummary {
            venue: Venue::Aster,
            side: PositionSide::Long,
            quantity: Decimal::ONE,
            entry_price: Decimal::new(150, 0),
            exit_price: None,
            pnl: Decimal::new(pnl, 2),
            close_reason: reason,
        }
    }

    fn summary(legs: Vec<LegSummary>) -> RoundSummary {
        let realized_pnl: Decimal = legs.iter().map(|l| l.pnl).sum();
        let fee_estimate = Decimal::new(75, 3);
        RoundSummary {
            round_id: "r".to_string(),
            symbol: "SOL-USDT".to_string(),
            legs,
            realized_pnl,
            fee_estimate,
            net_pnl: realized_pnl - fee_estimate,
            ticks: 3,
            outcome: RoundOutcome::Completed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_stats_accumulate() {
        let mut stats = SessionStats::default();
        stats.record(&summary(vec![
            leg(-120, Some(CloseReason::StopLoss)),
            leg(45, Some(CloseReason::TakeProfit)),
        ]));
        stats.record(&summary(vec![leg(30, Some(CloseReason::TakeProfit)), leg(10, None)]));
        stats.record_failure();

        assert_eq!(stats.rounds_completed, 2);
        assert_eq!(stats.rounds_failed, 1);
        assert_eq!(stats.completed_trades, 3);
        assert_eq!(stats.profitable_trades, 2);
        assert_eq!(stats.total_pnl, Decimal::new(-35, 2));
        assert_eq!(stats.total_fees, Decimal::new(150, 3));
        assert_eq!(stats.net_profit(), Decimal::new(-500, 3));
    }

    #[test]
    fn test_win_rate() {
        let mut stats = SessionStats::default();
        assert_eq!(stats.win_rate(), Decimal::ZERO);
        stats.completed_trades = 4;
        stats.profitable_trades = 1;
        assert_eq!(stats.win_rate(), Decimal::new(25, 0));
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::default();
        let settings = HedgeSettings::from(&config);
        assert_eq!(settings.long_venue, Venue::Backpack);
        assert_eq!(settings.monitor.max_ticks, 500);
        assert_eq!(settings.monitor.interval, Duration::from_secs(2));
        assert_eq!(settings.monitor.max_duration, None);
    }

    mod rounds {
        use super::*;
        use crate::connector::{OrderStatus, OrderStatusReport};
        use crate::test_support::{dec, mock_pair, RecordingSink};

        fn settings(max_ticks: u32) -> HedgeSettings {
            HedgeSettings {
                symbol: "SOL-USDT".to_string(),
                position_size_usd: dec("50"),
                long_venue: Venue::Aster,
                stop_loss_threshold: dec("0.008"),
                profit_target_rate: dec("0.003"),
                total_fee_rate: dec("0.0015"),
                min_price_move: Decimal::ZERO,
                monitor: MonitorSettings {
                    interval: Duration::ZERO,
                    max_ticks,
                    max_duration: None,
                },
            }
        }

        fn engine(pair: GatewayPair, sink: Arc<RecordingSink>, max_ticks: u32) -> HedgeEngine {
            HedgeEngine::new(settings(max_ticks), pair, sink, ShutdownSignal::new())
        }

        #[tokio::test]
        async fn test_full_round_stop_loss_then_take_profit() {
            let (aster, backpack, pair) = mock_pair("150", "150");
            aster.set_price(Some("148"));
            backpack.set_price(Some("148"));
            backpack.script_statuses(vec![Some(OrderStatusReport {
                status: OrderStatus::Filled,
                avg_price: None,
            })]);
            let sink = Arc::new(RecordingSink::default());

            let summary = engine(pair, sink.clone(), 50).run_round().await.unwrap();

            assert_eq!(summary.outcome, RoundOutcome::Completed);
            assert_eq!(summary.ticks, 2);
            assert_eq!(summary.legs.len(), 2);
            assert_eq!(summary.legs[0].close_reason, Some(CloseReason::StopLoss));
            assert_eq!(summary.legs[1].close_reason, Some(CloseReason::TakeProfit));
            assert_eq!(summary.realized_pnl, dec("-0.5115"));
            assert_eq!(summary.fee_estimate, dec("0.075"));
            assert_eq!(summary.net_pnl, dec("-0.5865"));

            let events = sink.events();
            assert!(matches!(events.first(), Some(HedgeEvent::RoundStarted { long_venue: Venue::Aster, .. })));
            assert!(matches!(events.last(), Some(HedgeEvent::RoundCompleted(_))));
            assert_eq!(sink.count(|e| matches!(e, HedgeEvent::PositionOpened { .. })), 2);
            assert_eq!(sink.count(|e| matches!(e, HedgeEvent::FillPriceFallback { .. })), 0);
        }

        #[tokio::test]
        async fn test_legs_open_on_configured_sides() {
            let (_aster, _backpack, pair) = mock_pair("150", "150");
            let sink = Arc::new(RecordingSink::default());
            let mut settings = settings(1);
            settings.long_venue = Venue::Backpack;

            let summary = HedgeEngine::new(settings, pair, sink, ShutdownSignal::new())
                .run_round()
                .await
                .unwrap();

            let sides: Vec<(Venue, PositionSide)> = summary.legs.iter().map(|l| (l.venue, l.side)).collect();
            assert_eq!(
                sides,
                vec![(Venue::Aster, PositionSide::Short), (Venue::Backpack, PositionSide::Long)]
            );
            assert_eq!(summary.outcome, RoundOutcome::CeilingReached);
        }

        #[tokio::test]
        async fn test_degraded_single_leg_round() {
            let (_aster, backpack, pair) = mock_pair("150", "150");
            backpack.fail_open();
            let sink = Arc::new(RecordingSink::default());

            let summary = engine(pair, sink.clone(), 3).run_round().await.unwrap();

            assert_eq!(summary.legs.len(), 1);
            assert_eq!(summary.legs[0].venue, Venue::Aster);
            assert_eq!(summary.outcome, RoundOutcome::CeilingReached);
            assert_eq!(
                sink.count(|e| matches!(e, HedgeEvent::LegOpenFailed { venue: Venue::Backpack, side: PositionSide::Short })),
                1
            );
            assert_eq!(
                sink.count(|e| matches!(e, HedgeEvent::DegradedSingleLeg { surviving: Venue::Aster })),
                1
            );
        }

        #[tokio::test]
        async fn test_no_leg_opened() {
            let (aster, backpack, pair) = mock_pair("150", "150");
            aster.fail_open();
            backpack.fail_open();
            let sink = Arc::new(RecordingSink::default());

            let err = engine(pair, sink.clone(), 3).run_round().await.unwrap_err();

            assert!(matches!(err, HedgeError::NoLegOpened { .. }));
            assert_eq!(sink.count(|e| matches!(e, HedgeEvent::LegOpenFailed { .. })), 2);
            assert_eq!(sink.count(|e| matches!(e, HedgeEvent::RoundCompleted(_))), 0);
            assert_eq!(aster.calls().price_fetches + backpack.calls().price_fetches, 0);
        }

        #[tokio::test]
        async fn test_unconfirmed_fill_is_reported() {
            let (aster, _backpack, pair) = mock_pair("150", "150");
            aster.open_unconfirmed();
            let sink = Arc::new(RecordingSink::default());

            engine(pair, sink.clone(), 1).run_round().await.unwrap();

            assert_eq!(
                sink.count(|e| matches!(e, HedgeEvent::FillPriceFallback { venue: Venue::Aster, .. })),
                1
            );
        }

        #[tokio::test]
        async fn test_unresolved_when_force_close_fails() {
            let (aster, _backpack, pair) = mock_pair("150", "150");
            aster.script_closes(&[false]);
            let sink = Arc::new(RecordingSink::default());

            let summary = engine(pair, sink, 1).run_round().await.unwrap();

            assert_eq!(summary.outcome, RoundOutcome::Unresolved);
            assert_eq!(summary.legs[0].close_reason, None);
        }

        #[tokio::test]
        async fn test_session_counts_failed_rounds() {
            let (aster, backpack, pair) = mock_pair("150", "150");
            aster.fail_open();
            backpack.fail_open();
            let shutdown = ShutdownSignal::new();
            let engine = HedgeEngine::new(settings(1), pair, Arc::new(RecordingSink::default()), shutdown.clone());
            let mut session = HedgeSession::new(engine, shutdown, Duration::ZERO, Duration::ZERO);

            let stats = session.run(Some(2)).await.clone();

            assert_eq!(stats.rounds_failed, 2);
            assert_eq!(stats.rounds_completed, 0);
            assert_eq!(aster.calls().opens, 2);
        }

        #[tokio::test]
        async fn test_session_stops_on_shutdown() {
            let (aster, _backpack, pair) = mock_pair("150", "150");
            let shutdown = ShutdownSignal::new();
            shutdown.trigger();
            let engine = HedgeEngine::new(settings(1), pair, Arc::new(RecordingSink::default()), shutdown.clone());
            let mut session = HedgeSession::new(engine, shutdown, Duration::ZERO, Duration::ZERO);

            session.run(None).await;

            assert_eq!(session.stats(), &SessionStats::default());
            assert_eq!(aster.calls().opens, 0);
        }
    }
}
