use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bot::{CloseReason, Position, PositionSide, Venue};
use crate::connector::OrderStatus;

/// How a hedge round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Every leg closed through stop-loss or take-profit
    Completed,
    /// Shutdown requested; remaining legs force-closed
    ForceClosed,
    /// Tick or wall-clock ceiling reached; remaining legs force-closed
    CeilingReached,
    /// Some leg could not be closed and is still open on the venue
    Unresolved,
}

impl RoundOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundOutcome::Completed => "completed",
            RoundOutcome::ForceClosed => "force-closed",
            RoundOutcome::CeilingReached => "ceiling reached",
            RoundOutcome::Unresolved => "unresolved",
        }
    }
}

/// Final state of one leg
#[derive(Debug, Clone, Serialize)]
pub struct LegSummary {
    pub venue: Venue,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub pnl: Decimal,
    pub close_reason: Option<CloseReason>,
}

impl From<&Position> for LegSummary {
    fn from(position: &Position) -> Self {
        Self {
            venue: position.venue,
            side: position.side,
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price: position.exit_price,
            pnl: position.pnl(),
            close_reason: position.close_reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub round_id: String,
    pub symbol: String,
    pub legs: Vec<LegSummary>,
    /// Sum of per-leg PnL
    pub realized_pnl: Decimal,
    /// position size * total fee rate
    pub fee_estimate: Decimal,
    pub net_pnl: Decimal,
    pub ticks: u32,
    pub outcome: RoundOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Structured events emitted by the hedge engine
#[derive(Debug, Clone)]
pub enum HedgeEvent {
    RoundStarted {
        round_id: String,
        symbol: String,
        long_venue: Venue,
    },
    PositionOpened {
        position: Position,
    },
    LegOpenFailed {
        venue: Venue,
        side: PositionSide,
    },
    /// Only one leg opened; the round continues with it alone
    DegradedSingleLeg {
        surviving: Venue,
    },
    /// Entry price kept at the quoted price after fill lookup gave up
    FillPriceFallback {
        venue: Venue,
        order_id: String,
        quoted_price: Decimal,
    },
    TakeProfitPlaced {
        venue: Venue,
        order_id: String,
        price: Decimal,
    },
    TakeProfitFilled {
        venue: Venue,
        order_id: String,
        price: Decimal,
    },
    /// Resting take-profit disappeared without filling and will be placed again
    TakeProfitResubmitted {
        venue: Venue,
        stale_order_id: String,
        status: OrderStatus,
    },
    LegClosed {
        position: Position,
        reason: CloseReason,
    },
    CloseFailed {
        venue: Venue,
        reason: CloseReason,
    },
    TickSkipped {
        tick: u32,
        error: String,
    },
    RoundCompleted(RoundSummary),
}

/// Receiver of hedge events (logger, trade log, chat webhook, ...)
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &HedgeEvent);
}

/// Writes every event to the tracing log / console
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn emit(&self, event: &HedgeEvent) {
        let tag = "[HEDGE]".bright_magenta().bold();
        match event {
            HedgeEvent::RoundStarted { round_id, symbol, long_venue } => {
                tprintln!(
                    "{} Round {} started on {} (long {}, short {})",
                    tag,
                    round_id,
                    symbol,
                    long_venue,
                    long_venue.other()
                );
            }
            HedgeEvent::PositionOpened { position } => {
                tprintln!(
                    "{} {} Opened {} {} {} @ {}",
                    tag,
                    "✓".green().bold(),
                    position.venue,
                    position.side,
                    position.quantity,
                    position.entry_price
                );
            }
            HedgeEvent::LegOpenFailed { venue, side } => {
                warn!("[HEDGE] Failed to open {} leg on {}", side, venue);
            }
            HedgeEvent::DegradedSingleLeg { surviving } => {
                warn!("[HEDGE] Only the {} leg opened, continuing single-leg", surviving);
            }
            HedgeEvent::FillPriceFallback { venue, order_id, quoted_price } => {
                warn!(
                    "[HEDGE] {} order {}: fill price unknown, using quoted {}",
                    venue, order_id, quoted_price
                );
            }
            HedgeEvent::TakeProfitPlaced { venue, order_id, price } => {
                tprintln!("{} Take-profit on {} @ {} (order {})", tag, venue, price, order_id);
            }
            HedgeEvent::TakeProfitFilled { venue, order_id, price } => {
                tprintln!(
                    "{} {} Take-profit filled on {} @ {} (order {})",
                    tag,
                    "✓".green().bold(),
                    venue,
                    price,
                    order_id
                );
            }
            HedgeEvent::TakeProfitResubmitted { venue, stale_order_id, status } => {
                warn!(
                    "[HEDGE] Take-profit {} on {} is {:?}, resubmitting",
                    stale_order_id, venue, status
                );
            }
            HedgeEvent::LegClosed { position, reason } => {
                let pnl = position.pnl();
                let pnl_str = if pnl >= Decimal::ZERO {
                    format!("{:+.4}", pnl).green()
                } else {
                    format!("{:+.4}", pnl).red()
                };
                tprintln!(
                    "{} Closed {} {} leg ({}) at {}, PnL {}",
                    tag,
                    position.venue,
                    position.side,
                    reason,
                    position.exit_price.unwrap_or(position.current_price),
                    pnl_str
                );
            }
            HedgeEvent::CloseFailed { venue, reason } => {
                warn!("[HEDGE] Failed to close {} leg ({}), will retry", venue, reason);
            }
            HedgeEvent::TickSkipped { tick, error } => {
                warn!("[HEDGE] Tick {} skipped: {}", tick, error);
            }
            HedgeEvent::RoundCompleted(summary) => {
                info!(
                    "[HEDGE] Round {} {}: {} ticks, realized {} fees {} net {}",
                    summary.round_id,
                    summary.outcome.as_str(),
                    summary.ticks,
                    summary.realized_pnl.round_dp(4),
                    summary.fee_estimate.round_dp(4),
                    summary.net_pnl.round_dp(4)
                );
            }
        }
    }
}

/// Forwards every event to each inner sink, in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn emit(&self, event: &HedgeEvent) {
        for sink in &self.sinks {
            sink.emit(event).await;
        }
    }
}
