use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::bot::{CloseReason, Position, PositionLedger, PositionSide, Venue};
use crate::connector::{GatewayPair, OrderStatus};
use crate::events::{EventSink, HedgeEvent};

/// Coarse state of a hedge round, by number of open legs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgeState {
    /// Nothing was ever recorded
    NoPositions,
    TwoActive,
    OneActive(Venue),
    /// Every recorded leg is closed; the round is over
    ZeroActive,
}

impl HedgeState {
    pub fn of(ledger: &PositionLedger) -> Self {
        if ledger.positions().next().is_none() {
            return HedgeState::NoPositions;
        }
        match ledger.active_venues().as_slice() {
            [] => HedgeState::ZeroActive,
            [venue] => HedgeState::OneActive(*venue),
            _ => HedgeState::TwoActive,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, HedgeState::NoPositions | HedgeState::ZeroActive)
    }
}

/// Asymmetric closing policy.
///
/// With both legs open, the first leg to lose `stop_loss_threshold` is cut at
/// market and the survivor gets a take-profit limit at `profit_target_rate`.
/// A lone leg gets a take-profit once it is in profit and is cut
/// unconditionally at the stop-loss.
#[derive(Debug, Clone)]
pub struct ClosingPolicy {
    pub stop_loss_threshold: Decimal,
    pub profit_target_rate: Decimal,
}

impl ClosingPolicy {
    pub fn new(stop_loss_threshold: Decimal, profit_target_rate: Decimal) -> Self {
        Self {
            stop_loss_threshold,
            profit_target_rate,
        }
    }

    fn breached(&self, position: &Position) -> bool {
        position.pnl_ratio() <= -self.stop_loss_threshold
    }

    /// One evaluation over the ledger; returns the state afterwards
    pub async fn evaluate(
        &self,
        ledger: &mut PositionLedger,
        gateways: &GatewayPair,
        sink: &dyn EventSink,
    ) -> HedgeState {
        self.refresh_take_profits(ledger, gateways, sink).await;

        match HedgeState::of(ledger) {
            HedgeState::TwoActive => {
                let Some(loser) = select_stop_loss_leg(&ledger.active_positions(), self.stop_loss_threshold) else {
                    return HedgeState::TwoActive;
                };

                if !self.close_leg(ledger, loser, CloseReason::StopLoss, gateways, sink).await {
                    return HedgeState::of(ledger);
                }

                let survivor = loser.other();
                let needs_take_profit = ledger
                    .get(survivor)
                    .map(|p| p.is_active() && p.limit_order_id.is_none() && !self.breached(p))
                    .unwrap_or(false);
                if needs_take_profit {
                    self.place_take_profit(ledger, survivor, gateways, sink).await;
                }
            }
            HedgeState::OneActive(venue) => {
                let Some(position) = ledger.get(venue) else {
                    return HedgeState::of(ledger);
                };

                if self.breached(position) {
                    self.close_leg(ledger, venue, CloseReason::FinalStopLoss, gateways, sink)
                        .await;
                } else if position.limit_order_id.is_none() && position.pnl() > Decimal::ZERO {
                    self.place_take_profit(ledger, venue, gateways, sink).await;
                }
            }
            HedgeState::NoPositions | HedgeState::ZeroActive => {}
        }

        HedgeState::of(ledger)
    }

    /// Poll every resting take-profit: filled legs are closed, dead orders replaced
    async fn refresh_take_profits(&self, ledger: &mut PositionLedger, gateways: &GatewayPair, sink: &dyn EventSink) {
        for venue in ledger.active_venues() {
            let Some(position) = ledger.get(venue) else { continue };
            let Some(order_id) = position.limit_order_id.clone() else { continue };
            let symbol = position.symbol.clone();

            // Unknown status: try again next tick
            let Some(report) = gateways.get(venue).order_status(&symbol, &order_id).await else {
                continue;
            };

            match report.status {
                OrderStatus::Filled => {
                    let Some(position) = ledger.get_mut(venue) else { continue };
                    let exit_price = report
                        .avg_price
                        .or(position.limit_price)
                        .unwrap_or(position.current_price);
                    position.mark_closed(exit_price, CloseReason::TakeProfit);
                    let closed = position.clone();

                    sink.emit(&HedgeEvent::TakeProfitFilled {
                        venue,
                        order_id,
                        price: exit_price,
                    })
                    .await;
                    sink.emit(&HedgeEvent::LegClosed {
                        position: closed,
                        reason: CloseReason::TakeProfit,
                    })
                    .await;
                }
                OrderStatus::Cancelled | OrderStatus::Rejected => {
                    if let Some(position) = ledger.get_mut(venue) {
                        position.limit_order_id = None;
                        position.limit_price = None;
                    }
                    sink.emit(&HedgeEvent::TakeProfitResubmitted {
                        venue,
                        stale_order_id: order_id,
                        status: report.status,
                    })
                    .await;
                    self.place_take_profit(ledger, venue, gateways, sink).await;
                }
                OrderStatus::New | OrderStatus::PartiallyFilled => {
                    debug!("[POLICY] Take-profit {} on {} still resting", order_id, venue);
                }
            }
        }
    }

    async fn place_take_profit(
        &self,
        ledger: &mut PositionLedger,
        venue: Venue,
        gateways: &GatewayPair,
        sink: &dyn EventSink,
    ) -> bool {
        let Some(position) = ledger.get(venue).filter(|p| p.is_active()).cloned() else {
            return false;
        };
        if position.limit_order_id.is_some() {
            return false;
        }

        let Some(order) = gateways
            .get(venue)
            .set_take_profit_limit(&position, self.profit_target_rate)
            .await
        else {
            warn!("[POLICY] Take-profit on {} not placed, will retry", venue);
            return false;
        };

        if let Some(position) = ledger.get_mut(venue) {
            position.limit_order_id = Some(order.order_id.clone());
            position.limit_price = Some(order.price);
        }
        sink.emit(&HedgeEvent::TakeProfitPlaced {
            venue,
            order_id: order.order_id,
            price: order.price,
        })
        .await;
        true
    }

    /// Cancel any resting take-profit, then close at market.
    ///
    /// A failed close leaves the position active so the next tick retries.
    /// A take-profit whose cancel failed stays on the closed leg until
    /// `cancel_stale_take_profits` gets rid of it.
    async fn close_leg(
        &self,
        ledger: &mut PositionLedger,
        venue: Venue,
        reason: CloseReason,
        gateways: &GatewayPair,
        sink: &dyn EventSink,
    ) -> bool {
        let Some(position) = ledger.get(venue).filter(|p| p.is_active()).cloned() else {
            return false;
        };
        let gateway = gateways.get(venue);

        let mut stale_order_id = None;
        if let Some(order_id) = &position.limit_order_id {
            if gateway.cancel_order(&position.symbol, order_id).await {
                if let Some(p) = ledger.get_mut(venue) {
                    p.limit_order_id = None;
                    p.limit_price = None;
                }
            } else {
                stale_order_id = Some(order_id.clone());
                warn!(
                    "[POLICY] Could not cancel take-profit {} on {}, closing anyway",
                    order_id, venue
                );
            }
        }

        if !gateway.close_position(&position).await {
            sink.emit(&HedgeEvent::CloseFailed { venue, reason }).await;
            return false;
        }

        let Some(closed) = ledger.get_mut(venue) else {
            return false;
        };
        let exit_price = closed.current_price;
        closed.mark_closed(exit_price, reason);
        closed.limit_order_id = stale_order_id;
        let closed = closed.clone();
        sink.emit(&HedgeEvent::LegClosed { position: closed, reason }).await;
        true
    }

    /// Retry the cancel of take-profits still resting behind closed legs.
    ///
    /// Returns true when no such order is left.
    pub async fn cancel_stale_take_profits(&self, ledger: &mut PositionLedger, gateways: &GatewayPair) -> bool {
        let stale: Vec<(Venue, String, String)> = ledger
            .positions()
            .filter(|p| !p.is_active())
            .filter_map(|p| {
                p.limit_order_id
                    .clone()
                    .map(|id| (p.venue, p.symbol.clone(), id))
            })
            .collect();

        let mut all_cancelled = true;
        for (venue, symbol, order_id) in stale {
            if gateways.get(venue).cancel_order(&symbol, &order_id).await {
                if let Some(p) = ledger.get_mut(venue) {
                    p.limit_order_id = None;
                    p.limit_price = None;
                }
            } else {
                warn!(
                    "[POLICY] Take-profit {} on {} left orphaned on the book, cancel it manually",
                    order_id, venue
                );
                all_cancelled = false;
            }
        }
        all_cancelled
    }

    /// Best-effort close of every active leg; returns true when none is left open
    pub async fn force_close_all(
        &self,
        ledger: &mut PositionLedger,
        reason: CloseReason,
        gateways: &GatewayPair,
        sink: &dyn EventSink,
    ) -> bool {
        for venue in ledger.active_venues() {
            self.close_leg(ledger, venue, reason, gateways, sink).await;
        }
        self.cancel_stale_take_profits(ledger, gateways).await;
        !ledger.has_active()
    }
}

/// Leg to stop out when both legs are open.
///
/// When both breach in the same tick the deeper loss goes first; on an exact
/// tie the long leg goes first.
pub fn select_stop_loss_leg(positions: &[&Position], stop_loss_threshold: Decimal) -> Option<Venue> {
    positions
        .iter()
        .filter(|p| p.is_active() && p.pnl_ratio() <= -stop_loss_threshold)
        .min_by(|a, b| {
            let rank = |side: PositionSide| if side == PositionSide::Long { 0 } else { 1 };
            a.pnl_ratio()
                .cmp(&b.pnl_ratio())
                .then_with(|| rank(a.side).cmp(&rank(b.side)))
        })
        .map(|p| p.venue)
}
