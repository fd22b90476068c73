use rust_decimal::Decimal;
use tracing::debug;

use super::position::{Position, Venue};

/// In-memory record of the legs of one hedge round.
///
/// Holds at most one position per venue slot. Lives only for the duration of
/// a round; a new round starts with `PositionLedger::new()`.
#[derive(Debug, Default)]
pub struct PositionLedger {
    aster: Option<Position>,
    backpack: Option<Position>,
    /// Price moves smaller than this are ignored
    min_price_move: Decimal,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_price_move(min_price_move: Decimal) -> Self {
        Self {
            min_price_move: min_price_move.abs(),
            ..Self::default()
        }
    }

    /// Store a position in its venue slot, replacing whatever was there
    pub fn record(&mut self, position: Position) {
        let slot = self.slot_mut(position.venue);
        if let Some(previous) = slot.as_ref() {
            debug!(
                "[LEDGER] Replacing {} {} position (order {})",
                previous.venue, previous.side, previous.order_id
            );
        }
        *slot = Some(position);
    }

    /// Apply a fresh mark price to the active position on `venue`.
    ///
    /// Returns true when the stored price changed.
    pub fn update_price(&mut self, venue: Venue, price: Decimal) -> bool {
        let min_move = self.min_price_move;
        match self.slot_mut(venue) {
            Some(position) if position.is_active() && price > Decimal::ZERO => {
                if (price - position.current_price).abs() < min_move {
                    return false;
                }
                position.current_price = price;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, venue: Venue) -> Option<&Position> {
        match venue {
            Venue::Aster => self.aster.as_ref(),
            Venue::Backpack => self.backpack.as_ref(),
        }
    }

    pub fn get_mut(&mut self, venue: Venue) -> Option<&mut Position> {
        self.slot_mut(venue).as_mut()
    }

    /// Active positions, Aster slot first
    pub fn active_positions(&self) -> Vec<&Position> {
        self.positions().filter(|p| p.is_active()).collect()
    }

    /// Venues that still hold an active position, Aster slot first
    pub fn active_venues(&self) -> Vec<Venue> {
        self.positions()
            .filter(|p| p.is_active())
            .map(|p| p.venue)
            .collect()
    }

    pub fn has_active(&self) -> bool {
        self.positions().any(|p| p.is_active())
    }

    /// Every recorded position, active or closed
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.aster.iter().chain(self.backpack.iter())
    }

    fn slot_mut(&mut self, venue: Venue) -> &mut Option<Position> {
        match venue {
            Venue::Aster => &mut self.aster,
            Venue::Backpack => &mut self.backpack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::position::{CloseReason, PositionSide};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn leg(venue: Venue, side: PositionSide) -> Position {
        Position::open(venue, "SOL-USDT", side, dec("1"), dec("150"), "42").unwrap()
    }

    #[test]
    fn test_record_and_get() {
        let mut ledger = PositionLedger::new();
        assert!(!ledger.has_active());

        ledger.record(leg(Venue::Aster, PositionSide::Short));
        ledger.record(leg(Venue::Backpack, PositionSide::Long));

        assert_eq!(ledger.active_positions().len(), 2);
        assert_eq!(ledger.get(Venue::Aster).unwrap().side, PositionSide::Short);
        assert_eq!(ledger.active_venues(), vec![Venue::Aster, Venue::Backpack]);
    }

    #[test]
    fn test_update_price_only_touches_active() {
        let mut ledger = PositionLedger::new();
        ledger.record(leg(Venue::Aster, PositionSide::Short));
        ledger.record(leg(Venue::Backpack, PositionSide::Long));
        ledger
            .get_mut(Venue::Backpack)
            .unwrap()
            .mark_closed(dec("151"), CloseReason::StopLoss);

        assert!(ledger.update_price(Venue::Aster, dec("149")));
        assert!(!ledger.update_price(Venue::Backpack, dec("152")));
        assert_eq!(ledger.get(Venue::Backpack).unwrap().current_price, dec("151"));
        assert_eq!(ledger.active_positions().len(), 1);
    }

    #[test]
    fn test_min_price_move_guard() {
        let mut ledger = PositionLedger::with_min_price_move(dec("0.05"));
        ledger.record(leg(Venue::Aster, PositionSide::Long));

        assert!(!ledger.update_price(Venue::Aster, dec("150.04")));
        assert_eq!(ledger.get(Venue::Aster).unwrap().current_price, dec("150"));
        assert!(ledger.update_price(Venue::Aster, dec("150.05")));
    }

    #[test]
    fn test_update_price_without_position() {
        let mut ledger = PositionLedger::new();
        assert!(!ledger.update_price(Venue::Aster, dec("150")));
    }
}
