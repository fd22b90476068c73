pub mod ledger;
pub mod position;

pub use ledger::PositionLedger;
pub use position::{CloseReason, OrderSide, Position, PositionSide, PositionStatus, Venue};
