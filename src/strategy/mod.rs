pub mod closing;

pub use closing::{select_stop_loss_leg, ClosingPolicy, HedgeState};
