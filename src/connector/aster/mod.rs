mod types;
pub mod trading;

pub use trading::{AsterClient, AsterCredentials};
