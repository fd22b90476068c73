mod types;
pub mod trading;

pub use trading::{BackpackClient, BackpackCredentials};
