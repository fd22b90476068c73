// Library exports for dynamic_hedge

#[macro_use]
pub mod util;

pub mod bot;
pub mod config;
pub mod connector;
pub mod csv_logger;
pub mod error;
pub mod events;
pub mod services;
pub mod strategy;

// Re-export commonly used items for convenience
pub use config::Config;
pub use error::HedgeError;
pub use services::{HedgeEngine, HedgeSession};

#[cfg(test)]
mod test_support;
