/// Services driving a hedge round

pub mod hedge;
pub mod monitor;
pub mod notifier;
pub mod price_oracle;

pub use hedge::{HedgeEngine, HedgeSession, HedgeSettings, SessionStats};
pub use monitor::{MonitorExit, MonitorLoop, MonitorReport, MonitorSettings};
pub use notifier::WebhookNotifier;
pub use price_oracle::{PriceOracle, PriceQuote};
