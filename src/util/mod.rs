pub mod circuit_breaker;
pub mod retry;
pub mod shutdown;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use retry::{is_transient_error, ErrorClassifier, RetryConfig, RetryPolicy};
pub use shutdown::ShutdownSignal;

/// Timestamped console line, used for banners and per-tick status output
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => {{
        use colored::Colorize as _;
        println!("{} {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string().bright_black(),
            format!($($arg)*)
        );
    }};
}
