use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;

use dynamic_hedge::bot::Venue;
use dynamic_hedge::config::Config;
use dynamic_hedge::connector::aster::{AsterClient, AsterCredentials};
use dynamic_hedge::connector::backpack::{BackpackClient, BackpackCredentials};
use dynamic_hedge::connector::{ExecutionGateway, GatewayPair, VenueGateway};
use dynamic_hedge::csv_logger::CsvTradeLog;
use dynamic_hedge::events::{FanoutSink, LogSink};
use dynamic_hedge::services::{HedgeEngine, HedgeSession, HedgeSettings, WebhookNotifier};
use dynamic_hedge::tprintln;
use dynamic_hedge::util::{RetryPolicy, ShutdownSignal};

/// Dynamic Hedge Bot - Cross-Exchange Delta-Neutral Rounds
///
/// Each round:
/// 1. Opens a long leg on one venue and an equal-notional short on the other
/// 2. Polls both prices every tick
/// 3. Cuts the first leg to hit the stop-loss at market
/// 4. Rests a take-profit limit on the surviving leg
/// 5. Cuts the survivor if it hits the stop-loss too
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tprintln!("{}", "═══════════════════════════════════════════════════".bright_cyan().bold());
    tprintln!("{}", "  Dynamic Hedge Bot - Aster / Backpack".bright_cyan().bold());
    tprintln!("{}", "═══════════════════════════════════════════════════".bright_cyan().bold());
    tprintln!("");

    // Load configuration
    let config = Config::load_default().context("Failed to load config.json")?;
    config.validate().context("Invalid configuration")?;

    let long_venue = config.long_venue;
    tprintln!("{} Symbol: {}", "[CONFIG]".blue().bold(), config.symbol.bright_white().bold());
    tprintln!("{} Size per leg: {}", "[CONFIG]".blue().bold(), format!("${}", config.position_size_usd).bright_white());
    tprintln!("{} Long on {}, short on {}", "[CONFIG]".blue().bold(), long_venue.to_string().green(), long_venue.other().to_string().red());
    tprintln!("{} Stop-loss: {}", "[CONFIG]".blue().bold(), format!("{}%", config.stop_loss_threshold * rust_decimal::Decimal::ONE_HUNDRED).yellow());
    tprintln!("{} Take-profit: {}", "[CONFIG]".blue().bold(), format!("{}%", config.profit_target_rate * rust_decimal::Decimal::ONE_HUNDRED).green().bold());
    tprintln!("{} Tick interval: {}", "[CONFIG]".blue().bold(), format!("{} secs", config.monitoring_interval_secs).bright_white());
    tprintln!(
        "{} Rounds: {}",
        "[CONFIG]".blue().bold(),
        config.rounds.map(|n| n.to_string()).unwrap_or_else(|| "until stopped".to_string()).bright_white()
    );
    tprintln!("");

    // Load credentials
    dotenv::dotenv().ok();
    let aster_credentials = AsterCredentials::from_env()
        .context("Failed to load Aster credentials from environment")?;
    let backpack_credentials = BackpackCredentials::from_env()
        .context("Failed to load Backpack credentials from environment")?;

    tprintln!("{} {}", "[INIT]".cyan().bold(), "Credentials loaded successfully".green());

    // Initialize trading clients
    let aster_client = AsterClient::new(aster_credentials, config.venue_config(Venue::Aster))
        .context("Failed to create Aster client")?;
    let backpack_client = BackpackClient::new(backpack_credentials, config.venue_config(Venue::Backpack))
        .context("Failed to create Backpack client")?;

    let fill_retry = RetryPolicy::from(&config.fill_price_retry);
    let order_retry = RetryPolicy::from(&config.order_retry);

    let aster: Arc<dyn ExecutionGateway> = Arc::new(VenueGateway::new(
        aster_client,
        fill_retry.clone(),
        order_retry.clone(),
        &config.circuit_breaker,
    ));
    let backpack: Arc<dyn ExecutionGateway> = Arc::new(VenueGateway::new(
        backpack_client,
        fill_retry,
        order_retry,
        &config.circuit_breaker,
    ));
    let gateways = GatewayPair::new(aster, backpack)?;

    tprintln!("{} {}", "[INIT]".cyan().bold(), "Trading clients initialized".green());

    // Event sinks
    let mut sink = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(path) = &config.trade_log_path {
        tprintln!("{} Trade log: {}", "[INIT]".cyan().bold(), path.bright_white());
        sink = sink.with(Arc::new(CsvTradeLog::new(path)));
    }
    if let Some(notifier) = WebhookNotifier::from_env() {
        tprintln!("{} {}", "[INIT]".cyan().bold(), "Webhook notifications enabled".green());
        sink = sink.with(Arc::new(notifier));
    }

    // Ctrl+C / SIGTERM: finish the current tick, force-close, stop
    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_signals();

    let engine = HedgeEngine::new(
        HedgeSettings::from(&config),
        gateways,
        Arc::new(sink),
        shutdown.clone(),
    );
    let mut session = HedgeSession::new(
        engine,
        shutdown,
        Duration::from_secs(config.round_pause_secs),
        Duration::from_secs(config.failed_round_pause_secs),
    );

    tprintln!("{} {}", "[INIT]".cyan().bold(), "Starting hedge session".green().bold());
    tprintln!("");

    session.run(config.rounds).await;
    session.print_report();

    Ok(())
}
