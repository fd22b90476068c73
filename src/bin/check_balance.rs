use anyhow::{Context, Result};
use colored::Colorize;
use rust_decimal::Decimal;
use tracing::warn;

use dynamic_hedge::bot::Venue;
use dynamic_hedge::config::Config;
use dynamic_hedge::connector::aster::{AsterClient, AsterCredentials};
use dynamic_hedge::connector::backpack::{BackpackClient, BackpackCredentials};
use dynamic_hedge::connector::{venue_quote, VenueClient};
use dynamic_hedge::tprintln;

/// Print balances and the current price on both venues
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();

    let config = Config::load_default().context("Failed to load config.json")?;

    let aster = AsterClient::new(AsterCredentials::from_env()?, config.venue_config(Venue::Aster))?;
    let backpack = BackpackClient::new(BackpackCredentials::from_env()?, config.venue_config(Venue::Backpack))?;

    tprintln!("{} Balance check for {}", "[BALANCE]".cyan().bold(), config.symbol.bright_white().bold());
    report(&aster, &config.symbol).await;
    report(&backpack, &config.symbol).await;

    Ok(())
}

async fn report<C: VenueClient>(client: &C, symbol: &str) {
    let venue = client.venue().as_str().to_uppercase();
    let tag = format!("[{}]", venue).bright_magenta().bold();

    match venue_quote(client, symbol).await {
        Ok((venue_symbol, price)) => tprintln!("{} {} price: {}", tag, venue_symbol, price.to_string().bright_white()),
        Err(e) => warn!("[{}] Price unavailable: {:#}", venue, e),
    }

    match client.balances().await {
        Ok(balances) if balances.is_empty() => tprintln!("{} No balances", tag),
        Ok(balances) => {
            for balance in balances {
                let locked = balance.total - balance.available;
                tprintln!(
                    "{} {:<6} total {:>14} available {:>14}{}",
                    tag,
                    balance.asset,
                    balance.total.to_string(),
                    balance.available.to_string(),
                    if locked > Decimal::ZERO {
                        format!(" locked {}", locked).yellow().to_string()
                    } else {
                        String::new()
                    }
                );
            }
        }
        Err(e) => warn!("[{}] Balance query failed: {:#}", venue, e),
    }
}
