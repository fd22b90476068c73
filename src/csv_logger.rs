//! CSV trade history logging
//!
//! Appends one row per closed leg when a hedge round completes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::events::{EventSink, HedgeEvent, LegSummary, RoundSummary};

/// Trade record for CSV logging
#[derive(Debug, Serialize)]
pub struct TradeRecord {
    /// Round completion time (ISO 8601)
    pub timestamp: String,
    pub round_id: String,
    pub symbol: String,
    pub venue: String,
    pub side: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub pnl: Decimal,
    /// Empty when the leg never closed
    pub close_reason: String,
    pub round_outcome: String,
    /// Round-level net PnL after estimated fees, repeated on each leg row
    pub round_net_pnl: Decimal,
}

impl TradeRecord {
    pub fn new(summary: &RoundSummary, leg: &LegSummary) -> Self {
        Self {
            timestamp: summary.finished_at.to_rfc3339(),
            round_id: summary.round_id.clone(),
            symbol: summary.symbol.clone(),
            venue: leg.venue.to_string(),
            side: leg.side.to_string(),
            quantity: leg.quantity,
            entry_price: leg.entry_price,
            exit_price: leg.exit_price,
            pnl: leg.pnl,
            close_reason: leg.close_reason.map(|r| r.to_string()).unwrap_or_default(),
            round_outcome: summary.outcome.as_str().to_string(),
            round_net_pnl: summary.net_pnl,
        }
    }
}

/// Append trade records to the CSV file
///
/// Creates the file with headers if it doesn't exist.
pub fn log_trades(path: &Path, records: &[TradeRecord]) -> Result<()> {
    let file_exists = path.exists();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for record in records {
        writer
            .serialize(record)
            .context("Failed to write CSV record")?;
    }

    writer.flush().context("Failed to flush CSV writer")?;

    Ok(())
}

/// Event sink that records every completed round's legs
#[derive(Debug, Clone)]
pub struct CsvTradeLog {
    path: PathBuf,
}

impl CsvTradeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSink for CsvTradeLog {
    async fn emit(&self, event: &HedgeEvent) {
        if let HedgeEvent::RoundCompleted(summary) = event {
            let records: Vec<TradeRecord> = summary
                .legs
                .iter()
                .map(|leg| TradeRecord::new(summary, leg))
                .collect();

            if let Err(e) = log_trades(&self.path, &records) {
                warn!("[CSV] Failed to record round {}: {:#}", summary.round_id, e);
            }
        }
    }
}
