use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;

use crate::events::{EventSink, HedgeEvent, RoundSummary};

/// Chat webhook notifications (Feishu-style text messages).
/// Failures are logged but never block the hedge loop.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, webhook_url }
    }

    /// Optional notifier from `HEDGE_WEBHOOK_URL`
    pub fn from_env() -> Option<Self> {
        std::env::var("HEDGE_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(Self::new)
    }

    /// Post a plain-text message. Failures are logged as warnings.
    pub async fn send(&self, message: &str) {
        let body = json!({
            "msg_type": "text",
            "content": { "text": message },
        });

        match self.http.post(&self.webhook_url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(status = %resp.status(), "Webhook returned non-2xx");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send webhook notification");
            }
        }
    }
}

#[async_trait]
impl EventSink for WebhookNotifier {
    async fn emit(&self, event: &HedgeEvent) {
        if let Some(message) = format_event(event) {
            self.send(&message).await;
        }
    }
}

/// Chat text for the events worth a notification; None for the noisy ones
pub fn format_event(event: &HedgeEvent) -> Option<String> {
    match event {
        HedgeEvent::PositionOpened { position } => Some(format!(
            "Hedge leg opened\nVenue: {}\nSide: {}\nSize: {} {}\nEntry: {}",
            position.venue, position.side, position.quantity, position.symbol, position.entry_price
        )),
        HedgeEvent::DegradedSingleLeg { surviving } => Some(format!(
            "Only one hedge leg opened, continuing on {} alone",
            surviving
        )),
        HedgeEvent::LegClosed { position, reason } => Some(format!(
            "Hedge leg closed ({})\nVenue: {}\nSide: {}\nEntry: {}\nExit: {}\nPnL: {}",
            reason,
            position.venue,
            position.side,
            position.entry_price,
            position.exit_price.unwrap_or(position.current_price),
            position.pnl().round_dp(4)
        )),
        HedgeEvent::CloseFailed { venue, reason } => Some(format!(
            "Failed to close {} leg ({}), retrying next tick",
            venue, reason
        )),
        HedgeEvent::RoundCompleted(summary) => Some(format_round_summary(summary)),
        _ => None,
    }
}

pub fn format_round_summary(summary: &RoundSummary) -> String {
    let mut text = format!(
        "Hedge round {} {} ({})\nTicks: {}",
        summary.round_id,
        summary.outcome.as_str(),
        summary.symbol,
        summary.ticks
    );
    for leg in &summary.legs {
        text.push_str(&format!(
            "\n{} {}: {} -> {} PnL {}",
            leg.venue,
            leg.side,
            leg.entry_price,
            leg.exit_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "open".to_string()),
            leg.pnl.round_dp(4)
        ));
    }
    text.push_str(&format!(
        "\nRealized: {}\nFees (est.): {}\nNet: {}",
        summary.realized_pnl.round_dp(4),
        summary.fee_estimate.round_dp(4),
        summary.net_pnl.round_dp(4)
    ));
    if summary.net_pnl > Decimal::ZERO {
        text.push_str("\nResult: profit");
    } else {
        text.push_str("\nResult: loss");
    }
    text
}
