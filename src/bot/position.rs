use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::HedgeError;

/// Exchange holding one leg of the hedge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Aster,
    Backpack,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Aster => "aster",
            Venue::Backpack => "backpack",
        }
    }

    /// The venue on the other side of the hedge
    pub fn other(&self) -> Venue {
        match self {
            Venue::Aster => Venue::Backpack,
            Venue::Backpack => Venue::Aster,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Order side that opens a position in this direction
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces a position in this direction
    pub fn exit_order_side(&self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

/// Why a leg was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Loser cut while both legs were open
    StopLoss,
    /// Last remaining leg hit the stop-loss
    FinalStopLoss,
    /// Resting take-profit limit order filled
    TakeProfit,
    /// Shutdown requested
    ForceClose,
    /// Monitor hit its tick / wall-clock ceiling
    TickCeiling,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "stop-loss",
            CloseReason::FinalStopLoss => "final stop-loss",
            CloseReason::TakeProfit => "take-profit",
            CloseReason::ForceClose => "force-close",
            CloseReason::TickCeiling => "tick ceiling",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a hedge round.
///
/// PnL is always derived from `entry_price`, `current_price` and `quantity`;
/// it is never stored.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub venue: Venue,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    /// Quoted price at open, replaced by the average fill price once known
    pub entry_price: Decimal,
    /// True once `entry_price` comes from the venue's fill history
    pub entry_price_confirmed: bool,
    /// Last observed price on this leg's venue
    pub current_price: Decimal,
    pub status: PositionStatus,
    /// Order that opened the position
    pub order_id: String,
    /// Resting take-profit order, at most one at a time
    pub limit_order_id: Option<String>,
    pub limit_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub close_reason: Option<CloseReason>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Create an active position from a confirmed opening order
    pub fn open(
        venue: Venue,
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: Decimal,
        entry_price: Decimal,
        order_id: impl Into<String>,
    ) -> Result<Self, HedgeError> {
        let symbol = symbol.into();
        let order_id = order_id.into();

        if quantity <= Decimal::ZERO {
            return Err(HedgeError::InvalidPosition(format!(
                "{} {} quantity must be positive, got {}",
                venue, symbol, quantity
            )));
        }
        if entry_price <= Decimal::ZERO {
            return Err(HedgeError::InvalidPosition(format!(
                "{} {} entry price must be positive, got {}",
                venue, symbol, entry_price
            )));
        }
        if order_id.is_empty() {
            return Err(HedgeError::InvalidPosition(format!(
                "{} {} opening order id is empty",
                venue, symbol
            )));
        }

        Ok(Self {
            venue,
            symbol,
            side,
            quantity,
            entry_price,
            entry_price_confirmed: false,
            current_price: entry_price,
            status: PositionStatus::Active,
            order_id,
            limit_order_id: None,
            limit_price: None,
            exit_price: None,
            close_reason: None,
            opened_at: Utc::now(),
            closed_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Unrealized (or realized, once closed) PnL in quote currency
    pub fn pnl(&self) -> Decimal {
        (self.mark() - self.entry_price) * self.quantity * self.side.sign()
    }

    /// PnL as a fraction of the entry price, sign flipped for shorts
    pub fn pnl_ratio(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.mark() - self.entry_price) / self.entry_price * self.side.sign()
    }

    /// Replace the quoted entry price with the actual average fill price
    pub fn confirm_entry_price(&mut self, fill_price: Decimal) {
        if fill_price > Decimal::ZERO {
            self.entry_price = fill_price;
            self.entry_price_confirmed = true;
        }
    }

    /// Take-profit price for a given target rate
    pub fn take_profit_price(&self, target_rate: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => self.entry_price * (Decimal::ONE + target_rate),
            PositionSide::Short => self.entry_price * (Decimal::ONE - target_rate),
        }
    }

    /// Mark the position closed at `exit_price`
    pub fn mark_closed(&mut self, exit_price: Decimal, reason: CloseReason) {
        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit_price);
        self.current_price = exit_price;
        self.close_reason = Some(reason);
        self.limit_order_id = None;
        self.closed_at = Some(Utc::now());
    }

    fn mark(&self) -> Decimal {
        self.exit_price.unwrap_or(self.current_price)
    }
}
