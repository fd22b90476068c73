use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::HedgeError;

/// Venue quantization rules for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRules {
    /// Quantity increment
    pub step_size: Decimal,
    /// Smallest accepted quantity
    pub min_qty: Decimal,
    /// Price increment
    pub tick_size: Decimal,
    /// Smallest accepted order value in quote currency
    pub min_notional: Decimal,
}

impl SymbolRules {
    /// Convert a USD notional into a venue-native order quantity.
    ///
    /// Rounds to the step size, applies the minimum quantity, then re-derives
    /// the quantity from `min_notional / price` (rounded up to the step) when
    /// the order would fall under the minimum notional.
    pub fn quantity_for_notional(&self, notional: Decimal, price: Decimal) -> Result<Decimal, HedgeError> {
        if price <= Decimal::ZERO {
            return Err(HedgeError::InvalidSizing(format!("price must be positive, got {}", price)));
        }
        if notional <= Decimal::ZERO {
            return Err(HedgeError::InvalidSizing(format!("notional must be positive, got {}", notional)));
        }
        if self.step_size <= Decimal::ZERO {
            return Err(HedgeError::InvalidSizing(format!("step size must be positive, got {}", self.step_size)));
        }

        let mut quantity = round_to_step(notional / price, self.step_size);
        if quantity < self.min_qty {
            quantity = ceil_to_step(self.min_qty, self.step_size);
        }
        if quantity * price < self.min_notional {
            quantity = ceil_to_step(self.min_notional / price, self.step_size);
        }
        if quantity <= Decimal::ZERO {
            return Err(HedgeError::InvalidSizing(format!(
                "notional {} at price {} rounds to zero with step {}",
                notional, price, self.step_size
            )));
        }

        Ok(quantity)
    }

    /// Round a price to the nearest tick
    pub fn round_price(&self, price: Decimal) -> Decimal {
        if self.tick_size <= Decimal::ZERO {
            return price;
        }
        round_to_step(price, self.tick_size)
    }

    /// Round a quantity to the nearest step
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        if self.step_size <= Decimal::ZERO {
            return quantity;
        }
        round_to_step(quantity, self.step_size)
    }

    pub fn format_quantity(&self, quantity: Decimal) -> String {
        format_to_step(quantity, self.step_size)
    }

    pub fn format_price(&self, price: Decimal) -> String {
        format_to_step(price, self.tick_size)
    }
}

/// Round to the nearest multiple of `step` (ties to even)
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    ((value / step).round() * step).normalize()
}

/// Round up to the next multiple of `step`
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    ((value / step).ceil() * step).normalize()
}

/// Render with exactly as many decimals as the step allows, trailing zeros trimmed
pub fn format_to_step(value: Decimal, step: Decimal) -> String {
    let scale = step.normalize().scale();
    value.round_dp(scale).normalize().to_string()
}
