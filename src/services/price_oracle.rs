use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::bot::Venue;
use crate::connector::GatewayPair;
use crate::error::HedgeError;

/// Prices observed on both venues in one fetch; either side may be missing
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceQuote {
    pub aster: Option<Decimal>,
    pub backpack: Option<Decimal>,
}

impl PriceQuote {
    pub fn get(&self, venue: Venue) -> Option<Decimal> {
        match venue {
            Venue::Aster => self.aster,
            Venue::Backpack => self.backpack,
        }
    }
}

/// Fetches the current price from both venues.
///
/// Fails soft: one venue failing still yields the other's price. No retry.
pub struct PriceOracle {
    gateways: GatewayPair,
}

impl PriceOracle {
    pub fn new(gateways: GatewayPair) -> Self {
        Self { gateways }
    }

    pub async fn get_prices(&self, symbol: &str) -> Result<PriceQuote, HedgeError> {
        let (aster, backpack) = tokio::join!(
            self.gateways.get(Venue::Aster).fetch_price(symbol),
            self.gateways.get(Venue::Backpack).fetch_price(symbol),
        );

        let aster = aster
            .map_err(|e| warn!("[ORACLE] Aster price for {} unavailable: {:#}", symbol, e))
            .ok();
        let backpack = backpack
            .map_err(|e| warn!("[ORACLE] Backpack price for {} unavailable: {:#}", symbol, e))
            .ok();

        if aster.is_none() && backpack.is_none() {
            return Err(HedgeError::NoPriceAvailable {
                symbol: symbol.to_string(),
            });
        }

        debug!("[ORACLE] {} aster={:?} backpack={:?}", symbol, aster, backpack);
        Ok(PriceQuote { aster, backpack })
    }
}
