//! Martingale level ladder calculation.
//!
//! Computes the ordered set of drawdown-triggered re-entry prices below an
//! entry price. Pure and deterministic; validation happens here so that bad
//! user input is rejected before the registry is touched.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

use crate::types::MartenError;

/// Currency display precision. Level prices are rounded to whole cents,
/// half away from zero.
const PRICE_DECIMALS: u32 = 2;

/// Compute the re-entry ladder for a symbol.
///
/// `price(i) = round2(entry_price * (1 - drawdown * i))` for i in 1..=count.
/// Prices are strictly decreasing in the level index. Deep ladders can
/// reach zero or below; those prices are computed as-is and left for the
/// broker to reject at submission time.
pub fn compute_levels(
    entry_price: Decimal,
    drawdown: Decimal,
    count: u32,
) -> Result<BTreeMap<u32, Decimal>, MartenError> {
    if entry_price <= Decimal::ZERO {
        return Err(MartenError::InvalidParameter(format!(
            "entry price must be positive, got {entry_price}"
        )));
    }
    if drawdown <= Decimal::ZERO || drawdown >= Decimal::ONE {
        return Err(MartenError::InvalidParameter(format!(
            "drawdown must be in (0, 1), got {drawdown}"
        )));
    }
    if count == 0 {
        return Err(MartenError::InvalidParameter(
            "level count must be positive".to_string(),
        ));
    }

    let mut levels = BTreeMap::new();
    for i in 1..=count {
        let price = (entry_price * (Decimal::ONE - drawdown * Decimal::from(i)))
            .round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
        levels.insert(i, price);
    }
    Ok(levels)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
