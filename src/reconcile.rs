//! Order state reconciliation.
//!
//! Decides, for one symbol, the minimal set of new orders needed to bring
//! the broker's resting/filled orders in line with the target ladder. The
//! broker is the system of record: a level counts as covered only when a
//! matching broker order exists, so calling this twice against unchanged
//! broker state never queues the same level twice.
//!
//! This module is pure. The engine fetches broker state first and fails the
//! symbol with `BrokerUnavailable` before ever reaching this code, so a
//! broker outage produces no actions (never guess and over-submit).

use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// The actions needed to cover a symbol's ladder this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// The symbol is flat with no resting entry order: a level-0 market
    /// entry must be submitted before any drawdown levels are considered.
    pub needs_entry: bool,
    /// Uncovered (level, price) pairs, ascending by level so the
    /// nearest-to-entry levels are submitted first if only a partial batch
    /// goes through.
    pub submissions: Vec<(u32, Decimal)>,
}

impl ReconcilePlan {
    /// Nothing to do: every level is already covered at the broker.
    pub fn is_noop(&self) -> bool {
        !self.needs_entry && self.submissions.is_empty()
    }
}

/// Whether any broker order price matches `target` within `tolerance`.
/// The tolerance absorbs rounding drift between our 2-dp ladder prices and
/// broker-reported prices.
fn is_covered(target: Decimal, prices: &[Decimal], tolerance: Decimal) -> bool {
    prices.iter().any(|p| (*p - target).abs() <= tolerance)
}

/// Compute the minimal uncovered-level set for one symbol.
///
/// `open_prices` and `filled_prices` are the broker's resting and filled
/// order prices for this symbol. `has_position` reflects the broker's
/// position query (true when share quantity is nonzero).
pub fn reconcile(
    ladder: &BTreeMap<u32, Decimal>,
    open_prices: &[Decimal],
    filled_prices: &[Decimal],
    has_position: bool,
    tolerance: Decimal,
) -> ReconcilePlan {
    // Flat with no resting entry order: the ladder has nothing to anchor
    // on yet. Signal the initial entry and hold all drawdown levels back.
    if !has_position && open_prices.is_empty() {
        return ReconcilePlan {
            needs_entry: true,
            submissions: Vec::new(),
        };
    }

    let submissions = ladder
        .iter()
        .filter(|(_, price)| {
            !is_covered(**price, open_prices, tolerance)
                && !is_covered(**price, filled_prices, tolerance)
        })
        .map(|(level, price)| (*level, *price))
        .collect();

    ReconcilePlan {
        needs_entry: false,
        submissions,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
