//! Shared types for the MARTEN agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that broker, registry,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Equity
// ---------------------------------------------------------------------------

/// Whether the engine acts on a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquityStatus {
    Enabled,
    Disabled,
}

impl EquityStatus {
    /// The opposite status (used by the toggle control).
    pub fn toggled(&self) -> Self {
        match self {
            EquityStatus::Enabled => EquityStatus::Disabled,
            EquityStatus::Disabled => EquityStatus::Enabled,
        }
    }
}

impl fmt::Display for EquityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquityStatus::Enabled => write!(f, "ON"),
            EquityStatus::Disabled => write!(f, "OFF"),
        }
    }
}

/// One tracked symbol: ladder configuration plus cached execution state.
///
/// The registry is the source of truth for configuration (drawdown, level
/// count); the broker is the source of truth for execution state. `position`
/// and `covered_levels` are advisory caches refreshed from the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equity {
    pub symbol: String,
    pub status: EquityStatus,
    /// Reference price anchoring the ladder. `None` until the first fill
    /// establishes a flat-to-long transition.
    pub entry_price: Option<Decimal>,
    /// Per-level drawdown fraction, strictly inside (0, 1).
    pub drawdown: Decimal,
    pub level_count: u32,
    /// Level index (1..=level_count) → target re-entry price,
    /// strictly decreasing in the index.
    pub levels: BTreeMap<u32, Decimal>,
    /// Levels confirmed covered by a resting or filled broker order.
    pub covered_levels: BTreeSet<u32>,
    /// Last known share quantity, refreshed from the broker each tick.
    pub position: Decimal,
}

impl Equity {
    /// A freshly registered symbol: disabled, flat, ladder unanchored.
    pub fn new(symbol: impl Into<String>, drawdown: Decimal, level_count: u32) -> Self {
        Self {
            symbol: symbol.into(),
            status: EquityStatus::Disabled,
            entry_price: None,
            drawdown,
            level_count,
            levels: BTreeMap::new(),
            covered_levels: BTreeSet::new(),
            position: Decimal::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == EquityStatus::Enabled
    }

    /// Whether the ladder has been anchored to an entry price yet.
    pub fn is_anchored(&self) -> bool {
        self.entry_price.is_some()
    }

    /// Level indices not yet confirmed covered, ascending.
    pub fn uncovered_levels(&self) -> Vec<u32> {
        self.levels
            .keys()
            .filter(|i| !self.covered_levels.contains(i))
            .copied()
            .collect()
    }

    /// Drop the anchor and all derived state. Used when a position is
    /// fully closed and a new base entry cycle begins.
    pub fn reset_cycle(&mut self) {
        self.entry_price = None;
        self.levels.clear();
        self.covered_levels.clear();
        self.position = Decimal::ZERO;
    }
}

impl fmt::Display for Equity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = match self.entry_price {
            Some(p) => format!("${p:.2}"),
            None => "unanchored".to_string(),
        };
        write!(
            f,
            "{} [{}] entry={} dd={:.1}% levels={} covered={} pos={}",
            self.symbol,
            self.status,
            entry,
            self.drawdown * Decimal::from(100),
            self.level_count,
            self.covered_levels.len(),
            self.position,
        )
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order execution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Order lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

/// Which broker order bucket to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatusFilter {
    Open,
    Filled,
}

impl OrderStatusFilter {
    /// The wire value used by the broker's order-listing endpoint.
    pub fn as_query_value(&self) -> &'static str {
        match self {
            OrderStatusFilter::Open => "open",
            OrderStatusFilter::Filled => "closed",
        }
    }
}

/// An order request handed to the broker gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub order_type: OrderType,
    /// Required for `Limit`, ignored for `Market`.
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

impl OrderTicket {
    /// The level-0 market entry that anchors a new ladder cycle.
    pub fn market_buy(symbol: impl Into<String>, qty: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            qty,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    /// A resting re-entry order at a ladder level price.
    pub fn limit_buy(symbol: impl Into<String>, qty: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            qty,
            order_type: OrderType::Limit,
            limit_price: Some(price),
            time_in_force: TimeInForce::Gtc,
        }
    }
}

impl fmt::Display for OrderTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit_price {
            Some(p) => write!(f, "{} {} x{} LMT ${p:.2}", self.side, self.symbol, self.qty),
            None => write!(f, "{} {} x{} MKT", self.side, self.symbol, self.qty),
        }
    }
}

/// A broker-side order as returned by the order-listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    /// Limit price for resting orders; fill price for filled ones.
    pub price: Option<Decimal>,
    pub submitted_at: DateTime<Utc>,
}

/// A broker-side position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: Decimal,
    pub avg_entry_price: Decimal,
}

impl fmt::Display for BrokerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x{} @ ${:.2}",
            self.symbol, self.qty, self.avg_entry_price
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for MARTEN.
#[derive(Debug, thiserror::Error)]
pub enum MartenError {
    /// Bad user input, rejected before any registry mutation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transient broker outage. Retried next tick, no local state touched.
    #[error("Broker unavailable ({broker}): {message}")]
    BrokerUnavailable { broker: String, message: String },

    /// Order rejected by the broker. The level stays uncovered and is
    /// retried next tick.
    #[error("Order rejected for {symbol}: {message}")]
    OrderRejected { symbol: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Advisory service error: {0}")]
    Advisor(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
