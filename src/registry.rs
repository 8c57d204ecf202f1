//! Equity registry and persistence.
//!
//! In-memory symbol → `Equity` map, persisted to a JSON file after every
//! mutation and reloaded at process start. Writes are atomic (write to a
//! sibling temp file, then rename) so a crash can never leave truncated
//! state behind. A missing or corrupt file loads as an empty registry.
//!
//! The registry is shared as `Arc<tokio::sync::Mutex<EquityRegistry>>`
//! between the engine loop and the control surface; all read-modify-write
//! goes through that single lock.

use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::ladder;
use crate::types::{Equity, EquityStatus, MartenError};

/// Default registry file path.
const DEFAULT_STATE_FILE: &str = "equities.json";

pub struct EquityRegistry {
    equities: BTreeMap<String, Equity>,
    state_file: PathBuf,
}

impl EquityRegistry {
    /// Create an empty registry backed by the given file (or the default).
    pub fn new(state_file: Option<&str>) -> Self {
        Self {
            equities: BTreeMap::new(),
            state_file: PathBuf::from(state_file.unwrap_or(DEFAULT_STATE_FILE)),
        }
    }

    /// Load the registry from disk. Missing or corrupt state is not fatal:
    /// the agent starts fresh and logs why.
    pub fn load(state_file: Option<&str>) -> Self {
        let mut registry = Self::new(state_file);
        let path = registry.state_file.clone();

        if !path.exists() {
            info!(path = %path.display(), "No saved registry found, starting fresh");
            return registry;
        }

        match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<BTreeMap<String, Equity>>(&json) {
                Ok(equities) => {
                    info!(
                        path = %path.display(),
                        symbols = equities.len(),
                        "Registry loaded from disk"
                    );
                    registry.equities = equities;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt registry file, starting fresh");
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable registry file, starting fresh");
            }
        }

        registry
    }

    // -- Control surface operations --------------------------------------

    /// Register a new symbol. Ladder parameters are validated first so bad
    /// input never mutates the registry; the symbol starts disabled, flat,
    /// and unanchored.
    pub fn add(
        &mut self,
        symbol: &str,
        drawdown: Decimal,
        level_count: u32,
    ) -> Result<(), MartenError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(MartenError::InvalidParameter("symbol is empty".to_string()));
        }
        if self.equities.contains_key(&symbol) {
            return Err(MartenError::InvalidParameter(format!(
                "symbol {symbol} is already registered"
            )));
        }
        // Probe the ladder math with a placeholder entry so drawdown and
        // count are rejected up front, before any fill anchors the ladder.
        ladder::compute_levels(Decimal::ONE_HUNDRED, drawdown, level_count)?;

        self.equities
            .insert(symbol.clone(), Equity::new(symbol.clone(), drawdown, level_count));
        info!(%symbol, %drawdown, level_count, "Symbol registered");
        self.persist()
    }

    /// Remove a symbol entirely.
    pub fn remove(&mut self, symbol: &str) -> Result<(), MartenError> {
        if self.equities.remove(symbol).is_none() {
            return Err(MartenError::InvalidParameter(format!(
                "unknown symbol {symbol}"
            )));
        }
        info!(symbol, "Symbol removed");
        self.persist()
    }

    /// Flip a symbol between Enabled and Disabled. Returns the new status.
    /// Disabling preserves `covered_levels`; the engine simply stops
    /// acting on the symbol.
    pub fn toggle(&mut self, symbol: &str) -> Result<EquityStatus, MartenError> {
        let eq = self.get_mut(symbol)?;
        eq.status = eq.status.toggled();
        let status = eq.status;
        info!(symbol, %status, "Symbol toggled");
        self.persist()?;
        Ok(status)
    }

    /// Cloned view of every tracked equity, for display and advisory context.
    pub fn snapshot(&self) -> Vec<Equity> {
        self.equities.values().cloned().collect()
    }

    /// Symbols the engine should process this tick.
    pub fn enabled_symbols(&self) -> Vec<String> {
        self.equities
            .values()
            .filter(|e| e.is_enabled())
            .map(|e| e.symbol.clone())
            .collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&Equity> {
        self.equities.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.equities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equities.is_empty()
    }

    // -- Engine operations ------------------------------------------------

    /// Anchor the ladder after a flat-to-long transition: set the entry
    /// price to the first establishing fill and recompute the levels. Any
    /// coverage from a previous cycle is discarded.
    pub fn anchor(&mut self, symbol: &str, entry_price: Decimal) -> Result<(), MartenError> {
        let eq = self.get_mut(symbol)?;
        let levels = ladder::compute_levels(entry_price, eq.drawdown, eq.level_count)?;
        eq.entry_price = Some(entry_price);
        eq.levels = levels;
        eq.covered_levels.clear();
        info!(symbol, %entry_price, "Ladder anchored");
        self.persist()
    }

    /// Start a fresh base entry cycle (position fully closed).
    pub fn reset_cycle(&mut self, symbol: &str) -> Result<(), MartenError> {
        self.get_mut(symbol)?.reset_cycle();
        debug!(symbol, "Cycle reset");
        self.persist()
    }

    /// Record the broker-confirmed coverage and position for a symbol.
    pub fn record_broker_state(
        &mut self,
        symbol: &str,
        covered: impl IntoIterator<Item = u32>,
        position: Decimal,
    ) -> Result<(), MartenError> {
        let eq = self.get_mut(symbol)?;
        eq.covered_levels.extend(covered);
        // coveredLevels ⊆ 1..=level_count
        let max = eq.level_count;
        eq.covered_levels.retain(|i| *i >= 1 && *i <= max);
        eq.position = position;
        self.persist()
    }

    fn get_mut(&mut self, symbol: &str) -> Result<&mut Equity, MartenError> {
        self.equities
            .get_mut(symbol)
            .ok_or_else(|| MartenError::InvalidParameter(format!("unknown symbol {symbol}")))
    }

    // -- Persistence -------------------------------------------------------

    /// Write the registry to disk atomically: serialize to `<path>.tmp`,
    /// then rename over the real file. Retried once immediately on failure,
    /// then surfaced — registry state is never silently dropped.
    pub fn persist(&self) -> Result<(), MartenError> {
        match self.try_persist() {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "Registry write failed, retrying once");
                self.try_persist().map_err(|e| {
                    MartenError::Persistence(format!(
                        "write to {} failed twice: {e}",
                        self.state_file.display()
                    ))
                })
            }
        }
    }

    fn try_persist(&self) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.equities)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = self.state_file.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.state_file)?;

        debug!(path = %self.state_file.display(), symbols = self.equities.len(), "Registry saved");
        Ok(())
    }

    /// Delete the backing file (for testing or reset).
    pub fn delete_state_file(&self) -> Result<()> {
        if Path::new(&self.state_file).exists() {
            std::fs::remove_file(&self.state_file)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
