//! Core engine — the periodic reconcile → submit loop.
//!
//! One long-lived task drives all enabled symbols: each tick fetches the
//! broker's position and order state per symbol, reconciles it against the
//! registry's ladder, and submits only the orders needed to cover uncovered
//! levels. A broker failure on one symbol is logged and never aborts the
//! rest of the tick. Submissions for a symbol are serialized with a
//! configurable delay between them to respect broker rate limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::broker::BrokerGateway;
use crate::reconcile;
use crate::registry::EquityRegistry;
use crate::types::{Equity, MartenError, OrderSide, OrderStatusFilter, OrderTicket};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine loop tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed period between ticks.
    pub tick_interval: Duration,
    /// Minimum delay between consecutive order submissions for one symbol.
    pub submit_delay: Duration,
    /// Price tolerance when matching broker orders to ladder levels
    /// (absorbs rounding drift, e.g. one cent).
    pub price_tolerance: Decimal,
    /// Share quantity per level order.
    pub order_qty: Decimal,
    /// How many orders to request per broker listing call.
    pub order_fetch_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            submit_delay: Duration::from_millis(250),
            price_tolerance: dec!(0.01),
            order_qty: Decimal::ONE,
            order_fetch_limit: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// Summary of one tick across all enabled symbols.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub symbols_processed: u64,
    pub entries_submitted: u64,
    pub orders_submitted: u64,
    pub orders_rejected: u64,
    pub symbols_failed: u64,
}

// ---------------------------------------------------------------------------
// Engine loop
// ---------------------------------------------------------------------------

pub struct EngineLoop {
    broker: Arc<dyn BrokerGateway>,
    registry: Arc<Mutex<EquityRegistry>>,
    config: EngineConfig,
}

impl EngineLoop {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        registry: Arc<Mutex<EquityRegistry>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            broker,
            registry,
            config,
        }
    }

    /// Run until the shutdown signal flips. The loop stops between ticks,
    /// never mid-submission, and flushes the registry exactly once on exit.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);

        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            broker = self.broker.name(),
            "Engine loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    info!(
                        symbols = report.symbols_processed,
                        entries = report.entries_submitted,
                        orders = report.orders_submitted,
                        rejected = report.orders_rejected,
                        failed = report.symbols_failed,
                        "Tick complete"
                    );
                }
                _ = shutdown.changed() => {
                    info!("Engine loop stopping");
                    break;
                }
            }
        }

        if let Err(e) = self.registry.lock().await.persist() {
            error!(error = %e, "Final registry flush failed");
        } else {
            info!("Registry flushed on shutdown");
        }
    }

    /// Process every enabled symbol once. Per-symbol failures are counted,
    /// logged, and do not abort the remaining symbols.
    pub async fn tick(&self) -> TickReport {
        let symbols = self.registry.lock().await.enabled_symbols();
        let mut report = TickReport::default();

        for symbol in symbols {
            match self.process_symbol(&symbol, &mut report).await {
                Ok(()) => report.symbols_processed += 1,
                Err(e) => {
                    warn!(%symbol, error = %e, "Symbol failed this tick, continuing");
                    report.symbols_failed += 1;
                }
            }
        }

        report
    }

    /// One symbol's reconcile-and-submit pass.
    async fn process_symbol(
        &self,
        symbol: &str,
        report: &mut TickReport,
    ) -> Result<(), MartenError> {
        // Broker state first: if any of these fail, the symbol is skipped
        // this tick with no local mutation and nothing submitted.
        let broker_position = self.broker.position(symbol).await?;
        let open_orders = self
            .broker
            .list_orders(OrderStatusFilter::Open, symbol, self.config.order_fetch_limit)
            .await?;
        let filled_orders = self
            .broker
            .list_orders(OrderStatusFilter::Filled, symbol, self.config.order_fetch_limit)
            .await?;

        // The symbol may have been toggled or removed since the snapshot.
        let Some(equity) = self.registry.lock().await.get(symbol).cloned() else {
            debug!(symbol, "Symbol removed mid-tick, skipping");
            return Ok(());
        };
        if !equity.is_enabled() {
            debug!(symbol, "Symbol disabled mid-tick, skipping");
            return Ok(());
        }

        match broker_position {
            None => {
                self.handle_flat(&equity, &open_orders, report).await?;
            }
            Some(position) => {
                // Flat-to-long transition: the first establishing fill
                // anchors the ladder.
                let equity = if !equity.is_anchored() {
                    let mut registry = self.registry.lock().await;
                    registry.anchor(symbol, position.avg_entry_price)?;
                    registry
                        .get(symbol)
                        .cloned()
                        .ok_or_else(|| MartenError::InvalidParameter(format!("unknown symbol {symbol}")))?
                } else {
                    equity
                };

                let open_prices: Vec<Decimal> = open_orders
                    .iter()
                    .filter(|o| o.side == OrderSide::Buy)
                    .filter_map(|o| o.price)
                    .collect();
                let filled_prices: Vec<Decimal> = filled_orders
                    .iter()
                    .filter(|o| o.side == OrderSide::Buy)
                    .filter_map(|o| o.price)
                    .collect();

                let plan = reconcile::reconcile(
                    &equity.levels,
                    &open_prices,
                    &filled_prices,
                    true,
                    self.config.price_tolerance,
                );

                // Everything the broker already confirms, plus whatever we
                // successfully submit below, ends up covered.
                let uncovered: Vec<u32> = plan.submissions.iter().map(|(i, _)| *i).collect();
                let mut covered: Vec<u32> = equity
                    .levels
                    .keys()
                    .filter(|i| !uncovered.contains(i))
                    .copied()
                    .collect();

                covered.extend(
                    self.submit_levels(&equity, &plan.submissions, position.qty, report)
                        .await?,
                );

                self.registry
                    .lock()
                    .await
                    .record_broker_state(symbol, covered, position.qty)?;
            }
        }

        Ok(())
    }

    /// Flat symbol: close out any stale anchor, then submit the level-0
    /// market entry unless a buy order is already resting at the broker.
    async fn handle_flat(
        &self,
        equity: &Equity,
        open_orders: &[crate::types::OrderSnapshot],
        report: &mut TickReport,
    ) -> Result<(), MartenError> {
        let symbol = equity.symbol.as_str();

        // A previously anchored symbol with no position has closed its
        // cycle; clear the stale ladder before re-entering.
        if equity.is_anchored() {
            info!(symbol, "Position closed, starting new entry cycle");
            self.registry.lock().await.reset_cycle(symbol)?;
        }

        // Only a resting buy counts as an in-flight entry; a stray sell
        // order must not stall re-entry.
        if open_orders.iter().any(|o| o.side == OrderSide::Buy) {
            debug!(symbol, "Entry order already resting, waiting for fill");
            return Ok(());
        }

        let ticket = OrderTicket::market_buy(symbol, self.config.order_qty);
        info!(symbol, ticket = %ticket, "Submitting initial entry");

        match self.broker.submit_order(&ticket).await {
            Ok(order_id) => {
                debug!(symbol, %order_id, "Entry accepted");
                report.entries_submitted += 1;
                Ok(())
            }
            Err(MartenError::OrderRejected { message, .. }) => {
                warn!(symbol, %message, "Entry rejected, retrying next tick");
                report.orders_rejected += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Submit limit orders for uncovered levels, nearest-to-entry first,
    /// honoring the inter-submission delay. Returns the levels accepted by
    /// the broker. A rejection skips that level (retried next tick); an
    /// outage aborts the remainder of the batch.
    async fn submit_levels(
        &self,
        equity: &Equity,
        submissions: &[(u32, Decimal)],
        position_qty: Decimal,
        report: &mut TickReport,
    ) -> Result<Vec<u32>, MartenError> {
        let mut accepted = Vec::new();

        for (i, (level, price)) in submissions.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.submit_delay).await;
            }

            let ticket = OrderTicket::limit_buy(&equity.symbol, self.config.order_qty, *price);
            debug!(symbol = %equity.symbol, level, ticket = %ticket, "Submitting level order");

            match self.broker.submit_order(&ticket).await {
                Ok(order_id) => {
                    info!(symbol = %equity.symbol, level, price = %price, %order_id, "Level covered");
                    report.orders_submitted += 1;
                    accepted.push(*level);
                }
                Err(MartenError::OrderRejected { message, .. }) => {
                    warn!(
                        symbol = %equity.symbol,
                        level,
                        %message,
                        "Level order rejected, retrying next tick"
                    );
                    report.orders_rejected += 1;
                }
                Err(e) => {
                    // Outage mid-batch: record what was accepted so far and
                    // let the next tick pick up the rest.
                    if !accepted.is_empty() {
                        self.registry.lock().await.record_broker_state(
                            &equity.symbol,
                            accepted.clone(),
                            position_qty,
                        )?;
                    }
                    return Err(e);
                }
            }
        }

        Ok(accepted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
