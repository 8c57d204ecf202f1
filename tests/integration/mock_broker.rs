//! Mock broker for integration testing.
//!
//! Provides a deterministic `BrokerGateway` implementation with in-memory
//! quotes, positions, and order books, fully controllable from test code.
//! Market orders fill immediately at the configured quote so a flat→long
//! transition can be driven without a real exchange.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use marten::broker::BrokerGateway;
use marten::types::*;

/// A mock broker for deterministic testing.
///
/// All state is in-memory. Quotes, positions, and order books are
/// fully controllable from test code.
pub struct MockBroker {
    name: String,
    prices: Mutex<HashMap<String, Decimal>>,
    positions: Mutex<HashMap<String, BrokerPosition>>,
    open_orders: Mutex<Vec<OrderSnapshot>>,
    filled_orders: Mutex<Vec<OrderSnapshot>>,
    /// Every ticket handed to `submit_order`, accepted or not.
    submitted: Mutex<Vec<OrderTicket>>,
    /// If true, every submission comes back `OrderRejected`.
    reject_all: Mutex<bool>,
    /// If set, all operations return `BrokerUnavailable`.
    force_error: Mutex<Option<String>>,
    /// Per-symbol outages; operations for other symbols still succeed.
    symbol_errors: Mutex<HashMap<String, String>>,
    /// Accept this many more submissions, then fail with an outage.
    fail_after: Mutex<Option<u32>>,
}

impl MockBroker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prices: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            open_orders: Mutex::new(Vec::new()),
            filled_orders: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            reject_all: Mutex::new(false),
            force_error: Mutex::new(None),
            symbol_errors: Mutex::new(HashMap::new()),
            fail_after: Mutex::new(None),
        }
    }

    // -- Test controls -----------------------------------------------------

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_position(&self, symbol: &str, qty: Decimal, avg_entry_price: Decimal) {
        self.positions.lock().unwrap().insert(
            symbol.to_string(),
            BrokerPosition {
                symbol: symbol.to_string(),
                qty,
                avg_entry_price,
            },
        );
    }

    pub fn clear_position(&self, symbol: &str) {
        self.positions.lock().unwrap().remove(symbol);
    }

    pub fn add_open_order(&self, symbol: &str, price: Decimal) {
        self.push_open(symbol, OrderSide::Buy, price);
    }

    pub fn add_open_sell(&self, symbol: &str, price: Decimal) {
        self.push_open(symbol, OrderSide::Sell, price);
    }

    fn push_open(&self, symbol: &str, side: OrderSide, price: Decimal) {
        self.open_orders.lock().unwrap().push(OrderSnapshot {
            id: format!("MOCK-{}", Uuid::new_v4()),
            symbol: symbol.to_string(),
            side,
            qty: Decimal::ONE,
            price: Some(price),
            submitted_at: Utc::now(),
        });
    }

    /// Force all subsequent operations to return an outage.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced outage, global or per-symbol.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
        self.symbol_errors.lock().unwrap().clear();
    }

    /// Force operations for one symbol only to return an outage.
    pub fn set_error_for(&self, symbol: &str, msg: &str) {
        self.symbol_errors
            .lock()
            .unwrap()
            .insert(symbol.to_string(), msg.to_string());
    }

    pub fn set_reject_all(&self, reject: bool) {
        *self.reject_all.lock().unwrap() = reject;
    }

    /// Accept `n` more submissions, then fail each one with an outage.
    pub fn fail_after_submissions(&self, n: u32) {
        *self.fail_after.lock().unwrap() = Some(n);
    }

    pub fn clear_fail_after(&self) {
        *self.fail_after.lock().unwrap() = None;
    }

    /// Every ticket handed to `submit_order` so far, in order.
    pub fn submitted_tickets(&self) -> Vec<OrderTicket> {
        self.submitted.lock().unwrap().clone()
    }

    /// Limit prices of resting buy orders for a symbol, ascending.
    pub fn open_prices(&self, symbol: &str) -> Vec<Decimal> {
        let mut prices: Vec<Decimal> = self
            .open_orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.symbol == symbol)
            .filter_map(|o| o.price)
            .collect();
        prices.sort();
        prices
    }

    // -- Internals ---------------------------------------------------------

    fn check_outage(&self, symbol: &str) -> Result<(), MartenError> {
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(self.outage(msg));
        }
        if let Some(msg) = self.symbol_errors.lock().unwrap().get(symbol) {
            return Err(self.outage(msg));
        }
        Ok(())
    }

    fn outage(&self, msg: &str) -> MartenError {
        MartenError::BrokerUnavailable {
            broker: self.name.clone(),
            message: msg.to_string(),
        }
    }

    fn snapshot_for(&self, ticket: &OrderTicket, price: Option<Decimal>) -> OrderSnapshot {
        OrderSnapshot {
            id: format!("MOCK-{}", Uuid::new_v4()),
            symbol: ticket.symbol.clone(),
            side: ticket.side,
            qty: ticket.qty,
            price,
            submitted_at: Utc::now(),
        }
    }
}

#[async_trait]
impl BrokerGateway for MockBroker {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, MartenError> {
        self.check_outage(symbol)?;
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| self.outage(&format!("no quote for {symbol}")))
    }

    async fn position(&self, symbol: &str) -> Result<Option<BrokerPosition>, MartenError> {
        self.check_outage(symbol)?;
        Ok(self.positions.lock().unwrap().get(symbol).cloned())
    }

    async fn list_orders(
        &self,
        filter: OrderStatusFilter,
        symbol: &str,
        _limit: u32,
    ) -> Result<Vec<OrderSnapshot>, MartenError> {
        self.check_outage(symbol)?;
        let book = match filter {
            OrderStatusFilter::Open => self.open_orders.lock().unwrap(),
            OrderStatusFilter::Filled => self.filled_orders.lock().unwrap(),
        };
        Ok(book.iter().filter(|o| o.symbol == symbol).cloned().collect())
    }

    async fn submit_order(&self, ticket: &OrderTicket) -> Result<String, MartenError> {
        self.check_outage(&ticket.symbol)?;
        self.submitted.lock().unwrap().push(ticket.clone());

        {
            let mut fail_after = self.fail_after.lock().unwrap();
            if let Some(remaining) = fail_after.as_mut() {
                if *remaining == 0 {
                    return Err(self.outage("simulated outage mid-batch"));
                }
                *remaining -= 1;
            }
        }

        if *self.reject_all.lock().unwrap() {
            return Err(MartenError::OrderRejected {
                symbol: ticket.symbol.clone(),
                message: "rejected by mock".to_string(),
            });
        }

        match ticket.order_type {
            OrderType::Market => {
                // Fill immediately at the configured quote.
                let price = self
                    .prices
                    .lock()
                    .unwrap()
                    .get(&ticket.symbol)
                    .copied()
                    .ok_or_else(|| MartenError::OrderRejected {
                        symbol: ticket.symbol.clone(),
                        message: "no market for symbol".to_string(),
                    })?;

                let snapshot = self.snapshot_for(ticket, Some(price));
                let id = snapshot.id.clone();
                self.filled_orders.lock().unwrap().push(snapshot);

                let mut positions = self.positions.lock().unwrap();
                positions
                    .entry(ticket.symbol.clone())
                    .and_modify(|p| p.qty += ticket.qty)
                    .or_insert_with(|| BrokerPosition {
                        symbol: ticket.symbol.clone(),
                        qty: ticket.qty,
                        avg_entry_price: price,
                    });
                Ok(id)
            }
            OrderType::Limit => {
                // Rests on the book until test code says otherwise.
                let snapshot = self.snapshot_for(ticket, ticket.limit_price);
                let id = snapshot.id.clone();
                self.open_orders.lock().unwrap().push(snapshot);
                Ok(id)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_market_buy_fills_and_creates_position() {
        let broker = MockBroker::new("mock");
        broker.set_price("AAPL", dec!(100));

        let ticket = OrderTicket::market_buy("AAPL", dec!(1));
        broker.submit_order(&ticket).await.unwrap();

        let pos = broker.position("AAPL").await.unwrap().unwrap();
        assert_eq!(pos.qty, dec!(1));
        assert_eq!(pos.avg_entry_price, dec!(100));

        let filled = broker
            .list_orders(OrderStatusFilter::Filled, "AAPL", 100)
            .await
            .unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].price, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_limit_buy_rests_on_book() {
        let broker = MockBroker::new("mock");
        let ticket = OrderTicket::limit_buy("AAPL", dec!(1), dec!(95.00));
        broker.submit_order(&ticket).await.unwrap();

        assert!(broker.position("AAPL").await.unwrap().is_none());
        assert_eq!(broker.open_prices("AAPL"), vec![dec!(95.00)]);
    }

    #[tokio::test]
    async fn test_forced_error_global_and_per_symbol() {
        let broker = MockBroker::new("mock");
        broker.set_price("AAPL", dec!(100));
        broker.set_price("MSFT", dec!(50));

        broker.set_error("simulated disconnect");
        assert!(broker.latest_price("AAPL").await.is_err());
        broker.clear_error();

        broker.set_error_for("AAPL", "symbol outage");
        assert!(broker.position("AAPL").await.is_err());
        assert!(broker.position("MSFT").await.is_ok());
    }

    #[tokio::test]
    async fn test_reject_all_records_ticket() {
        let broker = MockBroker::new("mock");
        broker.set_reject_all(true);

        let ticket = OrderTicket::limit_buy("AAPL", dec!(1), dec!(95.00));
        let err = broker.submit_order(&ticket).await.unwrap_err();
        assert!(matches!(err, MartenError::OrderRejected { .. }));
        assert_eq!(broker.submitted_tickets().len(), 1);
        assert!(broker.open_prices("AAPL").is_empty());
    }

    #[tokio::test]
    async fn test_fail_after_counts_submissions() {
        let broker = MockBroker::new("mock");
        broker.fail_after_submissions(1);

        let first = OrderTicket::limit_buy("AAPL", dec!(1), dec!(95.00));
        let second = OrderTicket::limit_buy("AAPL", dec!(1), dec!(90.00));
        assert!(broker.submit_order(&first).await.is_ok());
        assert!(broker.submit_order(&second).await.is_err());

        broker.clear_fail_after();
        assert!(broker.submit_order(&second).await.is_ok());
    }
}
