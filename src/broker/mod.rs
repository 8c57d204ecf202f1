//! Broker integration.
//!
//! Defines the `BrokerGateway` trait and provides the Alpaca REST
//! implementation. The engine only ever talks to the trait, so tests can
//! substitute a deterministic in-memory fake.

pub mod alpaca;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{BrokerPosition, MartenError, OrderSnapshot, OrderStatusFilter, OrderTicket};

/// Abstraction over the upstream broker.
///
/// The broker is the system of record for execution state: fills, resting
/// orders, and positions. Query failures surface as
/// `MartenError::BrokerUnavailable`; rejected submissions as
/// `MartenError::OrderRejected`.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Latest trade price for a symbol.
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, MartenError>;

    /// Current position for a symbol. `None` means flat.
    async fn position(&self, symbol: &str) -> Result<Option<BrokerPosition>, MartenError>;

    /// Orders for a symbol in the given status bucket, newest first.
    async fn list_orders(
        &self,
        filter: OrderStatusFilter,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<OrderSnapshot>, MartenError>;

    /// Submit one order. A single atomic broker call; returns the broker's
    /// order id on acceptance.
    async fn submit_order(&self, ticket: &OrderTicket) -> Result<String, MartenError>;

    /// Broker name for logging and identification.
    fn name(&self) -> &str;
}
