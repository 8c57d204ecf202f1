//! Alpaca broker integration.
//!
//! Implements the `BrokerGateway` trait against the Alpaca v2 REST API.
//! Trading calls go to the paper endpoint by default; the latest-trade
//! quote comes from the separate market-data host. Transient failures
//! (429, 5xx, network errors) are retried with exponential backoff.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, warn};

use super::BrokerGateway;
use crate::types::{
    BrokerPosition, MartenError, OrderSide, OrderSnapshot, OrderStatusFilter, OrderTicket,
    OrderType,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
const MARKET_DATA_URL: &str = "https://data.alpaca.markets";

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;
/// Bounded per-request timeout so one hung symbol cannot stall a tick.
const REQUEST_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

// Alpaca reports all numeric fields as JSON strings.

#[derive(Debug, Deserialize)]
struct LatestTradeResponse {
    trade: LatestTrade,
}

#[derive(Debug, Deserialize)]
struct LatestTrade {
    #[serde(rename = "p")]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: String,
    avg_entry_price: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    symbol: String,
    side: OrderSide,
    qty: String,
    #[serde(default)]
    limit_price: Option<String>,
    #[serde(default)]
    filled_avg_price: Option<String>,
    submitted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, serde::Serialize)]
struct SubmitOrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: crate::types::TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AlpacaClient {
    http: Client,
    trading_url: String,
    data_url: String,
    api_key: String,
    api_secret: String,
}

impl AlpacaClient {
    /// Build a client against the paper-trading endpoint.
    pub fn paper(api_key: String, api_secret: String) -> Result<Self, MartenError> {
        Self::new(
            PAPER_TRADING_URL.to_string(),
            MARKET_DATA_URL.to_string(),
            api_key,
            api_secret,
        )
    }

    pub fn new(
        trading_url: String,
        data_url: String,
        api_key: String,
        api_secret: String,
    ) -> Result<Self, MartenError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MartenError::Config(format!("failed to build Alpaca HTTP client: {e}")))?;

        Ok(Self {
            http,
            trading_url,
            data_url,
            api_key,
            api_secret,
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> MartenError {
        MartenError::BrokerUnavailable {
            broker: "alpaca".to_string(),
            message: message.into(),
        }
    }

    /// GET with retry on 429/5xx and network errors. Returns the response
    /// body for 2xx, `None` for 404 (used by the position query).
    async fn get_with_retry(&self, url: &str) -> Result<Option<String>, MartenError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .get(url)
                .header(KEY_HEADER, &self.api_key)
                .header(SECRET_HEADER, &self.api_secret)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body = response
                            .text()
                            .await
                            .map_err(|e| self.unavailable(format!("body read failed: {e}")))?;
                        return Ok(Some(body));
                    }

                    if status.as_u16() == 404 {
                        return Ok(None);
                    }

                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        warn!(status = %status, attempt, url, "Retryable Alpaca error");
                        last_error = Some(format!("HTTP {status}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    return Err(self.unavailable(format!("HTTP {status}: {error_text}")));
                }
                Err(e) => {
                    last_error = Some(format!("request error: {e}"));
                    continue;
                }
            }
        }

        Err(self.unavailable(format!(
            "failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        )))
    }

    fn parse_decimal(&self, raw: &str, field: &str) -> Result<Decimal, MartenError> {
        Decimal::from_str(raw)
            .map_err(|e| self.unavailable(format!("unparseable {field} {raw:?}: {e}")))
    }
}

#[async_trait]
impl BrokerGateway for AlpacaClient {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, MartenError> {
        let url = format!("{}/v2/stocks/{symbol}/trades/latest", self.data_url);
        let body = self
            .get_with_retry(&url)
            .await?
            .ok_or_else(|| self.unavailable(format!("no latest trade for {symbol}")))?;

        let parsed: LatestTradeResponse = serde_json::from_str(&body)
            .map_err(|e| self.unavailable(format!("bad latest-trade response: {e}")))?;

        Decimal::try_from(parsed.trade.price)
            .map_err(|e| self.unavailable(format!("unparseable trade price: {e}")))
    }

    async fn position(&self, symbol: &str) -> Result<Option<BrokerPosition>, MartenError> {
        let url = format!("{}/v2/positions/{symbol}", self.trading_url);

        // 404 means flat, not an outage.
        let Some(body) = self.get_with_retry(&url).await? else {
            return Ok(None);
        };

        let parsed: PositionResponse = serde_json::from_str(&body)
            .map_err(|e| self.unavailable(format!("bad position response: {e}")))?;

        Ok(Some(BrokerPosition {
            symbol: parsed.symbol,
            qty: self.parse_decimal(&parsed.qty, "position qty")?,
            avg_entry_price: self.parse_decimal(&parsed.avg_entry_price, "avg entry price")?,
        }))
    }

    async fn list_orders(
        &self,
        filter: OrderStatusFilter,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<OrderSnapshot>, MartenError> {
        let url = format!(
            "{}/v2/orders?status={}&symbols={symbol}&limit={limit}",
            self.trading_url,
            filter.as_query_value(),
        );

        let body = self
            .get_with_retry(&url)
            .await?
            .ok_or_else(|| self.unavailable("order listing returned 404"))?;

        let parsed: Vec<OrderResponse> = serde_json::from_str(&body)
            .map_err(|e| self.unavailable(format!("bad order listing: {e}")))?;

        let mut orders = Vec::with_capacity(parsed.len());
        for o in parsed {
            // The closed bucket includes cancellations; only orders that
            // actually filled carry a fill price.
            if filter == OrderStatusFilter::Filled && o.filled_avg_price.is_none() {
                continue;
            }
            let raw_price = match filter {
                OrderStatusFilter::Open => o.limit_price.as_deref(),
                OrderStatusFilter::Filled => o.filled_avg_price.as_deref(),
            };
            let price = match raw_price {
                Some(raw) => Some(self.parse_decimal(raw, "order price")?),
                None => None,
            };
            orders.push(OrderSnapshot {
                id: o.id,
                symbol: o.symbol,
                side: o.side,
                qty: self.parse_decimal(&o.qty, "order qty")?,
                price,
                submitted_at: o.submitted_at,
            });
        }

        debug!(
            symbol,
            status = filter.as_query_value(),
            count = orders.len(),
            "Listed broker orders"
        );

        Ok(orders)
    }

    async fn submit_order(&self, ticket: &OrderTicket) -> Result<String, MartenError> {
        let url = format!("{}/v2/orders", self.trading_url);
        let request = SubmitOrderRequest {
            symbol: &ticket.symbol,
            qty: ticket.qty.to_string(),
            side: ticket.side,
            order_type: ticket.order_type,
            time_in_force: ticket.time_in_force,
            limit_price: ticket.limit_price.map(|p| p.to_string()),
        };

        let resp = self
            .http
            .post(&url)
            .header(KEY_HEADER, &self.api_key)
            .header(SECRET_HEADER, &self.api_secret)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unavailable(format!("submit request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            // 4xx here is a rejection of this specific order, not an outage.
            if status.is_client_error() {
                return Err(MartenError::OrderRejected {
                    symbol: ticket.symbol.clone(),
                    message: format!("HTTP {status}: {error_text}"),
                });
            }
            return Err(self.unavailable(format!("HTTP {status}: {error_text}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| self.unavailable(format!("bad submit response: {e}")))?;

        let order_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        debug!(ticket = %ticket, %order_id, "Order accepted");
        Ok(order_id)
    }

    fn name(&self) -> &str {
        "alpaca"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
