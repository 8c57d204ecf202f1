//! AI advisory integration.
//!
//! Defines the `AdvisoryService` trait and provides the OpenAI
//! implementation. The advisor receives a read-only serialized snapshot of
//! the registry as context and answers portfolio questions; nothing in the
//! engine depends on its answers.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over the natural-language portfolio advisor.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    /// Ask a question against a registry snapshot (serialized JSON).
    /// Errors surface to the user as a displayed message and never touch
    /// the engine.
    async fn ask(&self, context: &str, question: &str) -> Result<String>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}
