//! Capability traits for remote models.
//!
//! A delegate exposes one capability: text completion ([`TextModel`]) or
//! batch embedding ([`EmbeddingModel`]). Both are narrow on purpose so
//! decorators such as [`CachingTextModel`](super::CachingTextModel) can
//! wrap any implementation without knowing its transport.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use crate::{HuginError, Result};

/// Dense embedding vector.
pub type EmbeddingVector = Vec<f32>;

/// Remote text completion.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Model name for logging/debugging.
    fn name(&self) -> &str;

    /// Produce a completion for `prompt`.
    ///
    /// The prompt is usually a JSON string, but structured prompts (objects
    /// or arrays) are accepted and hashed as-is by caching wrappers.
    async fn complete(&self, prompt: &Value) -> Result<String>;

    /// Produce a completion as a sequence of text chunks.
    ///
    /// Default implementation yields the whole [`complete`](Self::complete)
    /// answer as one chunk.
    async fn complete_stream(&self, prompt: &Value) -> Result<BoxStream<'static, String>> {
        let text = self.complete(prompt).await?;
        Ok(stream::once(async move { text }).boxed())
    }

    /// Verify the model is reachable and configured.
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Remote text embedding.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model name for logging/debugging.
    fn name(&self) -> &str;

    /// Output dimensionality, if known up front.
    fn dimensions(&self) -> Option<usize> {
        None
    }

    /// Embed every text, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Embed a single text.
    ///
    /// Default implementation forwards a one-element batch.
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(HuginError::EmptyResponse)
    }
}
