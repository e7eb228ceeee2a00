//! Read-through / write-through caching decorators.
//!
//! [`CachingTextModel`] and [`CachingEmbeddingModel`] wrap a delegate and a
//! registered [`CacheRoot`](crate::cache::CacheRoot). Lookups and writes run
//! on tokio's blocking pool since they wait on the root's file lock.
//!
//! # Batch decomposition
//!
//! `embed_batch` looks up each text individually, forwards only the misses
//! to the delegate in a single call (original order preserved), and
//! splices the returned vectors back into their positions. A single
//! `embed("hello")` therefore warms the entry a later
//! `embed_batch(["hello", "world"])` partially hits.
//!
//! Delegate errors are returned unchanged and nothing is cached for the
//! failed call.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::traits::{EmbeddingModel, EmbeddingVector, TextModel};
use crate::cache::RootHandle;
use crate::telemetry;
use crate::{HuginError, Result};

/// Text model that answers repeated prompts from disk.
pub struct CachingTextModel {
    name: String,
    inner: Arc<dyn TextModel>,
    root: RootHandle,
}

impl CachingTextModel {
    /// Wrap `inner`, caching under `root`.
    pub fn new(inner: Arc<dyn TextModel>, root: RootHandle) -> Self {
        Self {
            name: "cacheable_llm".to_string(),
            inner,
            root,
        }
    }

    /// Override the reported model name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn root(&self) -> &RootHandle {
        &self.root
    }

    pub fn inner(&self) -> &Arc<dyn TextModel> {
        &self.inner
    }
}

#[async_trait]
impl TextModel for CachingTextModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &Value) -> Result<String> {
        let cached = read_entries(&self.root, vec![prompt.clone()]).await;
        match cached.into_iter().next().flatten() {
            Some(Value::String(text)) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "complete")
                    .increment(1);
                return Ok(text);
            }
            Some(other) => {
                warn!(
                    root = %self.root.path().display(),
                    kind = json_kind(&other),
                    "cached completion is not a string, ignoring"
                );
            }
            None => {}
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "complete").increment(1);

        let text = call_delegate("complete", self.inner.complete(prompt)).await?;

        write_entries(
            &self.root,
            "complete",
            vec![(prompt.clone(), Value::String(text.clone()))],
        )
        .await;
        Ok(text)
    }

    async fn check(&self) -> Result<()> {
        self.inner.check().await
    }
}

/// Embedding model that answers repeated texts from disk.
pub struct CachingEmbeddingModel {
    name: String,
    inner: Arc<dyn EmbeddingModel>,
    root: RootHandle,
}

impl CachingEmbeddingModel {
    /// Wrap `inner`, caching under `root`.
    pub fn new(inner: Arc<dyn EmbeddingModel>, root: RootHandle) -> Self {
        Self {
            name: "cacheable_vectorize_model".to_string(),
            inner,
            root,
        }
    }

    /// Override the reported model name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn root(&self) -> &RootHandle {
        &self.root
    }

    pub fn inner(&self) -> &Arc<dyn EmbeddingModel> {
        &self.inner
    }
}

#[async_trait]
impl EmbeddingModel for CachingEmbeddingModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let prompts = texts.iter().map(|t| Value::String(t.clone())).collect();
        let cached: Vec<Option<EmbeddingVector>> = read_entries(&self.root, prompts)
            .await
            .into_iter()
            .map(|hit| hit.and_then(decode_vector))
            .collect();

        let misses: Vec<String> = texts
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(text, _)| text.clone())
            .collect();

        let hits = (texts.len() - misses.len()) as u64;
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "embed").increment(hits);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "embed")
            .increment(misses.len() as u64);

        if misses.is_empty() {
            return merge_batch_results(cached, Vec::new());
        }

        debug!(
            total = texts.len(),
            uncached = misses.len(),
            "forwarding uncached texts to embedding delegate"
        );
        let fresh = call_delegate("embed", self.inner.embed_batch(&misses)).await?;
        if fresh.len() != misses.len() {
            return Err(HuginError::DataError(format!(
                "embedding delegate returned {} vectors for {} texts",
                fresh.len(),
                misses.len()
            )));
        }

        let entries = misses
            .iter()
            .zip(&fresh)
            .map(|(text, vector)| (Value::String(text.clone()), Value::from(vector.clone())))
            .collect();
        write_entries(&self.root, "embed", entries).await;

        merge_batch_results(cached, fresh)
    }
}

/// Merge cached hits with delegate results for a batch.
///
/// `cached` holds `Some` for hits and `None` for misses; `fresh` holds the
/// delegate's vectors for exactly the misses, in order.
pub(crate) fn merge_batch_results(
    cached: Vec<Option<EmbeddingVector>>,
    fresh: Vec<EmbeddingVector>,
) -> Result<Vec<EmbeddingVector>> {
    let mut fresh = fresh.into_iter();
    cached
        .into_iter()
        .map(|hit| match hit {
            Some(vector) => Ok(vector),
            None => fresh.next().ok_or_else(|| {
                HuginError::DataError("embedding delegate returned too few vectors".to_string())
            }),
        })
        .collect()
}

fn decode_vector(value: Value) -> Option<EmbeddingVector> {
    match serde_json::from_value(value) {
        Ok(vector) => Some(vector),
        Err(e) => {
            warn!(error = %e, "cached embedding is not a float array, ignoring");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Invoke the delegate, recording call count, outcome and latency.
async fn call_delegate<T>(
    operation: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    let started = Instant::now();
    let result = call.await;
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(
        telemetry::DELEGATE_CALLS_TOTAL,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(telemetry::DELEGATE_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    result
}

async fn read_entries(root: &RootHandle, prompts: Vec<Value>) -> Vec<Option<Value>> {
    let count = prompts.len();
    let root = Arc::clone(root);
    let lookup = move || prompts.iter().map(|p| root.read(p)).collect::<Vec<_>>();
    match tokio::task::spawn_blocking(lookup).await {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "cache read task failed, treating as misses");
            vec![None; count]
        }
    }
}

async fn write_entries(root: &RootHandle, operation: &'static str, entries: Vec<(Value, Value)>) {
    let root = Arc::clone(root);
    let written = tokio::task::spawn_blocking(move || {
        entries
            .iter()
            .filter(|(prompt, response)| root.write(prompt, response))
            .count()
    })
    .await;
    match written {
        Ok(n) => {
            metrics::counter!(telemetry::CACHE_WRITES_TOTAL, "operation" => operation)
                .increment(n as u64);
        }
        Err(e) => error!(error = %e, "cache write task failed, entries dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_batch_all_cached() {
        let cached = vec![Some(vec![1.0]), Some(vec![2.0])];
        let result = merge_batch_results(cached, vec![]).unwrap();
        assert_eq!(result, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn merge_batch_mixed() {
        let cached = vec![Some(vec![1.0]), None, Some(vec![3.0]), None];
        let result = merge_batch_results(cached, vec![vec![2.0], vec![4.0]]).unwrap();
        assert_eq!(result, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
    }

    #[test]
    fn merge_batch_too_few_results() {
        let cached = vec![None, None];
        let result = merge_batch_results(cached, vec![vec![1.0]]);
        assert!(matches!(result, Err(HuginError::DataError(_))));
    }

    #[test]
    fn decode_vector_rejects_strings() {
        assert!(decode_vector(Value::String("nope".into())).is_none());
        assert_eq!(
            decode_vector(serde_json::json!([0.5, 1.5])),
            Some(vec![0.5, 1.5])
        );
    }
}
