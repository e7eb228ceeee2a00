//! Model construction from configuration maps.
//!
//! Model configs are JSON objects tagged with a `type` field. The
//! [`ModelFactory`] maps each tag to a constructor and is populated once
//! at composition time; nothing is registered globally.
//!
//! Built-in tags:
//!
//! | tag | capability | builds |
//! |---|---|---|
//! | `cacheable`, `cacheable_llm` | text | [`CachingTextModel`] around `delegate_type` |
//! | `cacheable_vectorize_model` | embedding | [`CachingEmbeddingModel`] around `delegate_type` |
//! | `openai`, `openai_llm` | text | [`OpenAiClient`](super::OpenAiClient) (feature `openai`) |
//! | `stream_openai_llm` | text | streaming [`OpenAiClient`](super::OpenAiClient) (feature `openai`) |
//! | `openai` | embedding | [`OpenAiClient`](super::OpenAiClient) (feature `openai`) |
//!
//! A cacheable config carries the delegate's own settings alongside its
//! caching keys:
//!
//! ```json
//! {
//!   "type": "cacheable",
//!   "delegate_type": "openai",
//!   "cache_root": "/var/cache/hugin/llm",
//!   "model": "gpt-4o-mini",
//!   "api_key": "sk-..."
//! }
//! ```
//!
//! `cache_root` and `name` are consumed by the wrapper; everything else is
//! forwarded to the delegate (with `type` set to `delegate_type`) and, minus
//! blacklisted secrets, recorded as the root's params snapshot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::caching::{CachingEmbeddingModel, CachingTextModel};
use super::traits::{EmbeddingModel, TextModel};
use crate::cache::CacheStore;
use crate::{HuginError, Result};

/// Constructor for a text model tag.
pub type TextModelConstructor =
    Arc<dyn Fn(&ModelFactory, &Value) -> Result<Arc<dyn TextModel>> + Send + Sync>;

/// Constructor for an embedding model tag.
pub type EmbeddingModelConstructor =
    Arc<dyn Fn(&ModelFactory, &Value) -> Result<Arc<dyn EmbeddingModel>> + Send + Sync>;

/// Registry of model constructors keyed by type tag.
pub struct ModelFactory {
    store: Arc<CacheStore>,
    text: HashMap<String, TextModelConstructor>,
    embedding: HashMap<String, EmbeddingModelConstructor>,
}

impl ModelFactory {
    /// Factory with the built-in tags registered.
    pub fn new(store: Arc<CacheStore>) -> Self {
        let mut factory = Self::empty(store);

        factory.register_text_model("cacheable", build_cacheable_text);
        factory.register_text_model("cacheable_llm", build_cacheable_text);
        factory.register_embedding_model("cacheable_vectorize_model", build_cacheable_embedding);

        #[cfg(feature = "openai")]
        {
            factory.register_text_model("openai", build_openai_text);
            factory.register_text_model("openai_llm", build_openai_text);
            factory.register_text_model("stream_openai_llm", build_streaming_openai_text);
            factory.register_embedding_model("openai", build_openai_embedding);
        }

        factory
    }

    /// Factory with no tags registered.
    pub fn empty(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            text: HashMap::new(),
            embedding: HashMap::new(),
        }
    }

    /// Cache store used by the cacheable wrappers.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Register (or replace) a text model constructor.
    pub fn register_text_model<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&ModelFactory, &Value) -> Result<Arc<dyn TextModel>> + Send + Sync + 'static,
    {
        self.text.insert(tag.into(), Arc::new(constructor));
    }

    /// Register (or replace) an embedding model constructor.
    pub fn register_embedding_model<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&ModelFactory, &Value) -> Result<Arc<dyn EmbeddingModel>> + Send + Sync + 'static,
    {
        self.embedding.insert(tag.into(), Arc::new(constructor));
    }

    /// Build a text model from a tagged config.
    ///
    /// The model is not contacted; use
    /// [`text_model_checked`](Self::text_model_checked) to fail fast on an
    /// unreachable or misconfigured delegate.
    pub fn text_model(&self, config: &Value) -> Result<Arc<dyn TextModel>> {
        let tag = type_tag(config)?;
        let constructor = self
            .text
            .get(tag)
            .ok_or_else(|| HuginError::UnknownModelType(tag.to_string()))?;
        debug!(tag, "building text model");
        constructor(self, config)
    }

    /// Build a text model and run its [`check`](TextModel::check).
    pub async fn text_model_checked(&self, config: &Value) -> Result<Arc<dyn TextModel>> {
        let model = self.text_model(config)?;
        model.check().await?;
        debug!(model = model.name(), "text model checked");
        Ok(model)
    }

    /// Build an embedding model from a tagged config.
    pub fn embedding_model(&self, config: &Value) -> Result<Arc<dyn EmbeddingModel>> {
        let tag = type_tag(config)?;
        let constructor = self
            .embedding
            .get(tag)
            .ok_or_else(|| HuginError::UnknownModelType(tag.to_string()))?;
        debug!(tag, "building embedding model");
        constructor(self, config)
    }

    /// Registered text model tags, sorted.
    pub fn text_model_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.text.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Registered embedding model tags, sorted.
    pub fn embedding_model_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.embedding.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

fn type_tag(config: &Value) -> Result<&str> {
    config
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| HuginError::Configuration("model config has no \"type\" field".to_string()))
}

/// A cacheable config split into wrapper settings and delegate config.
struct CacheableConfig {
    cache_root: Option<PathBuf>,
    name: Option<String>,
    params: Value,
    delegate: Value,
}

fn split_cacheable(config: &Value) -> Result<CacheableConfig> {
    let mut rest: Map<String, Value> = config
        .as_object()
        .cloned()
        .ok_or_else(|| HuginError::Configuration("model config must be an object".to_string()))?;

    rest.remove("type");
    let delegate_type = match rest.remove("delegate_type") {
        Some(Value::String(tag)) if !tag.is_empty() => tag,
        _ => {
            return Err(HuginError::Configuration(
                "cacheable model config requires \"delegate_type\"".to_string(),
            ));
        }
    };
    let cache_root = rest
        .remove("cache_root")
        .and_then(|v| v.as_str().map(PathBuf::from))
        .filter(|p| !p.as_os_str().is_empty());
    let name = rest
        .remove("name")
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|n| !n.is_empty());

    let params = Value::Object(rest.clone());
    rest.insert("type".to_string(), Value::String(delegate_type));

    Ok(CacheableConfig {
        cache_root,
        name,
        params,
        delegate: Value::Object(rest),
    })
}

fn build_cacheable_text(factory: &ModelFactory, config: &Value) -> Result<Arc<dyn TextModel>> {
    let parts = split_cacheable(config)?;
    let root = factory
        .store()
        .register(parts.cache_root.as_deref(), &parts.params)?;
    let inner = factory.text_model(&parts.delegate)?;

    let mut model = CachingTextModel::new(inner, root);
    if let Some(name) = parts.name {
        model = model.with_name(name);
    }
    Ok(Arc::new(model))
}

fn build_cacheable_embedding(
    factory: &ModelFactory,
    config: &Value,
) -> Result<Arc<dyn EmbeddingModel>> {
    let parts = split_cacheable(config)?;
    let root = factory
        .store()
        .register(parts.cache_root.as_deref(), &parts.params)?;
    let inner = factory.embedding_model(&parts.delegate)?;

    let mut model = CachingEmbeddingModel::new(inner, root);
    if let Some(name) = parts.name {
        model = model.with_name(name);
    }
    Ok(Arc::new(model))
}

#[cfg(feature = "openai")]
fn build_openai_text(_: &ModelFactory, config: &Value) -> Result<Arc<dyn TextModel>> {
    Ok(Arc::new(super::OpenAiClient::from_config(config)?))
}

#[cfg(feature = "openai")]
fn build_streaming_openai_text(_: &ModelFactory, config: &Value) -> Result<Arc<dyn TextModel>> {
    let mut config = config.clone();
    if let Value::Object(map) = &mut config {
        map.insert("stream".to_string(), Value::Bool(true));
    }
    Ok(Arc::new(super::OpenAiClient::from_config(&config)?))
}

#[cfg(feature = "openai")]
fn build_openai_embedding(_: &ModelFactory, config: &Value) -> Result<Arc<dyn EmbeddingModel>> {
    Ok(Arc::new(super::OpenAiClient::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_moves_delegate_type_into_type() {
        let parts = split_cacheable(&json!({
            "type": "cacheable",
            "delegate_type": "openai",
            "cache_root": "/tmp/x",
            "name": "llm",
            "model": "m",
        }))
        .unwrap();
        assert_eq!(parts.cache_root, Some(PathBuf::from("/tmp/x")));
        assert_eq!(parts.name.as_deref(), Some("llm"));
        assert_eq!(parts.params, json!({"model": "m"}));
        assert_eq!(parts.delegate, json!({"type": "openai", "model": "m"}));
    }

    #[test]
    fn split_requires_delegate_type() {
        let result = split_cacheable(&json!({"type": "cacheable"}));
        assert!(matches!(result, Err(HuginError::Configuration(_))));
    }

    #[test]
    fn empty_cache_root_means_default() {
        let parts =
            split_cacheable(&json!({"delegate_type": "openai", "cache_root": ""})).unwrap();
        assert!(parts.cache_root.is_none());
    }
}
