//! Tests for model construction from tagged configs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hugin::cache::{CacheConfig, CacheStore};
use hugin::providers::{EmbeddingModel, EmbeddingVector, ModelFactory, TextModel};
use hugin::{HuginError, Result};
use serde_json::{Value, json};

// ============================================================================
// Test delegates
// ============================================================================

/// Echoes its configured `reply` and counts calls in a shared counter.
struct ScriptedLlm {
    reply: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TextModel for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &Value) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Configured fine but never reachable.
struct OfflineLlm;

#[async_trait]
impl TextModel for OfflineLlm {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _prompt: &Value) -> Result<String> {
        Err(HuginError::Http("connection refused".to_string()))
    }

    async fn check(&self) -> Result<()> {
        Err(HuginError::Http("connection refused".to_string()))
    }
}

struct ConstantEmbedder;

#[async_trait]
impl EmbeddingModel for ConstantEmbedder {
    fn name(&self) -> &str {
        "constant"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

fn factory_in(dir: &std::path::Path, calls: Arc<AtomicUsize>) -> ModelFactory {
    let store = Arc::new(CacheStore::new(CacheConfig::new().base_dir(dir)));
    let mut factory = ModelFactory::new(store);
    factory.register_text_model("scripted", move |_, config: &Value| {
        let reply = config
            .get("reply")
            .and_then(Value::as_str)
            .ok_or_else(|| HuginError::Configuration("reply required".to_string()))?;
        Ok(Arc::new(ScriptedLlm {
            reply: reply.to_string(),
            calls: Arc::clone(&calls),
        }) as Arc<dyn TextModel>)
    });
    factory.register_text_model("offline", |_, _: &Value| {
        Ok(Arc::new(OfflineLlm) as Arc<dyn TextModel>)
    });
    factory.register_embedding_model("constant", |_, _: &Value| {
        Ok(Arc::new(ConstantEmbedder) as Arc<dyn EmbeddingModel>)
    });
    factory
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn builtin_tags_registered() {
    let factory = ModelFactory::new(Arc::new(CacheStore::default()));
    let text = factory.text_model_types();
    assert!(text.contains(&"cacheable"));
    assert!(text.contains(&"cacheable_llm"));
    assert!(
        factory
            .embedding_model_types()
            .contains(&"cacheable_vectorize_model")
    );
    #[cfg(feature = "openai")]
    {
        assert!(text.contains(&"openai"));
        assert!(text.contains(&"openai_llm"));
        assert!(text.contains(&"stream_openai_llm"));
        assert!(factory.embedding_model_types().contains(&"openai"));
    }
}

#[test]
fn empty_factory_has_no_tags() {
    let factory = ModelFactory::empty(Arc::new(CacheStore::default()));
    assert!(factory.text_model_types().is_empty());
    assert!(factory.embedding_model_types().is_empty());
}

#[test]
fn unknown_tag_is_error() {
    let factory = ModelFactory::new(Arc::new(CacheStore::default()));
    let result = factory.text_model(&json!({"type": "no_such_model"}));
    assert!(matches!(result, Err(HuginError::UnknownModelType(tag)) if tag == "no_such_model"));
}

#[test]
fn missing_type_is_configuration_error() {
    let factory = ModelFactory::new(Arc::new(CacheStore::default()));
    let result = factory.embedding_model(&json!({"model": "m"}));
    assert!(matches!(result, Err(HuginError::Configuration(_))));
}

// ============================================================================
// Cacheable wrappers
// ============================================================================

#[tokio::test]
async fn cacheable_text_wraps_delegate() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let factory = factory_in(dir.path(), Arc::clone(&calls));

    let model = factory
        .text_model(&json!({
            "type": "cacheable",
            "delegate_type": "scripted",
            "cache_root": dir.path().join("llm"),
            "name": "planner",
            "reply": "42",
            "api_key": "sk-secret",
        }))
        .unwrap();

    assert_eq!(model.name(), "planner");
    assert_eq!(model.complete(&json!("meaning?")).await.unwrap(), "42");
    assert_eq!(model.complete(&json!("meaning?")).await.unwrap(), "42");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let root = factory.store().get(&dir.path().join("llm")).unwrap();
    assert_eq!(root.params(), json!({"reply": "42"}));
}

#[tokio::test]
async fn cacheable_default_root_under_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let factory = factory_in(dir.path(), calls);

    let model = factory
        .text_model(&json!({
            "type": "cacheable_llm",
            "delegate_type": "scripted",
            "model": "qwen",
            "reply": "hi",
        }))
        .unwrap();
    model.complete(&json!("p")).await.unwrap();

    assert_eq!(factory.store().roots(), vec![dir.path().join("qwen")]);
    assert_eq!(model.name(), "cacheable_llm");
}

#[tokio::test]
async fn cacheable_embedding_wraps_delegate() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory_in(dir.path(), Arc::new(AtomicUsize::new(0)));

    let model = factory
        .embedding_model(&json!({
            "type": "cacheable_vectorize_model",
            "delegate_type": "constant",
            "cache_root": dir.path().join("vec"),
        }))
        .unwrap();

    assert_eq!(model.name(), "cacheable_vectorize_model");
    assert_eq!(model.embed("x").await.unwrap(), vec![1.0, 0.0]);
    let root = factory.store().get(&dir.path().join("vec")).unwrap();
    assert_eq!(root.read(&json!("x")), Some(json!([1.0, 0.0])));
}

#[test]
fn cacheable_requires_delegate_type() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory_in(dir.path(), Arc::new(AtomicUsize::new(0)));
    let result = factory.text_model(&json!({"type": "cacheable"}));
    assert!(matches!(result, Err(HuginError::Configuration(_))));
}

#[test]
fn cacheable_with_unknown_delegate_fails() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory_in(dir.path(), Arc::new(AtomicUsize::new(0)));
    let result = factory.text_model(&json!({"type": "cacheable", "delegate_type": "nope"}));
    assert!(matches!(result, Err(HuginError::UnknownModelType(_))));
}

#[test]
fn delegate_constructor_errors_propagate() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory_in(dir.path(), Arc::new(AtomicUsize::new(0)));
    // scripted requires `reply`
    let result = factory.text_model(&json!({"type": "cacheable", "delegate_type": "scripted"}));
    assert!(matches!(result, Err(HuginError::Configuration(msg)) if msg == "reply required"));
}

#[tokio::test]
async fn checked_build_surfaces_unreachable_delegate() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory_in(dir.path(), Arc::new(AtomicUsize::new(0)));
    let config = json!({"type": "cacheable", "delegate_type": "offline"});

    // construction alone succeeds; only the check reaches the delegate
    assert!(factory.text_model(&config).is_ok());
    let result = factory.text_model_checked(&config).await;
    assert!(matches!(result, Err(HuginError::Http(_))));
}

#[tokio::test]
async fn checked_build_returns_healthy_model() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let factory = factory_in(dir.path(), Arc::clone(&calls));

    let model = factory
        .text_model_checked(&json!({
            "type": "cacheable",
            "delegate_type": "scripted",
            "reply": "ok",
        }))
        .await
        .unwrap();
    assert_eq!(model.complete(&json!("p")).await.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[cfg(feature = "openai")]
#[test]
fn openai_tag_builds_client() {
    let factory = ModelFactory::new(Arc::new(CacheStore::default()));
    let model = factory
        .text_model(&json!({"type": "openai_llm", "api_key": "k", "model": "gpt-x"}))
        .unwrap();
    assert_eq!(model.name(), "gpt-x");
}
