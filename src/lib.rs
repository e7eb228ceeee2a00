//! Hugin - caching model proxy and streaming solver service
//!
//! This crate sits between a question-answering pipeline and the remote
//! models it calls:
//!
//! - a content-addressable on-disk cache that wraps text completion and
//!   embedding clients, so replayed pipelines make no remote calls;
//! - a producer/consumer event stream that runs a pipeline in the
//!   background and feeds its progress and answer to an OpenAI-compatible
//!   streaming transport.
//!
//! # Caching Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hugin::{CacheConfig, CacheStore, ModelFactory};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> hugin::Result<()> {
//!     let store = Arc::new(CacheStore::new(CacheConfig::new().base_dir("/var/cache/hugin")));
//!     let factory = ModelFactory::new(store);
//!
//!     let llm = factory.text_model(&json!({
//!         "type": "cacheable",
//!         "delegate_type": "openai",
//!         "model": "gpt-4o-mini",
//!         "api_key": "sk-your-key",
//!     }))?;
//!
//!     // second call is answered from disk
//!     let answer = llm.complete(&json!("What is the capital of France?")).await?;
//!     let again = llm.complete(&json!("What is the capital of France?")).await?;
//!     assert_eq!(answer, again);
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use hugin::{Pipeline, Reporter, StreamCoordinator};
//! use serde_json::json;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Pipeline for Echo {
//!     async fn invoke(&self, query: &str, reporter: &Reporter) -> hugin::Result<String> {
//!         reporter.report_node(json!({"step": "thinking"}))?;
//!         Ok(format!("you said: {query}"))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let session = StreamCoordinator::new().start(Arc::new(Echo), "hello");
//! let mut events = session.events;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod providers;
pub mod service;
pub mod stream;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheKey, CacheRoot, CacheStore, KeyCodec};
pub use config::Config;
pub use error::{HuginError, Result};
pub use providers::{
    CachingEmbeddingModel, CachingTextModel, EmbeddingModel, EmbeddingVector, ModelFactory,
    TextModel,
};
#[cfg(feature = "openai")]
pub use providers::{OpenAiClient, OpenAiConfig};
pub use service::{
    CompletionStream, PipelineBuilder, ProjectDirectory, ProjectRecord, ResolvedQuery,
    SolverService, StaticDirectory, normalize_project_config,
};
pub use stream::{
    ChannelState, Event, EventReceiver, EventSender, Pipeline, Reporter, StreamCoordinator,
    StreamHandle, StreamSession, StreamState, channel,
};
pub use transport::{DONE_MARKER, Frame, frame_events, frame_payloads};
