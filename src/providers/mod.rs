//! Remote model delegates and the decorators that cache them.

pub mod caching;
pub mod factory;
#[cfg(feature = "openai")]
pub mod openai;
pub mod traits;

pub use caching::{CachingEmbeddingModel, CachingTextModel};
pub use factory::{EmbeddingModelConstructor, ModelFactory, TextModelConstructor};
#[cfg(feature = "openai")]
pub use openai::{OpenAiClient, OpenAiConfig};
pub use traits::{EmbeddingModel, EmbeddingVector, TextModel};
