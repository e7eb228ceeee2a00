//! Public wire types for the OpenAI-compatible surface.

mod chat;
mod model;

pub use chat::{
    CHUNK_OBJECT, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ChunkChoice,
    DeltaMessage, FinishReason, Role,
};
pub use model::{ModelCard, ModelList};
