//! The Inference Dispatcher (C6): turns OpenAI-compatible requests into
//! calls against a loaded [`cortex_loader::EnginePlugin`], gating single-slot
//! engines and bridging the plugin's poll loop into an async stream for SSE.

pub mod dispatcher;
pub mod gating;
pub mod prompt;
pub mod response;
pub mod types;

pub use dispatcher::{Dispatcher, FamilyPromptConfig};
pub use gating::{CacheHintCounter, ConcurrencyGate, DEFAULT_CLEAN_CACHE_THRESHOLD};
pub use response::{
    ChatCompletionChoice, ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionDelta, ChatCompletionMessage,
    ChatCompletionResponse, EmbeddingRecord, EmbeddingsResponse, UsageResponse,
};
pub use types::{
    ChatCompletionRequest, ChatMessage, ChatRole, ContentPart, EmbeddingsInput, EmbeddingsRequest, GenerationRequest,
    ImagePart, ImageUrlRef, MessageContent, SamplingParams, StopSequences,
};
