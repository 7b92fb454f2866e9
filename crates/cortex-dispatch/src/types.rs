//! OpenAI-compatible wire shapes, hand-written rather than pulled from a
//! client SDK: this process is a server answering these shapes, not a
//! client consuming them, so the request/response structs only need to
//! round-trip JSON, not provide a builder API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlRef },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrlRef {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<StopSequences>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SamplingParams {
    pub top_p: f32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub repeat_last_n: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    /// Defaults per spec.md §4.6.
    fn default() -> Self {
        Self {
            top_p: 0.95,
            temperature: 0.8,
            max_tokens: 500,
            repeat_last_n: 32,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImagePart {
    pub id: usize,
    pub placeholder: String,
    /// Always a `data:` URL by the time dispatch sees it — remote/local
    /// file references are base64-encoded during prompt formatting.
    pub data_url: String,
}

/// The dispatcher's internal request shape, built by normalizing an
/// OpenAI-shaped body, per spec.md §4.6. Also the wire shape submitted to
/// the engine plugin via [`cortex_loader::EnginePlugin::submit_completion`].
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub sampling: SamplingParams,
    pub stop: Vec<String>,
    pub image_parts: Vec<ImagePart>,
    pub stream: bool,
    /// Set for the embeddings path: asks the plugin to return a vector
    /// instead of sampled tokens.
    pub embedding: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingsInput {
    One(String),
    Many(Vec<String>),
}

impl EmbeddingsInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            EmbeddingsInput::One(s) => vec![s],
            EmbeddingsInput::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: EmbeddingsInput,
}
