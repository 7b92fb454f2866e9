//! The Inference Dispatcher (C6): normalizes OpenAI-shaped requests into the
//! internal `GenerationRequest` shape, gates single-slot engines, bridges the
//! plugin's callback-style polling loop into an async stream for SSE, and
//! applies the KV-cache-clear hint on the configured cadence. The bridging
//! shape mirrors the teacher's runnable-to-SSE adapter: a blocking poll loop
//! feeds a channel that an `async_stream::stream!` block turns into frames.

use crate::gating::{CacheHintCounter, ConcurrencyGate, DEFAULT_CLEAN_CACHE_THRESHOLD};
use crate::prompt::format_prompt;
use crate::response::{ChatCompletionChunk, ChatCompletionResponse, EmbeddingRecord, EmbeddingsResponse, UsageResponse};
use crate::types::{ChatCompletionRequest, EmbeddingsRequest, GenerationRequest, SamplingParams, StopSequences};
use cortex_core::{Error, Result};
use cortex_loader::{EngineLoader, EnginePlugin, EngineResult};
use dashmap::DashMap;
use futures::stream::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const RESULT_CHANNEL_CAPACITY: usize = 32;

/// Per-family prompt-formatting configuration; owned by the server's wiring
/// layer and passed in per call since it varies by loaded family.
#[derive(Debug, Clone, Default)]
pub struct FamilyPromptConfig {
    pub multimodal: bool,
    pub preprompt: String,
    pub user_turn_marker: String,
}

pub struct Dispatcher {
    loader: Arc<EngineLoader>,
    gates: DashMap<String, Arc<ConcurrencyGate>>,
    cache_hints: DashMap<String, Arc<CacheHintCounter>>,
    clean_cache_threshold: u64,
}

impl Dispatcher {
    pub fn new(loader: Arc<EngineLoader>) -> Self {
        Self::with_clean_cache_threshold(loader, DEFAULT_CLEAN_CACHE_THRESHOLD)
    }

    pub fn with_clean_cache_threshold(loader: Arc<EngineLoader>, clean_cache_threshold: u64) -> Self {
        Self {
            loader,
            gates: DashMap::new(),
            cache_hints: DashMap::new(),
            clean_cache_threshold,
        }
    }

    fn gate_for(&self, family: &str) -> Arc<ConcurrencyGate> {
        self.gates.entry(family.to_string()).or_insert_with(|| Arc::new(ConcurrencyGate::new())).clone()
    }

    fn cache_hint_for(&self, family: &str) -> Arc<CacheHintCounter> {
        self.cache_hints
            .entry(family.to_string())
            .or_insert_with(|| Arc::new(CacheHintCounter::new(self.clean_cache_threshold)))
            .clone()
    }

    fn normalize(&self, family_config: &FamilyPromptConfig, request: &ChatCompletionRequest) -> GenerationRequest {
        let (prompt, image_parts) = format_prompt(&request.messages, family_config.multimodal, &family_config.preprompt, &family_config.user_turn_marker);
        let defaults = SamplingParams::default();
        let sampling = SamplingParams {
            top_p: request.top_p.unwrap_or(defaults.top_p),
            temperature: request.temperature.unwrap_or(defaults.temperature),
            max_tokens: request.max_tokens.unwrap_or(defaults.max_tokens),
            repeat_last_n: defaults.repeat_last_n,
            frequency_penalty: request.frequency_penalty.unwrap_or(defaults.frequency_penalty),
            presence_penalty: request.presence_penalty.unwrap_or(defaults.presence_penalty),
        };
        // §4.6: default stop tokens are always the family's user-turn marker
        // plus the ChatML end-of-turn marker; explicit request stops extend
        // rather than replace them.
        let mut stop = vec![family_config.user_turn_marker.clone(), "<|im_end|>".to_string()];
        match &request.stop {
            None => {}
            Some(StopSequences::One(s)) => stop.push(s.clone()),
            Some(StopSequences::Many(items)) => stop.extend(items.clone()),
        }
        GenerationRequest {
            model: request.model.clone(),
            prompt,
            sampling,
            stop,
            image_parts,
            stream: request.stream.unwrap_or(false),
            embedding: false,
        }
    }

    /// Submits `generation` against `family` and returns a channel of
    /// incrementally-produced results. Holds the engine borrow and, for
    /// single-slot engines, the concurrency gate, for the lifetime of the
    /// background poll task — both are released when the channel closes.
    async fn run(&self, family: &str, generation: GenerationRequest) -> Result<mpsc::Receiver<Result<EngineResult>>> {
        let handle = self.loader.borrow(family)?;
        let plugin = handle.plugin().clone();
        let single_slot = plugin.n_parallel() <= 1;
        let gate = self.gate_for(family);
        let guard = if single_slot { Some(gate.acquire(None).await?) } else { None };

        if self.cache_hint_for(family).record_request() {
            let hint_plugin = plugin.clone();
            tokio::task::spawn_blocking(move || hint_plugin.clear_cache());
        }

        let request_json = serde_json::to_vec(&generation)?;
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let _guard = guard;
            let _handle = handle;

            let submit_plugin = plugin.clone();
            let task_id = match tokio::task::spawn_blocking(move || submit_plugin.submit_completion(&request_json)).await {
                Ok(Ok(id)) => id,
                Ok(Err(err)) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
                Err(err) => {
                    let _ = tx.send(Err(Error::internal(err.to_string()))).await;
                    return;
                }
            };

            loop {
                let poll_plugin = plugin.clone();
                let polled = tokio::task::spawn_blocking(move || poll_plugin.next_result(task_id)).await;
                let outcome = match polled {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(err)) => {
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(Error::internal(err.to_string()))).await;
                        break;
                    }
                };
                let Some(result) = outcome else {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                };
                if let Some(error) = &result.error {
                    let _ = tx.send(Err(Error::engine_error(error.clone()))).await;
                    break;
                }
                let is_final = result.stop;
                if tx.send(Ok(result)).await.is_err() {
                    plugin.cancel(task_id);
                    break;
                }
                if is_final {
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Runs `request` to completion against `family`, returning the full
    /// accumulated response.
    pub async fn chat_completion(&self, family: &str, family_config: &FamilyPromptConfig, request: ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let generation = self.normalize(family_config, &request);
        let model = generation.model.clone();
        let mut receiver = self.run(family, generation).await?;

        let mut content = String::new();
        let mut usage = UsageResponse { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0 };
        while let Some(result) = receiver.recv().await {
            let result = result?;
            content.push_str(&result.content);
            if let Some(u) = result.usage {
                usage = u.into();
            }
        }
        Ok(ChatCompletionResponse::new(model, content, usage))
    }

    /// Streams `request` against `family` as a sequence of SSE chunk frames.
    pub async fn chat_completion_stream(&self, family: &str, family_config: &FamilyPromptConfig, request: ChatCompletionRequest) -> Result<impl Stream<Item = Result<ChatCompletionChunk>>> {
        let generation = self.normalize(family_config, &request);
        let model = generation.model.clone();
        let id = ChatCompletionChunk::new_id();
        let mut receiver = self.run(family, generation).await?;

        Ok(async_stream::stream! {
            yield Ok(ChatCompletionChunk::role_opening(&id, &model));
            while let Some(result) = receiver.recv().await {
                match result {
                    Ok(result) => {
                        if !result.content.is_empty() {
                            yield Ok(ChatCompletionChunk::content(&id, &model, result.content));
                        }
                        if result.stop {
                            yield Ok(ChatCompletionChunk::stop(&id, &model));
                        }
                    }
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        })
    }

    /// Requests one embedding vector via the same submit/poll protocol chat
    /// completions use, with `generation.embedding` set.
    async fn embed_one(&self, family: &str, text: String) -> Result<(Vec<f32>, u32)> {
        let generation = GenerationRequest {
            model: String::new(),
            prompt: text,
            sampling: SamplingParams::default(),
            stop: Vec::new(),
            image_parts: Vec::new(),
            stream: false,
            embedding: true,
        };
        let mut receiver = self.run(family, generation).await?;

        let mut embedding = Vec::new();
        let mut tokens = 0u32;
        while let Some(result) = receiver.recv().await {
            let result = result?;
            if !result.content.is_empty() {
                embedding = serde_json::from_str(&result.content).map_err(|err| Error::engine_error(format!("malformed embedding payload: {err}")))?;
            }
            if let Some(usage) = result.usage {
                tokens = usage.total_tokens;
            }
        }
        Ok((embedding, tokens))
    }

    /// Submits `request`'s inputs sequentially for single-slot engines and
    /// concurrently for multi-slot engines, per spec.md §4.6.
    pub async fn embeddings(&self, family: &str, request: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let inputs = request.input.into_vec();
        let n_parallel = self.loader.borrow(family)?.plugin().n_parallel();

        let mut records = Vec::with_capacity(inputs.len());
        let mut total_tokens = 0u32;

        if n_parallel <= 1 {
            for (index, text) in inputs.into_iter().enumerate() {
                let (embedding, tokens) = self.embed_one(family, text).await?;
                total_tokens += tokens;
                records.push(EmbeddingRecord { object: "embedding", embedding, index });
            }
        } else {
            let futures = inputs.into_iter().enumerate().map(|(index, text)| async move {
                let (embedding, tokens) = self.embed_one(family, text).await?;
                Ok::<_, Error>((index, embedding, tokens))
            });
            for result in futures::future::join_all(futures).await {
                let (index, embedding, tokens) = result?;
                total_tokens += tokens;
                records.push(EmbeddingRecord { object: "embedding", embedding, index });
            }
            records.sort_by_key(|r| r.index);
        }

        Ok(EmbeddingsResponse {
            object: "list",
            data: records,
            model: request.model,
            usage: UsageResponse { prompt_tokens: total_tokens, completion_tokens: 0, total_tokens },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ChatRole, MessageContent};
    use cortex_loader::{FamilySource, RemoteEngineConfig};

    fn user_message(text: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "stub-family".to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: MessageContent::Text(text.to_string()),
            }],
            stream: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    async fn dispatcher_with_remote_family() -> Dispatcher {
        let loader = Arc::new(EngineLoader::new());
        loader
            .load(
                "stub-family",
                FamilySource::Remote {
                    config: RemoteEngineConfig {
                        base_url: "https://example.test".to_string(),
                        api_key: None,
                        capabilities: vec![],
                    },
                },
            )
            .await
            .unwrap();
        Dispatcher::new(loader)
    }

    #[tokio::test]
    async fn normalize_applies_defaults_when_fields_absent() {
        let dispatcher = dispatcher_with_remote_family().await;
        let request = user_message("hello");
        let config = FamilyPromptConfig {
            user_turn_marker: "<|user|>".to_string(),
            ..FamilyPromptConfig::default()
        };
        let generation = dispatcher.normalize(&config, &request);
        assert_eq!(generation.sampling.temperature, SamplingParams::default().temperature);
        assert_eq!(generation.sampling.max_tokens, SamplingParams::default().max_tokens);
        assert!(generation.prompt.contains("hello"));
        assert_eq!(generation.stop, vec!["<|user|>".to_string(), "<|im_end|>".to_string()]);
    }

    #[tokio::test]
    async fn normalize_honors_explicit_overrides_and_stop_sequences() {
        let dispatcher = dispatcher_with_remote_family().await;
        let mut request = user_message("hi");
        request.temperature = Some(0.1);
        request.stop = Some(StopSequences::Many(vec!["###".to_string()]));
        let config = FamilyPromptConfig {
            user_turn_marker: "<|user|>".to_string(),
            ..FamilyPromptConfig::default()
        };
        let generation = dispatcher.normalize(&config, &request);
        assert_eq!(generation.sampling.temperature, 0.1);
        assert_eq!(
            generation.stop,
            vec!["<|user|>".to_string(), "<|im_end|>".to_string(), "###".to_string()]
        );
    }

    #[tokio::test]
    async fn cache_hint_counter_is_per_family() {
        let dispatcher = dispatcher_with_remote_family().await;
        let a = dispatcher.cache_hint_for("family-a");
        let b = dispatcher.cache_hint_for("family-b");
        for _ in 0..4 {
            assert!(!a.record_request());
        }
        assert!(a.record_request());
        assert!(!b.record_request());
    }
}
