//! The `EnginePlugin` trait: the function table the Dispatcher calls
//! through, whether backed by a native dynamic library or a remote HTTPS
//! adapter. Calls are synchronous/blocking by design — the Dispatcher runs
//! them on a blocking task (`spawn_blocking`) and bridges results into an
//! async stream, per spec.md §4.6.

use cortex_core::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One polled result from an in-flight engine task. Mirrors spec.md §4.6's
/// `{content, stop?, error?, usage?}` record.
#[derive(Debug, Clone, Default)]
pub struct EngineResult {
    pub content: String,
    pub stop: bool,
    pub error: Option<String>,
    pub usage: Option<Usage>,
}

/// An opaque, engine-assigned id for an in-flight completion/embedding task.
pub type EngineTaskId = u64;

/// The stable surface every loaded engine (local native or remote HTTPS)
/// exposes to the Dispatcher.
pub trait EnginePlugin: Send + Sync {
    /// Submits a `GenerationRequest` (already serialized to the wire shape
    /// the plugin expects) and returns an engine-assigned task id.
    fn submit_completion(&self, request_json: &[u8]) -> Result<EngineTaskId>;

    /// Polls for the next result of `task_id`. Returns `None` once the
    /// engine has no more results buffered *and* the task has not produced
    /// a final chunk — callers should poll again after a short delay.
    fn next_result(&self, task_id: EngineTaskId) -> Result<Option<EngineResult>>;

    /// Requests cancellation of an in-flight task.
    fn cancel(&self, task_id: EngineTaskId);

    /// Hints the engine to evict its KV cache, per the cache-hinting policy
    /// in spec.md §4.6.
    fn clear_cache(&self);

    fn capabilities(&self) -> &[String];

    /// Maximum concurrent inference slots; `1` forces single-slot gating.
    fn n_parallel(&self) -> u32;
}
