//! The in-process adapter for remote (cloud-proxy) engine families: same
//! `EnginePlugin` surface as [`crate::native::NativeEngine`], but dispatches
//! over HTTPS instead of `dlopen`'d native code. No shared library is ever
//! opened for these families, per spec.md §4.5.

use crate::plugin::{EnginePlugin, EngineResult, EngineTaskId};
use cortex_core::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RemoteEngineConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub capabilities: Vec<String>,
}

/// Tracks one outstanding request's accumulated body so `next_result` can be
/// polled repeatedly even though the underlying HTTP call is a single
/// request/response (remote families proxy non-streaming upstream calls;
/// spec.md does not require remote streaming passthrough for the core).
struct PendingCall {
    body: Mutex<Option<std::result::Result<String, String>>>,
}

pub struct RemoteEngine {
    config: RemoteEngineConfig,
    client: reqwest::blocking::Client,
    next_task_id: AtomicU64,
    pending: DashMap<EngineTaskId, PendingCall>,
}

impl RemoteEngine {
    pub fn new(config: RemoteEngineConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Error::load_failed(format!("failed to build remote client: {e}")))?;
        Ok(Self {
            config,
            client,
            next_task_id: AtomicU64::new(1),
            pending: DashMap::new(),
        })
    }
}

impl EnginePlugin for RemoteEngine {
    fn submit_completion(&self, request_json: &[u8]) -> Result<EngineTaskId> {
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .header("Content-Type", "application/json")
            .body(request_json.to_vec());
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let outcome = request
            .send()
            .map_err(|e| Error::engine_error(format!("remote engine request failed: {e}")))
            .and_then(|resp| {
                if resp.status().is_success() {
                    resp.text().map_err(|e| Error::engine_error(e.to_string()))
                } else {
                    Err(Error::engine_error(format!("remote engine returned {}", resp.status())))
                }
            });

        self.pending.insert(
            task_id,
            PendingCall {
                body: Mutex::new(Some(outcome.map_err(|e| e.message))),
            },
        );
        Ok(task_id)
    }

    fn next_result(&self, task_id: EngineTaskId) -> Result<Option<EngineResult>> {
        let Some(entry) = self.pending.get(&task_id) else {
            return Ok(None);
        };
        let mut guard = entry.body.lock().unwrap();
        match guard.take() {
            Some(Ok(body)) => Ok(Some(EngineResult {
                content: body,
                stop: true,
                error: None,
                usage: None,
            })),
            Some(Err(message)) => Ok(Some(EngineResult {
                error: Some(message),
                stop: true,
                ..Default::default()
            })),
            None => Ok(None),
        }
    }

    fn cancel(&self, task_id: EngineTaskId) {
        self.pending.remove(&task_id);
    }

    fn clear_cache(&self) {
        // Remote families manage their own cache; nothing to do locally.
    }

    fn capabilities(&self) -> &[String] {
        &self.config.capabilities
    }

    fn n_parallel(&self) -> u32 {
        // Remote families proxy to a cloud scheduler; never single-slot.
        u32::MAX
    }
}
