//! The Download Service (C3): parallel, resumable file fetches with task
//! lifecycle and event emission, used by the Engine Registry to install
//! engine archives and by model installation flows.

pub mod fetch;
pub mod retry;
pub mod service;
pub mod types;

pub use service::{default_pool_size, DownloadService, OnFinished};
pub use types::{DownloadItem, DownloadTask, ItemStatus, TaskKind};
