//! Single-item resumable fetch: HTTP range requests, retry/backoff,
//! progress sampling, and integrity verification.

use crate::retry::{self, FetchOutcome};
use crate::types::{DownloadItem, ItemStatus};
use cortex_core::{Error, Result};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cadence at which progress is sampled and surfaced to the caller, per
/// spec.md §4.3 ("every 250 ms or every 1 MiB, whichever comes first").
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
const PROGRESS_BYTES: u64 = 1024 * 1024;

/// Per-chunk read timeout; a task has no overall timeout (progress resets it).
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

pub type ProgressFn<'a> = dyn FnMut(u64, Option<u64>) + Send + 'a;

/// Fetches `item` into `item.destination`, resuming from the file's current
/// length on each retry. Returns once the item is `Completed`, `Failed`, or
/// `Cancelled` — the returned `Result` mirrors that terminal status.
pub async fn fetch_item(
    client: &reqwest::Client,
    item: &mut DownloadItem,
    cancel: &Arc<AtomicBool>,
    mut on_progress: Box<ProgressFn<'_>>,
) -> Result<()> {
    for attempt in 0..retry::MAX_ATTEMPTS {
        if cancel.load(Ordering::Relaxed) {
            item.status = ItemStatus::Cancelled;
            return Err(Error::cancelled("download cancelled before attempt"));
        }

        item.status = ItemStatus::InProgress;
        match try_once(client, item, cancel, &mut on_progress).await {
            Ok(()) => {
                item.status = ItemStatus::Completed;
                return Ok(());
            }
            Err(FetchAttemptError::Cancelled) => {
                item.status = ItemStatus::Cancelled;
                return Err(Error::cancelled("download cancelled"));
            }
            Err(FetchAttemptError::Terminal(err)) => {
                item.status = ItemStatus::Failed;
                return Err(err);
            }
            Err(FetchAttemptError::Retryable(err)) => {
                item.status = ItemStatus::Pending;
                tracing::warn!(item = %item.id, attempt, error = %err, "retrying download");
                if let Some(delay) = retry::backoff_for_attempt(attempt) {
                    tokio::time::sleep(delay).await;
                } else {
                    item.status = ItemStatus::Failed;
                    return Err(err);
                }
            }
        }
    }
    item.status = ItemStatus::Failed;
    Err(Error::download_failed("exhausted retries"))
}

enum FetchAttemptError {
    Retryable(Error),
    Terminal(Error),
    Cancelled,
}

async fn try_once(
    client: &reqwest::Client,
    item: &mut DownloadItem,
    cancel: &Arc<AtomicBool>,
    on_progress: &mut Box<ProgressFn<'_>>,
) -> std::result::Result<(), FetchAttemptError> {
    if let Some(parent) = item.destination.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| FetchAttemptError::Terminal(Error::from(e)))?;
    }

    let resume_from = std::fs::metadata(&item.destination).map(|m| m.len()).unwrap_or(0);
    let mut request = client.get(&item.source_url);
    if resume_from > 0 {
        request = request.header("Range", format!("bytes={resume_from}-"));
    }

    let response = request.send().await.map_err(|e| {
        FetchAttemptError::Retryable(Error::download_failed(format!("request failed: {e}")))
    })?;

    let status = response.status().as_u16();
    let (mut file, mut written) = if status == 416 {
        // Range not satisfiable: the partial is stale relative to the
        // server's current object. Discard and restart from zero.
        let file = std::fs::File::create(&item.destination)
            .map_err(|e| FetchAttemptError::Terminal(Error::from(e)))?;
        (file, 0u64)
    } else if status == 206 {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&item.destination)
            .map_err(|e| FetchAttemptError::Terminal(Error::from(e)))?;
        (file, resume_from)
    } else if status == 200 {
        let file = std::fs::File::create(&item.destination)
            .map_err(|e| FetchAttemptError::Terminal(Error::from(e)))?;
        (file, 0u64)
    } else {
        return Err(classify_http_error(status));
    };

    file.seek(SeekFrom::Start(written))
        .map_err(|e| FetchAttemptError::Terminal(Error::from(e)))?;

    if let Some(total) = response.content_length() {
        item.expected_bytes = Some(total + written);
    }

    let mut stream = response.bytes_stream();
    let mut last_sample = Instant::now();
    let mut since_last_sample = 0u64;
    let mut hasher = item.expected_sha256.as_ref().map(|_| Sha256::new());

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(FetchAttemptError::Cancelled);
        }
        let next = tokio::time::timeout(CHUNK_TIMEOUT, stream.next())
            .await
            .map_err(|_| FetchAttemptError::Retryable(Error::download_failed("chunk read timed out")))?;
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| {
            FetchAttemptError::Retryable(Error::download_failed(format!("stream error: {e}")))
        })?;

        file.write_all(&chunk)
            .map_err(|e| FetchAttemptError::Terminal(Error::from(e)))?;
        if let Some(h) = hasher.as_mut() {
            h.update(&chunk);
        }

        written += chunk.len() as u64;
        item.downloaded_bytes = written;
        since_last_sample += chunk.len() as u64;

        if since_last_sample >= PROGRESS_BYTES || last_sample.elapsed() >= PROGRESS_INTERVAL {
            on_progress(written, item.expected_bytes);
            since_last_sample = 0;
            last_sample = Instant::now();
        }
    }
    on_progress(written, item.expected_bytes);

    if let Some(expected) = item.expected_bytes {
        if written != expected {
            return Err(FetchAttemptError::Retryable(Error::download_failed(format!(
                "short read: got {written} of {expected} bytes"
            ))));
        }
    }

    if let (Some(h), Some(expected_hex)) = (hasher, item.expected_sha256.as_ref()) {
        let digest = hex::encode(h.finalize());
        if &digest != expected_hex {
            return Err(FetchAttemptError::Terminal(Error::download_failed(format!(
                "checksum mismatch: expected {expected_hex}, got {digest}"
            ))));
        }
    }

    Ok(())
}

fn classify_http_error(status: u16) -> FetchAttemptError {
    let err = Error::download_failed(format!("unexpected status {status}"));
    match retry::classify_status(status) {
        FetchOutcome::Retryable => FetchAttemptError::Retryable(err),
        FetchOutcome::Terminal => FetchAttemptError::Terminal(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_item_downloads_full_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let mut item = DownloadItem::new("i1", format!("{}/file.bin", server.uri()), &dest);
        let cancel = Arc::new(AtomicBool::new(false));
        let client = reqwest::Client::new();

        fetch_item(&client, &mut item, &cancel, Box::new(|_, _| {}))
            .await
            .unwrap();

        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn cancelled_before_start_marks_item_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let mut item = DownloadItem::new("i1", format!("{}/file.bin", server.uri()), &dest);
        let cancel = Arc::new(AtomicBool::new(true));
        let client = reqwest::Client::new();

        let result = fetch_item(&client, &mut item, &cancel, Box::new(|_, _| {})).await;
        assert!(result.is_err());
        assert_eq!(item.status, ItemStatus::Cancelled);
    }

    #[tokio::test]
    async fn not_found_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.bin");
        let mut item = DownloadItem::new("i1", format!("{}/missing.bin", server.uri()), &dest);
        let cancel = Arc::new(AtomicBool::new(false));
        let client = reqwest::Client::new();

        let result = fetch_item(&client, &mut item, &cancel, Box::new(|_, _| {})).await;
        assert!(result.is_err());
        assert_eq!(item.status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn checksum_mismatch_fails_the_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let mut item = DownloadItem::new("i1", format!("{}/file.bin", server.uri()), &dest);
        item.expected_sha256 = Some("0".repeat(64));
        let cancel = Arc::new(AtomicBool::new(false));
        let client = reqwest::Client::new();

        let result = fetch_item(&client, &mut item, &cancel, Box::new(|_, _| {})).await;
        assert!(result.is_err());
        assert_eq!(item.status, ItemStatus::Failed);
    }
}
