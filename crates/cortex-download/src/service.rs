//! The Download Service scheduler (C3): a bounded worker pool pulling tasks
//! from a FIFO queue, each task running its items sequentially while up to
//! `pool_size` tasks run in parallel.

use crate::fetch::fetch_item;
use crate::types::{DownloadItem, DownloadTask, ItemStatus, TaskKind};
use cortex_core::{Error, Result};
use cortex_events::{Event, EventBus};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Callback invoked exactly once when a task reaches a terminal state.
pub type OnFinished = Box<dyn FnOnce(Result<()>) + Send + 'static>;

struct TaskHandle {
    snapshot: Arc<Mutex<DownloadTask>>,
    cancel: Arc<AtomicBool>,
}

/// Default worker pool size: `min(4, available_parallelism)`, per spec.md §4.3.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4)
}

#[derive(Clone)]
pub struct DownloadService {
    client: reqwest::Client,
    events: EventBus,
    semaphore: Arc<Semaphore>,
    tasks: Arc<DashMap<String, TaskHandle>>,
}

impl DownloadService {
    pub fn new(events: EventBus) -> Self {
        Self::with_pool_size(events, default_pool_size())
    }

    pub fn with_pool_size(events: EventBus, pool_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            events,
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Schedules `task` onto the worker pool and returns immediately with
    /// the task id. `on_finished` runs once the task reaches a terminal
    /// state (all items completed, or the worst item's failure/cancel).
    pub fn add_task(&self, task: DownloadTask, on_finished: OnFinished) -> Result<String> {
        if task.id.is_empty() {
            return Err(Error::bad_request("task id must not be empty"));
        }
        if self.tasks.contains_key(&task.id) {
            return Err(Error::already_exists(format!("task {} already scheduled", task.id)));
        }

        let task_id = task.id.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(Mutex::new(task.clone()));
        self.tasks.insert(
            task_id.clone(),
            TaskHandle {
                snapshot: snapshot.clone(),
                cancel: cancel.clone(),
            },
        );

        let this = self.clone();
        tokio::spawn(async move {
            let _permit = this.semaphore.acquire().await;
            let result = this.run_task(task, &snapshot, &cancel).await;
            this.tasks.remove(&task_id);
            on_finished(result);
        });

        Ok(task_id)
    }

    /// Runs `task` to completion on the calling task, bypassing the pool
    /// queue. Spec.md §4.3: `AddDownloadTask` is the synchronous variant.
    pub async fn add_download_task(&self, task: DownloadTask) -> bool {
        let cancel = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(Mutex::new(task.clone()));
        self.run_task(task, &snapshot, &cancel).await.is_ok()
    }

    /// Requests cancellation of a still-running task. A no-op if the task is
    /// not currently tracked (already finished, or unknown id).
    pub fn cancel(&self, task_id: &str) {
        if let Some(handle) = self.tasks.get(task_id) {
            handle.cancel.store(true, Ordering::Relaxed);
        }
    }

    /// A read-only snapshot of a still-running task's items.
    pub async fn snapshot(&self, task_id: &str) -> Option<DownloadTask> {
        let handle = self.tasks.get(task_id)?;
        Some(handle.snapshot.lock().await.clone())
    }

    async fn run_task(
        &self,
        mut task: DownloadTask,
        snapshot: &Arc<Mutex<DownloadTask>>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<()> {
        self.events.publish(Event::DownloadStarted {
            task_id: task.id.clone(),
            at: now(),
        });

        let mut first_error: Option<Error> = None;
        for index in 0..task.items.len() {
            let events = self.events.clone();
            let task_id = task.id.clone();
            let item_id = task.items[index].id.clone();
            let result = {
                let mut item = task.items[index].clone();
                let progress_events = events.clone();
                let progress_task_id = task_id.clone();
                let progress_item_id = item_id.clone();
                let outcome = fetch_item(
                    &self.client,
                    &mut item,
                    cancel,
                    Box::new(move |downloaded, total| {
                        progress_events.publish(Event::DownloadProgress {
                            task_id: progress_task_id.clone(),
                            item: progress_item_id.clone(),
                            bytes_downloaded: downloaded,
                            total_bytes: total.unwrap_or(downloaded),
                        });
                    }),
                )
                .await;
                task.items[index] = item;
                *snapshot.lock().await = task.clone();
                outcome
            };

            if let Err(err) = result {
                let fatal = matches!(task.items[index].status, ItemStatus::Failed | ItemStatus::Cancelled);
                if first_error.is_none() {
                    first_error = Some(err);
                }
                if fatal {
                    break;
                }
            }
        }

        let success = first_error.is_none();
        self.events.publish(Event::DownloadFinished {
            task_id: task.id.clone(),
            success,
            at: now(),
        });

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task_with_one_item(id: &str, url: String, dest: std::path::PathBuf) -> DownloadTask {
        DownloadTask {
            id: id.to_string(),
            kind: TaskKind::Model,
            items: vec![DownloadItem::new("item-1", url, dest)],
        }
    }

    #[tokio::test]
    async fn add_download_task_runs_synchronously_to_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"weights".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.bin");
        let service = DownloadService::with_pool_size(EventBus::new(), 2);
        let task = task_with_one_item("t1", format!("{}/model.bin", server.uri()), dest.clone());

        assert!(service.add_download_task(task).await);
        assert_eq!(std::fs::read(&dest).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn add_task_invokes_on_finished_and_publishes_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"weights".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.bin");
        let events = EventBus::new();
        let mut sub = events.subscribe();
        let service = DownloadService::with_pool_size(events, 2);
        let task = task_with_one_item("t1", format!("{}/model.bin", server.uri()), dest.clone());

        let (tx, rx) = tokio::sync::oneshot::channel();
        service
            .add_task(
                task,
                Box::new(move |result| {
                    let _ = tx.send(result.is_ok());
                }),
            )
            .unwrap();

        assert!(rx.await.unwrap());

        let mut saw_started = false;
        let mut saw_finished = false;
        for _ in 0..10 {
            match tokio::time::timeout(std::time::Duration::from_millis(200), sub.recv()).await {
                Ok(cortex_events::RecvOutcome::Event(Event::DownloadStarted { .. })) => saw_started = true,
                Ok(cortex_events::RecvOutcome::Event(Event::DownloadFinished { success, .. })) => {
                    saw_finished = success;
                    break;
                }
                _ => continue,
            }
        }
        assert!(saw_started);
        assert!(saw_finished);
    }

    #[tokio::test]
    async fn duplicate_task_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.bin");
        let service = DownloadService::with_pool_size(EventBus::new(), 2);
        let task = task_with_one_item("dup", "https://example.test/model.bin".to_string(), dest.clone());
        service.add_task(task, Box::new(|_| {})).unwrap();

        let task2 = task_with_one_item("dup", "https://example.test/model.bin".to_string(), dest);
        assert!(service.add_task(task2, Box::new(|_| {})).is_err());
    }

    #[tokio::test]
    async fn cancel_marks_running_task_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.bin"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(500)).set_body_bytes(vec![0u8; 16]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("big.bin");
        let service = DownloadService::with_pool_size(EventBus::new(), 2);
        let task = task_with_one_item("t1", format!("{}/big.bin", server.uri()), dest);

        let (tx, rx) = tokio::sync::oneshot::channel();
        service
            .add_task(
                task,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .unwrap();
        service.cancel("t1");

        let result = rx.await.unwrap();
        assert!(result.is_err());
    }
}
