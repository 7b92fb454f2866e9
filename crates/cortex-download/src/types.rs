//! Task/Item types shared by the scheduler, the fetcher, and callers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Engine,
    Model,
    CudaToolkit,
    Misc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ItemStatus {
    /// Order used to compute a task's overall status as "worst of its items".
    fn rank(self) -> u8 {
        match self {
            ItemStatus::Completed => 0,
            ItemStatus::Pending => 1,
            ItemStatus::InProgress => 2,
            ItemStatus::Cancelled => 3,
            ItemStatus::Failed => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    pub id: String,
    pub source_url: String,
    pub destination: std::path::PathBuf,
    pub expected_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub status: ItemStatus,
    /// Optional expected sha256, verified on completion per spec.md §4.3.
    pub expected_sha256: Option<String>,
}

impl DownloadItem {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>, destination: impl Into<std::path::PathBuf>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            destination: destination.into(),
            expected_bytes: None,
            downloaded_bytes: 0,
            status: ItemStatus::Pending,
            expected_sha256: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,
    pub kind: TaskKind,
    pub items: Vec<DownloadItem>,
}

impl DownloadTask {
    /// The task's overall status: the worst status among its items, per
    /// spec.md §3 ("task status = worst of its items").
    pub fn overall_status(&self) -> ItemStatus {
        self.items
            .iter()
            .map(|i| i.status)
            .max_by_key(|s| s.rank())
            .unwrap_or(ItemStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: ItemStatus) -> DownloadItem {
        DownloadItem {
            status,
            ..DownloadItem::new("i1", "https://example.test/a", "/tmp/a")
        }
    }

    #[test]
    fn overall_status_is_worst_of_items() {
        let task = DownloadTask {
            id: "t1".to_string(),
            kind: TaskKind::Engine,
            items: vec![item(ItemStatus::Completed), item(ItemStatus::Failed), item(ItemStatus::InProgress)],
        };
        assert_eq!(task.overall_status(), ItemStatus::Failed);
    }

    #[test]
    fn empty_task_is_completed() {
        let task = DownloadTask {
            id: "t1".to_string(),
            kind: TaskKind::Misc,
            items: vec![],
        };
        assert_eq!(task.overall_status(), ItemStatus::Completed);
    }
}
