//! The Thread/Message Repository (C7): per-thread on-disk records under
//! reader/writer discipline, grounded on the filesystem thread store's
//! lock-then-load shape but generalized to an async lock table.

use crate::layout::{append_line, messages_file, thread_dir, thread_file, threads_root, write_atomic};
use crate::lock::ThreadLockTable;
use crate::types::{Message, MessageContent, MessageRole, Metadata, SortOrder, Thread};
use cortex_core::{Error, Result};
use std::path::PathBuf;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct ThreadRepository {
    data_dir: PathBuf,
    locks: ThreadLockTable,
}

impl ThreadRepository {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(threads_root(&data_dir))?;
        Ok(Self {
            data_dir,
            locks: ThreadLockTable::new(),
        })
    }

    fn load_thread_json(&self, thread_id: &str) -> Result<Thread> {
        let path = thread_file(&self.data_dir, thread_id);
        if !path.exists() {
            return Err(Error::not_found(format!("thread {thread_id} not found")));
        }
        let raw = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub async fn create(&self, metadata: Metadata) -> Result<Thread> {
        let id = uuid::Uuid::new_v4().to_string();
        let _guard = self.locks.write(&id).await;
        let dir = thread_dir(&self.data_dir, &id);
        if dir.exists() {
            return Err(Error::already_exists(format!("thread {id} already exists")));
        }
        std::fs::create_dir_all(&dir)?;

        let at = now();
        let thread = Thread {
            id: id.clone(),
            metadata,
            created_at: at,
            updated_at: at,
        };
        write_atomic(&thread_file(&self.data_dir, &id), &serde_json::to_vec_pretty(&thread)?)?;
        tracing::info!(thread_id = %id, "created thread");
        Ok(thread)
    }

    pub async fn retrieve(&self, thread_id: &str) -> Result<Thread> {
        let _guard = self.locks.read(thread_id).await;
        self.load_thread_json(thread_id)
    }

    /// Merges `patch` into the thread's metadata. An empty patch is rejected:
    /// spec.md treats absent metadata on `Modify` as a missing-field error.
    pub async fn modify(&self, thread_id: &str, patch: Metadata) -> Result<Thread> {
        if patch.is_empty() {
            return Err(Error::bad_request("metadata is required for modify (missing_field)"));
        }
        let _guard = self.locks.write(thread_id).await;
        let mut thread = self.load_thread_json(thread_id)?;
        thread.metadata.extend(patch);
        thread.updated_at = now();
        write_atomic(&thread_file(&self.data_dir, thread_id), &serde_json::to_vec_pretty(&thread)?)?;
        Ok(thread)
    }

    pub async fn delete(&self, thread_id: &str) -> Result<()> {
        let guard = self.locks.write(thread_id).await;
        let dir = thread_dir(&self.data_dir, thread_id);
        if !dir.exists() {
            return Err(Error::not_found(format!("thread {thread_id} not found")));
        }
        std::fs::remove_dir_all(&dir)?;
        drop(guard);
        self.locks.forget(thread_id);
        tracing::info!(thread_id, "deleted thread");
        Ok(())
    }

    /// Enumerates thread directories, loading each under its own shared
    /// lock, then orders and cursors the in-memory result.
    pub async fn list(&self, limit: u8, order: SortOrder, after: Option<&str>, before: Option<&str>) -> Result<Vec<Thread>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(threads_root(&self.data_dir))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }

        let mut threads = Vec::with_capacity(ids.len());
        for id in ids {
            let _guard = self.locks.read(&id).await;
            if let Ok(thread) = self.load_thread_json(&id) {
                threads.push(thread);
            }
        }

        threads.sort_by_key(|t| t.created_at);
        if order == SortOrder::Desc {
            threads.reverse();
        }

        if let Some(after_id) = after {
            if let Some(pos) = threads.iter().position(|t| t.id == after_id) {
                threads = threads.split_off(pos + 1);
            }
        }
        if let Some(before_id) = before {
            if let Some(pos) = threads.iter().position(|t| t.id == before_id) {
                threads.truncate(pos);
            }
        }

        threads.truncate(limit as usize);
        Ok(threads)
    }

    pub async fn append_message(&self, thread_id: &str, role: MessageRole, content: MessageContent) -> Result<Message> {
        let _guard = self.locks.write(thread_id).await;
        let mut thread = self.load_thread_json(thread_id)?;

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            role,
            content,
            created_at: now(),
        };
        append_line(&messages_file(&self.data_dir, thread_id), &serde_json::to_string(&message)?)?;

        thread.updated_at = message.created_at;
        write_atomic(&thread_file(&self.data_dir, thread_id), &serde_json::to_vec_pretty(&thread)?)?;
        Ok(message)
    }

    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let _guard = self.locks.read(thread_id).await;
        self.load_thread_json(thread_id)?;

        let path = messages_file(&self.data_dir, thread_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataValue;
    use std::collections::HashMap;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), MetadataValue::String(v.to_string()))).collect()
    }

    #[tokio::test]
    async fn create_then_retrieve_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ThreadRepository::new(dir.path()).unwrap();
        let created = repo.create(meta(&[("topic", "rust")])).await.unwrap();
        let retrieved = repo.retrieve(&created.id).await.unwrap();
        assert_eq!(retrieved.id, created.id);
        assert_eq!(retrieved.created_at, created.created_at);
    }

    #[tokio::test]
    async fn retrieve_missing_thread_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ThreadRepository::new(dir.path()).unwrap();
        let err = repo.retrieve("missing").await.unwrap_err();
        assert_eq!(err.kind, cortex_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn modify_rejects_empty_patch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ThreadRepository::new(dir.path()).unwrap();
        let thread = repo.create(Metadata::new()).await.unwrap();
        let err = repo.modify(&thread.id, HashMap::new()).await.unwrap_err();
        assert_eq!(err.kind, cortex_core::ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn modify_merges_metadata_and_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ThreadRepository::new(dir.path()).unwrap();
        let thread = repo.create(meta(&[("a", "1")])).await.unwrap();
        let updated = repo.modify(&thread.id, meta(&[("b", "2")])).await.unwrap();
        assert!(matches!(updated.metadata.get("a"), Some(MetadataValue::String(v)) if v == "1"));
        assert!(matches!(updated.metadata.get("b"), Some(MetadataValue::String(v)) if v == "2"));
    }

    #[tokio::test]
    async fn delete_removes_thread_and_forgets_lock() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ThreadRepository::new(dir.path()).unwrap();
        let thread = repo.create(Metadata::new()).await.unwrap();
        repo.delete(&thread.id).await.unwrap();
        let err = repo.retrieve(&thread.id).await.unwrap_err();
        assert_eq!(err.kind, cortex_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn append_and_list_messages_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ThreadRepository::new(dir.path()).unwrap();
        let thread = repo.create(Metadata::new()).await.unwrap();
        repo.append_message(&thread.id, MessageRole::User, MessageContent::Text("hi".into())).await.unwrap();
        repo.append_message(&thread.id, MessageRole::Assistant, MessageContent::Text("hello".into())).await.unwrap();

        let messages = repo.list_messages(&thread.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn list_orders_and_cursors_by_creation_time() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ThreadRepository::new(dir.path()).unwrap();
        let first = repo.create(Metadata::new()).await.unwrap();
        let second = repo.create(Metadata::new()).await.unwrap();
        let third = repo.create(Metadata::new()).await.unwrap();

        let all = repo.list(10, SortOrder::Asc, None, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let after_first = repo.list(10, SortOrder::Asc, Some(&first.id), None).await.unwrap();
        let after_ids: Vec<&str> = after_first.iter().map(|t| t.id.as_str()).collect();
        assert!(after_ids.contains(&second.id.as_str()) || after_ids.contains(&third.id.as_str()));
    }
}
