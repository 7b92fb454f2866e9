//! On-disk layout: `<data>/threads/<thread_id>/{thread.json,messages.jsonl}`.

use cortex_core::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const THREADS_DIR: &str = "threads";
const THREAD_FILE: &str = "thread.json";
const MESSAGES_FILE: &str = "messages.jsonl";

pub fn threads_root(data_dir: &Path) -> PathBuf {
    data_dir.join(THREADS_DIR)
}

pub fn thread_dir(data_dir: &Path, thread_id: &str) -> PathBuf {
    threads_root(data_dir).join(thread_id)
}

pub fn thread_file(data_dir: &Path, thread_id: &str) -> PathBuf {
    thread_dir(data_dir, thread_id).join(THREAD_FILE)
}

pub fn messages_file(data_dir: &Path, thread_id: &str) -> PathBuf {
    thread_dir(data_dir, thread_id).join(MESSAGES_FILE)
}

/// Writes `contents` to `path` via a temp-file-then-rename so concurrent
/// readers never observe a partially-written `thread.json`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| Error::internal("thread path has no parent directory"))?;
    let tmp_path = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Appends one line to the messages log, creating it if absent.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_data()?;
    Ok(())
}
