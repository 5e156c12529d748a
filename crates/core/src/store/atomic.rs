//! Durable, torn-write-free persistence of whole-object files: write to a
//! sibling temp path, then rename over the target. Readers either see the
//! old content or the new content in full, never a partial write.

use std::path::Path;

use rand::Rng as _;
use tokio::fs;

use crate::error::CoreResult;

/// Writes `bytes` to `path` atomically, creating parent directories as
/// needed. The temp file lives alongside `path` so the final rename stays
/// within one filesystem.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let suffix: u64 = rand::thread_rng().gen();
    let tmp_path = path.with_extension(format!("tmp-{suffix:x}"));
    fs::write(&tmp_path, bytes).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Reads `path`, returning `Ok(None)` if it does not exist and propagating
/// any other I/O error.
pub async fn read_optional(path: &Path) -> CoreResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Appends `bytes` to `path`, creating the file (and parents) if absent.
/// Appends to a JSONL log are not individually fsynced to a temp file since
/// each line is already a complete, self-terminated record; a partial write
/// mid-line is detectable by the reader (invalid trailing JSON) and is
/// treated as "ignore the last, incomplete line" during replay.
pub async fn append_line(path: &Path, line: &str) -> CoreResult<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("latest.yaml");
        atomic_write(&path, b"hello").await.unwrap();
        let read = read_optional(&path).await.unwrap().unwrap();
        assert_eq!(read, b"hello");
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(read_optional(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_write_fully_replaces_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latest.yaml");
        atomic_write(&path, b"v1").await.unwrap();
        atomic_write(&path, b"v2-longer-body").await.unwrap();
        let read = read_optional(&path).await.unwrap().unwrap();
        assert_eq!(read, b"v2-longer-body");
    }

    #[tokio::test]
    async fn append_line_accumulates_across_calls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courses").join("c1").join("events.log");
        append_line(&path, "{\"a\":1}").await.unwrap();
        append_line(&path, "{\"a\":2}").await.unwrap();
        let content = String::from_utf8(read_optional(&path).await.unwrap().unwrap()).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }
}
