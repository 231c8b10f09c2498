//! The transfer list — `TransferredFile` bookkeeping for one session
//! (§3 "Data model", §4.6 "Session controller").
//!
//! Built from the peer's Introduction frame (receiver) or from the local
//! file selection (sender), mutated as payload chunks complete, and
//! queried by the IPC surface's `Transfers()` operation (§6).

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

/// One file named in an Introduction frame, tracked from negotiation
/// through completion.
#[derive(Debug, Clone)]
pub struct TransferredFile {
    /// The sharing-frame `FileMetadata.id` (not the payload id).
    pub file_id: i64,
    pub name: String,
    pub size: i64,
    pub destination: PathBuf,
    /// The Nearby Connections payload id this file's bytes travel under.
    pub payload_id: i64,
    pub transferred: i64,
    pub complete: bool,
}

impl TransferredFile {
    pub fn new(file_id: i64, name: String, size: i64, payload_id: i64, destination: PathBuf) -> Self {
        Self {
            file_id,
            name,
            size,
            destination,
            payload_id,
            transferred: 0,
            complete: false,
        }
    }
}

/// All files declared for one session, keyed by payload id so payload
/// assembler progress/completion events can be applied directly.
#[derive(Default)]
pub struct TransferList {
    files: Mutex<Vec<TransferredFile>>,
}

impl TransferList {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, files: Vec<TransferredFile>) {
        *self.files.lock().await = files;
    }

    pub async fn record_progress(&self, payload_id: i64, transferred: i64) {
        let mut files = self.files.lock().await;
        if let Some(f) = files.iter_mut().find(|f| f.payload_id == payload_id) {
            f.transferred = transferred;
        }
    }

    /// Mark the file carrying `payload_id` complete. Returns whether every
    /// declared file is now complete (§4.6 "re-evaluate completion").
    pub async fn record_complete(&self, payload_id: i64) -> bool {
        let mut files = self.files.lock().await;
        if let Some(f) = files.iter_mut().find(|f| f.payload_id == payload_id) {
            f.complete = true;
            f.transferred = f.size;
        }
        !files.is_empty() && files.iter().all(|f| f.complete)
    }

    pub async fn snapshot(&self) -> Vec<TransferredFile> {
        self.files.lock().await.clone()
    }
}

/// Resolve a conflict-free destination path under `dir` for `name`: if
/// `dir/name` already exists, append `" (n)"` before the extension for the
/// smallest `n >= 1` that doesn't collide (§9 Design Notes resolution —
/// deterministic, never overwrites, never rejects).
pub fn resolve_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|s| s.to_str());

    for n in 1.. {
        let suffixed = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(&suffixed);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("infinite range always yields a non-colliding path")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transfer_list_completes_only_when_all_files_done() {
        let list = TransferList::new();
        list.set(vec![
            TransferredFile::new(1, "a.txt".into(), 10, 100, PathBuf::from("/tmp/a.txt")),
            TransferredFile::new(2, "b.txt".into(), 20, 200, PathBuf::from("/tmp/b.txt")),
        ])
        .await;

        assert!(!list.record_complete(100).await);
        assert!(list.record_complete(200).await);

        let snapshot = list.snapshot().await;
        assert!(snapshot.iter().all(|f| f.complete));
    }

    #[tokio::test]
    async fn progress_updates_the_matching_file_only() {
        let list = TransferList::new();
        list.set(vec![
            TransferredFile::new(1, "a.txt".into(), 10, 100, PathBuf::from("/tmp/a.txt")),
            TransferredFile::new(2, "b.txt".into(), 20, 200, PathBuf::from("/tmp/b.txt")),
        ])
        .await;

        list.record_progress(100, 5).await;
        let snapshot = list.snapshot().await;
        assert_eq!(snapshot[0].transferred, 5);
        assert_eq!(snapshot[1].transferred, 0);
    }

    #[test]
    fn resolve_destination_appends_suffix_on_collision() {
        let dir = std::env::temp_dir().join(format!("quickshare-dest-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("photo.jpg"), b"existing").unwrap();

        let resolved = resolve_destination(&dir, "photo.jpg");
        assert_eq!(resolved, dir.join("photo (1).jpg"));

        std::fs::write(dir.join("photo (1).jpg"), b"existing too").unwrap();
        let resolved = resolve_destination(&dir, "photo.jpg");
        assert_eq!(resolved, dir.join("photo (2).jpg"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn resolve_destination_passes_through_when_no_collision() {
        let dir = std::env::temp_dir().join(format!("quickshare-dest-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let resolved = resolve_destination(&dir, "fresh.txt");
        assert_eq!(resolved, dir.join("fresh.txt"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
