//! The payload assembler (§4.4).
//!
//! Reassembles chunked payloads addressed by a 64-bit payload id. A chunk
//! with an unexpected offset aborts only that payload — not the session's
//! other in-flight payloads (§8 "Boundary behaviors") — while everything
//! above this layer (the secure-message sequence number) is a
//! session-fatal concern handled by the session state machine instead.
//!
//! A `tokio::sync::Mutex`-guarded map keyed by id, file sinks opened
//! eagerly on pre-registration, progress reported per chunk.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// LAST_CHUNK flag bit (§4.4), matching `PayloadChunk::Flags::LAST_CHUNK`.
pub const LAST_CHUNK: i32 = 1;

#[derive(Debug)]
pub enum PendingKind {
    /// Backed by an in-memory buffer — created automatically for an
    /// unrecognized id (§4.4: "creates a bytes-kind PendingPayload").
    Bytes(Vec<u8>),
    /// Backed by an open file — only created by explicit pre-registration
    /// from the session controller's accept path (§4.6).
    File { file: File, path: PathBuf },
}

pub struct PendingPayload {
    pub id: i64,
    kind: PendingKind,
    accepted_len: i64,
    pub complete: bool,
}

/// What happened as a result of feeding one chunk to the assembler.
pub enum ChunkOutcome {
    /// A non-terminal chunk was accepted; carries total bytes transferred
    /// so far for this payload (§4.4 "progress(id, bytes_transferred)").
    Progress(i64),
    /// The LAST_CHUNK arrived; the payload is complete.
    Complete(PayloadComplete),
}

pub enum PayloadComplete {
    /// The assembled bytes, for a bytes-kind payload.
    Bytes(Vec<u8>),
    /// Just the id — the bytes already live on disk — for a file-kind payload.
    File(i64),
}

#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("chunk offset {got} does not match accepted length {expected} for payload {payload_id}")]
    OffsetMismatch { payload_id: i64, expected: i64, got: i64 },

    #[error("payload {0} already has an in-flight pending payload")]
    AlreadyPending(i64),

    #[error("failed to open destination file {0:?}: {1}")]
    OpenFailed(PathBuf, std::io::Error),

    #[error("failed to write destination file {0:?}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
}

/// Tracks every in-flight payload for one session.
#[derive(Default)]
pub struct PayloadAssembler {
    pending: Mutex<HashMap<i64, PendingPayload>>,
}

impl PayloadAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a file-kind sink for `id` ahead of the first chunk
    /// (§4.6 "On accept: for each declared payload id, open the
    /// destination file, pre-register a file-kind PendingPayload").
    pub async fn pre_register_file(&self, id: i64, path: PathBuf) -> Result<(), AssemblerError> {
        let file = File::create(&path)
            .await
            .map_err(|e| AssemblerError::OpenFailed(path.clone(), e))?;

        let mut pending = self.pending.lock().await;
        if pending.contains_key(&id) {
            return Err(AssemblerError::AlreadyPending(id));
        }
        pending.insert(
            id,
            PendingPayload {
                id,
                kind: PendingKind::File { file, path },
                accepted_len: 0,
                complete: false,
            },
        );
        Ok(())
    }

    /// Feed one chunk `{ id, offset, body, flags }` to the assembler.
    pub async fn handle_chunk(
        &self,
        id: i64,
        offset: i64,
        body: &[u8],
        flags: i32,
    ) -> Result<ChunkOutcome, AssemblerError> {
        let mut pending = self.pending.lock().await;

        let entry = pending.entry(id).or_insert_with(|| PendingPayload {
            id,
            kind: PendingKind::Bytes(Vec::new()),
            accepted_len: 0,
            complete: false,
        });

        if offset != entry.accepted_len {
            let expected = entry.accepted_len;
            // §8: an offset mismatch aborts only this payload.
            pending.remove(&id);
            return Err(AssemblerError::OffsetMismatch { payload_id: id, expected, got: offset });
        }

        match &mut entry.kind {
            PendingKind::Bytes(buf) => buf.extend_from_slice(body),
            PendingKind::File { file, path } => {
                file.write_all(body)
                    .await
                    .map_err(|e| AssemblerError::WriteFailed(path.clone(), e))?;
            }
        }
        entry.accepted_len += body.len() as i64;

        let is_last = flags & LAST_CHUNK != 0;
        if !is_last {
            return Ok(ChunkOutcome::Progress(entry.accepted_len));
        }

        entry.complete = true;
        let entry = pending.remove(&id).expect("just inserted above");
        match entry.kind {
            PendingKind::Bytes(buf) => Ok(ChunkOutcome::Complete(PayloadComplete::Bytes(buf))),
            PendingKind::File { mut file, path } => {
                file.flush().await.map_err(|e| AssemblerError::WriteFailed(path.clone(), e))?;
                Ok(ChunkOutcome::Complete(PayloadComplete::File(id)))
            }
        }
    }

    /// Current accepted length for an in-flight payload, if any.
    pub async fn progress(&self, id: i64) -> Option<i64> {
        self.pending.lock().await.get(&id).map(|p| p.accepted_len)
    }

    pub async fn in_flight_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 5 — exact chunk sequence from the spec's worked example.
    #[tokio::test]
    async fn assembles_bytes_payload_from_example_chunks() {
        let assembler = PayloadAssembler::new();

        let outcome = assembler.handle_chunk(7, 0, b"HELLO", 0).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Progress(5)));

        let outcome = assembler.handle_chunk(7, 5, b" WORLD", 0).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Progress(11)));

        let outcome = assembler.handle_chunk(7, 11, b"", LAST_CHUNK).await.unwrap();
        match outcome {
            ChunkOutcome::Complete(PayloadComplete::Bytes(bytes)) => {
                assert_eq!(bytes, b"HELLO WORLD");
            }
            _ => panic!("expected a completed bytes payload"),
        }
    }

    #[tokio::test]
    async fn offset_mismatch_aborts_only_that_payload() {
        let assembler = PayloadAssembler::new();

        assembler.handle_chunk(1, 0, b"abc", 0).await.unwrap();
        assembler.handle_chunk(2, 0, b"xyz", 0).await.unwrap();

        let err = assembler.handle_chunk(1, 99, b"oops", 0).await.unwrap_err();
        assert!(matches!(err, AssemblerError::OffsetMismatch { payload_id: 1, .. }));

        // payload 2 is unaffected
        assert_eq!(assembler.progress(2).await, Some(3));
        // payload 1 was aborted and removed
        assert_eq!(assembler.progress(1).await, None);
    }

    #[tokio::test]
    async fn unknown_id_creates_bytes_payload_automatically() {
        let assembler = PayloadAssembler::new();
        assembler.handle_chunk(42, 0, b"data", 0).await.unwrap();
        assert_eq!(assembler.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn file_payload_writes_through_to_disk() {
        let dir = std::env::temp_dir().join(format!("quickshare-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("incoming.bin");

        let assembler = PayloadAssembler::new();
        assembler.pre_register_file(1, path.clone()).await.unwrap();
        assembler.handle_chunk(1, 0, b"file contents", 0).await.unwrap();
        let outcome = assembler.handle_chunk(1, 13, b"", LAST_CHUNK).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Complete(PayloadComplete::File(1))));

        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"file contents");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn double_pre_registration_is_rejected() {
        let dir = std::env::temp_dir().join(format!("quickshare-test-dup-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("f.bin");

        let assembler = PayloadAssembler::new();
        assembler.pre_register_file(5, path.clone()).await.unwrap();
        let err = assembler.pre_register_file(5, path.clone()).await.unwrap_err();
        assert!(matches!(err, AssemblerError::AlreadyPending(5)));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
