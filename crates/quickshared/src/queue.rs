//! The send queue (§4.5 "Send queue").
//!
//! All outgoing frames are serialized through a FIFO drained by a
//! dedicated writer task, one packet at a time, so the socket never
//! interleaves two partially-written frames. `ready_for_next_packet`
//! fires after each frame is fully flushed, which is what paces the
//! sender's file-chunk pump (§4.6, §5 "Backpressure").

use bytes::Bytes;
use quickshare_core::framing::encode_frame;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use std::sync::Arc;

enum Outgoing {
    Frame(Bytes),
    Disconnect,
}

/// Handle used by the rest of a session to enqueue outgoing frames. Cheap
/// to clone; the actual socket write happens on the writer task this was
/// constructed alongside.
#[derive(Clone)]
pub struct SendQueue {
    tx: mpsc::UnboundedSender<Outgoing>,
    ready: Arc<Notify>,
}

impl SendQueue {
    /// Spawn the writer task owning `write_half`, returning a handle to
    /// feed it and the task's `JoinHandle` (join to detect a dead writer).
    pub fn spawn(mut write_half: OwnedWriteHalf) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
        let ready = Arc::new(Notify::new());
        let ready_for_writer = ready.clone();

        let handle = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    Outgoing::Frame(body) => {
                        let framed = encode_frame(&body);
                        if write_half.write_all(&framed).await.is_err() {
                            break;
                        }
                        if write_half.flush().await.is_err() {
                            break;
                        }
                        ready_for_writer.notify_one();
                    }
                    Outgoing::Disconnect => {
                        let _ = write_half.shutdown().await;
                        break;
                    }
                }
            }
        });

        (Self { tx, ready }, handle)
    }

    /// Enqueue a frame body (without the length prefix — the writer task
    /// adds it). Returns an error only if the writer task has exited.
    pub fn enqueue(&self, body: Bytes) -> Result<(), SendQueueClosed> {
        self.tx.send(Outgoing::Frame(body)).map_err(|_| SendQueueClosed)
    }

    /// Enqueue the disconnection sentinel (§4.5 "Disconnection"): once the
    /// writer dequeues it, the transport is closed.
    pub fn enqueue_disconnect(&self) {
        let _ = self.tx.send(Outgoing::Disconnect);
    }

    /// Wait for the writer to finish flushing whatever was most recently
    /// enqueued. Used to pace the sender's chunk pump so at most one
    /// packet is ever in flight (§5 "Backpressure").
    pub async fn ready_for_next_packet(&self) {
        self.ready.notified().await;
    }
}

#[derive(Debug, thiserror::Error)]
#[error("send queue's writer task has exited")]
pub struct SendQueueClosed;
