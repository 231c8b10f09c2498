//! The session controller (§4.6) — the Paired-Key / Introduction / Response
//! dialogue and the user-visible transfer state machine that sits on top of
//! [`NearbySocket`] once a session reaches the Secure phase.
//!
//! Sharing frames (`sharing::Frame`) travel as single-chunk BYTES payloads
//! through the same `PayloadTransferFrame` mechanism as file data (the
//! proto's own doc comment on `sharing::Frame` says as much) — an unclaimed
//! payload id completing as `PayloadComplete::Bytes` is always a control
//! frame, since every payload id the peer will actually send file bytes on
//! was pre-registered from the Introduction's `FileMetadata` first.

use std::path::PathBuf;

use prost::Message;
use quickshare_core::error::SessionError;
use quickshare_core::wire::{connections, sharing};
use quickshare_services::{resolve_destination, ChunkOutcome, PayloadAssembler, PayloadComplete, TransferList};
use rand::Rng;

use crate::session::{NearbySocket, SocketEvent};

/// The controller's externally visible state (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    NotReady,
    WaitingForUserAccept,
    Transferring,
    Complete,
    Failed(FailedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedReason {
    RemoteDeclined,
    RemoteOutOfSpace,
    RemoteUnsupported,
    RemoteTimedOut,
    Unknown,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::NotReady => write!(f, "NotReady"),
            ControllerState::WaitingForUserAccept => write!(f, "WaitingForUserAccept"),
            ControllerState::Transferring => write!(f, "Transferring"),
            ControllerState::Complete => write!(f, "Complete"),
            ControllerState::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}

impl std::fmt::Display for FailedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailedReason::RemoteDeclined => write!(f, "RemoteDeclined"),
            FailedReason::RemoteOutOfSpace => write!(f, "RemoteOutOfSpace"),
            FailedReason::RemoteUnsupported => write!(f, "RemoteUnsupported"),
            FailedReason::RemoteTimedOut => write!(f, "RemoteTimedOut"),
            FailedReason::Unknown => write!(f, "Unknown"),
        }
    }
}

struct OutgoingFile {
    payload_id: i64,
    path: PathBuf,
    size: i64,
}

/// One session's application-layer dialogue, file bookkeeping, and
/// accept/reject gate. Owns nothing about the transport beyond the
/// [`NearbySocket`] passed into each call — matches §9's "the controller
/// holds the session" ownership note.
pub struct SessionController {
    is_sender: bool,
    state: ControllerState,
    pub peer_name: Option<String>,
    pub pin: String,
    transfers: TransferList,
    assembler: PayloadAssembler,
    download_dir: PathBuf,
    chunk_size: usize,
    outgoing: Vec<OutgoingFile>,
}

impl SessionController {
    pub fn new_receiver(download_dir: PathBuf, chunk_size: usize) -> Self {
        Self {
            is_sender: false,
            state: ControllerState::NotReady,
            peer_name: None,
            pin: String::new(),
            transfers: TransferList::new(),
            assembler: PayloadAssembler::new(),
            download_dir,
            chunk_size,
            outgoing: Vec::new(),
        }
    }

    pub fn new_sender(chunk_size: usize) -> Self {
        Self {
            is_sender: true,
            state: ControllerState::NotReady,
            peer_name: None,
            pin: String::new(),
            transfers: TransferList::new(),
            assembler: PayloadAssembler::new(),
            download_dir: PathBuf::new(),
            chunk_size,
            outgoing: Vec::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state.clone()
    }

    pub fn is_sender(&self) -> bool {
        self.is_sender
    }

    pub async fn transfers(&self) -> Vec<quickshare_services::TransferredFile> {
        self.transfers.snapshot().await
    }

    /// Called once `NearbySocket` reaches `Ready` (§4.6 "ready_for_encrypted_messages",
    /// both roles). Derives the PIN and sends the opening PairedKeyEncryption.
    pub fn start(&mut self, socket: &mut NearbySocket) -> Result<(), SessionError> {
        self.peer_name = socket.peer_name.clone();
        self.pin = derive_pin(&socket.auth_string().unwrap_or([0u8; 32]));

        let frame = sharing::Frame {
            version: Some(sharing::frame::Version::V1 as i32),
            v1: Some(sharing::V1Frame {
                r#type: Some(sharing::v1_frame::FrameType::PairedKeyEncryption as i32),
                paired_key_encryption: Some(sharing::PairedKeyEncryptionFrame {
                    secret_id_hash: Some(quickshare_core::crypto::random_bytes(6)),
                    signed_data: Some(quickshare_core::crypto::random_bytes(72)),
                }),
                ..Default::default()
            }),
        };
        send_sharing_frame(socket, &frame)
    }

    /// Queue local files for an outbound transfer (sender role). Must be
    /// called before the peer's `PairedKeyResult` arrives.
    pub fn queue_files(&mut self, files: Vec<PathBuf>) {
        self.outgoing = files
            .into_iter()
            .map(|path| OutgoingFile { payload_id: random_id(), path, size: 0 })
            .collect();
    }

    /// Dispatch one decrypted `OfflineFrame` from [`SocketEvent::Frame`].
    pub async fn handle_frame(
        &mut self,
        frame: connections::OfflineFrame,
        socket: &mut NearbySocket,
    ) -> Result<(), SessionError> {
        let Some(v1) = frame.v1 else { return Ok(()) };

        match v1.r#type {
            Some(t) if t == connections::v1_frame::FrameType::KeepAlive as i32 => {
                if let Some(keep_alive) = v1.keep_alive {
                    if keep_alive.ack == Some(false) {
                        socket.send_keepalive(true)?;
                    }
                }
            }
            Some(t) if t == connections::v1_frame::FrameType::Disconnection as i32 => {
                if !matches!(self.state, ControllerState::Complete) {
                    self.state = ControllerState::Failed(FailedReason::Unknown);
                }
            }
            Some(t) if t == connections::v1_frame::FrameType::PayloadTransfer as i32 => {
                if let Some(payload_transfer) = v1.payload_transfer {
                    self.handle_payload_transfer(payload_transfer, socket).await?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    async fn handle_payload_transfer(
        &mut self,
        frame: connections::PayloadTransferFrame,
        socket: &mut NearbySocket,
    ) -> Result<(), SessionError> {
        let Some(header) = frame.payload_header else { return Ok(()) };
        let Some(chunk) = frame.payload_chunk else { return Ok(()) };
        let id = header.id.unwrap_or_default();

        let outcome = self
            .assembler
            .handle_chunk(id, chunk.offset.unwrap_or(0), &chunk.body.unwrap_or_default(), chunk.flags.unwrap_or(0))
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(payload_id = id, error = %err, "dropping malformed payload");
                return Ok(());
            }
        };

        match outcome {
            ChunkOutcome::Progress(transferred) => {
                self.transfers.record_progress(id, transferred).await;
            }
            ChunkOutcome::Complete(PayloadComplete::Bytes(bytes)) => {
                if let Ok(sharing_frame) = sharing::Frame::decode(bytes.as_slice()) {
                    self.handle_sharing_frame(sharing_frame, socket).await?;
                }
            }
            ChunkOutcome::Complete(PayloadComplete::File(id)) => {
                if self.transfers.record_complete(id).await {
                    self.state = ControllerState::Complete;
                    tracing::info!(peer_addr = %socket.peer_addr(), "transfer complete");
                }
            }
        }

        Ok(())
    }

    async fn handle_sharing_frame(
        &mut self,
        frame: sharing::Frame,
        socket: &mut NearbySocket,
    ) -> Result<(), SessionError> {
        let Some(v1) = frame.v1 else { return Ok(()) };

        match v1.r#type {
            Some(t) if t == sharing::v1_frame::FrameType::PairedKeyEncryption as i32 => {
                if !self.is_sender {
                    let reply = sharing::Frame {
                        version: Some(sharing::frame::Version::V1 as i32),
                        v1: Some(sharing::V1Frame {
                            r#type: Some(sharing::v1_frame::FrameType::PairedKeyResult as i32),
                            paired_key_result: Some(sharing::PairedKeyResultFrame {
                                status: Some(sharing::paired_key_result_frame::Status::Unable as i32),
                            }),
                            ..Default::default()
                        }),
                    };
                    send_sharing_frame(socket, &reply)?;
                }
            }
            Some(t) if t == sharing::v1_frame::FrameType::PairedKeyResult as i32 => {
                if self.is_sender {
                    self.send_introduction(socket).await?;
                }
            }
            Some(t) if t == sharing::v1_frame::FrameType::Introduction as i32 => {
                if !self.is_sender {
                    if let Some(introduction) = v1.introduction {
                        self.accept_introduction(introduction).await;
                    }
                }
            }
            Some(t) if t == sharing::v1_frame::FrameType::Response as i32 => {
                if self.is_sender {
                    if let Some(response) = v1.connection_response {
                        self.handle_sender_response(response, socket).await?;
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    async fn send_introduction(&mut self, socket: &mut NearbySocket) -> Result<(), SessionError> {
        let mut file_metadata = Vec::with_capacity(self.outgoing.len());
        for outgoing in &mut self.outgoing {
            let meta = tokio::fs::metadata(&outgoing.path).await;
            let size = meta.map(|m| m.len() as i64).unwrap_or(0);
            outgoing.size = size;

            let name = outgoing
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string());

            file_metadata.push(sharing::FileMetadata {
                name: Some(name),
                mime_type: Some("application/octet-stream".to_string()),
                id: Some(random_id()),
                size: Some(size),
                payload_id: Some(outgoing.payload_id),
            });
        }

        let frame = sharing::Frame {
            version: Some(sharing::frame::Version::V1 as i32),
            v1: Some(sharing::V1Frame {
                r#type: Some(sharing::v1_frame::FrameType::Introduction as i32),
                introduction: Some(sharing::IntroductionFrame { file_metadata }),
                ..Default::default()
            }),
        };
        send_sharing_frame(socket, &frame)?;
        self.state = ControllerState::WaitingForUserAccept;
        Ok(())
    }

    async fn accept_introduction(&mut self, introduction: sharing::IntroductionFrame) {
        let mut files = Vec::with_capacity(introduction.file_metadata.len());
        for meta in introduction.file_metadata {
            let name = meta.name.unwrap_or_else(|| "file".to_string());
            let destination = resolve_destination(&self.download_dir, &name);
            files.push(quickshare_services::TransferredFile::new(
                meta.id.unwrap_or_default(),
                name,
                meta.size.unwrap_or(0),
                meta.payload_id.unwrap_or_default(),
                destination,
            ));
        }
        self.transfers.set(files).await;
        self.state = ControllerState::WaitingForUserAccept;
    }

    /// Called by the owning controller loop when the local user accepts
    /// the transfer while `WaitingForUserAccept` (receiver role only).
    pub async fn accept_transfer(&mut self, socket: &mut NearbySocket) -> Result<(), SessionError> {
        if self.is_sender || self.state != ControllerState::WaitingForUserAccept {
            return Ok(());
        }

        for file in self.transfers.snapshot().await {
            self.assembler
                .pre_register_file(file.payload_id, file.destination.clone())
                .await
                .map_err(|e| SessionError::Transport(std::io::Error::other(e.to_string())))?;
        }

        socket.send_secure(connections::OfflineFrame {
            version: Some(connections::offline_frame::Version::V1 as i32),
            v1: Some(connections::V1Frame {
                r#type: Some(connections::v1_frame::FrameType::ConnectionResponse as i32),
                connection_response: Some(connections::ConnectionResponseFrame {
                    status: Some(connections::connection_response_frame::ResponseStatus::Accept as i32),
                }),
                ..Default::default()
            }),
        })?;
        self.state = ControllerState::Transferring;
        Ok(())
    }

    /// Called by the owning controller loop when the local user rejects
    /// the transfer while `WaitingForUserAccept` (receiver role only).
    pub fn reject_transfer(&mut self, socket: &mut NearbySocket) -> Result<(), SessionError> {
        if self.is_sender || self.state != ControllerState::WaitingForUserAccept {
            return Ok(());
        }

        socket.send_secure(connections::OfflineFrame {
            version: Some(connections::offline_frame::Version::V1 as i32),
            v1: Some(connections::V1Frame {
                r#type: Some(connections::v1_frame::FrameType::ConnectionResponse as i32),
                connection_response: Some(connections::ConnectionResponseFrame {
                    status: Some(connections::connection_response_frame::ResponseStatus::Reject as i32),
                }),
                ..Default::default()
            }),
        })?;
        self.state = ControllerState::Failed(FailedReason::Unknown);
        Ok(())
    }

    async fn handle_sender_response(
        &mut self,
        response: sharing::ConnectionResponseFrame,
        socket: &mut NearbySocket,
    ) -> Result<(), SessionError> {
        use sharing::connection_response_frame::Status;

        match response.status {
            Some(s) if s == Status::Accept as i32 => {
                self.state = ControllerState::Transferring;
                self.pump_outgoing_files(socket).await?;
            }
            Some(s) if s == Status::Reject as i32 => {
                self.state = ControllerState::Failed(FailedReason::RemoteDeclined);
            }
            Some(s) if s == Status::NotEnoughSpace as i32 => {
                self.state = ControllerState::Failed(FailedReason::RemoteOutOfSpace);
            }
            Some(s) if s == Status::UnsupportedAttachmentType as i32 => {
                self.state = ControllerState::Failed(FailedReason::RemoteUnsupported);
            }
            Some(s) if s == Status::TimedOut as i32 => {
                self.state = ControllerState::Failed(FailedReason::RemoteTimedOut);
            }
            _ => {
                self.state = ControllerState::Failed(FailedReason::Unknown);
            }
        }
        Ok(())
    }

    /// Stream every queued file's bytes as payload chunks, paced by
    /// `ready_for_next_packet` (§4.6 "Sender path", §5 "Backpressure").
    async fn pump_outgoing_files(&mut self, socket: &mut NearbySocket) -> Result<(), SessionError> {
        let chunk_size = self.chunk_size;
        let files = std::mem::take(&mut self.outgoing);

        use tokio::io::AsyncReadExt;

        for file in &files {
            let mut handle = tokio::fs::File::open(&file.path).await?;
            let mut offset: i64 = 0;
            let mut buf = vec![0u8; chunk_size];

            loop {
                let n = handle.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                send_payload_chunk(socket, file.payload_id, offset, &buf[..n], false)?;
                offset += n as i64;
                socket.ready_for_next_packet().await;
            }

            send_payload_chunk(socket, file.payload_id, offset, &[], true)?;
            socket.ready_for_next_packet().await;
        }

        self.state = ControllerState::Complete;
        Ok(())
    }

    /// React to the transport closing or an event loop keep-alive tick;
    /// called by the daemon's per-session task for events other than a
    /// decrypted frame.
    pub fn handle_other_event(&mut self, event: &SocketEvent) {
        if matches!(event, SocketEvent::Disconnected) && !matches!(self.state, ControllerState::Complete) {
            self.state = ControllerState::Failed(FailedReason::Unknown);
        }
    }
}

fn send_sharing_frame(socket: &mut NearbySocket, frame: &sharing::Frame) -> Result<(), SessionError> {
    let body = frame.encode_to_vec();
    send_payload_chunk(socket, random_id(), 0, &body, true)
}

fn send_payload_chunk(
    socket: &mut NearbySocket,
    payload_id: i64,
    offset: i64,
    body: &[u8],
    last: bool,
) -> Result<(), SessionError> {
    let flags = if last { quickshare_services::LAST_CHUNK } else { 0 };

    socket.send_secure(connections::OfflineFrame {
        version: Some(connections::offline_frame::Version::V1 as i32),
        v1: Some(connections::V1Frame {
            r#type: Some(connections::v1_frame::FrameType::PayloadTransfer as i32),
            payload_transfer: Some(connections::PayloadTransferFrame {
                packet_type: Some(connections::payload_transfer_frame::PacketType::Data as i32),
                payload_header: Some(connections::payload_transfer_frame::PayloadHeader {
                    id: Some(payload_id),
                    r#type: Some(connections::payload_transfer_frame::payload_header::PayloadType::Bytes as i32),
                    total_size: Some((offset as usize + body.len()) as i64),
                }),
                payload_chunk: Some(connections::payload_transfer_frame::PayloadChunk {
                    offset: Some(offset),
                    body: Some(body.to_vec()),
                    flags: Some(flags),
                }),
            }),
            ..Default::default()
        }),
    })
}

fn random_id() -> i64 {
    rand::thread_rng().gen::<i64>().unsigned_abs() as i64
}

/// PIN derivation from the 32-byte auth string (§4.6 "PIN derivation").
pub fn derive_pin(auth_string: &[u8; 32]) -> String {
    let mut hash: i64 = 0;
    let mut multiplier: i64 = 1;
    for &b in auth_string {
        hash = (hash + (b as i8) as i64 * multiplier) % 9973;
        multiplier = (multiplier * 31) % 9973;
    }
    format!("{:04}", hash.abs() % 10000)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 1 — PIN derivation fixtures.
    #[test]
    fn pin_derivation_zero_fixture() {
        let auth = [0x00u8; 32];
        assert_eq!(derive_pin(&auth), "0000");
    }

    #[test]
    fn pin_derivation_is_deterministic_for_nonzero_input() {
        let auth = [0xFFu8; 32];
        let first = derive_pin(&auth);
        let second = derive_pin(&auth);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn pin_derivation_matches_reference_fixture() {
        let auth = [0xFFu8; 32];
        assert_eq!(derive_pin(&auth), "6509");
    }

    #[test]
    fn pin_derivation_differs_across_distinct_inputs() {
        let a = derive_pin(&[0x01u8; 32]);
        let b = derive_pin(&[0x02u8; 32]);
        assert_ne!(a, b);
    }
}
