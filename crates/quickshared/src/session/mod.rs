//! `NearbySocket` — the session state machine (§4.5).
//!
//! Drives the connection-request exchange, the UKEY2 handshake, the
//! secure-message envelope, keep-alive, and disconnection on top of one
//! TCP duplex stream. The handshake proper lives in [`handshake`]; this
//! module owns the struct, the phase/role types, and the secure-phase
//! send/receive primitives the session controller drives once the
//! handshake reaches [`Phase::Ready`].

mod handshake;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use quickshare_core::crypto::{self, KeySchedule};
use quickshare_core::endpoint_info::EndpointInfo;
use quickshare_core::error::{ProtocolError, SessionError};
use quickshare_core::framing::FrameDecoder;
use quickshare_core::wire::{connections, securegcm, securemessage};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::Interval;

use crate::queue::SendQueue;

pub use handshake::LocalIdentity;

/// Keep-alive cadence (§4.5 "Keep-alive").
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// The session's phase (§4.5 "States"). One-way except for the terminal
/// `Closed`/`Error` pair (§3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForConnectionRequest,
    WaitingForUkey2ClientInit,
    WaitingForUkey2ServerInit,
    WaitingForUkey2ClientFinish,
    WaitingForConnectionResponse,
    Ready,
    Closed,
    Error,
}

/// What came off the wire during the secure phase (§4.5 "Secure phase").
pub enum SocketEvent {
    Frame(connections::OfflineFrame),
    KeepAliveTick,
    Disconnected,
}

/// One peer-to-peer session's transport, phase, and cryptographic state.
///
/// Owns the read half of the TCP stream directly and a [`SendQueue`] for
/// the write half — the "session ownership is a tree" design note (§9):
/// no shared mutable state besides what the queue's writer task owns.
pub struct NearbySocket {
    reader: OwnedReadHalf,
    decoder: FrameDecoder,
    queue: SendQueue,
    role: Role,
    phase: Phase,
    peer_addr: SocketAddr,
    pub peer_name: Option<String>,
    pub peer_endpoint_info: Option<EndpointInfo>,
    keys: Option<KeySchedule>,
    send_seq: u32,
    expected_recv_seq: u32,
    sent_connection_response: bool,
    keepalive: Interval,
}

impl NearbySocket {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The 32-byte auth string derived at the end of the handshake — the
    /// basis for the displayed PIN (§4.5 "Key schedule").
    pub fn auth_string(&self) -> Option<[u8; 32]> {
        self.keys.as_ref().map(|k| k.auth_string)
    }

    /// Connect to `addr` and run the initiator side of the handshake
    /// through to [`Phase::Ready`].
    pub async fn connect(addr: SocketAddr, identity: &LocalIdentity) -> Result<Self, SessionError> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (queue, _writer_task) = SendQueue::spawn(writer);

        let mut socket = Self {
            reader,
            decoder: FrameDecoder::new(),
            queue,
            role: Role::Initiator,
            phase: Phase::WaitingForUkey2ServerInit,
            peer_addr,
            peer_name: None,
            peer_endpoint_info: None,
            keys: None,
            send_seq: 0,
            expected_recv_seq: 0,
            sent_connection_response: false,
            keepalive: tokio::time::interval(KEEPALIVE_INTERVAL),
        };

        socket.run_initiator_handshake(identity).await?;
        Ok(socket)
    }

    /// Accept an already-connected stream and run the responder side of
    /// the handshake through to [`Phase::Ready`].
    pub async fn accept(stream: TcpStream, identity: &LocalIdentity) -> Result<Self, SessionError> {
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (queue, _writer_task) = SendQueue::spawn(writer);

        let mut socket = Self {
            reader,
            decoder: FrameDecoder::new(),
            queue,
            role: Role::Responder,
            phase: Phase::WaitingForConnectionRequest,
            peer_addr,
            peer_name: None,
            peer_endpoint_info: None,
            keys: None,
            send_seq: 0,
            expected_recv_seq: 0,
            sent_connection_response: false,
            keepalive: tokio::time::interval(KEEPALIVE_INTERVAL),
        };

        socket.run_responder_handshake(identity).await?;
        Ok(socket)
    }

    // ── Plain (unencrypted) packet I/O, used only during the handshake ──────

    async fn next_plain_packet(&mut self) -> Result<Bytes, SessionError> {
        loop {
            if let Some(packet) = self.decoder.next_packet()? {
                return Ok(packet);
            }
            let mut buf = [0u8; 8192];
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                return Err(SessionError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed the connection during the handshake",
                )));
            }
            self.decoder.push(&buf[..n]);
        }
    }

    fn send_plain(&self, body: impl Message) -> Result<(), SessionError> {
        let mut buf = Vec::new();
        body.encode(&mut buf).expect("protobuf encoding to a Vec never fails");
        self.queue
            .enqueue(Bytes::from(buf))
            .map_err(|_| transport_closed())
    }

    // ── Secure-phase I/O ─────────────────────────────────────────────────────

    /// Wrap `frame` in a `DeviceToDeviceMessage` + `SecureMessage` envelope
    /// and enqueue it (§4.5 "Secure phase").
    pub fn send_secure(&mut self, frame: connections::OfflineFrame) -> Result<(), SessionError> {
        let keys = self.keys.as_ref().expect("send_secure called before Ready");

        self.send_seq += 1;
        let d2d = securegcm::DeviceToDeviceMessage {
            sequence_number: Some(self.send_seq as i32),
            message: Some(frame.encode_to_vec()),
        };

        let iv = crypto::random_bytes(16);
        let ciphertext = crypto::aes256_cbc_encrypt(&d2d.encode_to_vec(), &*keys.encrypt_key, &iv)?;

        let metadata = securegcm::GcmMetadata {
            r#type: Some(securegcm::Type::DeviceToDeviceMessage as i32),
            version: Some(1),
        };

        let header_and_body = securemessage::HeaderAndBody {
            header: securemessage::Header {
                encryption_scheme: securemessage::EncScheme::Aes256Cbc as i32,
                signature_scheme: securemessage::SigScheme::HmacSha256 as i32,
                verification_key_id: None,
                decryption_key_id: None,
                iv: Some(iv),
                public_metadata: Some(metadata.encode_to_vec()),
                associated_data_length: None,
            },
            body: ciphertext,
        };

        let hab_bytes = header_and_body.encode_to_vec();
        let signature = crypto::hmac_sha256(&hab_bytes, &*keys.send_hmac_key).to_vec();

        let secure_message = securemessage::SecureMessage {
            header_and_body: hab_bytes,
            signature,
        };

        self.send_plain(secure_message)
    }

    /// Block until the next secure-phase event: a decrypted
    /// `OfflineFrame`, a keep-alive tick, or a clean disconnect.
    pub async fn next_event(&mut self) -> Result<SocketEvent, SessionError> {
        loop {
            if let Some(packet) = self.decoder.next_packet()? {
                if let Some(event) = self.on_secure_packet(packet)? {
                    return Ok(event);
                }
                continue;
            }

            let mut buf = [0u8; 16 * 1024];
            tokio::select! {
                biased;
                _ = self.keepalive.tick() => return Ok(SocketEvent::KeepAliveTick),
                read = self.reader.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(SocketEvent::Disconnected);
                    }
                    self.decoder.push(&buf[..n]);
                }
            }
        }
    }

    /// Decode and decrypt one secure-phase packet. A bad HMAC is a
    /// `CryptoFailure` (§7): the frame is logged and dropped, not the
    /// session — `Ok(None)` tells `next_event` to keep waiting for the
    /// next packet rather than treating this one as fatal.
    fn on_secure_packet(&mut self, packet: Bytes) -> Result<Option<SocketEvent>, SessionError> {
        let keys = self.keys.as_ref().expect("secure packets only arrive once Ready");

        let secure_message = securemessage::SecureMessage::decode(packet.as_ref())
            .map_err(|_| ProtocolError::MissingField("SecureMessage"))?;

        if !crypto::hmac_sha256_verify(
            &secure_message.header_and_body,
            &*keys.receive_hmac_key,
            &secure_message.signature,
        ) {
            tracing::warn!(peer_addr = %self.peer_addr, "dropping secure message with bad HMAC");
            return Ok(None);
        }

        let header_and_body = securemessage::HeaderAndBody::decode(secure_message.header_and_body.as_slice())
            .map_err(|_| ProtocolError::MissingField("HeaderAndBody"))?;

        let iv = header_and_body
            .header
            .iv
            .as_deref()
            .ok_or(ProtocolError::MissingField("iv"))?;

        let plaintext = crypto::aes256_cbc_decrypt(&header_and_body.body, &*keys.decrypt_key, iv)?;

        let d2d = securegcm::DeviceToDeviceMessage::decode(plaintext.as_slice())
            .map_err(|_| ProtocolError::MissingField("DeviceToDeviceMessage"))?;

        let got_seq = d2d.sequence_number.ok_or(ProtocolError::MissingField("sequence_number"))? as u32;
        self.expected_recv_seq += 1;
        if got_seq != self.expected_recv_seq {
            return Err(ProtocolError::SequenceGap { expected: self.expected_recv_seq, got: got_seq }.into());
        }

        let message = d2d.message.ok_or(ProtocolError::MissingField("message"))?;
        let frame = connections::OfflineFrame::decode(message.as_slice())
            .map_err(|_| ProtocolError::MissingField("OfflineFrame"))?;

        Ok(Some(SocketEvent::Frame(frame)))
    }

    /// Send a keep-alive frame (§4.5 "Keep-alive").
    pub fn send_keepalive(&mut self, ack: bool) -> Result<(), SessionError> {
        self.send_secure(connections::OfflineFrame {
            version: Some(connections::offline_frame::Version::V1 as i32),
            v1: Some(connections::V1Frame {
                r#type: Some(connections::v1_frame::FrameType::KeepAlive as i32),
                keep_alive: Some(connections::KeepAliveFrame { ack: Some(ack) }),
                ..Default::default()
            }),
        })
    }

    /// Send the Disconnection frame, then enqueue the close sentinel
    /// (§4.5 "Disconnection").
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        let _ = self.send_secure(connections::OfflineFrame {
            version: Some(connections::offline_frame::Version::V1 as i32),
            v1: Some(connections::V1Frame {
                r#type: Some(connections::v1_frame::FrameType::Disconnection as i32),
                disconnection: Some(connections::DisconnectionFrame {
                    request_safe_to_disconnect: Some(true),
                }),
                ..Default::default()
            }),
        });
        self.queue.enqueue_disconnect();
        self.phase = Phase::Closed;
        Ok(())
    }

    pub async fn ready_for_next_packet(&self) {
        self.queue.ready_for_next_packet().await;
    }
}

fn transport_closed() -> SessionError {
    SessionError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "send queue closed"))
}
