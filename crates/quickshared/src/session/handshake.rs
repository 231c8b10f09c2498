//! The connection-request + UKEY2 handshake (§4.5 "UKEY2 phase").
//!
//! Both roles exchange four plaintext messages before the channel turns
//! secure: `ConnectionRequest`, `ClientInit`, `ServerInit`, `ClientFinish`,
//! followed by a `ConnectionResponse` each way. Nothing in this exchange
//! is wrapped in the `SecureMessage` envelope — that only starts once a
//! [`KeySchedule`] exists.

use bytes::Bytes;
use prost::Message;
use quickshare_core::crypto::{self, EcdhKeyPair};
use quickshare_core::endpoint_info::EndpointInfo;
use quickshare_core::error::{HandshakeError, ProtocolError, SessionError};
use quickshare_core::wire::{connections, securegcm, securemessage};
use rand::Rng;

use super::{NearbySocket, Phase};

const NEXT_PROTOCOL: &str = "AES_256_CBC-HMAC_SHA256";
const UKEY2_VERSION: i32 = 1;

impl NearbySocket {
    /// Best-effort `Ukey2Alert` sent ahead of failing the handshake (§4.5
    /// "UKEY2 phase": "Any protocol error SHOULD generate and send a
    /// Ukey2Alert with the appropriate AlertType before failing the
    /// session"). Never itself returns an error — a queue that is already
    /// gone just means the peer won't see the alert before we close.
    fn send_ukey2_alert(&self, err: &HandshakeError) {
        let alert = securegcm::Ukey2Alert {
            r#type: Some(err.alert_type() as i32),
            error_message: Some(err.to_string()),
        };
        let wrapped = securegcm::Ukey2Message {
            message_type: Some(securegcm::ukey2_message::Type::Alert as i32),
            message_data: Some(alert.encode_to_vec()),
        };
        let _ = self.send_plain(wrapped);
    }
}

/// Send a `Ukey2Alert` for `err`, then return it as the handshake's result.
fn fail_handshake<T>(socket: &NearbySocket, err: HandshakeError) -> Result<T, SessionError> {
    socket.send_ukey2_alert(&err);
    Err(err.into())
}

/// This device's advertised identity for one handshake: the endpoint id
/// sent in `ConnectionRequest` and the `EndpointInfo` record it wraps.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub endpoint_id: String,
    pub endpoint_info: EndpointInfo,
}

impl LocalIdentity {
    /// Build an identity with a fresh random 4-character endpoint id
    /// (§4.3 — the id advertised alongside `EndpointInfo` over mDNS).
    pub fn new(device_name: impl Into<String>, device_type: u8, visible: bool) -> Self {
        Self {
            endpoint_id: random_endpoint_id(),
            endpoint_info: EndpointInfo::new(1, visible, device_type, device_name),
        }
    }
}

fn random_endpoint_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..4).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect()
}

impl NearbySocket {
    pub(super) async fn run_initiator_handshake(&mut self, identity: &LocalIdentity) -> Result<(), SessionError> {
        let keypair = crypto::ecdh_p256_generate();
        let client_finish_bytes = build_client_finish(&keypair);
        let commitment = crypto::sha512(&client_finish_bytes).to_vec();

        self.send_plain(connections::OfflineFrame {
            version: Some(connections::offline_frame::Version::V1 as i32),
            v1: Some(connections::V1Frame {
                r#type: Some(connections::v1_frame::FrameType::ConnectionRequest as i32),
                connection_request: Some(connections::ConnectionRequestFrame {
                    endpoint_id: Some(identity.endpoint_id.clone()),
                    endpoint_name: Some(identity.endpoint_info.device_name.clone()),
                    endpoint_info: Some(identity.endpoint_info.to_bytes().map_err(|_| {
                        SessionError::Protocol(ProtocolError::MissingField("endpoint_info"))
                    })?),
                }),
                ..Default::default()
            }),
        })?;

        let client_init = securegcm::Ukey2ClientInit {
            version: Some(UKEY2_VERSION),
            random: Some(crypto::random_bytes(32)),
            cipher_commitments: vec![securegcm::ukey2_client_init::CipherCommitment {
                handshake_cipher: Some(securegcm::HandshakeCipher::P256Sha512 as i32),
                commitment: Some(commitment),
            }],
            next_protocol: Some(NEXT_PROTOCOL.to_string()),
        };
        let client_init_wrapped = securegcm::Ukey2Message {
            message_type: Some(securegcm::ukey2_message::Type::ClientInit as i32),
            message_data: Some(client_init.encode_to_vec()),
        };
        let client_init_bytes = client_init_wrapped.encode_to_vec();
        self.queue
            .enqueue(Bytes::from(client_init_bytes.clone()))
            .map_err(|_| super::transport_closed())?;
        self.phase = Phase::WaitingForUkey2ServerInit;

        let server_init_bytes = self.next_plain_packet().await?;
        let server_init_wrapped = securegcm::Ukey2Message::decode(server_init_bytes.as_ref())
            .map_err(|_| HandshakeError::BadMessage)?;
        if server_init_wrapped.message_type != Some(securegcm::ukey2_message::Type::ServerInit as i32) {
            return Err(HandshakeError::BadMessage.into());
        }
        let server_init = securegcm::Ukey2ServerInit::decode(
            server_init_wrapped.message_data.as_deref().ok_or(HandshakeError::BadMessage)?,
        )
        .map_err(|_| HandshakeError::BadMessage)?;

        if server_init.version != Some(UKEY2_VERSION) {
            return fail_handshake(self, HandshakeError::BadVersion);
        }
        if server_init.random.as_deref().map(|r| r.len()) != Some(32) {
            return fail_handshake(self, HandshakeError::BadRandom);
        }
        if server_init.handshake_cipher != Some(securegcm::HandshakeCipher::P256Sha512 as i32) {
            return fail_handshake(self, HandshakeError::BadHandshakeCipher);
        }

        let peer_public = parse_generic_public_key(
            server_init.public_key.as_deref().ok_or(HandshakeError::BadMessage)?,
        )?;
        let z = keypair.agree(&peer_public.0, &peer_public.1)?;

        let mut m1m2 = client_init_bytes;
        m1m2.extend_from_slice(server_init_bytes.as_ref());
        let keys = crypto::derive_key_schedule(&z, &m1m2, true);

        self.queue
            .enqueue(Bytes::from(client_finish_bytes))
            .map_err(|_| super::transport_closed())?;
        self.keys = Some(keys);
        self.phase = Phase::WaitingForConnectionResponse;

        // The initiator sends its own ConnectionResponse(ACCEPT) unprompted,
        // immediately after deriving keys, then waits for the peer's reply —
        // the responder always waits-then-echoes (see run_responder_handshake).
        self.send_plain(accept_connection_response_frame())?;
        self.sent_connection_response = true;

        let response_packet = self.next_plain_packet().await?;
        let response_frame = connections::OfflineFrame::decode(response_packet.as_ref())
            .map_err(|_| ProtocolError::MissingField("ConnectionResponseFrame"))?;
        expect_connection_response(&response_frame)?;

        self.phase = Phase::Ready;

        tracing::info!(peer_addr = %self.peer_addr, "initiator handshake complete");
        Ok(())
    }

    pub(super) async fn run_responder_handshake(&mut self, _identity: &LocalIdentity) -> Result<(), SessionError> {
        let request_packet = self.next_plain_packet().await?;
        let request_frame = connections::OfflineFrame::decode(request_packet.as_ref())
            .map_err(|_| ProtocolError::MissingField("ConnectionRequestFrame"))?;
        let request = request_frame
            .v1
            .as_ref()
            .and_then(|v1| v1.connection_request.as_ref())
            .ok_or(ProtocolError::UnexpectedFrame {
                phase: "WaitingForConnectionRequest",
                received: "non-ConnectionRequest frame",
            })?;

        if let Some(info_bytes) = &request.endpoint_info {
            if let Ok(info) = EndpointInfo::from_bytes(info_bytes) {
                self.peer_name = Some(info.device_name.clone());
                self.peer_endpoint_info = Some(info);
            }
        }
        if self.peer_name.is_none() {
            self.peer_name = request.endpoint_name.clone();
        }
        self.phase = Phase::WaitingForUkey2ClientInit;

        let client_init_bytes = self.next_plain_packet().await?;
        let client_init_wrapped = securegcm::Ukey2Message::decode(client_init_bytes.as_ref())
            .map_err(|_| HandshakeError::BadMessage)?;
        if client_init_wrapped.message_type != Some(securegcm::ukey2_message::Type::ClientInit as i32) {
            return Err(HandshakeError::BadMessage.into());
        }
        let client_init = securegcm::Ukey2ClientInit::decode(
            client_init_wrapped.message_data.as_deref().ok_or(HandshakeError::BadMessage)?,
        )
        .map_err(|_| HandshakeError::BadMessage)?;

        if client_init.version != Some(UKEY2_VERSION) {
            return fail_handshake(self, HandshakeError::BadVersion);
        }
        if client_init.random.as_deref().map(|r| r.len()) != Some(32) {
            return fail_handshake(self, HandshakeError::BadRandom);
        }
        if client_init.next_protocol.as_deref() != Some(NEXT_PROTOCOL) {
            return fail_handshake(self, HandshakeError::BadNextProtocol);
        }
        let commitment = match client_init
            .cipher_commitments
            .iter()
            .find(|c| c.handshake_cipher == Some(securegcm::HandshakeCipher::P256Sha512 as i32))
            .and_then(|c| c.commitment.clone())
        {
            Some(commitment) => commitment,
            None => return fail_handshake(self, HandshakeError::BadHandshakeCipher),
        };

        let keypair = crypto::ecdh_p256_generate();
        let (x, y) = keypair.public_xy();
        let server_init = securegcm::Ukey2ServerInit {
            version: Some(UKEY2_VERSION),
            random: Some(crypto::random_bytes(32)),
            handshake_cipher: Some(securegcm::HandshakeCipher::P256Sha512 as i32),
            public_key: Some(encode_generic_public_key(&x, &y)),
        };
        let server_init_wrapped = securegcm::Ukey2Message {
            message_type: Some(securegcm::ukey2_message::Type::ServerInit as i32),
            message_data: Some(server_init.encode_to_vec()),
        };
        let server_init_bytes = server_init_wrapped.encode_to_vec();
        self.queue
            .enqueue(Bytes::from(server_init_bytes.clone()))
            .map_err(|_| super::transport_closed())?;
        self.phase = Phase::WaitingForUkey2ClientFinish;

        let client_finish_bytes = self.next_plain_packet().await?;
        if crypto::sha512(client_finish_bytes.as_ref()).as_slice() != commitment.as_slice() {
            return fail_handshake(self, HandshakeError::CommitmentMismatch);
        }
        let client_finish_wrapped = securegcm::Ukey2Message::decode(client_finish_bytes.as_ref())
            .map_err(|_| HandshakeError::BadMessage)?;
        if client_finish_wrapped.message_type != Some(securegcm::ukey2_message::Type::ClientFinish as i32) {
            return Err(HandshakeError::BadMessage.into());
        }
        let client_finish = securegcm::Ukey2ClientFinished::decode(
            client_finish_wrapped.message_data.as_deref().ok_or(HandshakeError::BadMessage)?,
        )
        .map_err(|_| HandshakeError::BadMessage)?;

        let peer_public = parse_generic_public_key(
            client_finish.public_key.as_deref().ok_or(HandshakeError::BadMessage)?,
        )?;
        let z = keypair.agree(&peer_public.0, &peer_public.1)?;

        let mut m1m2 = client_init_bytes.to_vec();
        m1m2.extend_from_slice(&server_init_bytes);
        self.keys = Some(crypto::derive_key_schedule(&z, &m1m2, false));

        self.phase = Phase::WaitingForConnectionResponse;

        // The responder waits for the initiator's ConnectionResponse(ACCEPT)
        // first, then echoes its own — the initiator always sends-then-waits
        // (see run_initiator_handshake).
        let response_packet = self.next_plain_packet().await?;
        let response_frame = connections::OfflineFrame::decode(response_packet.as_ref())
            .map_err(|_| ProtocolError::MissingField("ConnectionResponseFrame"))?;
        expect_connection_response(&response_frame)?;

        self.send_plain(accept_connection_response_frame())?;
        self.sent_connection_response = true;
        self.phase = Phase::Ready;

        tracing::info!(peer_addr = %self.peer_addr, peer_name = ?self.peer_name, "responder handshake complete");
        Ok(())
    }
}

fn build_client_finish(keypair: &EcdhKeyPair) -> Vec<u8> {
    let (x, y) = keypair.public_xy();
    let client_finish = securegcm::Ukey2ClientFinished {
        public_key: Some(encode_generic_public_key(&x, &y)),
    };
    let wrapped = securegcm::Ukey2Message {
        message_type: Some(securegcm::ukey2_message::Type::ClientFinish as i32),
        message_data: Some(client_finish.encode_to_vec()),
    };
    wrapped.encode_to_vec()
}

fn encode_generic_public_key(x: &[u8], y: &[u8]) -> Vec<u8> {
    securemessage::GenericPublicKey {
        r#type: securemessage::EcCurveType::EcP256 as i32,
        ec_p256_public_key: Some(securemessage::EcP256PublicKey {
            x: crypto::signed_be_pad(x),
            y: crypto::signed_be_pad(y),
        }),
    }
    .encode_to_vec()
}

fn parse_generic_public_key(bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), SessionError> {
    let key = securemessage::GenericPublicKey::decode(bytes).map_err(|_| HandshakeError::BadMessage)?;
    let ec = key.ec_p256_public_key.ok_or(HandshakeError::BadMessage)?;
    Ok((ec.x, ec.y))
}

fn accept_connection_response_frame() -> connections::OfflineFrame {
    connections::OfflineFrame {
        version: Some(connections::offline_frame::Version::V1 as i32),
        v1: Some(connections::V1Frame {
            r#type: Some(connections::v1_frame::FrameType::ConnectionResponse as i32),
            connection_response: Some(connections::ConnectionResponseFrame {
                status: Some(connections::connection_response_frame::ResponseStatus::Accept as i32),
            }),
            ..Default::default()
        }),
    }
}

fn expect_connection_response(frame: &connections::OfflineFrame) -> Result<(), SessionError> {
    let response = frame
        .v1
        .as_ref()
        .and_then(|v1| v1.connection_response.as_ref())
        .ok_or(ProtocolError::UnexpectedFrame {
            phase: "WaitingForConnectionResponse",
            received: "non-ConnectionResponse frame",
        })?;

    if response.status != Some(connections::connection_response_frame::ResponseStatus::Accept as i32) {
        return Err(SessionError::PeerRejected(quickshare_core::error::PeerRejectedReason::Declined));
    }
    Ok(())
}
