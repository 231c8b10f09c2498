//! A raw, hand-crafted UKEY2 exchange exercising the alert-on-failure path
//! (§4.5 "UKEY2 phase": "Any protocol error SHOULD generate and send a
//! Ukey2Alert with the appropriate AlertType before failing the session").
//!
//! `NearbySocket` itself never emits a malformed handshake, so this drives
//! the responder side directly over a raw `TcpStream` instead of going
//! through `NearbySocket::connect`.

use std::time::Duration;

use prost::Message;
use quickshare_core::crypto;
use quickshare_core::endpoint_info::EndpointInfo;
use quickshare_core::error::SessionError;
use quickshare_core::framing::{encode_frame, FrameDecoder};
use quickshare_core::wire::{connections, securegcm};
use quickshared::session::{LocalIdentity, NearbySocket};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn send(stream: &mut TcpStream, body: impl Message) {
    let mut buf = Vec::new();
    body.encode(&mut buf).unwrap();
    stream.write_all(&encode_frame(&buf)).await.unwrap();
}

async fn read_one(stream: &mut TcpStream) -> bytes::Bytes {
    let mut decoder = FrameDecoder::new();
    loop {
        if let Some(packet) = decoder.next_packet().unwrap() {
            return packet;
        }
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "peer closed before sending a reply");
        decoder.push(&buf[..n]);
    }
}

/// A `ClientInit` advertising the wrong UKEY2 version must be rejected
/// with `HandshakeError::BadVersion`, and the responder must send a
/// `Ukey2Alert { type: BAD_VERSION }` before closing.
#[tokio::test]
async fn bad_client_init_version_triggers_alert_and_fails_responder() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let responder_identity = LocalIdentity::new("Responder", 1, true);
    let responder_fut = async {
        let (stream, _) = listener.accept().await.unwrap();
        NearbySocket::accept(stream, &responder_identity).await
    };

    let client_fut = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let identity = LocalIdentity::new("Attacker", 1, true);
        send(
            &mut stream,
            connections::OfflineFrame {
                version: Some(connections::offline_frame::Version::V1 as i32),
                v1: Some(connections::V1Frame {
                    r#type: Some(connections::v1_frame::FrameType::ConnectionRequest as i32),
                    connection_request: Some(connections::ConnectionRequestFrame {
                        endpoint_id: Some(identity.endpoint_id.clone()),
                        endpoint_name: Some(identity.endpoint_info.device_name.clone()),
                        endpoint_info: Some(identity.endpoint_info.to_bytes().unwrap()),
                    }),
                    ..Default::default()
                }),
            },
        )
        .await;

        let bad_client_init = securegcm::Ukey2ClientInit {
            version: Some(2), // wrong: the implementation speaks version 1
            random: Some(crypto::random_bytes(32)),
            cipher_commitments: vec![securegcm::ukey2_client_init::CipherCommitment {
                handshake_cipher: Some(securegcm::HandshakeCipher::P256Sha512 as i32),
                commitment: Some(crypto::random_bytes(64)),
            }],
            next_protocol: Some("AES_256_CBC-HMAC_SHA256".to_string()),
        };
        send(
            &mut stream,
            securegcm::Ukey2Message {
                message_type: Some(securegcm::ukey2_message::Type::ClientInit as i32),
                message_data: Some(bad_client_init.encode_to_vec()),
            },
        )
        .await;

        let reply = read_one(&mut stream).await;
        securegcm::Ukey2Message::decode(reply.as_ref()).expect("reply decodes as a Ukey2Message")
    };

    let (responder_result, alert_message) =
        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(responder_fut, client_fut) })
            .await
            .expect("alert exchange timed out");

    assert!(
        matches!(responder_result, Err(SessionError::Handshake(_))),
        "responder handshake should fail on a bad version, got {responder_result:?}"
    );

    assert_eq!(alert_message.message_type, Some(securegcm::ukey2_message::Type::Alert as i32));
    let alert = securegcm::Ukey2Alert::decode(alert_message.message_data.unwrap().as_slice()).unwrap();
    assert_eq!(alert.r#type, Some(securegcm::ukey2_alert::AlertType::BadVersion as i32));
}

/// A `ConnectionRequest` carrying an `endpoint_info` blob too short to
/// parse must not bring the responder down — it just falls back to
/// `peer_name` derived from `endpoint_name` (§4.3). Exercised directly
/// against `EndpointInfo::from_bytes` since this is a decode-fallback
/// concern, not a handshake-sequencing one.
#[test]
fn malformed_endpoint_info_fails_to_parse_without_panicking() {
    assert!(EndpointInfo::from_bytes(&[0xFF, 0x01]).is_err());
    assert!(EndpointInfo::from_bytes(&[]).is_err());
}
