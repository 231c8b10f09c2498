//! The protobuf message catalog (§6 "Frame catalog").
//!
//! These schemas are fixed by interoperability with the real Nearby
//! Connections / Nearby Sharing implementations — this module treats them
//! as opaque typed records compiled by `prost` from the `.proto` files
//! under `proto/`, and adds nothing beyond what upstream defines.

#![allow(clippy::doc_markdown)]

pub mod securemessage {
    include!(concat!(env!("OUT_DIR"), "/securemessage.rs"));
}

/// `securegcm` covers both the UKEY2 handshake messages and the
/// DeviceToDeviceMessage/GcmMetadata pair — upstream puts them in the same
/// proto package, so `prost` merges both `.proto` files into one module.
pub mod securegcm {
    include!(concat!(env!("OUT_DIR"), "/securegcm.rs"));
}

pub mod connections {
    include!(concat!(env!("OUT_DIR"), "/location.nearby.connections.rs"));
}

pub mod sharing {
    include!(concat!(env!("OUT_DIR"), "/sharing.nearby.rs"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn offline_frame_round_trips_through_prost() {
        let frame = connections::OfflineFrame {
            version: Some(connections::offline_frame::Version::V1 as i32),
            v1: Some(connections::V1Frame {
                r#type: Some(connections::v1_frame::FrameType::KeepAlive as i32),
                keep_alive: Some(connections::KeepAliveFrame { ack: Some(false) }),
                ..Default::default()
            }),
        };

        let mut buf = Vec::new();
        frame.encode(&mut buf).unwrap();
        let decoded = connections::OfflineFrame::decode(buf.as_slice()).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn ukey2_client_init_round_trips() {
        let init = securegcm::Ukey2ClientInit {
            version: Some(1),
            random: Some(vec![0u8; 32]),
            cipher_commitments: vec![securegcm::ukey2_client_init::CipherCommitment {
                handshake_cipher: Some(securegcm::HandshakeCipher::P256Sha512 as i32),
                commitment: Some(vec![1, 2, 3]),
            }],
            next_protocol: Some("AES_256_CBC-HMAC_SHA256".to_string()),
        };

        let mut buf = Vec::new();
        init.encode(&mut buf).unwrap();
        let decoded = securegcm::Ukey2ClientInit::decode(buf.as_slice()).unwrap();
        assert_eq!(init, decoded);
    }

    #[test]
    fn sharing_introduction_frame_round_trips() {
        let frame = sharing::Frame {
            version: Some(sharing::frame::Version::V1 as i32),
            v1: Some(sharing::V1Frame {
                r#type: Some(sharing::v1_frame::FrameType::Introduction as i32),
                introduction: Some(sharing::IntroductionFrame {
                    file_metadata: vec![sharing::FileMetadata {
                        name: Some("photo.jpg".to_string()),
                        mime_type: Some("image/jpeg".to_string()),
                        id: Some(42),
                        size: Some(1024),
                        payload_id: Some(7),
                    }],
                }),
                ..Default::default()
            }),
        };

        let mut buf = Vec::new();
        prost::Message::encode(&frame, &mut buf).unwrap();
        let decoded = sharing::Frame::decode(buf.as_slice()).unwrap();
        assert_eq!(frame, decoded);
    }
}
