//! The closed error-kind set from §7 "Error Handling Design".
//!
//! Each kind below is its own `thiserror` enum, matching the granularity
//! the reference codebase uses for its own `CryptoError`/`WireError`
//! pairing; [`SessionError`] composes them into the single type a
//! `NearbySocket` reports upward.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::framing::FramingError;
use crate::wire::securegcm::ukey2_alert::AlertType;

/// A handshake-phase failure (§4.5 "UKEY2 phase"). Each variant maps
/// directly onto a `Ukey2Alert::AlertType` the implementation SHOULD send
/// before closing the transport.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("UKEY2 protocol version mismatch")]
    BadVersion,

    #[error("UKEY2 random value was not exactly 32 bytes")]
    BadRandom,

    #[error("UKEY2 next_protocol was not AES_256_CBC-HMAC_SHA256")]
    BadNextProtocol,

    #[error("no acceptable cipher commitment (need P256_SHA512)")]
    BadHandshakeCipher,

    #[error("malformed or undecodable UKEY2 message")]
    BadMessage,

    #[error("ClientFinish public key does not match the ClientInit commitment")]
    CommitmentMismatch,
}

impl HandshakeError {
    /// The `Ukey2Alert::AlertType` to send before failing the session.
    pub fn alert_type(&self) -> AlertType {
        match self {
            HandshakeError::BadVersion => AlertType::BadVersion,
            HandshakeError::BadRandom => AlertType::BadRandom,
            HandshakeError::BadNextProtocol => AlertType::BadNextProtocol,
            HandshakeError::BadHandshakeCipher => AlertType::BadHandshakeCipher,
            HandshakeError::BadMessage | HandshakeError::CommitmentMismatch => AlertType::BadMessage,
        }
    }
}

/// A structural protocol violation outside the handshake proper — an
/// out-of-phase frame, a sequence-number gap, or a chunk offset mismatch.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("received {received} while in phase {phase}, which does not accept it")]
    UnexpectedFrame { phase: &'static str, received: &'static str },

    #[error("expected sequence number {expected}, got {got}")]
    SequenceGap { expected: u32, got: u32 },

    #[error("chunk offset {got} does not match accepted length {expected} for payload {payload_id}")]
    OffsetMismatch { payload_id: i64, expected: i64, got: i64 },

    #[error("required field missing: {0}")]
    MissingField(&'static str),
}

/// The top-level closed error set a session reports (§7).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handshake failure: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("peer rejected the transfer: {0:?}")]
    PeerRejected(PeerRejectedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRejectedReason {
    Declined,
    OutOfSpace,
    Unsupported,
    TimedOut,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_errors_map_to_expected_alert_types() {
        assert_eq!(HandshakeError::BadVersion.alert_type(), AlertType::BadVersion);
        assert_eq!(HandshakeError::CommitmentMismatch.alert_type(), AlertType::BadMessage);
    }
}
