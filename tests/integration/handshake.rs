//! Handshake-level integration coverage (§4.5 "UKEY2 phase" / "Key schedule").

use quickshared::controller::derive_pin;
use quickshared::session::{Phase, Role};

use crate::common::handshake_pair_named;

#[tokio::test]
async fn full_handshake_reaches_ready_on_both_sides() {
    let (initiator, responder) = handshake_pair_named("Pixel 9", "Galaxy S24").await;

    assert_eq!(initiator.phase(), Phase::Ready);
    assert_eq!(responder.phase(), Phase::Ready);
    assert_eq!(initiator.role(), Role::Initiator);
    assert_eq!(responder.role(), Role::Responder);
}

#[tokio::test]
async fn responder_learns_initiator_device_name_from_endpoint_info() {
    let (_initiator, responder) = handshake_pair_named("Pixel 9", "Galaxy S24").await;
    assert_eq!(responder.peer_name.as_deref(), Some("Pixel 9"));
}

/// Both sides derive their key schedule from the same ECDH shared secret
/// and transcript, so the 32-byte auth string — and the PIN derived from
/// it — must match exactly (§4.6 "PIN derivation").
#[tokio::test]
async fn both_sides_derive_the_same_auth_string_and_pin() {
    let (initiator, responder) = handshake_pair_named("Pixel 9", "Galaxy S24").await;

    let initiator_auth = initiator.auth_string().expect("initiator has an auth string once Ready");
    let responder_auth = responder.auth_string().expect("responder has an auth string once Ready");
    assert_eq!(initiator_auth, responder_auth);

    let initiator_pin = derive_pin(&initiator_auth);
    let responder_pin = derive_pin(&responder_auth);
    assert_eq!(initiator_pin, responder_pin);
    assert_eq!(initiator_pin.len(), 4);
}

/// Running the pairing twice over fresh sockets must not reuse the ECDH
/// ephemeral keys — two independent sessions should not share an auth
/// string (sanity check on `ecdh_p256_generate`'s randomness).
#[tokio::test]
async fn independent_sessions_derive_independent_auth_strings() {
    let (first_initiator, _first_responder) = handshake_pair_named("Device A", "Device B").await;
    let (second_initiator, _second_responder) = handshake_pair_named("Device A", "Device B").await;

    assert_ne!(
        first_initiator.auth_string().unwrap(),
        second_initiator.auth_string().unwrap()
    );
}
