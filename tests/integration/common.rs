//! Shared test harness: a loopback TCP pair handshaken into `Phase::Ready`.

use std::time::Duration;

use quickshared::session::{LocalIdentity, NearbySocket};
use tokio::net::TcpListener;

/// Bind an ephemeral loopback listener and run both sides of the
/// handshake concurrently, returning `(initiator, responder)` once both
/// reach `Phase::Ready`.
pub async fn handshake_pair() -> (NearbySocket, NearbySocket) {
    handshake_pair_named("Initiator Device", "Responder Device").await
}

pub async fn handshake_pair_named(initiator_name: &str, responder_name: &str) -> (NearbySocket, NearbySocket) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
    let addr = listener.local_addr().expect("local_addr");

    let initiator_identity = LocalIdentity::new(initiator_name, 3, true);
    let responder_identity = LocalIdentity::new(responder_name, 1, true);

    let accept_fut = async {
        let (stream, _) = listener.accept().await.expect("accept inbound connection");
        NearbySocket::accept(stream, &responder_identity)
            .await
            .expect("responder handshake")
    };
    let connect_fut = async {
        NearbySocket::connect(addr, &initiator_identity)
            .await
            .expect("initiator handshake")
    };

    tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(connect_fut, accept_fut) })
        .await
        .expect("handshake pair timed out")
}
