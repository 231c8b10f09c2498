//! End-to-end tests driving two in-process `NearbySocket`s against each
//! other over a real `127.0.0.1` TCP socket, entirely inside the test
//! process — no network namespaces, no root, no spawned `quickshared`
//! binary. Mirrors the fixtures in spec §8's "Concrete end-to-end
//! scenarios".

mod common;
mod handshake;
mod protocol_errors;
mod transfer;
