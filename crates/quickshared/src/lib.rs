//! The session state machine (`NearbySocket`, §4.5) and the session
//! controller (§4.6) that sit on top of `quickshare-core`'s pure wire and
//! crypto layer — plus the session table and IPC wiring that make them
//! reachable as a running daemon.
//!
//! Library surface is exposed (not just a `main.rs`) so the integration
//! test crate can drive two sessions against each other over a real
//! loopback `TcpStream` pair without spawning the `quickshared` binary,
//! mirroring how the reference codebase's daemon crate still exposes its
//! session/session-table modules for its own integration tests.

pub mod controller;
pub mod queue;
pub mod session;
pub mod table;

pub use controller::{ControllerState, FailedReason, SessionController};
pub use session::{NearbySocket, Phase, Role};
pub use table::{ControllerView, SessionHandle, SessionId, SessionTable};
