//! Services layered above the wire protocol in `quickshare-core`: the
//! payload assembler and the per-session transfer list.
//!
//! These are pure session-local state, independent of the socket and
//! controller state machines in `quickshared` — reassembly and
//! bookkeeping live in their own services crate the daemon binary
//! depends on rather than owns directly.

pub mod payload;
pub mod transfer;

pub use payload::{AssemblerError, ChunkOutcome, PayloadAssembler, PayloadComplete, LAST_CHUNK};
pub use transfer::{resolve_destination, TransferList, TransferredFile};
