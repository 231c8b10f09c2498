//! The session table (SPEC_FULL §10 "Daemon process") — the daemon's
//! concurrent registry mapping a session id to the task driving one
//! `NearbySocket` + `SessionController` pair, and the thin read-only view
//! of controller state the IPC surface queries without touching the
//! session task directly.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;

use crate::controller::{ControllerState, FailedReason};
use crate::session::Role;
use quickshare_services::TransferredFile;

/// Opaque session identifier, printed as 16 lowercase hex digits in the
/// IPC surface (SPEC_FULL §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn generate() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn parse(s: &str) -> Option<Self> {
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A command the session task accepts from the outside (the IPC surface,
/// on behalf of the UI's accept/reject decision — §4.6, §6).
#[derive(Debug, Clone, Copy)]
pub enum ControllerCommand {
    AcceptTransfer,
    RejectTransfer,
}

/// A read-only snapshot of one session's controller state, refreshed by
/// the session task after every frame it processes. This is what the IPC
/// surface actually reads — it never touches the live `NearbySocket`.
#[derive(Debug, Clone)]
pub struct ControllerView {
    pub peer_name: Option<String>,
    pub pin: String,
    pub is_sender: bool,
    pub state: ControllerState,
    pub transfers: Vec<TransferredFile>,
}

impl Default for ControllerView {
    fn default() -> Self {
        Self {
            peer_name: None,
            pin: String::new(),
            is_sender: false,
            state: ControllerState::NotReady,
            transfers: Vec::new(),
        }
    }
}

/// Everything the daemon and the IPC surface need about one running
/// session without reaching into its task (§3 "SessionHandle").
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub peer_addr: SocketAddr,
    pub role: Role,
    commands: mpsc::UnboundedSender<ControllerCommand>,
    view: Arc<Mutex<ControllerView>>,
}

impl SessionHandle {
    pub fn new(id: SessionId, peer_addr: SocketAddr, role: Role) -> (Self, mpsc::UnboundedReceiver<ControllerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id,
            peer_addr,
            role,
            commands: tx,
            view: Arc::new(Mutex::new(ControllerView::default())),
        };
        (handle, rx)
    }

    pub fn send_command(&self, command: ControllerCommand) {
        let _ = self.commands.send(command);
    }

    pub fn view(&self) -> ControllerView {
        self.view.lock().expect("controller view lock poisoned").clone()
    }

    pub fn update_view(&self, view: ControllerView) {
        *self.view.lock().expect("controller view lock poisoned") = view;
    }

    pub fn failed_reason(&self) -> Option<FailedReason> {
        match self.view().state {
            ControllerState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// The daemon's concurrent registry of running sessions (§10 "Daemon
/// process" — `Arc<DashMap<SessionId, SessionHandle>>`, the reference
/// codebase's registry idiom).
#[derive(Clone, Default)]
pub struct SessionTable {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|entry| entry.clone()).collect()
    }
}
