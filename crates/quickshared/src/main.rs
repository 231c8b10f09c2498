//! quickshared — the Nearby Share / Quick Share compatible transfer daemon.
//!
//! Binds a TCP listener for inbound sessions, accepts outbound connect
//! requests from the IPC surface, and drives each session's
//! `NearbySocket` + `SessionController` pair to completion in its own
//! task — listener, command, and API tasks joined with `tokio::select!`,
//! minus the discovery broadcast this implementation leaves to a
//! companion mDNS process (§6).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use quickshare_api::handlers::{
    ConnectRequest, DaemonCommand, SessionDetail, SessionSummary, StatusResponse, TransferView,
};
use quickshare_api::ApiState;
use quickshare_core::config::DaemonConfig;
use quickshared::controller::{ControllerState, SessionController};
use quickshared::session::{LocalIdentity, NearbySocket, Role, SocketEvent};
use quickshared::table::{ControllerCommand, SessionHandle, SessionId, SessionTable};
use quickshare_services::TransferredFile;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = DaemonConfig::load().context("failed to load configuration")?;
    let _ = config.write_default_if_missing();

    tracing::info!(device_name = %config.device_name, chunk_size = config.chunk_size_bytes, "quickshared starting");

    let identity = Arc::new(LocalIdentity::new(
        config.device_name.clone(),
        config.device_type,
        config.visible,
    ));
    let table = SessionTable::new();

    let listener = TcpListener::bind((config.listen_addr.as_str(), config.listen_port))
        .await
        .context("failed to bind listen address")?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "listening for inbound sessions");

    let (command_tx, command_rx) = mpsc::channel(32);

    let accept_task = tokio::spawn(accept_loop(listener, identity.clone(), table.clone(), config.clone()));
    let command_task = tokio::spawn(command_loop(command_rx, table.clone(), identity.clone(), config.clone()));

    let api_state = ApiState { commands: command_tx };
    let api_bind_addr = config.ipc_bind_addr.clone();
    let api_port = config.ipc_port;
    let api_task = tokio::spawn(async move { quickshare_api::serve(api_state, &api_bind_addr, api_port).await });

    tokio::select! {
        r = accept_task  => tracing::error!(?r, "accept loop exited"),
        r = command_task => tracing::info!(?r, "command loop exited"),
        r = api_task     => tracing::error!(?r, "IPC API exited"),
    }

    Ok(())
}

/// Accept inbound TCP connections and drive the responder side of each
/// handshake in its own task (§4.5 "Responder").
async fn accept_loop(
    listener: TcpListener,
    identity: Arc<LocalIdentity>,
    table: SessionTable,
    config: DaemonConfig,
) -> Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let identity = identity.clone();
        let table = table.clone();
        let config = config.clone();

        tokio::spawn(async move {
            match NearbySocket::accept(stream, &identity).await {
                Ok(socket) => {
                    let controller =
                        SessionController::new_receiver(config.download_dir.clone(), config.chunk_size_bytes);
                    spawn_session(&table, peer_addr, Role::Responder, socket, controller);
                }
                Err(err) => {
                    tracing::warn!(%peer_addr, error = %err, "inbound handshake failed");
                }
            }
        });
    }
}

/// Serve [`DaemonCommand`]s from the IPC surface against the session
/// table (§6 "IPC surface").
async fn command_loop(
    mut commands: mpsc::Receiver<DaemonCommand>,
    table: SessionTable,
    identity: Arc<LocalIdentity>,
    config: DaemonConfig,
) {
    while let Some(command) = commands.recv().await {
        match command {
            DaemonCommand::Status(reply) => {
                let _ = reply.send(StatusResponse {
                    active_sessions: table.list().len(),
                    device_name: config.device_name.clone(),
                });
            }
            DaemonCommand::ListSessions(reply) => {
                let summaries = table.list().iter().map(to_summary).collect();
                let _ = reply.send(summaries);
            }
            DaemonCommand::GetSession(id, reply) => {
                let detail = SessionId::parse(&id).and_then(|id| table.get(id)).map(to_detail);
                let _ = reply.send(detail);
            }
            DaemonCommand::Accept(id, reply) => {
                let result = match SessionId::parse(&id).and_then(|id| table.get(id)) {
                    Some(handle) => {
                        handle.send_command(ControllerCommand::AcceptTransfer);
                        Ok(())
                    }
                    None => Err("session not found".to_string()),
                };
                let _ = reply.send(result);
            }
            DaemonCommand::Reject(id, reply) => {
                let result = match SessionId::parse(&id).and_then(|id| table.get(id)) {
                    Some(handle) => {
                        handle.send_command(ControllerCommand::RejectTransfer);
                        Ok(())
                    }
                    None => Err("session not found".to_string()),
                };
                let _ = reply.send(result);
            }
            DaemonCommand::Connect(request, reply) => {
                let result = handle_connect(request, &identity, &table, &config).await;
                let _ = reply.send(result);
            }
        }
    }
}

/// Dial a peer and run the initiator side of the handshake, registering
/// the session and queuing local files for the sender path (§4.5
/// "Initiator", §4.6 "Sender path").
async fn handle_connect(
    request: ConnectRequest,
    identity: &Arc<LocalIdentity>,
    table: &SessionTable,
    config: &DaemonConfig,
) -> Result<String, String> {
    let addr = parse_connection_string(&request.connection_string)?;
    let files: Vec<PathBuf> = request.files.into_iter().map(PathBuf::from).collect();

    let socket = NearbySocket::connect(addr, identity).await.map_err(|e| e.to_string())?;
    let mut controller = SessionController::new_sender(config.chunk_size_bytes);
    controller.queue_files(files);

    let id = spawn_session(table, addr, Role::Initiator, socket, controller);
    Ok(id.to_string())
}

fn parse_connection_string(s: &str) -> Result<SocketAddr, String> {
    let rest = s
        .strip_prefix("tcp:")
        .ok_or_else(|| format!("unsupported connection string: {s}"))?;
    rest.parse().map_err(|_| format!("invalid tcp address: {rest}"))
}

/// Register a new session and spawn the task driving it to completion.
/// Returns immediately with the session's id.
fn spawn_session(
    table: &SessionTable,
    peer_addr: SocketAddr,
    role: Role,
    socket: NearbySocket,
    controller: SessionController,
) -> SessionId {
    let id = SessionId::generate();
    let (handle, commands) = SessionHandle::new(id, peer_addr, role);
    table.insert(handle.clone());
    let table = table.clone();
    tokio::spawn(async move {
        run_session(socket, controller, handle.clone(), commands).await;
        table.remove(handle.id);
    });
    id
}

/// Drive one session from the opening `start()` dialogue through to
/// `Complete`/`Failed`, publishing a fresh [`ControllerView`](quickshared::table::ControllerView)
/// after every step the IPC surface can observe (§4.6).
async fn run_session(
    mut socket: NearbySocket,
    mut controller: SessionController,
    handle: SessionHandle,
    mut commands: mpsc::UnboundedReceiver<ControllerCommand>,
) {
    if let Err(err) = controller.start(&mut socket) {
        tracing::warn!(peer_addr = %handle.peer_addr, error = %err, "failed to start session controller");
        return;
    }
    publish_view(&handle, &controller).await;

    loop {
        if matches!(controller.state(), ControllerState::Complete | ControllerState::Failed(_)) {
            break;
        }

        tokio::select! {
            event = socket.next_event() => {
                match event {
                    Ok(SocketEvent::Frame(frame)) => {
                        if let Err(err) = controller.handle_frame(frame, &mut socket).await {
                            tracing::warn!(peer_addr = %handle.peer_addr, error = %err, "error handling frame");
                            break;
                        }
                    }
                    Ok(SocketEvent::KeepAliveTick) => {
                        if let Err(err) = socket.send_keepalive(false) {
                            tracing::warn!(peer_addr = %handle.peer_addr, error = %err, "failed to send keep-alive");
                            break;
                        }
                    }
                    Ok(SocketEvent::Disconnected) => {
                        controller.handle_other_event(&SocketEvent::Disconnected);
                        publish_view(&handle, &controller).await;
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(peer_addr = %handle.peer_addr, error = %err, "session error");
                        break;
                    }
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(ControllerCommand::AcceptTransfer) => {
                        if let Err(err) = controller.accept_transfer(&mut socket).await {
                            tracing::warn!(peer_addr = %handle.peer_addr, error = %err, "failed to accept transfer");
                        }
                    }
                    Some(ControllerCommand::RejectTransfer) => {
                        if let Err(err) = controller.reject_transfer(&mut socket) {
                            tracing::warn!(peer_addr = %handle.peer_addr, error = %err, "failed to reject transfer");
                        }
                    }
                    None => break,
                }
            }
        }

        publish_view(&handle, &controller).await;
    }

    let _ = socket.disconnect();
    publish_view(&handle, &controller).await;
    tracing::info!(peer_addr = %handle.peer_addr, state = %controller.state(), "session ended");
}

async fn publish_view(handle: &SessionHandle, controller: &SessionController) {
    handle.update_view(quickshared::table::ControllerView {
        peer_name: controller.peer_name.clone(),
        pin: controller.pin.clone(),
        is_sender: controller.is_sender(),
        state: controller.state(),
        transfers: controller.transfers().await,
    });
}

fn to_summary(handle: &SessionHandle) -> SessionSummary {
    let view = handle.view();
    SessionSummary {
        id: handle.id.to_string(),
        peer_addr: handle.peer_addr.to_string(),
        peer_name: view.peer_name,
        is_sender: view.is_sender,
        state: view.state.to_string(),
    }
}

fn to_detail(handle: SessionHandle) -> SessionDetail {
    let view = handle.view();
    let failed_reason = match &view.state {
        ControllerState::Failed(reason) => Some(reason.to_string()),
        _ => None,
    };
    SessionDetail {
        id: handle.id.to_string(),
        peer_addr: handle.peer_addr.to_string(),
        peer_name: view.peer_name,
        pin: view.pin,
        is_sender: view.is_sender,
        state: view.state.to_string(),
        failed_reason,
        transfers: view.transfers.iter().map(to_transfer_view).collect(),
    }
}

fn to_transfer_view(file: &TransferredFile) -> TransferView {
    TransferView {
        file_name: file.name.clone(),
        destination: file.destination.display().to_string(),
        size: file.size,
        transferred: file.transferred,
        complete: file.complete,
    }
}
