//! Full sender/receiver dialogue over a handshaken pair (§4.6): Introduction,
//! user accept, chunked payload streaming, and completion on both sides.

use std::time::Duration;

use quickshared::controller::{ControllerState, FailedReason, SessionController};
use quickshared::session::SocketEvent;
use tokio::io::AsyncWriteExt;

use crate::common::handshake_pair;

const CHUNK_SIZE: usize = 16; // small on purpose so the transfer spans several chunks

/// Drive one side's controller/socket pair until it reaches a terminal
/// state (`Complete` or `Failed`), optionally auto-accepting once the
/// peer's introduction has been received.
async fn drive(
    mut socket: quickshared::session::NearbySocket,
    mut controller: SessionController,
    auto_accept: bool,
) -> (quickshared::session::NearbySocket, SessionController) {
    loop {
        if auto_accept && controller.state() == ControllerState::WaitingForUserAccept {
            controller.accept_transfer(&mut socket).await.expect("accept_transfer");
            continue;
        }
        if matches!(controller.state(), ControllerState::Complete | ControllerState::Failed(_)) {
            break;
        }

        match socket.next_event().await.expect("next_event") {
            SocketEvent::Frame(frame) => controller.handle_frame(frame, &mut socket).await.expect("handle_frame"),
            SocketEvent::KeepAliveTick => {
                let _ = socket.send_keepalive(false);
            }
            SocketEvent::Disconnected => {
                controller.handle_other_event(&SocketEvent::Disconnected);
                break;
            }
        }
    }

    (socket, controller)
}

#[tokio::test]
async fn sender_and_receiver_complete_a_small_file_transfer() {
    let (initiator, responder) = handshake_pair().await;

    let tmp = tempdir();
    let source_path = tmp.join("source.txt");
    let contents = b"HELLO WORLD, this spans multiple sixteen byte chunks easily.";
    {
        let mut f = tokio::fs::File::create(&source_path).await.expect("create source file");
        f.write_all(contents).await.expect("write source file");
    }
    let download_dir = tmp.join("downloads");
    tokio::fs::create_dir_all(&download_dir).await.expect("create download dir");

    let mut sender_socket = initiator;
    let mut sender_controller = SessionController::new_sender(CHUNK_SIZE);
    sender_controller.start(&mut sender_socket).expect("sender start");
    sender_controller.queue_files(vec![source_path.clone()]);

    let mut receiver_socket = responder;
    let mut receiver_controller = SessionController::new_receiver(download_dir.clone(), CHUNK_SIZE);
    receiver_controller.start(&mut receiver_socket).expect("receiver start");

    let sender_fut = drive(sender_socket, sender_controller, false);
    let receiver_fut = drive(receiver_socket, receiver_controller, true);

    let ((_sender_socket, sender_controller), (_receiver_socket, receiver_controller)) =
        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(sender_fut, receiver_fut) })
            .await
            .expect("transfer timed out");

    assert_eq!(sender_controller.state(), ControllerState::Complete);
    assert_eq!(receiver_controller.state(), ControllerState::Complete);

    let transfers = receiver_controller.transfers().await;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].name, "source.txt");
    assert!(transfers[0].complete);

    let downloaded = tokio::fs::read(&transfers[0].destination).await.expect("read downloaded file");
    assert_eq!(downloaded, contents);
}

#[tokio::test]
async fn receiver_rejection_fails_the_sender_with_remote_declined() {
    let (initiator, responder) = handshake_pair().await;

    let tmp = tempdir();
    let source_path = tmp.join("source.txt");
    tokio::fs::write(&source_path, b"irrelevant").await.expect("write source file");
    let download_dir = tmp.join("downloads");
    tokio::fs::create_dir_all(&download_dir).await.expect("create download dir");

    let mut sender_socket = initiator;
    let mut sender_controller = SessionController::new_sender(CHUNK_SIZE);
    sender_controller.start(&mut sender_socket).expect("sender start");
    sender_controller.queue_files(vec![source_path]);

    let mut receiver_socket = responder;
    let mut receiver_controller = SessionController::new_receiver(download_dir, CHUNK_SIZE);
    receiver_controller.start(&mut receiver_socket).expect("receiver start");

    let sender_fut = drive(sender_socket, sender_controller, false);

    let receiver_fut = async move {
        loop {
            if receiver_controller.state() == ControllerState::WaitingForUserAccept {
                receiver_controller.reject_transfer(&mut receiver_socket).expect("reject_transfer");
                break;
            }
            match receiver_socket.next_event().await.expect("next_event") {
                SocketEvent::Frame(frame) => receiver_controller
                    .handle_frame(frame, &mut receiver_socket)
                    .await
                    .expect("handle_frame"),
                SocketEvent::KeepAliveTick => {
                    let _ = receiver_socket.send_keepalive(false);
                }
                SocketEvent::Disconnected => break,
            }
        }
        receiver_controller
    };

    let ((_sender_socket, sender_controller), receiver_controller) =
        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(sender_fut, receiver_fut) })
            .await
            .expect("reject flow timed out");

    assert_eq!(sender_controller.state(), ControllerState::Failed(FailedReason::RemoteDeclined));
    assert_eq!(receiver_controller.state(), ControllerState::Failed(FailedReason::Unknown));
}

fn tempdir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "quickshare-integration-{}-{}",
        std::process::id(),
        tempdir_counter()
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn tempdir_counter() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
