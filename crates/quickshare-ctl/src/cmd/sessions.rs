//! /sessions handlers — list, inspect, accept, reject.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct SessionSummary {
    id: String,
    peer_addr: String,
    peer_name: Option<String>,
    is_sender: bool,
    state: String,
}

#[derive(Deserialize)]
struct TransferView {
    file_name: String,
    size: i64,
    transferred: i64,
    complete: bool,
}

#[derive(Deserialize)]
struct SessionDetail {
    id: String,
    peer_addr: String,
    peer_name: Option<String>,
    pin: String,
    is_sender: bool,
    state: String,
    failed_reason: Option<String>,
    transfers: Vec<TransferView>,
}

#[derive(Deserialize)]
struct AcceptRejectResponse {
    ok: bool,
}

pub async fn cmd_sessions_list(port: u16) -> Result<()> {
    let sessions: Vec<SessionSummary> = get_json(&format!("{}/sessions", base_url(port))).await?;

    if sessions.is_empty() {
        println!("No active sessions.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Sessions ({})", sessions.len());
    println!("═══════════════════════════════════════");
    for s in &sessions {
        let role = if s.is_sender { "sending" } else { "receiving" };
        println!("  ┌─ {} ({})", s.id, role);
        println!("  │  peer  : {}", s.peer_name.as_deref().unwrap_or(&s.peer_addr));
        println!("  └─ state : {}", s.state);
    }

    Ok(())
}

pub async fn cmd_session_inspect(port: u16, id: &str) -> Result<()> {
    let detail: SessionDetail = get_json(&format!("{}/sessions/{}", base_url(port), id)).await?;

    println!("═══════════════════════════════════════");
    println!("  Session {}", detail.id);
    println!("═══════════════════════════════════════");
    println!("  Peer       : {}", detail.peer_name.as_deref().unwrap_or(&detail.peer_addr));
    println!("  Address    : {}", detail.peer_addr);
    println!("  PIN        : {}", detail.pin);
    println!("  Role       : {}", if detail.is_sender { "sending" } else { "receiving" });
    println!("  State      : {}", detail.state);
    if let Some(reason) = &detail.failed_reason {
        println!("  Failed     : {}", reason);
    }

    if detail.transfers.is_empty() {
        println!("\n  No files negotiated yet.");
    } else {
        println!("\n  Files:");
        for f in &detail.transfers {
            let mark = if f.complete { "✓" } else { " " };
            println!("  [{}] {} ({}/{} bytes)", mark, f.file_name, f.transferred, f.size);
        }
    }

    Ok(())
}

pub async fn cmd_session_accept(port: u16, id: &str) -> Result<()> {
    let resp: AcceptRejectResponse = post_json(&format!("{}/sessions/{}/accept", base_url(port), id)).await?;
    if resp.ok {
        println!("Accepted session {}.", id);
    }
    Ok(())
}

pub async fn cmd_session_reject(port: u16, id: &str) -> Result<()> {
    let resp: AcceptRejectResponse = post_json(&format!("{}/sessions/{}/reject", base_url(port), id)).await?;
    if resp.ok {
        println!("Rejected session {}.", id);
    }
    Ok(())
}
