//! Daemon status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    active_sessions: usize,
    device_name: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  quickshared status");
    println!("═══════════════════════════════════════");
    println!("  Device name     : {}", resp.device_name);
    println!("  Active sessions : {}", resp.active_sessions);

    Ok(())
}
