//! `connect` — dial a peer and offer local files (sender role, §6).

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

#[derive(Serialize)]
struct ConnectRequest {
    connection_string: String,
    files: Vec<String>,
}

#[derive(Deserialize)]
struct ConnectResponse {
    session_id: String,
}

pub async fn cmd_connect(port: u16, connection_string: &str, files: &[String]) -> Result<()> {
    let request = ConnectRequest {
        connection_string: connection_string.to_string(),
        files: files.to_vec(),
    };

    let resp: ConnectResponse =
        post_json_body(&format!("{}/connect", base_url(port)), &request).await?;

    println!("Connected. Session id: {}", resp.session_id);
    Ok(())
}
