//! quickshare-ctl — command-line interface for the quickshared daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 9100;

fn print_usage() {
    println!("Usage: quickshare-ctl [--port <port>] <command>");
    println!();
    println!("Daemon");
    println!("  status                          Device name and active session count");
    println!();
    println!("Sessions");
    println!("  sessions                        List active sessions");
    println!("  sessions inspect <id>           Show PIN, peer, and file progress");
    println!("  sessions accept <id>            Accept a pending transfer");
    println!("  sessions reject <id>            Reject a pending transfer");
    println!();
    println!("File Transfer");
    println!("  connect <tcp:host:port> <file>...   Dial a peer and offer files");
    println!();
    println!(
        "Options:\n  --port <port>                   API port (default: {})",
        DEFAULT_PORT
    );
    println!();
    println!("Examples:");
    println!("  quickshare-ctl status");
    println!("  quickshare-ctl sessions");
    println!("  quickshare-ctl sessions inspect 0a1b2c3d4e5f6789");
    println!("  quickshare-ctl sessions accept 0a1b2c3d4e5f6789");
    println!("  quickshare-ctl connect tcp:192.168.1.50:9001 document.pdf photo.jpg");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }

    let remaining_refs: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();

    // connect <connection_string> <file>...
    if remaining_refs.first() == Some(&"connect") && remaining_refs.len() >= 2 {
        let connection_string = remaining_refs[1];
        let files: Vec<String> = remaining[2..].to_vec();
        return cmd::connect::cmd_connect(port, connection_string, &files).await;
    }

    match remaining_refs.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["sessions"] => cmd::sessions::cmd_sessions_list(port).await,
        ["sessions", "inspect", id] => cmd::sessions::cmd_session_inspect(port, id).await,
        ["sessions", "accept", id] => cmd::sessions::cmd_session_accept(port, id).await,
        ["sessions", "reject", id] => cmd::sessions::cmd_session_reject(port, id).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
