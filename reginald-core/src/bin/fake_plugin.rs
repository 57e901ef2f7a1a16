//! A minimal external plugin used only by the integration tests under
//! `tests/`. It speaks just enough of §4.3/§4.4's protocol to drive
//! `PluginSession` through a real child process: it answers `handshake`
//! with the name its own executable was copied under, answers
//! `runCommand` with success, and answers `shutdown` with `true` — unless
//! its name contains `hang`, in which case it never answers `shutdown` at
//! all, so a test can exercise the kill-escalation path.
//!
//! The name (and hang behaviour) comes from the executable's own file
//! name rather than an environment variable or argv, since neither
//! `Manifest` nor `PluginSession::start` gives the host a way to pass
//! per-instance environment or arguments to a spawned plugin — several
//! copies of this same binary, under different names, are what a test
//! spawns concurrently to play distinct plugins.

use reginald_core::rpc::transport::{read_frame, write_frame};
use serde_json::{json, Value};
use tokio::io::{self, BufReader};

#[tokio::main]
async fn main() {
    let exe = std::env::current_exe().unwrap_or_default();
    let name = exe
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("fake")
        .to_string();
    let hang_shutdown = name.contains("hang");

    let mut reader = BufReader::new(io::stdin());
    let mut stdout = io::stdout();

    loop {
        let body = match read_frame(&mut reader).await {
            Ok(b) => b,
            Err(_) => break,
        };
        let msg: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let method = msg.get("method").and_then(Value::as_str).unwrap_or("");
        let id = msg.get("id").cloned();

        match method {
            "handshake" => {
                let result = json!({
                    "protocol": "jsonrpc",
                    "protocolVersion": "2.0",
                    "name": name,
                });
                send_response(&mut stdout, id, result).await;
            }
            "runCommand" => {
                send_response(&mut stdout, id, Value::Null).await;
            }
            "shutdown" => {
                if hang_shutdown {
                    std::future::pending::<()>().await;
                }
                send_response(&mut stdout, id, Value::Bool(true)).await;
            }
            "exit" => break,
            _ => {}
        }
    }
}

async fn send_response(stdout: &mut io::Stdout, id: Option<Value>, result: Value) {
    let reply = json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    });
    let body = reply.to_string();
    let _ = write_frame(stdout, &body).await;
}
