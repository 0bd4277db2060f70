mod backup;
mod config;
mod csv_import;
mod db;
mod ipc;
mod listing;
mod record;
mod stats;

use std::io::{self, BufRead, Write};

fn main() {
    let runtime = config::RuntimeConfig::from_env();
    // stdout carries the IPC stream; logs go to stderr only.
    env_logger::Builder::new()
        .parse_filters(&runtime.log_filter)
        .target(env_logger::Target::Stderr)
        .init();
    log::info!("natd {} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState::new();
    if let Some(path) = runtime.workspace.as_ref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            log::error!("NATD_WORKSPACE could not be opened: {e:#}");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("dropping malformed request: {}", e);
                // No id to reply to.
                let body = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", body);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    log::info!("stdin closed, exiting");
}
