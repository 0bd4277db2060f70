use crate::backup;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn path_param(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_workspace_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let out_path = path_param(req, "outPath")?;
    let conn = state.conn()?;

    let manifest = backup::export_bundle(conn, Path::new(&out_path)).map_err(|e| {
        log::error!("workspace export failed: {e:#}");
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
    })?;
    log::info!(
        "workspace exported to {} ({} records)",
        out_path,
        manifest.record_count
    );

    Ok(json!({
        "path": out_path,
        "bundleFormat": manifest.format,
        "dbSha256": manifest.db_sha256,
        "recordCount": manifest.record_count,
        "exportedAt": manifest.exported_at,
    }))
}

/// Put the previous workspace back after a restore could not be completed.
fn reopen_previous(state: &mut AppState, previous: Option<PathBuf>) {
    let Some(path) = previous else {
        return;
    };
    if let Err(e) = open_workspace(state, &path) {
        log::error!(
            "could not reopen workspace {} after failed restore: {e:#}",
            path.display()
        );
    }
}

fn import_workspace_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let in_path = path_param(req, "inPath")?;
    let workspace_path = workspace_param(state, req)?;

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // The live database stays open and untouched until the copy is verified.
    let staged = backup::stage_restore(&src, &workspace_path).map_err(|e| {
        log::warn!("rejected bundle {}: {e:#}", in_path);
        HandlerErr::new("invalid_bundle", format!("{e:#}")).with_details(json!({ "path": in_path }))
    })?;

    let previous = state.workspace.clone();
    state.db = None;

    if let Err(e) = backup::commit_restore(&staged, &workspace_path) {
        log::error!("restore commit failed: {e:#}");
        backup::discard_restore(staged);
        reopen_previous(state, previous);
        return Err(HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": in_path })));
    }

    if let Err(e) = open_workspace(state, &workspace_path) {
        log::error!("restored workspace did not open: {e:#}");
        if previous.as_deref() != Some(workspace_path.as_path()) {
            reopen_previous(state, previous);
        }
        return Err(HandlerErr::new("db_open_failed", format!("{e:#}")));
    }
    log::info!(
        "workspace restored from {} ({}, {} records)",
        in_path,
        staged.format_detected,
        staged.record_count
    );

    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": staged.format_detected,
        "recordCount": staged.record_count,
        "exportedAt": staged.manifest.as_ref().map(|m| m.exported_at.clone()),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => import_workspace_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
