use crate::config;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn settings_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.conn()?;
    let cfg = db::load_dashboard_config(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    Ok(json!({ "config": cfg }))
}

fn settings_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.conn()?;
    let Some(patch) = req.params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    let current = db::load_dashboard_config(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    let merged = current.merged(patch)?;
    let value =
        serde_json::to_value(&merged).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    db::settings_set_json(conn, config::SETTINGS_KEY, &value)
        .map_err(|e| HandlerErr::new("db_update_failed", format!("{e:#}")))?;
    log::info!("dashboard config updated");
    Ok(json!({ "config": merged }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "settings.get" => settings_get(state, req),
        "settings.update" => settings_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
