use crate::backup::sha256_hex;
use crate::csv_import::{self, EMPTY_IMPORT_MESSAGE};
use crate::db::{self, ImportBatch};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

/// Source text plus a display name, from `params.path` or `params.text`.
fn read_import_input(req: &Request) -> Result<(String, Option<String>), HandlerErr> {
    let source_name = req
        .params
        .get("sourceName")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(path) = req.params.get("path").and_then(|v| v.as_str()) {
        let p = PathBuf::from(path.trim());
        if !p.is_file() {
            return Err(HandlerErr::new("not_found", "import file not found")
                .with_details(json!({ "path": path })));
        }
        let text = std::fs::read_to_string(&p).map_err(|e| {
            HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": path }))
        })?;
        let name = source_name.or_else(|| {
            p.file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        });
        return Ok((text, name));
    }
    if let Some(text) = req.params.get("text").and_then(|v| v.as_str()) {
        return Ok((text.to_string(), source_name));
    }
    Err(HandlerErr::bad_params("missing path or text"))
}

fn records_import_csv(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.conn()?;
    let (text, source_name) = read_import_input(req)?;

    let parsed = csv_import::parse_nat_csv(&text);
    if parsed.rows.is_empty() {
        return Err(HandlerErr::new("empty_import", EMPTY_IMPORT_MESSAGE).with_details(json!({
            "rowsTotal": parsed.total_lines,
            "warnings": parsed.warnings,
        })));
    }

    let sha256 = sha256_hex(text.as_bytes());
    let mut warnings = parsed.warnings;
    let earlier = db::find_import_batch_by_sha(conn, &sha256)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    if let Some(prev) = earlier {
        warnings.push(json!({
            "code": "duplicate_import",
            "message": "identical content was imported before",
            "batchId": prev.id,
            "importedAt": prev.imported_at,
        }));
    }

    let now = db::now_rfc3339();
    let batch = ImportBatch {
        id: Uuid::new_v4().to_string(),
        source_name,
        sha256,
        row_count: parsed.rows.len() as i64,
        warning_count: warnings.len() as i64,
        imported_at: now.clone(),
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    db::insert_import_batch(&tx, &batch).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "import_batches" }))
    })?;
    let mut record_ids = Vec::with_capacity(parsed.rows.len());
    for draft in parsed.rows {
        let record = draft.into_record(Uuid::new_v4().to_string(), &now);
        db::insert_record(&tx, &record, Some(&batch.id)).map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "records" }))
        })?;
        record_ids.push(record.id);
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    log::info!(
        "csv import {}: {} rows, {} warnings",
        batch.id,
        record_ids.len(),
        warnings.len()
    );
    Ok(json!({
        "batchId": batch.id,
        "imported": record_ids.len(),
        "rowsTotal": parsed.total_lines,
        "recordIds": record_ids,
        "sha256": batch.sha256,
        "warningsCount": warnings.len(),
        "warnings": warnings,
    }))
}

fn imports_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.conn()?;
    let batches = db::list_import_batches(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(json!({ "imports": batches }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "records.importCsv" => records_import_csv(state, req),
        "imports.list" => imports_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
