mod test_support;

use serde_json::json;
use std::io::Write;
use test_support::{temp_dir, Sidecar, CSV_HEADER};

fn seed_one(s: &mut Sidecar) {
    let csv = format!(
        "{}\nKeep,14,Male,Tagalog,80,Good,High,Public,On poverty line,Good,66\n",
        CSV_HEADER
    );
    s.request_ok("seed", "records.importCsv", json!({ "text": csv }));
}

fn total_count(s: &mut Sidecar, id: &str) -> Option<u64> {
    let list = s.request_ok(id, "records.list", json!({}));
    list.get("totalCount").and_then(|v| v.as_u64())
}

#[test]
fn failed_import_keeps_current_workspace_open() {
    let workspace = temp_dir("natd-backup-ipc-fail");
    let mut s = Sidecar::with_workspace(&workspace);
    seed_one(&mut s);

    let corrupt = workspace.join("corrupt.natd.zip");
    std::fs::write(&corrupt, b"PK\x03\x04garbage").expect("write corrupt zip");
    assert_eq!(
        s.request_err(
            "1",
            "backup.importWorkspaceBundle",
            json!({ "inPath": corrupt.to_string_lossy() })
        ),
        "invalid_bundle"
    );
    assert_eq!(total_count(&mut s, "2"), Some(1));

    let mismatched = workspace.join("mismatch.natd.zip");
    let f = std::fs::File::create(&mismatched).expect("create bundle");
    let mut zip = zip::ZipWriter::new(f);
    let opts = zip::write::FileOptions::default();
    zip.start_file("manifest.json", opts).expect("manifest");
    zip.write_all(
        json!({
            "format": "natd-workspace-v1",
            "appVersion": "0.0.0",
            "exportedAt": "2026-01-01T00:00:00Z",
            "dbSha256": "00",
            "recordCount": 0
        })
        .to_string()
        .as_bytes(),
    )
    .expect("write manifest");
    zip.start_file("db/natd.sqlite3", opts).expect("db entry");
    zip.write_all(b"not a database").expect("write db");
    zip.finish().expect("finish zip");

    let resp = s.request(
        "3",
        "backup.importWorkspaceBundle",
        json!({ "inPath": mismatched.to_string_lossy() }),
    );
    let error = resp.get("error").expect("error");
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("invalid_bundle"));
    assert!(error
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .contains("checksum"));
    assert_eq!(total_count(&mut s, "4"), Some(1));

    let health = s.request_ok("5", "health", json!({}));
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_then_import_restores_earlier_state() {
    let workspace = temp_dir("natd-backup-ipc-roundtrip");
    let bundle = workspace.join("saved.natd.zip");
    let mut s = Sidecar::with_workspace(&workspace);
    seed_one(&mut s);

    let export = s.request_ok(
        "1",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export.get("recordCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        export.get("dbSha256").and_then(|v| v.as_str()).map(|v| v.len()),
        Some(64)
    );

    let list = s.request_ok("2", "records.list", json!({}));
    let id = list
        .get("rows")
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.first())
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_str())
        .expect("record id")
        .to_string();
    s.request_ok("3", "records.delete", json!({ "id": id }));
    assert_eq!(total_count(&mut s, "4"), Some(0));

    let import = s.request_ok(
        "5",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        import.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("natd-workspace-v1")
    );
    assert_eq!(import.get("recordCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(total_count(&mut s, "6"), Some(1));

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn backup_param_errors() {
    let mut s = Sidecar::spawn();
    assert_eq!(
        s.request_err("1", "backup.exportWorkspaceBundle", json!({ "outPath": "x.zip" })),
        "no_workspace"
    );
    assert_eq!(
        s.request_err("2", "backup.importWorkspaceBundle", json!({})),
        "bad_params"
    );

    let workspace = temp_dir("natd-backup-ipc-params");
    s.request_ok(
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let missing = workspace.join("missing.natd.zip");
    assert_eq!(
        s.request_err(
            "4",
            "backup.importWorkspaceBundle",
            json!({ "inPath": missing.to_string_lossy() })
        ),
        "not_found"
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
