mod test_support;

use serde_json::json;
use test_support::{temp_dir, Sidecar, CSV_HEADER};

fn sample_csv() -> String {
    format!(
        "{}\n\
         Student 1,14,Male,Tagalog,85,Very Satisfactory,High,Public,Below poverty line,Good,72\n\
         Student 2,15,Female,Cebuano,92,Outstanding,Low,Private,On poverty line,Poor,88\n\
         \n\
         Student 3,abc,female,Ilocano,70,Fairly Satisfactory,high,Public,BelowPovertyLine,Excellent,100\n",
        CSV_HEADER
    )
}

#[test]
fn csv_text_import_writes_records_and_batch() {
    let workspace = temp_dir("natd-import-text");
    let mut s = Sidecar::with_workspace(&workspace);

    let res = s.request_ok(
        "1",
        "records.importCsv",
        json!({ "text": sample_csv(), "sourceName": "survey.csv" }),
    );
    assert_eq!(res.get("imported").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(res.get("rowsTotal").and_then(|v| v.as_u64()), Some(3));
    let warnings = res.get("warnings").and_then(|v| v.as_array()).expect("warnings");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].get("code").and_then(|v| v.as_str()), Some("bad_number"));

    let list = s.request_ok("2", "records.list", json!({ "query": { "pageSize": 10 } }));
    let rows = list.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get("sex").and_then(|v| v.as_str()), Some("Female"));
    assert_eq!(
        rows[2].get("socioEconomicStatus").and_then(|v| v.as_str()),
        Some("Below poverty line")
    );
    assert!(rows[2].get("age").expect("age key").is_null());

    let imports = s.request_ok("3", "imports.list", json!({}));
    let batches = imports.get("imports").and_then(|v| v.as_array()).expect("imports");
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0].get("sourceName").and_then(|v| v.as_str()),
        Some("survey.csv")
    );
    assert_eq!(batches[0].get("rowCount").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(
        batches[0].get("sha256").and_then(|v| v.as_str()).map(|s| s.len()),
        Some(64)
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn empty_import_short_circuits_without_writing() {
    let workspace = temp_dir("natd-import-empty");
    let mut s = Sidecar::with_workspace(&workspace);

    let resp = s.request(
        "1",
        "records.importCsv",
        json!({ "text": format!("{}\n\n", CSV_HEADER) }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    let error = resp.get("error").expect("error");
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("empty_import"));
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("No valid data found to upload.")
    );

    let list = s.request_ok("2", "records.list", json!({}));
    assert_eq!(list.get("totalCount").and_then(|v| v.as_u64()), Some(0));
    let imports = s.request_ok("3", "imports.list", json!({}));
    assert_eq!(
        imports.get("imports").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reimporting_same_file_warns_duplicate() {
    let workspace = temp_dir("natd-import-dup");
    let csv_path = workspace.join("nat.csv");
    std::fs::write(&csv_path, sample_csv()).expect("write csv");
    let mut s = Sidecar::with_workspace(&workspace);

    let first = s.request_ok(
        "1",
        "records.importCsv",
        json!({ "path": csv_path.to_string_lossy() }),
    );
    let first_batch = first
        .get("batchId")
        .and_then(|v| v.as_str())
        .expect("batchId")
        .to_string();

    let second = s.request_ok(
        "2",
        "records.importCsv",
        json!({ "path": csv_path.to_string_lossy() }),
    );
    let dup = second
        .get("warnings")
        .and_then(|v| v.as_array())
        .and_then(|ws| {
            ws.iter()
                .find(|w| w.get("code").and_then(|v| v.as_str()) == Some("duplicate_import"))
                .cloned()
        })
        .expect("duplicate_import warning");
    assert_eq!(dup.get("batchId").and_then(|v| v.as_str()), Some(first_batch.as_str()));

    let list = s.request_ok("3", "records.list", json!({}));
    assert_eq!(list.get("totalCount").and_then(|v| v.as_u64()), Some(6));
    let imports = s.request_ok("4", "imports.list", json!({}));
    let batches = imports.get("imports").and_then(|v| v.as_array()).expect("imports");
    assert_eq!(
        batches[0].get("sourceName").and_then(|v| v.as_str()),
        Some("nat.csv")
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn import_input_errors() {
    let workspace = temp_dir("natd-import-errors");
    let mut s = Sidecar::with_workspace(&workspace);

    assert_eq!(s.request_err("1", "records.importCsv", json!({})), "bad_params");
    let missing = workspace.join("nope.csv");
    assert_eq!(
        s.request_err(
            "2",
            "records.importCsv",
            json!({ "path": missing.to_string_lossy() })
        ),
        "not_found"
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn quoted_multiline_cell_imports_as_one_record() {
    let workspace = temp_dir("natd-import-multiline");
    let mut s = Sidecar::with_workspace(&workspace);
    let csv = format!(
        "{}\r\n\
         \"Reyes, Ana\",14,Female,Tagalog,88,\"Very\r\nSatisfactory\",High,Public,On poverty line,Good,81\r\n\
         Ben,15,Male,Cebuano,75,Fair,Low,Private,On poverty line,Poor,64\r\n",
        CSV_HEADER
    );

    let res = s.request_ok("1", "records.importCsv", json!({ "text": csv }));
    assert_eq!(res.get("imported").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(res.get("rowsTotal").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        res.get("warnings").and_then(|v| v.as_array()).map(|w| w.len()),
        Some(0)
    );

    let list = s.request_ok("2", "records.list", json!({ "query": { "pageSize": 10 } }));
    let rows = list.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 2);
    let ana = rows
        .iter()
        .find(|r| r.get("respondent").and_then(|v| v.as_str()) == Some("Reyes, Ana"))
        .expect("quoted respondent");
    assert_eq!(
        ana.get("academicDescription").and_then(|v| v.as_str()),
        Some("Very\nSatisfactory")
    );
    assert_eq!(ana.get("testResult").and_then(|v| v.as_f64()), Some(81.0));

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
