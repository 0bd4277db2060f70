use crate::config::{self, DashboardConfig};
use crate::record::Record;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE_NAME: &str = "natd.sqlite3";

pub const RECORD_COLUMNS: &str = "id, respondent, age, sex, ethnic_group, academic_performance,
     academic_description, iq_band, school_type, socio_economic_status, study_habit,
     test_result, created_at, updated_at";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_batches(
            id TEXT PRIMARY KEY,
            source_name TEXT,
            sha256 TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            warning_count INTEGER NOT NULL,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_batches_sha256 ON import_batches(sha256)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            id TEXT PRIMARY KEY,
            respondent TEXT NOT NULL,
            age INTEGER,
            sex TEXT NOT NULL,
            ethnic_group TEXT NOT NULL,
            academic_performance REAL,
            academic_description TEXT NOT NULL,
            iq_band TEXT NOT NULL,
            school_type TEXT NOT NULL,
            socio_economic_status TEXT NOT NULL,
            study_habit TEXT NOT NULL,
            test_result REAL,
            import_batch_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(import_batch_id) REFERENCES import_batches(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_ses ON records(socio_economic_status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_import_batch ON records(import_batch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings {} is invalid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Stored dashboard config, or the defaults when none has been saved.
pub fn load_dashboard_config(conn: &Connection) -> anyhow::Result<DashboardConfig> {
    let Some(v) = settings_get_json(conn, config::SETTINGS_KEY)? else {
        return Ok(DashboardConfig::default());
    };
    let cfg: DashboardConfig =
        serde_json::from_value(v).context("stored dashboard config does not parse")?;
    Ok(cfg)
}

pub fn record_from_row(r: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: r.get(0)?,
        respondent: r.get(1)?,
        age: r.get(2)?,
        sex: r.get(3)?,
        ethnic_group: r.get(4)?,
        academic_performance: r.get(5)?,
        academic_description: r.get(6)?,
        iq_band: r.get(7)?,
        school_type: r.get(8)?,
        socio_economic_status: r.get(9)?,
        study_habit: r.get(10)?,
        test_result: r.get(11)?,
        created_at: r.get(12)?,
        updated_at: r.get(13)?,
    })
}

/// The full record set in insertion order.
pub fn load_records(conn: &Connection) -> rusqlite::Result<Vec<Record>> {
    let sql = format!("SELECT {} FROM records ORDER BY rowid", RECORD_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_record(conn: &Connection, id: &str) -> rusqlite::Result<Option<Record>> {
    let sql = format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS);
    conn.query_row(&sql, [id], record_from_row).optional()
}

pub fn insert_record(
    conn: &Connection,
    r: &Record,
    import_batch_id: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO records(
           id,
           respondent,
           age,
           sex,
           ethnic_group,
           academic_performance,
           academic_description,
           iq_band,
           school_type,
           socio_economic_status,
           study_habit,
           test_result,
           import_batch_id,
           created_at,
           updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            r.id,
            r.respondent,
            r.age,
            r.sex,
            r.ethnic_group,
            r.academic_performance,
            r.academic_description,
            r.iq_band,
            r.school_type,
            r.socio_economic_status,
            r.study_habit,
            r.test_result,
            import_batch_id,
            r.created_at,
            r.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update_record(conn: &Connection, r: &Record) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE records SET
           respondent = ?,
           age = ?,
           sex = ?,
           ethnic_group = ?,
           academic_performance = ?,
           academic_description = ?,
           iq_band = ?,
           school_type = ?,
           socio_economic_status = ?,
           study_habit = ?,
           test_result = ?,
           updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            r.respondent,
            r.age,
            r.sex,
            r.ethnic_group,
            r.academic_performance,
            r.academic_description,
            r.iq_band,
            r.school_type,
            r.socio_economic_status,
            r.study_habit,
            r.test_result,
            r.updated_at,
            r.id,
        ],
    )
}

pub fn delete_record(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM records WHERE id = ?", [id])
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    pub id: String,
    pub source_name: Option<String>,
    pub sha256: String,
    pub row_count: i64,
    pub warning_count: i64,
    pub imported_at: String,
}

fn batch_from_row(r: &Row<'_>) -> rusqlite::Result<ImportBatch> {
    Ok(ImportBatch {
        id: r.get(0)?,
        source_name: r.get(1)?,
        sha256: r.get(2)?,
        row_count: r.get(3)?,
        warning_count: r.get(4)?,
        imported_at: r.get(5)?,
    })
}

pub fn find_import_batch_by_sha(
    conn: &Connection,
    sha256: &str,
) -> rusqlite::Result<Option<ImportBatch>> {
    conn.query_row(
        "SELECT id, source_name, sha256, row_count, warning_count, imported_at
         FROM import_batches
         WHERE sha256 = ?
         ORDER BY rowid
         LIMIT 1",
        [sha256],
        batch_from_row,
    )
    .optional()
}

pub fn insert_import_batch(conn: &Connection, b: &ImportBatch) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO import_batches(id, source_name, sha256, row_count, warning_count, imported_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            b.id,
            b.source_name,
            b.sha256,
            b.row_count,
            b.warning_count,
            b.imported_at,
        ],
    )?;
    Ok(())
}

/// Import history, newest first.
pub fn list_import_batches(conn: &Connection) -> rusqlite::Result<Vec<ImportBatch>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_name, sha256, row_count, warning_count, imported_at
         FROM import_batches
         ORDER BY rowid DESC",
    )?;
    let rows = stmt
        .query_map([], batch_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
