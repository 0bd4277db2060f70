//! Portable workspace bundles.
//!
//! A bundle is a zip holding `manifest.json` and a consistent snapshot of the
//! workspace database taken with `VACUUM INTO`. Restores are staged next to
//! the live database and fully verified before anything is swapped in.

use anyhow::{anyhow, bail, Context};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const BUNDLE_FORMAT: &str = "natd-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/natd.sqlite3";
const LIVE_DB: &str = "natd.sqlite3";
const STAGED_DB: &str = "natd.sqlite3.restoring";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub format: String,
    pub app_version: String,
    pub exported_at: String,
    pub db_sha256: String,
    pub record_count: i64,
}

/// A verified database waiting in the workspace folder to replace the live one.
#[derive(Debug)]
pub struct StagedRestore {
    pub path: PathBuf,
    pub format_detected: &'static str,
    pub record_count: i64,
    pub manifest: Option<BundleManifest>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn count_records(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))
}

/// Snapshot the database behind `conn` and write it as a bundle to `out_path`.
pub fn export_bundle(conn: &Connection, out_path: &Path) -> anyhow::Result<BundleManifest> {
    let out_dir = match out_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create directory {}", out_dir.display()))?;

    let snapshot = out_dir.join(format!(".natd-snapshot-{}.sqlite3", uuid::Uuid::new_v4()));
    let snapshot_path = snapshot.to_string_lossy().to_string();
    conn.execute("VACUUM INTO ?1", [snapshot_path.as_str()])
        .context("failed to snapshot workspace database")?;
    let bytes = std::fs::read(&snapshot);
    remove_quietly(&snapshot);
    let bytes = bytes.context("failed to read database snapshot")?;

    let manifest = BundleManifest {
        format: BUNDLE_FORMAT.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        db_sha256: sha256_hex(&bytes),
        record_count: count_records(conn).context("failed to count records")?,
    };

    let file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(MANIFEST_ENTRY, opts)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;
    zip.start_file(DB_ENTRY, opts)?;
    zip.write_all(&bytes)?;
    zip.finish().context("failed to finalize bundle")?;

    Ok(manifest)
}

fn read_bundle(in_path: &Path) -> anyhow::Result<(BundleManifest, Vec<u8>)> {
    let file = File::open(in_path)?;
    let mut archive = ZipArchive::new(file).context("not a readable zip archive")?;

    let mut raw = Vec::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle has no manifest.json")?
        .read_to_end(&mut raw)?;
    let manifest: BundleManifest =
        serde_json::from_slice(&raw).context("manifest.json does not parse")?;
    if manifest.format != BUNDLE_FORMAT {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let mut db = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle has no {}", DB_ENTRY))?
        .read_to_end(&mut db)?;
    let actual = sha256_hex(&db);
    if actual != manifest.db_sha256 {
        bail!(
            "database checksum mismatch: manifest {} vs bundle {}",
            manifest.db_sha256,
            actual
        );
    }
    Ok((manifest, db))
}

/// Open the staged file read-only and make sure it is a sound workspace.
fn verify_staged(path: &Path) -> anyhow::Result<i64> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .context("restored file does not open as SQLite")?;
    let check: String = conn
        .query_row("PRAGMA integrity_check", [], |r| r.get(0))
        .context("integrity check failed to run")?;
    if check != "ok" {
        bail!("integrity check failed: {}", check);
    }
    count_records(&conn).context("restored database has no records table")
}

/// Read `in_path` (bundle or raw SQLite file), verify it and stage it inside
/// `workspace`. The live database is not touched.
pub fn stage_restore(in_path: &Path, workspace: &Path) -> anyhow::Result<StagedRestore> {
    let mut head = [0u8; 16];
    let n = File::open(in_path)
        .with_context(|| format!("failed to open {}", in_path.display()))?
        .read(&mut head)?;
    let head = &head[..n];

    let (format_detected, manifest, bytes) = if head.starts_with(ZIP_MAGIC) {
        let (m, db) = read_bundle(in_path)?;
        (BUNDLE_FORMAT, Some(m), db)
    } else if head.starts_with(SQLITE_MAGIC) {
        let db = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.display()))?;
        (RAW_SQLITE_FORMAT, None, db)
    } else {
        return Err(anyhow!("not a workspace bundle or SQLite database"));
    };

    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let staged = workspace.join(STAGED_DB);
    std::fs::write(&staged, &bytes)
        .with_context(|| format!("failed to stage {}", staged.display()))?;

    let verified = verify_staged(&staged).and_then(|count| match &manifest {
        Some(m) if m.record_count != count => Err(anyhow!(
            "manifest lists {} records, database holds {}",
            m.record_count,
            count
        )),
        _ => Ok(count),
    });
    match verified {
        Ok(record_count) => Ok(StagedRestore {
            path: staged,
            format_detected,
            record_count,
            manifest,
        }),
        Err(e) => {
            remove_quietly(&staged);
            Err(e)
        }
    }
}

/// Swap a staged restore in as the workspace database. Callers must have
/// closed their connection to the live file.
pub fn commit_restore(staged: &StagedRestore, workspace: &Path) -> anyhow::Result<()> {
    let live = workspace.join(LIVE_DB);
    std::fs::rename(&staged.path, &live)
        .with_context(|| format!("failed to replace {}", live.display()))
}

/// Remove a staged restore that will not be committed.
pub fn discard_restore(staged: StagedRestore) {
    remove_quietly(&staged.path);
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("could not remove {}: {}", path.display(), e);
    }
}
