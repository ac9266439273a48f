//! Diagnostics for Branchline Admin.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Database health**: table presence, integrity check, row counts
//! - **Diagnostics export**: packages the health snapshot and log files
//!   into a zip bundle for support.
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use crate::db::DbState;
use rusqlite::params;
use serde_json::{json, Value};
use std::fs;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 14;

/// Maximum bytes read per log file when exporting (5 MB).
pub const MAX_LOG_EXPORT_SIZE: u64 = 5 * 1024 * 1024;

/// Tables counted in the health snapshot.
const CORE_TABLES: [&str; 13] = [
    "branches",
    "users",
    "employees",
    "product_groups",
    "items",
    "installments",
    "installment_payments",
    "financing",
    "customers",
    "direct_purchases",
    "sales",
    "expenses",
    "activity_logs",
];

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Database health
// ---------------------------------------------------------------------------

/// Row counts per core table plus an integrity check and file size.
pub fn get_db_stats(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut counts = serde_json::Map::new();
    for table in CORE_TABLES {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .unwrap_or(-1);
        counts.insert(table.to_string(), json!(count));
    }

    let integrity: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .unwrap_or_else(|e| format!("check failed: {e}"));

    let schema_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let db_size = fs::metadata(&db.db_path).map(|m| m.len()).unwrap_or(0);

    Ok(json!({
        "dbPath": db.db_path.to_string_lossy(),
        "dbSizeBytes": db_size,
        "schemaVersion": schema_version,
        "integrity": integrity,
        "rowCounts": Value::Object(counts),
    }))
}

/// Verify the core tables exist.
pub fn health_check(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .map_err(|e| e.to_string())?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    let missing: Vec<&str> = CORE_TABLES
        .iter()
        .filter(|t| !existing.iter().any(|e| e == *t))
        .copied()
        .collect();

    Ok(json!({
        "healthy": missing.is_empty(),
        "tables": existing,
        "missing": missing,
    }))
}

/// Most recent activity-log entries for the export bundle.
fn recent_activity(conn: &rusqlite::Connection, limit: i64) -> Vec<Value> {
    let mut stmt = match conn.prepare(
        "SELECT log_label, log_category, created_at
         FROM activity_logs ORDER BY created_at DESC LIMIT ?1",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    stmt.query_map(params![limit], |row| {
        Ok(json!({
            "log_label": row.get::<_, String>(0)?,
            "log_category": row.get::<_, String>(1)?,
            "created_at": row.get::<_, String>(2)?,
        }))
    })
    .map(|rows| rows.filter_map(|r| r.ok()).collect())
    .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Collects diagnostics data and writes a zip file to the given directory.
/// Returns the path to the zip file.
pub fn export_diagnostics(db: &DbState, output_dir: &Path) -> Result<String, String> {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let zip_name = format!("branchline-diagnostics-{timestamp}.zip");
    let zip_path = output_dir.join(&zip_name);

    let file = fs::File::create(&zip_path)
        .map_err(|e| format!("Failed to create diagnostics zip: {e}"))?;
    let mut zip = zip::ZipWriter::new(file);

    let zip_options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    // 1. About info
    zip.start_file("about.json", zip_options)
        .map_err(|e| e.to_string())?;
    zip.write_all(
        serde_json::to_string_pretty(&get_about_info())
            .unwrap()
            .as_bytes(),
    )
    .map_err(|e| e.to_string())?;

    // 2. Database stats
    let stats = get_db_stats(db)?;
    zip.start_file("db_stats.json", zip_options)
        .map_err(|e| e.to_string())?;
    zip.write_all(serde_json::to_string_pretty(&stats).unwrap().as_bytes())
        .map_err(|e| e.to_string())?;

    // 3. Recent activity trail
    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        let activity = json!(recent_activity(&conn, 50));
        zip.start_file("recent_activity.json", zip_options)
            .map_err(|e| e.to_string())?;
        zip.write_all(serde_json::to_string_pretty(&activity).unwrap().as_bytes())
            .map_err(|e| e.to_string())?;
    }

    // 4. Log files
    let log_dir = get_log_dir();
    if log_dir.exists() {
        if let Ok(entries) = fs::read_dir(&log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_log = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("admin."));
                if is_log {
                    let fname = path
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .to_string();
                    let zip_entry = format!("logs/{fname}");
                    if zip.start_file(&zip_entry, zip_options).is_ok() {
                        if let Ok(f) = fs::File::open(&path) {
                            let mut buf = Vec::new();
                            // Cap per file to keep the zip manageable
                            let _ = f.take(MAX_LOG_EXPORT_SIZE).read_to_end(&mut buf);
                            let _ = zip.write_all(&buf);
                        }
                    }
                }
            }
        }
    }

    zip.finish().map_err(|e| e.to_string())?;

    Ok(zip_path.to_string_lossy().to_string())
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Returns the log directory path (same location used by lib.rs).
pub fn get_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("app.branchline.admin").join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs() {
    let log_dir = get_log_dir();
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(&log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.starts_with("admin.") || name == "admin.log" {
                        let modified = entry
                            .metadata()
                            .ok()
                            .and_then(|m| m.modified().ok())
                            .unwrap_or(std::time::UNIX_EPOCH);
                        log_files.push((path, modified));
                    }
                }
            }
        }
    }

    // Sort newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::sync::Mutex;

    fn test_db_state() -> DbState {
        let conn = rusqlite::Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    #[test]
    fn about_info_has_required_fields() {
        let info = get_about_info();
        assert!(info.get("version").is_some());
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert!(info.get("platform").is_some());
    }

    #[test]
    fn health_check_sees_all_core_tables() {
        let db_state = test_db_state();
        let health = health_check(&db_state).expect("health");
        assert_eq!(health["healthy"], true);
        assert!(health["missing"].as_array().unwrap().is_empty());
    }

    #[test]
    fn db_stats_count_rows() {
        let db_state = test_db_state();
        {
            let conn = db_state.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO branches (id, branch_name) VALUES ('b-1', 'Main')",
                [],
            )
            .unwrap();
        }
        let stats = get_db_stats(&db_state).expect("stats");
        assert_eq!(stats["rowCounts"]["branches"], 1);
        assert_eq!(stats["integrity"], "ok");
        assert_eq!(stats["schemaVersion"], 3);
    }

    #[test]
    fn export_writes_zip() {
        let db_state = test_db_state();
        let dir = std::env::temp_dir().join(format!("branchline-diag-test-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");

        let zip_path = export_diagnostics(&db_state, &dir).expect("export");
        let meta = fs::metadata(&zip_path).expect("zip exists");
        assert!(meta.len() > 0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn log_dir_is_stable() {
        let d1 = get_log_dir();
        let d2 = get_log_dir();
        assert_eq!(d1, d2);
        assert!(d1.to_string_lossy().contains("app.branchline.admin"));
    }
}
