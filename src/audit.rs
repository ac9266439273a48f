//! Append-only activity log.
//!
//! Every staff-visible mutation (new installment, payment, purchase, sale
//! deletion, ...) records who did what. Entries are written inside the same
//! transaction as the change they describe and are never edited.

use rusqlite::Connection;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Append one log entry on an existing connection/transaction.
pub fn record(
    conn: &Connection,
    label: &str,
    category: &str,
    user_id: Option<&str>,
    installment_id: Option<&str>,
    purchase_id: Option<&str>,
    branch_id: Option<&str>,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO activity_logs
             (id, log_label, log_category, user_id, installment_id, purchase_id, branch_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            label,
            category,
            user_id,
            installment_id,
            purchase_id,
            branch_id
        ],
    )
    .map_err(|e| format!("insert activity log: {e}"))?;
    Ok(())
}

/// List log entries newest-first, optionally scoped to a branch and/or a
/// case-insensitive label filter.
pub fn list(
    conn: &Connection,
    branch_id: Option<&str>,
    label_query: Option<&str>,
    limit: i64,
) -> Result<Value, String> {
    let pattern = label_query
        .map(|q| format!("%{}%", q.trim().to_lowercase()))
        .filter(|p| p != "%%");

    let mut stmt = conn
        .prepare(
            "SELECT id, log_label, log_category, user_id, installment_id,
                    purchase_id, branch_id, created_at
             FROM activity_logs
             WHERE (?1 IS NULL OR branch_id = ?1)
               AND (?2 IS NULL OR lower(log_label) LIKE ?2)
             ORDER BY created_at DESC
             LIMIT ?3",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(rusqlite::params![branch_id, pattern, limit.max(1)], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "log_label": row.get::<_, String>(1)?,
                "log_category": row.get::<_, String>(2)?,
                "user_id": row.get::<_, Option<String>>(3)?,
                "installment_id": row.get::<_, Option<String>>(4)?,
                "purchase_id": row.get::<_, Option<String>>(5)?,
                "branch_id": row.get::<_, Option<String>>(6)?,
                "created_at": row.get::<_, String>(7)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut logs = Vec::new();
    for row in rows {
        match row {
            Ok(l) => logs.push(l),
            Err(e) => warn!("skipping malformed log row: {e}"),
        }
    }

    Ok(serde_json::json!(logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        conn
    }

    #[test]
    fn record_and_filter_by_label() {
        let conn = test_conn();
        record(
            &conn,
            "Ana accepted a new installment from Maria",
            "New Installment",
            Some("u-1"),
            Some("i-1"),
            None,
            Some("b-1"),
        )
        .expect("record");
        record(
            &conn,
            "Ana processed a direct purchase of TV 43",
            "Direct Purchase",
            Some("u-1"),
            None,
            Some("dp-1"),
            Some("b-1"),
        )
        .expect("record");

        let all = list(&conn, Some("b-1"), None, 50).expect("list");
        assert_eq!(all.as_array().unwrap().len(), 2);

        let filtered = list(&conn, Some("b-1"), Some("installment"), 50).expect("filtered");
        let arr = filtered.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(
            arr[0].get("log_category").and_then(Value::as_str),
            Some("New Installment")
        );

        let other_branch = list(&conn, Some("b-2"), None, 50).expect("other branch");
        assert!(other_branch.as_array().unwrap().is_empty());
    }
}
