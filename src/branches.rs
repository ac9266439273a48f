//! Branch registry. Branches partition every other table for non-super
//! staff, so deletion is rare and leaves referencing rows pointing at a
//! branch id that no longer resolves to a name.

use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;

/// Create a branch. Name, address, and phone are all required.
pub fn create(db: &DbState, name: &str, address: &str, phone: &str) -> Result<Value, String> {
    if name.trim().is_empty() || address.trim().is_empty() || phone.trim().is_empty() {
        return Err("Please fill out all the inputs.".into());
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO branches (id, branch_name, branch_address, branch_contact_number)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, name.trim(), address.trim(), phone.trim()],
    )
    .map_err(|e| format!("insert branch: {e}"))?;
    info!(branch_id = %id, name = %name, "branch created");
    Ok(serde_json::json!({ "success": true, "branchId": id }))
}

/// All branches with their lifetime sales totals.
pub fn list(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT b.id, b.branch_name, b.branch_address, b.branch_contact_number,
                    b.created_at, COALESCE(SUM(s.amount), 0)
             FROM branches b
             LEFT JOIN sales s ON s.branch_id = b.id
             GROUP BY b.id
             ORDER BY b.branch_name ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "branch_name": row.get::<_, String>(1)?,
                "branch_address": row.get::<_, String>(2)?,
                "branch_contact_number": row.get::<_, String>(3)?,
                "created_at": row.get::<_, String>(4)?,
                "branch_total_sales": row.get::<_, f64>(5)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut branches = Vec::new();
    for row in rows {
        match row {
            Ok(b) => branches.push(b),
            Err(e) => warn!("skipping malformed branch row: {e}"),
        }
    }
    Ok(serde_json::json!(branches))
}

/// Delete a branch.
pub fn delete(db: &DbState, branch_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let deleted = conn
        .execute("DELETE FROM branches WHERE id = ?1", params![branch_id])
        .map_err(|e| format!("delete branch: {e}"))?;
    if deleted == 0 {
        return Err(format!("Branch not found: {branch_id}"));
    }
    info!(branch_id = %branch_id, "branch deleted");
    Ok(serde_json::json!({ "success": true }))
}
