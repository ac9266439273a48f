//! Customer registry. Rows are created alongside installment and financing
//! records; the screens here only page, search, and prune them.

use rusqlite::params;
use serde_json::Value;
use tracing::warn;

use crate::db::DbState;

/// Paginated customer listing.
pub fn list(
    db: &DbState,
    branch_id: Option<&str>,
    page: i64,
    per_page: i64,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let per_page = if per_page > 0 { per_page } else { 10 };
    let offset = (page.max(1) - 1) * per_page;

    let mut stmt = conn
        .prepare(
            "SELECT id, customer_name, customer_address, customer_phone_number,
                    customer_occupation, customer_trade_mark, bir_tin,
                    branch_id, installment_id, created_at
             FROM customers
             WHERE (?1 IS NULL OR branch_id = ?1)
             ORDER BY created_at DESC
             LIMIT ?2 OFFSET ?3",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![branch_id, per_page, offset], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "customer_name": row.get::<_, String>(1)?,
                "customer_address": row.get::<_, Option<String>>(2)?,
                "customer_phone_number": row.get::<_, Option<String>>(3)?,
                "customer_occupation": row.get::<_, Option<String>>(4)?,
                "customer_trade_mark": row.get::<_, Option<String>>(5)?,
                "bir_tin": row.get::<_, Option<String>>(6)?,
                "branch_id": row.get::<_, Option<String>>(7)?,
                "installment_id": row.get::<_, Option<String>>(8)?,
                "created_at": row.get::<_, String>(9)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut customers = Vec::new();
    for row in rows {
        match row {
            Ok(c) => customers.push(c),
            Err(e) => warn!("skipping malformed customer row: {e}"),
        }
    }

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM customers WHERE (?1 IS NULL OR branch_id = ?1)",
            params![branch_id],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({ "data": customers, "count": count }))
}

/// Case-insensitive name search, capped at five rows.
pub fn search(db: &DbState, query: &str, branch_id: Option<&str>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let pattern = format!("%{}%", query.trim().to_lowercase());

    let mut stmt = conn
        .prepare(
            "SELECT id, customer_name, customer_address, customer_phone_number,
                    customer_occupation
             FROM customers
             WHERE lower(customer_name) LIKE ?1
               AND (?2 IS NULL OR branch_id = ?2)
             LIMIT 5",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![pattern, branch_id], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "customer_name": row.get::<_, String>(1)?,
                "customer_address": row.get::<_, Option<String>>(2)?,
                "customer_phone_number": row.get::<_, Option<String>>(3)?,
                "customer_occupation": row.get::<_, Option<String>>(4)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut customers = Vec::new();
    for row in rows {
        match row {
            Ok(c) => customers.push(c),
            Err(e) => warn!("skipping malformed customer row: {e}"),
        }
    }
    Ok(serde_json::json!(customers))
}

/// Delete a customer record.
pub fn delete(db: &DbState, customer_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let deleted = conn
        .execute("DELETE FROM customers WHERE id = ?1", params![customer_id])
        .map_err(|e| format!("delete customer: {e}"))?;
    if deleted == 0 {
        return Err(format!("Customer not found: {customer_id}"));
    }
    Ok(serde_json::json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn test_db_state() -> DbState {
        let conn = rusqlite::Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        conn.execute_batch(
            "INSERT INTO branches (id, branch_name) VALUES ('b-1', 'Main Branch');
             INSERT INTO customers (id, customer_name, customer_address, branch_id)
                 VALUES ('c-1', 'Maria Santos', 'Quezon City', 'b-1');
             INSERT INTO customers (id, customer_name, customer_address, branch_id)
                 VALUES ('c-2', 'Jun Dela Cruz', 'Pasig', 'b-1');",
        )
        .expect("seed");
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    #[test]
    fn list_search_delete() {
        let db_state = test_db_state();

        let page = list(&db_state, Some("b-1"), 1, 10).expect("list");
        assert_eq!(page["count"], 2);

        let hits = search(&db_state, "maria", None).expect("search");
        assert_eq!(hits.as_array().unwrap().len(), 1);

        delete(&db_state, "c-1").expect("delete");
        let page = list(&db_state, Some("b-1"), 1, 10).expect("list");
        assert_eq!(page["count"], 1);

        assert!(delete(&db_state, "c-1").is_err(), "already gone");
    }
}
