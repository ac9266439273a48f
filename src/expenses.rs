//! Branch operating expenses.

use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::db::DbState;

/// Record an expense against the operator's branch.
pub fn create(db: &DbState, ctx: &SessionContext, amount: f64, remarks: &str) -> Result<Value, String> {
    if amount <= 0.0 || remarks.trim().is_empty() {
        return Err("Please fill all the fields".into());
    }
    let branch_id = ctx.require_branch()?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO expenses (id, amount, remarks, employee_name, branch_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, amount, remarks.trim(), ctx.name, branch_id],
    )
    .map_err(|e| format!("insert expense: {e}"))?;
    info!(expense_id = %id, amount, "expense recorded");
    Ok(serde_json::json!({ "success": true, "expenseId": id }))
}

/// Edit an expense (amount/remarks).
pub fn update(db: &DbState, expense_id: &str, amount: f64, remarks: &str) -> Result<Value, String> {
    if amount <= 0.0 || remarks.trim().is_empty() {
        return Err("Please fill all the fields".into());
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE expenses SET amount = ?1, remarks = ?2 WHERE id = ?3",
            params![amount, remarks.trim(), expense_id],
        )
        .map_err(|e| format!("update expense: {e}"))?;
    if changed == 0 {
        return Err(format!("Expense not found: {expense_id}"));
    }
    Ok(serde_json::json!({ "success": true }))
}

/// Delete an expense.
pub fn delete(db: &DbState, expense_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let deleted = conn
        .execute("DELETE FROM expenses WHERE id = ?1", params![expense_id])
        .map_err(|e| format!("delete expense: {e}"))?;
    if deleted == 0 {
        return Err(format!("Expense not found: {expense_id}"));
    }
    Ok(serde_json::json!({ "success": true }))
}

/// Paginated expense listing, newest-first, with the page's running total
/// and the overall count.
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
            "SELECT e.id, e.amount, e.remarks, e.employee_name, e.branch_id,
                    e.created_at, b.branch_name
             FROM expenses e
             LEFT JOIN branches b ON b.id = e.branch_id
             WHERE (?1 IS NULL OR e.branch_id = ?1)
             ORDER BY e.created_at DESC
             LIMIT ?2 OFFSET ?3",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![branch_id, per_page, offset], |row| {
            let branch_name: Option<String> = row.get(6)?;
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "amount": row.get::<_, f64>(1)?,
                "remarks": row.get::<_, String>(2)?,
                "employee_name": row.get::<_, Option<String>>(3)?,
                "branch_id": row.get::<_, Option<String>>(4)?,
                "created_at": row.get::<_, String>(5)?,
                "branch": branch_name
                    .map(|n| serde_json::json!({ "branch_name": n }))
                    .unwrap_or(Value::Null),
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut expenses = Vec::new();
    let mut page_total = 0.0;
    for row in rows {
        match row {
            Ok(e) => {
                page_total += e.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                expenses.push(e);
            }
            Err(e) => warn!("skipping malformed expense row: {e}"),
        }
    }

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM expenses WHERE (?1 IS NULL OR branch_id = ?1)",
            params![branch_id],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "data": expenses,
        "count": count,
        "page_total": page_total,
    }))
}

/// Expenses across every branch, grouped by branch name.
pub fn grouped_by_branch(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT COALESCE(b.branch_name, 'Unknown Branch'), e.amount, e.remarks,
                    e.employee_name, e.created_at
             FROM expenses e
             LEFT JOIN branches b ON b.id = e.branch_id
             ORDER BY e.created_at DESC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                serde_json::json!({
                    "amount": row.get::<_, f64>(1)?,
                    "remarks": row.get::<_, String>(2)?,
                    "employee_name": row.get::<_, Option<String>>(3)?,
                    "created_at": row.get::<_, String>(4)?,
                }),
            ))
        })
        .map_err(|e| e.to_string())?;

    let mut grouped = serde_json::Map::new();
    for row in rows {
        let (branch_name, expense) = row.map_err(|e| e.to_string())?;
        let entry = grouped
            .entry(branch_name)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(arr) = entry.as_array_mut() {
            arr.push(expense);
        }
    }
    Ok(Value::Object(grouped))
}
