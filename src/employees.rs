//! Staff accounts: a login row in `users` plus an HR row in `employees`.
//!
//! Deactivation flips the login flag instead of deleting anything, so the
//! transaction history an employee accumulated stays attributable.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;

const MIN_PASSWORD_LEN: usize = 6;

/// Input for a new staff account.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub branch_id: String,
}

/// Create the user account and the employee record together.
pub fn create(db: &DbState, input: &NewEmployee) -> Result<Value, String> {
    if input.first_name.trim().is_empty()
        || input.last_name.trim().is_empty()
        || input.email.trim().is_empty()
        || input.branch_id.trim().is_empty()
    {
        return Err("Please provide all inputs!".into());
    }
    if input.password.len() < MIN_PASSWORD_LEN {
        return Err("Please make your password more than 6 characters".into());
    }

    let email = input.email.trim().to_lowercase();
    let password_hash =
        bcrypt::hash(&input.password, bcrypt::DEFAULT_COST).map_err(|e| format!("hash: {e}"))?;
    let user_id = Uuid::new_v4().to_string();

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let exists: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("email check: {e}"))?;
    if exists.is_some() {
        return Err(format!("An account already exists for {email}"));
    }

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO users (id, email, password_hash, first_name, last_name,
                                phone_number, role, branch_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'admin', ?7)",
            params![
                user_id,
                email,
                password_hash,
                input.first_name.trim(),
                input.last_name.trim(),
                input.phone_number,
                input.branch_id,
            ],
        )
        .map_err(|e| format!("insert user: {e}"))?;

        conn.execute(
            "INSERT INTO employees (id, user_id, first_name, last_name, email,
                                    phone_number, branch_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                input.first_name.trim(),
                input.last_name.trim(),
                email,
                input.phone_number,
                input.branch_id,
            ],
        )
        .map_err(|e| format!("insert employee: {e}"))?;

        Ok(())
    })();

    match result {
        Ok(()) => conn
            .execute_batch("COMMIT")
            .map_err(|e| format!("commit: {e}"))?,
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }

    info!(user_id = %user_id, email = %email, "employee account created");
    Ok(serde_json::json!({ "success": true, "userId": user_id }))
}

/// Update the editable employee fields on both rows.
pub fn update(
    db: &DbState,
    user_id: &str,
    first_name: &str,
    last_name: &str,
    phone_number: &str,
    branch_id: &str,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;
    let result = (|| -> Result<(), String> {
        let users_changed = conn
            .execute(
                "UPDATE users SET first_name = ?1, last_name = ?2, phone_number = ?3,
                                  branch_id = ?4
                 WHERE id = ?5",
                params![first_name, last_name, phone_number, branch_id, user_id],
            )
            .map_err(|e| format!("update user: {e}"))?;
        if users_changed == 0 {
            return Err(format!("Employee not found: {user_id}"));
        }
        conn.execute(
            "UPDATE employees SET first_name = ?1, last_name = ?2, phone_number = ?3,
                                  branch_id = ?4
             WHERE user_id = ?5",
            params![first_name, last_name, phone_number, branch_id, user_id],
        )
        .map_err(|e| format!("update employee: {e}"))?;
        Ok(())
    })();
    match result {
        Ok(()) => conn
            .execute_batch("COMMIT")
            .map_err(|e| format!("commit: {e}"))?,
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }

    Ok(serde_json::json!({ "success": true }))
}

/// Block or re-enable the login account.
pub fn set_active(db: &DbState, user_id: &str, active: bool) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE users SET is_deactivated = ?1 WHERE id = ?2",
            params![!active as i64, user_id],
        )
        .map_err(|e| format!("update deactivation: {e}"))?;
    if changed == 0 {
        return Err(format!("Employee not found: {user_id}"));
    }
    info!(user_id = %user_id, active, "employee activation changed");
    Ok(serde_json::json!({ "success": true }))
}

/// Employees with their branch names, superadmin-wide or per branch.
pub fn list(db: &DbState, branch_id: Option<&str>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT e.id, e.user_id, e.first_name, e.last_name, e.email, e.phone_number,
                    e.branch_id, e.number_of_transactions, b.branch_name,
                    u.role, u.is_deactivated, e.created_at
             FROM employees e
             LEFT JOIN branches b ON b.id = e.branch_id
             LEFT JOIN users u ON u.id = e.user_id
             WHERE (?1 IS NULL OR e.branch_id = ?1)
             ORDER BY e.created_at DESC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![branch_id], |row| {
            let branch_name: Option<String> = row.get(8)?;
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "user_id": row.get::<_, String>(1)?,
                "first_name": row.get::<_, String>(2)?,
                "last_name": row.get::<_, String>(3)?,
                "email": row.get::<_, String>(4)?,
                "phone_number": row.get::<_, Option<String>>(5)?,
                "branch_id": row.get::<_, Option<String>>(6)?,
                "number_of_transactions": row.get::<_, i64>(7)?,
                "branch": branch_name
                    .map(|n| serde_json::json!({ "branch_name": n }))
                    .unwrap_or(Value::Null),
                "role": row.get::<_, Option<String>>(9)?,
                "is_deactivated": row.get::<_, Option<i64>>(10)?.unwrap_or(0) != 0,
                "created_at": row.get::<_, String>(11)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut employees = Vec::new();
    for row in rows {
        match row {
            Ok(e) => employees.push(e),
            Err(e) => warn!("skipping malformed employee row: {e}"),
        }
    }

    Ok(serde_json::json!(employees))
}

/// Increment the per-employee transaction tally. Used inside the same
/// transaction as the sale/installment write it counts.
pub(crate) fn bump_transaction_count(conn: &Connection, user_id: &str) -> Result<(), String> {
    conn.execute(
        "UPDATE employees
         SET number_of_transactions = number_of_transactions + 1
         WHERE user_id = ?1",
        params![user_id],
    )
    .map_err(|e| format!("bump transaction count: {e}"))?;
    Ok(())
}
