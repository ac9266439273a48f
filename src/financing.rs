//! Lender-brokered installment sales (Home Credit, Skyro, Billease).
//!
//! Mirrors the in-house installment flow, but the lender settles the item
//! up front: there is no monthly ledger to append to, and the final due date
//! runs the full term past the first due date.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::db::DbState;
use crate::{audit, dues, employees};

/// Lenders the storefront brokers through.
pub const LENDERS: [&str; 3] = ["Home Credit", "Skyro", "Billease"];

/// Input for a new financing record.
#[derive(Debug, Clone)]
pub struct NewFinancing {
    pub financing: String,
    pub customer_name: String,
    pub customer_full_address: String,
    pub customer_occupation: String,
    pub phone: String,
    pub trademark: String,
    pub term: i64,
    pub quantity: i64,
    pub item_id: String,
    pub total: f64,
    pub partial_payment: f64,
    pub date_released: String,
    pub first_due: Option<String>,
}

/// Create a financing record with its customer row, stock decrement, sale,
/// counter bump, and audit entry in one transaction.
pub fn create_financing(
    db: &DbState,
    ctx: &SessionContext,
    input: &NewFinancing,
) -> Result<Value, String> {
    if input.customer_name.trim().is_empty() {
        return Err("Missing required field: customer name".into());
    }
    if input.item_id.trim().is_empty() {
        return Err("Missing required field: unit".into());
    }
    if input.quantity < 1 {
        return Err("Quantity must be at least 1".into());
    }
    if !LENDERS.contains(&input.financing.as_str()) {
        return Err(format!(
            "Unknown financing partner: {}. Must be one of {}",
            input.financing,
            LENDERS.join(", ")
        ));
    }

    let released = dues::parse_day(&input.date_released)?;
    let first_due = match &input.first_due {
        Some(s) if !s.trim().is_empty() => dues::parse_day(s)?,
        _ => dues::add_months(released, 1)?,
    };
    let installment_due = dues::financing_due_date(first_due, input.term)?;
    let monthly_payment = (input.total - input.partial_payment) / input.term as f64;

    let branch_id = ctx.require_branch()?.to_string();
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let (stocks, number_of_sold): (i64, i64) = conn
        .query_row(
            "SELECT stocks, number_of_sold FROM items WHERE id = ?1",
            params![input.item_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| format!("item lookup: {e}"))?
        .ok_or_else(|| format!("Item not found: {}", input.item_id))?;

    if stocks <= 0 {
        return Err("No more stocks available for this item.".into());
    }
    if stocks < input.quantity {
        return Err(format!(
            "Stocks Remaining: {stocks}. Insufficient stocks. Please try again."
        ));
    }

    let financing_id = Uuid::new_v4().to_string();
    let today = chrono::Utc::now().date_naive().to_string();

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO financing (
                id, financing, customer_name, customer_full_address,
                customer_occupation, phone, trademark, term, quantity, total,
                partial_amount_paid, monthly_payment, date_released,
                installment_due, latest_payment_date, status, collector_name,
                item_id, branch_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, 'On-going', ?16, ?17, ?18)",
            params![
                financing_id,
                input.financing,
                input.customer_name.trim(),
                input.customer_full_address,
                input.customer_occupation,
                input.phone,
                input.trademark,
                input.term,
                input.quantity,
                input.total,
                input.partial_payment,
                monthly_payment,
                released.to_string(),
                installment_due.to_string(),
                first_due.to_string(),
                ctx.name,
                input.item_id,
                branch_id,
            ],
        )
        .map_err(|e| format!("insert financing: {e}"))?;

        conn.execute(
            "INSERT INTO customers (
                id, customer_name, customer_address, customer_phone_number,
                customer_occupation, customer_trade_mark, bir_tin, branch_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                input.customer_name.trim(),
                input.customer_full_address,
                input.phone,
                input.customer_occupation,
                input.trademark,
                input.financing,
                branch_id,
            ],
        )
        .map_err(|e| format!("insert customer: {e}"))?;

        conn.execute(
            "UPDATE items SET stocks = ?1, number_of_sold = ?2 WHERE id = ?3",
            params![
                stocks - input.quantity,
                number_of_sold + input.quantity,
                input.item_id
            ],
        )
        .map_err(|e| format!("update item stocks: {e}"))?;

        conn.execute(
            "INSERT INTO sales (id, amount, payment_method, date_issued, branch_id, financing_id)
             VALUES (?1, ?2, 'Cash', ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                input.partial_payment,
                today,
                branch_id,
                financing_id,
            ],
        )
        .map_err(|e| format!("insert sale: {e}"))?;

        employees::bump_transaction_count(&conn, &ctx.user_id)?;

        audit::record(
            &conn,
            &format!(
                "{} accepted a new {} financing from {}",
                ctx.name,
                input.financing,
                input.customer_name.trim()
            ),
            "New Financing",
            Some(&ctx.user_id),
            None,
            None,
            Some(&branch_id),
        )?;

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

    info!(
        financing_id = %financing_id,
        lender = %input.financing,
        customer = %input.customer_name,
        "Financing record created"
    );

    Ok(serde_json::json!({
        "success": true,
        "financingId": financing_id,
        "installment_due": installment_due.to_string(),
        "monthly_payment": monthly_payment,
    }))
}

fn financing_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let item_id: Option<String> = row.get(22)?;
    let item = match item_id {
        Some(id) => serde_json::json!({
            "id": id,
            "item_name": row.get::<_, Option<String>>(23)?,
            "item_imei": row.get::<_, Option<String>>(24)?,
            "serial": row.get::<_, Option<String>>(25)?,
            "item_price": row.get::<_, Option<f64>>(26)?,
        }),
        None => Value::Null,
    };
    let branch = match row.get::<_, Option<String>>(27)? {
        Some(name) => serde_json::json!({ "branch_name": name }),
        None => Value::Null,
    };
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "financing": row.get::<_, String>(1)?,
        "customer_name": row.get::<_, String>(2)?,
        "customer_full_address": row.get::<_, Option<String>>(3)?,
        "customer_occupation": row.get::<_, Option<String>>(4)?,
        "phone": row.get::<_, Option<String>>(5)?,
        "trademark": row.get::<_, Option<String>>(6)?,
        "term": row.get::<_, i64>(7)?,
        "quantity": row.get::<_, i64>(8)?,
        "total": row.get::<_, f64>(9)?,
        "partial_amount_paid": row.get::<_, f64>(10)?,
        "monthly_payment": row.get::<_, f64>(11)?,
        "date_released": row.get::<_, String>(12)?,
        "installment_due": row.get::<_, String>(13)?,
        "latest_payment_date": row.get::<_, String>(14)?,
        "status": row.get::<_, String>(15)?,
        "purple": row.get::<_, f64>(16)?,
        "yellow": row.get::<_, f64>(17)?,
        "white": row.get::<_, f64>(18)?,
        "collector_name": row.get::<_, Option<String>>(19)?,
        "branch_id": row.get::<_, Option<String>>(20)?,
        "created_at": row.get::<_, String>(21)?,
        "item": item,
        "branch": branch,
    }))
}

const FINANCING_SELECT: &str = "
    SELECT f.id, f.financing, f.customer_name, f.customer_full_address,
           f.customer_occupation, f.phone, f.trademark, f.term, f.quantity,
           f.total, f.partial_amount_paid, f.monthly_payment, f.date_released,
           f.installment_due, f.latest_payment_date, f.status,
           f.purple, f.yellow, f.white, f.collector_name,
           f.branch_id, f.created_at,
           it.id, it.item_name, it.item_imei, it.serial, it.item_price,
           b.branch_name
    FROM financing f
    LEFT JOIN items it ON it.id = f.item_id
    LEFT JOIN branches b ON b.id = f.branch_id";

/// Paginated listing with item/branch embeds.
pub fn list(
    db: &DbState,
    branch_id: Option<&str>,
    page: i64,
    per_page: i64,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let per_page = if per_page > 0 { per_page } else { 50 };
    let offset = (page.max(1) - 1) * per_page;

    let sql = format!(
        "{FINANCING_SELECT}
         WHERE (?1 IS NULL OR f.branch_id = ?1)
         ORDER BY f.created_at DESC
         LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let rows: Vec<Value> = stmt
        .query_map(params![branch_id, per_page, offset], |row| {
            financing_row_json(row)
        })
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM financing WHERE (?1 IS NULL OR branch_id = ?1)",
            params![branch_id],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({ "data": rows, "count": count }))
}

/// Customer-name search with item-name fallback, capped at five rows.
pub fn search(db: &DbState, query: &str, branch_id: Option<&str>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let pattern = format!("%{}%", query.trim().to_lowercase());

    let by_customer = format!(
        "{FINANCING_SELECT}
         WHERE lower(f.customer_name) LIKE ?1
           AND (?2 IS NULL OR f.branch_id = ?2)
         LIMIT 5"
    );
    let mut stmt = conn.prepare(&by_customer).map_err(|e| e.to_string())?;
    let mut rows: Vec<Value> = stmt
        .query_map(params![pattern, branch_id], |row| financing_row_json(row))
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    if rows.is_empty() {
        let by_item = format!(
            "{FINANCING_SELECT}
             WHERE lower(it.item_name) LIKE ?1
               AND (?2 IS NULL OR f.branch_id = ?2)
             LIMIT 5"
        );
        let mut stmt = conn.prepare(&by_item).map_err(|e| e.to_string())?;
        rows = stmt
            .query_map(params![pattern, branch_id], |row| financing_row_json(row))
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
    }

    Ok(serde_json::json!(rows))
}

/// Delete a financing record.
pub fn delete_financing(db: &DbState, financing_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let deleted = conn
        .execute("DELETE FROM financing WHERE id = ?1", params![financing_id])
        .map_err(|e| format!("delete financing: {e}"))?;
    if deleted == 0 {
        return Err(format!("Financing record not found: {financing_id}"));
    }
    info!(financing_id = %financing_id, "Financing record deleted");
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
             INSERT INTO users (id, email, password_hash, first_name, last_name, role, branch_id)
                 VALUES ('u-1', 'ana@branchline.app', 'x', 'Ana', 'Reyes', 'admin', 'b-1');
             INSERT INTO employees (id, user_id, branch_id) VALUES ('e-1', 'u-1', 'b-1');
             INSERT INTO items (id, item_name, item_price, stocks, number_of_sold)
                 VALUES ('it-1', 'Fridge 9cf', 32000.0, 2, 0);",
        )
        .expect("seed");
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    fn ctx() -> SessionContext {
        SessionContext {
            user_id: "u-1".into(),
            name: "Ana Reyes".into(),
            role: "admin".into(),
            branch_id: Some("b-1".into()),
            branch_name: Some("Main Branch".into()),
        }
    }

    fn sample() -> NewFinancing {
        NewFinancing {
            financing: "Skyro".into(),
            customer_name: "Leo Cruz".into(),
            customer_full_address: "Pasig".into(),
            customer_occupation: "Driver".into(),
            phone: "0918".into(),
            trademark: "".into(),
            term: 12,
            quantity: 1,
            item_id: "it-1".into(),
            total: 32000.0,
            partial_payment: 5000.0,
            date_released: "2025-02-10".into(),
            first_due: Some("2025-03-10".into()),
        }
    }

    #[test]
    fn financing_due_runs_full_term_past_first_due() {
        let db_state = test_db_state();
        let result = create_financing(&db_state, &ctx(), &sample()).expect("create");
        // 2025-03-10 + 12 months, unlike the in-house term - 1 rule.
        assert_eq!(result["installment_due"], "2026-03-10");

        let conn = db_state.conn.lock().unwrap();
        let (stocks, sold): (i64, i64) = conn
            .query_row(
                "SELECT stocks, number_of_sold FROM items WHERE id = 'it-1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((stocks, sold), (1, 1));
        let sales: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sales WHERE financing_id IS NOT NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(sales, 1);
    }

    #[test]
    fn unknown_lender_is_rejected() {
        let db_state = test_db_state();
        let mut input = sample();
        input.financing = "Loan Shark".into();
        let err = create_financing(&db_state, &ctx(), &input).expect_err("lender check");
        assert!(err.contains("Unknown financing partner"));
    }

    #[test]
    fn list_and_search_and_delete() {
        let db_state = test_db_state();
        create_financing(&db_state, &ctx(), &sample()).expect("create");

        let page = list(&db_state, Some("b-1"), 1, 10).expect("list");
        assert_eq!(page["count"], 1);
        let id = page["data"][0]["id"].as_str().unwrap().to_string();
        assert_eq!(page["data"][0]["financing"], "Skyro");

        let hits = search(&db_state, "fridge", None).expect("search");
        assert_eq!(hits.as_array().unwrap().len(), 1, "item-name fallback");

        delete_financing(&db_state, &id).expect("delete");
        let page = list(&db_state, Some("b-1"), 1, 10).expect("list");
        assert_eq!(page["count"], 0);
    }
}
