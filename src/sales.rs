//! Direct purchases and the sales ledger.
//!
//! Every collected amount lands one row in `sales`, tagged with the record
//! it came from (installment payment, direct purchase, or financing
//! release). The daily-sales screens read this table; the purchase flow
//! writes it together with the stock movements in a single transaction.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::db::DbState;
use crate::{audit, employees};

// ---------------------------------------------------------------------------
// Direct purchases
// ---------------------------------------------------------------------------

/// One cart line of a direct purchase.
#[derive(Debug, Clone)]
pub struct PurchaseLine {
    pub item_id: String,
    pub quantity: i64,
}

/// Input for a direct (one-time) purchase.
#[derive(Debug, Clone)]
pub struct NewDirectPurchase {
    pub customer_name: String,
    pub reference_number: String,
    pub payment_method: String,
    pub lines: Vec<PurchaseLine>,
}

struct ItemSnapshot {
    id: String,
    name: String,
    price: f64,
    stocks: i64,
    number_of_sold: i64,
    quantity: i64,
}

/// Record a direct purchase: stock validation first, then purchase +
/// per-line stock decrement, purchase items, sale rows, audit entries, and
/// the collector's counter, all in one transaction.
pub fn create_direct_purchase(
    db: &DbState,
    ctx: &SessionContext,
    input: &NewDirectPurchase,
) -> Result<Value, String> {
    if input.lines.is_empty() {
        return Err("No items selected for this purchase".into());
    }
    if input.payment_method.trim().is_empty() {
        return Err("Missing required field: payment method".into());
    }

    let branch_id = ctx.require_branch()?.to_string();
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    // Validate every line against current stock before any write.
    let mut snapshots: Vec<ItemSnapshot> = Vec::with_capacity(input.lines.len());
    for line in &input.lines {
        if line.quantity < 1 {
            return Err("Quantity must be at least 1".into());
        }
        let snap = conn
            .query_row(
                "SELECT id, item_name, item_price, stocks, number_of_sold
                 FROM items WHERE id = ?1",
                params![line.item_id],
                |row| {
                    Ok(ItemSnapshot {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        price: row.get(2)?,
                        stocks: row.get(3)?,
                        number_of_sold: row.get(4)?,
                        quantity: line.quantity,
                    })
                },
            )
            .optional()
            .map_err(|e| format!("item lookup: {e}"))?
            .ok_or_else(|| format!("Product not found in inventory: {}", line.item_id))?;

        if snap.stocks < line.quantity {
            return Err(format!(
                "Insufficient stocks for {}. Available stocks: {}.",
                snap.name, snap.stocks
            ));
        }
        snapshots.push(snap);
    }

    let total_amount: f64 = snapshots.iter().map(|s| s.price * s.quantity as f64).sum();
    let purchase_id = Uuid::new_v4().to_string();
    let today = chrono::Utc::now().date_naive().to_string();

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO direct_purchases (id, customer_name, amount, reference_number,
                                           payment_method, collector_name, branch_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                purchase_id,
                input.customer_name,
                total_amount,
                input.reference_number,
                input.payment_method,
                ctx.name,
                branch_id,
            ],
        )
        .map_err(|e| format!("insert direct purchase: {e}"))?;

        for snap in &snapshots {
            conn.execute(
                "UPDATE items SET stocks = ?1, number_of_sold = ?2 WHERE id = ?3",
                params![
                    snap.stocks - snap.quantity,
                    snap.number_of_sold + snap.quantity,
                    snap.id
                ],
            )
            .map_err(|e| format!("update stocks for {}: {e}", snap.name))?;

            conn.execute(
                "INSERT INTO direct_purchase_items
                     (id, direct_purchase_id, item_id, product_name, price, quantity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    purchase_id,
                    snap.id,
                    snap.name,
                    snap.price,
                    snap.quantity
                ],
            )
            .map_err(|e| format!("insert purchase item: {e}"))?;

            conn.execute(
                "INSERT INTO sales (id, amount, payment_method, date_issued, branch_id, purchase_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    snap.price * snap.quantity as f64,
                    input.payment_method,
                    today,
                    branch_id,
                    purchase_id,
                ],
            )
            .map_err(|e| format!("insert sale for {}: {e}", snap.name))?;

            audit::record(
                &conn,
                &format!("{} processed a direct purchase of {}", ctx.name, snap.name),
                "Direct Purchase",
                Some(&ctx.user_id),
                None,
                Some(&purchase_id),
                Some(&branch_id),
            )?;

            employees::bump_transaction_count(&conn, &ctx.user_id)?;
        }

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
        purchase_id = %purchase_id,
        total = total_amount,
        lines = snapshots.len(),
        "Direct purchase recorded"
    );

    Ok(serde_json::json!({
        "success": true,
        "purchaseId": purchase_id,
        "amount": total_amount,
    }))
}

/// Direct purchases newest-first with their item lines embedded.
pub fn list_purchases(
    db: &DbState,
    branch_id: Option<&str>,
    page: i64,
    per_page: i64,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let per_page = if per_page > 0 { per_page } else { 50 };
    let offset = (page.max(1) - 1) * per_page;

    let mut stmt = conn
        .prepare(
            "SELECT p.id, p.customer_name, p.amount, p.reference_number,
                    p.payment_method, p.collector_name, p.branch_id, p.created_at,
                    b.branch_name
             FROM direct_purchases p
             LEFT JOIN branches b ON b.id = p.branch_id
             WHERE (?1 IS NULL OR p.branch_id = ?1)
             ORDER BY p.created_at DESC
             LIMIT ?2 OFFSET ?3",
        )
        .map_err(|e| e.to_string())?;

    let mut purchases: Vec<Value> = stmt
        .query_map(params![branch_id, per_page, offset], |row| {
            let branch_name: Option<String> = row.get(8)?;
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "customer_name": row.get::<_, String>(1)?,
                "amount": row.get::<_, f64>(2)?,
                "reference_number": row.get::<_, Option<String>>(3)?,
                "payment_method": row.get::<_, String>(4)?,
                "collector_name": row.get::<_, Option<String>>(5)?,
                "branch_id": row.get::<_, Option<String>>(6)?,
                "created_at": row.get::<_, String>(7)?,
                "branch": branch_name
                    .map(|n| serde_json::json!({ "branch_name": n }))
                    .unwrap_or(Value::Null),
            }))
        })
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    for purchase in purchases.iter_mut() {
        let id = purchase
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut stmt = conn
            .prepare(
                "SELECT id, item_id, product_name, price, quantity
                 FROM direct_purchase_items WHERE direct_purchase_id = ?1",
            )
            .map_err(|e| e.to_string())?;
        let items: Vec<Value> = stmt
            .query_map(params![id], |r| {
                Ok(serde_json::json!({
                    "id": r.get::<_, String>(0)?,
                    "item_id": r.get::<_, Option<String>>(1)?,
                    "product_name": r.get::<_, String>(2)?,
                    "price": r.get::<_, f64>(3)?,
                    "quantity": r.get::<_, i64>(4)?,
                }))
            })
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
        if let Some(obj) = purchase.as_object_mut() {
            obj.insert("items".into(), Value::Array(items));
        }
    }

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM direct_purchases WHERE (?1 IS NULL OR branch_id = ?1)",
            params![branch_id],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({ "data": purchases, "count": count }))
}

// ---------------------------------------------------------------------------
// Sales ledger
// ---------------------------------------------------------------------------

/// Sales newest-first with branch embed and an origin label derived from
/// which record the row references.
pub fn list_sales(
    db: &DbState,
    branch_id: Option<&str>,
    page: i64,
    per_page: i64,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let per_page = if per_page > 0 { per_page } else { 50 };
    let offset = (page.max(1) - 1) * per_page;

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.amount, s.payment_method, s.date_issued, s.branch_id,
                    s.installment_id, s.purchase_id, s.financing_id, s.created_at,
                    b.branch_name
             FROM sales s
             LEFT JOIN branches b ON b.id = s.branch_id
             WHERE (?1 IS NULL OR s.branch_id = ?1)
               AND (?2 IS NULL OR s.date_issued >= ?2)
               AND (?3 IS NULL OR s.date_issued <= ?3)
             ORDER BY s.created_at DESC
             LIMIT ?4 OFFSET ?5",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(
            params![branch_id, date_from, date_to, per_page, offset],
            |row| {
                let installment_id: Option<String> = row.get(5)?;
                let purchase_id: Option<String> = row.get(6)?;
                let financing_id: Option<String> = row.get(7)?;
                let branch_name: Option<String> = row.get(9)?;
                let origin = if installment_id.is_some() {
                    "Installment"
                } else if purchase_id.is_some() {
                    "Direct Purchase"
                } else if financing_id.is_some() {
                    "Financing"
                } else {
                    "Sale"
                };
                Ok(serde_json::json!({
                    "id": row.get::<_, String>(0)?,
                    "amount": row.get::<_, f64>(1)?,
                    "payment_method": row.get::<_, String>(2)?,
                    "date_issued": row.get::<_, String>(3)?,
                    "branch_id": row.get::<_, Option<String>>(4)?,
                    "installment_id": installment_id,
                    "purchase_id": purchase_id,
                    "financing_id": financing_id,
                    "created_at": row.get::<_, String>(8)?,
                    "origin": origin,
                    "branch": branch_name
                        .map(|n| serde_json::json!({ "branch_name": n }))
                        .unwrap_or(Value::Null),
                }))
            },
        )
        .map_err(|e| e.to_string())?;

    let mut sales = Vec::new();
    for row in rows {
        match row {
            Ok(s) => sales.push(s),
            Err(e) => warn!("skipping malformed sale row: {e}"),
        }
    }

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sales
             WHERE (?1 IS NULL OR branch_id = ?1)
               AND (?2 IS NULL OR date_issued >= ?2)
               AND (?3 IS NULL OR date_issued <= ?3)",
            params![branch_id, date_from, date_to],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({ "data": sales, "count": count }))
}

/// Per-branch totals for the daily-sales overview.
pub fn totals_per_branch(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT b.id, b.branch_name, COALESCE(SUM(s.amount), 0), COUNT(s.id)
             FROM branches b
             LEFT JOIN sales s ON s.branch_id = b.id
             GROUP BY b.id
             ORDER BY b.branch_name ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "branch_id": row.get::<_, String>(0)?,
                "branch_name": row.get::<_, String>(1)?,
                "total_sales": row.get::<_, f64>(2)?,
                "transaction_count": row.get::<_, i64>(3)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut totals = Vec::new();
    for row in rows {
        match row {
            Ok(t) => totals.push(t),
            Err(e) => warn!("skipping malformed totals row: {e}"),
        }
    }
    Ok(serde_json::json!(totals))
}

/// Grand total collected, optionally scoped to a branch.
pub fn total_sales(db: &DbState, branch_id: Option<&str>) -> Result<f64, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM sales WHERE (?1 IS NULL OR branch_id = ?1)",
        params![branch_id],
        |row| row.get(0),
    )
    .map_err(|e| format!("total sales: {e}"))
}

/// Amount collected on one calendar day.
pub fn daily_total(db: &DbState, branch_id: Option<&str>, date: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COUNT(*)
         FROM sales
         WHERE date_issued = ?2 AND (?1 IS NULL OR branch_id = ?1)",
        params![branch_id, date],
        |row| {
            Ok(serde_json::json!({
                "date": date,
                "total": row.get::<_, f64>(0)?,
                "transaction_count": row.get::<_, i64>(1)?,
            }))
        },
    )
    .map_err(|e| format!("daily total: {e}"))
}

/// Delete a sale row, leaving an audit entry behind.
pub fn delete_sale(db: &DbState, ctx: &SessionContext, sale_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let (amount, branch_id): (f64, Option<String>) = conn
        .query_row(
            "SELECT amount, branch_id FROM sales WHERE id = ?1",
            params![sale_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| format!("sale lookup: {e}"))?
        .ok_or_else(|| format!("Sale not found: {sale_id}"))?;

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;
    let result = (|| -> Result<(), String> {
        conn.execute("DELETE FROM sales WHERE id = ?1", params![sale_id])
            .map_err(|e| format!("delete sale: {e}"))?;
        audit::record(
            &conn,
            &format!("{} deleted a sale record of {amount:.2}", ctx.name),
            "Sale Deletion",
            Some(&ctx.user_id),
            None,
            None,
            branch_id.as_deref(),
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

    info!(sale_id = %sale_id, amount, "Sale deleted");
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
                 VALUES ('it-1', 'Electric Fan', 1200.0, 10, 0);
             INSERT INTO items (id, item_name, item_price, stocks, number_of_sold)
                 VALUES ('it-2', 'Rice Cooker', 1800.0, 1, 0);",
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

    fn cart(lines: &[(&str, i64)]) -> NewDirectPurchase {
        NewDirectPurchase {
            customer_name: "Walk-in".into(),
            reference_number: "GC-123".into(),
            payment_method: "GCash".into(),
            lines: lines
                .iter()
                .map(|(id, qty)| PurchaseLine {
                    item_id: (*id).into(),
                    quantity: *qty,
                })
                .collect(),
        }
    }

    #[test]
    fn purchase_writes_lines_sales_and_stock() {
        let db_state = test_db_state();
        let result =
            create_direct_purchase(&db_state, &ctx(), &cart(&[("it-1", 2), ("it-2", 1)]))
                .expect("purchase");
        assert_eq!(result["amount"], 1200.0 * 2.0 + 1800.0);

        let conn = db_state.conn.lock().unwrap();
        let stocks: i64 = conn
            .query_row("SELECT stocks FROM items WHERE id = 'it-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(stocks, 8);
        let lines: i64 = conn
            .query_row("SELECT COUNT(*) FROM direct_purchase_items", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(lines, 2);
        let sales: i64 = conn
            .query_row("SELECT COUNT(*) FROM sales", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sales, 2, "one sale row per line");
        let transactions: i64 = conn
            .query_row(
                "SELECT number_of_transactions FROM employees WHERE user_id = 'u-1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(transactions, 2);
    }

    #[test]
    fn insufficient_stock_rejects_whole_cart() {
        let db_state = test_db_state();
        let err = create_direct_purchase(&db_state, &ctx(), &cart(&[("it-1", 1), ("it-2", 5)]))
            .expect_err("stock check");
        assert!(err.contains("Insufficient stocks for Rice Cooker"), "{err}");

        // Nothing moved, including the first (valid) line.
        let conn = db_state.conn.lock().unwrap();
        let purchases: i64 = conn
            .query_row("SELECT COUNT(*) FROM direct_purchases", [], |r| r.get(0))
            .unwrap();
        assert_eq!(purchases, 0);
        let stocks: i64 = conn
            .query_row("SELECT stocks FROM items WHERE id = 'it-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(stocks, 10);
    }

    #[test]
    fn sales_listing_labels_origin_and_totals_roll_up() {
        let db_state = test_db_state();
        create_direct_purchase(&db_state, &ctx(), &cart(&[("it-1", 1)])).expect("purchase");

        let listing = list_sales(&db_state, Some("b-1"), 1, 10, None, None).expect("list");
        assert_eq!(listing["count"], 1);
        assert_eq!(listing["data"][0]["origin"], "Direct Purchase");

        let totals = totals_per_branch(&db_state).expect("totals");
        assert_eq!(totals[0]["total_sales"], 1200.0);

        let grand = total_sales(&db_state, None).expect("grand total");
        assert_eq!(grand, 1200.0);

        let today = chrono::Utc::now().date_naive().to_string();
        let daily = daily_total(&db_state, Some("b-1"), &today).expect("daily");
        assert_eq!(daily["total"], 1200.0);
        assert_eq!(daily["transaction_count"], 1);
    }

    #[test]
    fn delete_sale_leaves_audit_entry() {
        let db_state = test_db_state();
        create_direct_purchase(&db_state, &ctx(), &cart(&[("it-1", 1)])).expect("purchase");

        let sale_id: String = {
            let conn = db_state.conn.lock().unwrap();
            conn.query_row("SELECT id FROM sales LIMIT 1", [], |r| r.get(0))
                .unwrap()
        };
        delete_sale(&db_state, &ctx(), &sale_id).expect("delete");

        let conn = db_state.conn.lock().unwrap();
        let sales: i64 = conn
            .query_row("SELECT COUNT(*) FROM sales", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sales, 0);
        let logs: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM activity_logs WHERE log_category = 'Sale Deletion'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(logs, 1);
    }

    #[test]
    fn purchases_listing_embeds_items() {
        let db_state = test_db_state();
        create_direct_purchase(&db_state, &ctx(), &cart(&[("it-1", 2)])).expect("purchase");

        let listing = list_purchases(&db_state, Some("b-1"), 1, 10).expect("list");
        assert_eq!(listing["count"], 1);
        let purchase = &listing["data"][0];
        assert_eq!(purchase["payment_method"], "GCash");
        assert_eq!(purchase["items"].as_array().unwrap().len(), 1);
        assert_eq!(purchase["items"][0]["quantity"], 2);
        assert_eq!(purchase["branch"]["branch_name"], "Main Branch");
    }
}
