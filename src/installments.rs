//! In-house installment contracts: creation, the monthly payment ledger,
//! status transitions, and the color-bucket projections for the dues screens.
//!
//! Multi-entity writes (contract + ledger + customer + stock + sale + audit)
//! run inside one `BEGIN IMMEDIATE` transaction so a failure partway leaves
//! nothing behind.

use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::db::DbState;
use crate::dues::{self, DueBucket};
use crate::{audit, employees};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Terminal statuses staff can move an on-going contract to.
const TERMINAL_STATUSES: [&str; 3] = [
    dues::STATUS_FULLY_PAID,
    dues::STATUS_DEPOSIT,
    dues::STATUS_REMATE,
];

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Input for a new installment contract.
#[derive(Debug, Clone)]
pub struct NewInstallment {
    pub customer_name: String,
    pub customer_full_address: String,
    pub customer_occupation: String,
    pub phone: String,
    pub trademark: String,
    pub bir_tin: String,
    pub term: i64,
    pub quantity: i64,
    pub item_id: String,
    pub total: f64,
    pub partial_payment: f64,
    pub date_released: String,
    /// First monthly due date. Defaults to one month after release.
    pub first_due: Option<String>,
}

/// Create an installment contract and everything that rides along with it:
/// the optional down-payment ledger entry, the customer registry row, the
/// stock decrement, the sale record, the collector's transaction counter,
/// and the audit log entry. All-or-nothing.
pub fn create_installment(
    db: &DbState,
    ctx: &SessionContext,
    input: &NewInstallment,
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

    let released = dues::parse_day(&input.date_released)?;
    let first_due = match &input.first_due {
        Some(s) if !s.trim().is_empty() => dues::parse_day(s)?,
        _ => dues::add_months(released, 1)?,
    };

    let has_down_payment = input.partial_payment > 0.0;
    let installment_due = dues::final_due_date(first_due, input.term)?;
    let latest_payment_date = dues::first_payment_date(first_due, has_down_payment)?;
    let monthly_payment = (input.total - input.partial_payment) / input.term as f64;

    let branch_id = ctx.require_branch()?.to_string();
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    // Stock check before the transaction opens
    let (stocks, number_of_sold, item_name): (i64, i64, String) = conn
        .query_row(
            "SELECT stocks, number_of_sold, item_name FROM items WHERE id = ?1",
            params![input.item_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
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

    let installment_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let today = Utc::now().date_naive().to_string();

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO installments (
                id, customer_name, customer_full_address, customer_occupation,
                phone, trademark, term, quantity, total, partial_amount_paid,
                monthly_payment, date_released, installment_due,
                latest_payment_date, status, collector_name, item_id,
                branch_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, 'On-going', ?15, ?16, ?17, ?18)",
            params![
                installment_id,
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
                latest_payment_date.to_string(),
                ctx.name,
                input.item_id,
                branch_id,
                now,
            ],
        )
        .map_err(|e| format!("insert installment: {e}"))?;

        // Down payment opens the ledger, labeled after the release month.
        if has_down_payment {
            let month_label = format!(
                "{} (Down Payment)",
                MONTH_NAMES[released.month0() as usize]
            );
            conn.execute(
                "INSERT INTO installment_payments
                     (id, installment_id, selected_month, payment, payment_date, date_paid)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    installment_id,
                    month_label,
                    input.partial_payment,
                    released.to_string(),
                ],
            )
            .map_err(|e| format!("insert down payment: {e}"))?;
        }

        conn.execute(
            "INSERT INTO customers (
                id, customer_name, customer_address, customer_phone_number,
                customer_occupation, customer_trade_mark, bir_tin,
                branch_id, installment_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                Uuid::new_v4().to_string(),
                input.customer_name.trim(),
                input.customer_full_address,
                input.phone,
                input.customer_occupation,
                input.trademark,
                input.bir_tin,
                branch_id,
                installment_id,
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
            "INSERT INTO sales (id, amount, payment_method, date_issued, branch_id, installment_id)
             VALUES (?1, ?2, 'Cash', ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                input.partial_payment,
                today,
                branch_id,
                installment_id,
            ],
        )
        .map_err(|e| format!("insert sale: {e}"))?;

        employees::bump_transaction_count(&conn, &ctx.user_id)?;

        audit::record(
            &conn,
            &format!(
                "{} accepted a new installment from {}",
                ctx.name,
                input.customer_name.trim()
            ),
            "New Installment",
            Some(&ctx.user_id),
            Some(&installment_id),
            None,
            Some(&branch_id),
        )?;

        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}"))?;
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }

    info!(
        installment_id = %installment_id,
        customer = %input.customer_name,
        item = %item_name,
        term = input.term,
        "Installment created"
    );

    Ok(serde_json::json!({
        "success": true,
        "installmentId": installment_id,
        "installment_due": installment_due.to_string(),
        "latest_payment_date": latest_payment_date.to_string(),
        "monthly_payment": monthly_payment,
        "remaining_stocks": stocks - input.quantity,
    }))
}

// ---------------------------------------------------------------------------
// Payment ledger
// ---------------------------------------------------------------------------

/// Record one monthly payment and advance the rolling due date.
///
/// All four fields are mandatory; the ledger insert, due-date rollover,
/// sale record, transaction counter, and audit entry commit together.
pub fn add_payment(
    db: &DbState,
    ctx: &SessionContext,
    installment_id: &str,
    selected_month: &str,
    payment: f64,
    payment_date: &str,
    date_paid: &str,
) -> Result<Value, String> {
    if selected_month.trim().is_empty() {
        return Err("Missing required payment field: selected month".into());
    }
    if payment <= 0.0 {
        return Err("Missing required payment field: amount must be greater than zero".into());
    }
    if payment_date.trim().is_empty() {
        return Err("Missing required payment field: due date".into());
    }
    if date_paid.trim().is_empty() {
        return Err("Missing required payment field: payment date".into());
    }

    let paid_due = dues::parse_day(payment_date)?;
    let paid_on = dues::parse_day(date_paid)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let (customer_name, installment_due, branch_id): (String, String, Option<String>) = conn
        .query_row(
            "SELECT customer_name, installment_due, branch_id
             FROM installments WHERE id = ?1",
            params![installment_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(|e| format!("installment lookup: {e}"))?
        .ok_or_else(|| format!("Installment not found: {installment_id}"))?;

    let final_due = dues::parse_day(&installment_due)?;
    let new_latest = dues::next_due_date(paid_due, final_due)?;

    let payment_id = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive().to_string();

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO installment_payments
                 (id, installment_id, selected_month, payment, payment_date, date_paid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                payment_id,
                installment_id,
                selected_month.trim(),
                payment,
                paid_due.to_string(),
                paid_on.to_string(),
            ],
        )
        .map_err(|e| format!("insert payment: {e}"))?;

        conn.execute(
            "UPDATE installments SET latest_payment_date = ?1 WHERE id = ?2",
            params![new_latest.to_string(), installment_id],
        )
        .map_err(|e| format!("advance due date: {e}"))?;

        conn.execute(
            "INSERT INTO sales (id, amount, payment_method, date_issued, branch_id, installment_id)
             VALUES (?1, ?2, 'Cash', ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                payment,
                today,
                branch_id,
                installment_id,
            ],
        )
        .map_err(|e| format!("insert sale: {e}"))?;

        employees::bump_transaction_count(&conn, &ctx.user_id)?;

        audit::record(
            &conn,
            &format!(
                "{} accepted an installment payment of {}",
                ctx.name, customer_name
            ),
            "Installment Payment",
            Some(&ctx.user_id),
            Some(installment_id),
            None,
            branch_id.as_deref(),
        )?;

        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}"))?;
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }

    info!(
        installment_id = %installment_id,
        payment_id = %payment_id,
        amount = payment,
        new_due = %new_latest,
        "Installment payment recorded"
    );

    Ok(serde_json::json!({
        "success": true,
        "paymentId": payment_id,
        "latest_payment_date": new_latest.to_string(),
    }))
}

/// Edit an existing ledger entry (explicit staff correction; no due-date
/// recomputation).
pub fn update_payment(
    db: &DbState,
    payment_id: &str,
    selected_month: &str,
    payment: f64,
    payment_date: &str,
    date_paid: &str,
) -> Result<Value, String> {
    if selected_month.trim().is_empty()
        || payment <= 0.0
        || payment_date.trim().is_empty()
        || date_paid.trim().is_empty()
    {
        return Err("All payment fields are required".into());
    }
    let paid_due = dues::parse_day(payment_date)?;
    let paid_on = dues::parse_day(date_paid)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE installment_payments
             SET selected_month = ?1, payment = ?2, payment_date = ?3, date_paid = ?4
             WHERE id = ?5",
            params![
                selected_month.trim(),
                payment,
                paid_due.to_string(),
                paid_on.to_string(),
                payment_id
            ],
        )
        .map_err(|e| format!("update payment: {e}"))?;

    if changed == 0 {
        return Err(format!("Payment not found: {payment_id}"));
    }
    Ok(serde_json::json!({ "success": true }))
}

/// Ledger rows plus the running total and the remarks differential
/// (tallied white amount minus everything collected).
pub fn get_payments(db: &DbState, installment_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let white: f64 = conn
        .query_row(
            "SELECT white FROM installments WHERE id = ?1",
            params![installment_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("installment lookup: {e}"))?
        .ok_or_else(|| format!("Installment not found: {installment_id}"))?;

    let mut stmt = conn
        .prepare(
            "SELECT id, selected_month, payment, payment_date, date_paid, created_at
             FROM installment_payments
             WHERE installment_id = ?1
             ORDER BY created_at ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![installment_id], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "selected_month": row.get::<_, String>(1)?,
                "payment": row.get::<_, f64>(2)?,
                "payment_date": row.get::<_, String>(3)?,
                "date_paid": row.get::<_, String>(4)?,
                "created_at": row.get::<_, String>(5)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut payments = Vec::new();
    let mut total = 0.0;
    for row in rows {
        match row {
            Ok(p) => {
                total += p.get("payment").and_then(Value::as_f64).unwrap_or(0.0);
                payments.push(p);
            }
            Err(e) => warn!("skipping malformed payment row: {e}"),
        }
    }

    Ok(serde_json::json!({
        "payments": payments,
        "total": total,
        "remarks": white - total,
    }))
}

// ---------------------------------------------------------------------------
// Status & staff-maintained fields
// ---------------------------------------------------------------------------

/// Move an on-going contract to a terminal status. One-directional: once
/// terminal, a contract never changes status again.
pub fn set_status(
    db: &DbState,
    ctx: &SessionContext,
    installment_id: &str,
    new_status: &str,
) -> Result<Value, String> {
    if !TERMINAL_STATUSES.contains(&new_status) {
        return Err(format!(
            "Invalid status: {new_status}. Must be one of Fully-paid, Deposit, Remate"
        ));
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let (current, customer_name, branch_id): (String, String, Option<String>) = conn
        .query_row(
            "SELECT status, customer_name, branch_id FROM installments WHERE id = ?1",
            params![installment_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(|e| format!("installment lookup: {e}"))?
        .ok_or_else(|| format!("Installment not found: {installment_id}"))?;

    if current != dues::STATUS_ONGOING {
        return Err(format!(
            "Installment is already {current}; only on-going installments can change status"
        ));
    }

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;
    let result = (|| -> Result<(), String> {
        conn.execute(
            "UPDATE installments SET status = ?1 WHERE id = ?2",
            params![new_status, installment_id],
        )
        .map_err(|e| format!("update status: {e}"))?;
        audit::record(
            &conn,
            &format!(
                "{} marked {}'s installment as {}",
                ctx.name, customer_name, new_status
            ),
            "Installment Status",
            Some(&ctx.user_id),
            Some(installment_id),
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

    let message = match new_status {
        "Fully-paid" => "Installment is now fully-paid! Congratulations.",
        "Deposit" => "Installment deposited successfully",
        _ => "Installment remated successfully",
    };
    Ok(serde_json::json!({ "success": true, "message": message }))
}

/// Staff override of the monthly amount.
pub fn set_monthly_payment(
    db: &DbState,
    installment_id: &str,
    monthly_payment: f64,
) -> Result<Value, String> {
    if monthly_payment <= 0.0 {
        return Err("Monthly payment must be greater than zero".into());
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE installments SET monthly_payment = ?1 WHERE id = ?2",
            params![monthly_payment, installment_id],
        )
        .map_err(|e| format!("update monthly payment: {e}"))?;
    if changed == 0 {
        return Err(format!("Installment not found: {installment_id}"));
    }
    Ok(serde_json::json!({ "success": true }))
}

/// Staff-maintained purple/yellow/white tallies plus the free-form comment.
///
/// Entered tallies win unless zero; the white amount keeps its stored value
/// when present, otherwise it defaults to purple + yellow.
pub fn update_counters(
    db: &DbState,
    installment_id: &str,
    purple: Option<f64>,
    yellow: Option<f64>,
    comment: Option<&str>,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let (cur_purple, cur_yellow, cur_white, cur_comment): (f64, f64, f64, Option<String>) = conn
        .query_row(
            "SELECT purple, yellow, white, comment FROM installments WHERE id = ?1",
            params![installment_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(|e| format!("installment lookup: {e}"))?
        .ok_or_else(|| format!("Installment not found: {installment_id}"))?;

    let new_purple = purple.filter(|v| *v != 0.0).unwrap_or(cur_purple);
    let new_yellow = yellow.filter(|v| *v != 0.0).unwrap_or(cur_yellow);
    let new_white = if cur_white != 0.0 {
        cur_white
    } else {
        new_purple + new_yellow
    };
    let new_comment = match comment {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        _ => cur_comment.unwrap_or_default(),
    };

    conn.execute(
        "UPDATE installments SET purple = ?1, yellow = ?2, white = ?3, comment = ?4
         WHERE id = ?5",
        params![new_purple, new_yellow, new_white, new_comment, installment_id],
    )
    .map_err(|e| format!("update counters: {e}"))?;

    Ok(serde_json::json!({
        "success": true,
        "purple": new_purple,
        "yellow": new_yellow,
        "white": new_white,
    }))
}

/// Delete a contract. Ledger entries and the customer registry row cascade;
/// sale history survives with its reference nulled.
pub fn delete_installment(db: &DbState, installment_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let deleted = conn
        .execute(
            "DELETE FROM installments WHERE id = ?1",
            params![installment_id],
        )
        .map_err(|e| format!("delete installment: {e}"))?;
    if deleted == 0 {
        return Err(format!("Installment not found: {installment_id}"));
    }
    info!(installment_id = %installment_id, "Installment deleted");
    Ok(serde_json::json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// Listing, search, buckets
// ---------------------------------------------------------------------------

/// Sort/filter options for the main installments table.
#[derive(Debug, Default, Clone)]
pub struct ListOptions {
    pub branch_id: Option<String>,
    pub page: i64,
    pub per_page: i64,
    /// "asc" / "desc" order the table by day-of-month of the final due date.
    pub sort: Option<String>,
    /// Inclusive date-range filter on the final due date.
    pub due_from: Option<String>,
    pub due_to: Option<String>,
}

fn installment_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
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
        "customer_name": row.get::<_, String>(1)?,
        "customer_full_address": row.get::<_, Option<String>>(2)?,
        "customer_occupation": row.get::<_, Option<String>>(3)?,
        "phone": row.get::<_, Option<String>>(4)?,
        "trademark": row.get::<_, Option<String>>(5)?,
        "term": row.get::<_, i64>(6)?,
        "quantity": row.get::<_, i64>(7)?,
        "total": row.get::<_, f64>(8)?,
        "partial_amount_paid": row.get::<_, f64>(9)?,
        "monthly_payment": row.get::<_, f64>(10)?,
        "date_released": row.get::<_, String>(11)?,
        "installment_due": row.get::<_, String>(12)?,
        "latest_payment_date": row.get::<_, String>(13)?,
        "status": row.get::<_, String>(14)?,
        "purple": row.get::<_, f64>(15)?,
        "yellow": row.get::<_, f64>(16)?,
        "white": row.get::<_, f64>(17)?,
        "comment": row.get::<_, Option<String>>(18)?,
        "collector_name": row.get::<_, Option<String>>(19)?,
        "branch_id": row.get::<_, Option<String>>(20)?,
        "created_at": row.get::<_, String>(21)?,
        "item": item,
        "branch": branch,
    }))
}

const INSTALLMENT_SELECT: &str = "
    SELECT i.id, i.customer_name, i.customer_full_address, i.customer_occupation,
           i.phone, i.trademark, i.term, i.quantity, i.total,
           i.partial_amount_paid, i.monthly_payment, i.date_released,
           i.installment_due, i.latest_payment_date, i.status,
           i.purple, i.yellow, i.white, i.comment, i.collector_name,
           i.branch_id, i.created_at,
           it.id, it.item_name, it.item_imei, it.serial, it.item_price,
           b.branch_name
    FROM installments i
    LEFT JOIN items it ON it.id = i.item_id
    LEFT JOIN branches b ON b.id = i.branch_id";

/// Attach the payments ledger to each row (join-style embedded select).
fn attach_payments(conn: &Connection, rows: &mut [Value]) -> Result<(), String> {
    for row in rows.iter_mut() {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut stmt = conn
            .prepare(
                "SELECT id, selected_month, payment, payment_date, date_paid
                 FROM installment_payments WHERE installment_id = ?1
                 ORDER BY created_at ASC",
            )
            .map_err(|e| e.to_string())?;
        let payments: Vec<Value> = stmt
            .query_map(params![id], |r| {
                Ok(serde_json::json!({
                    "id": r.get::<_, String>(0)?,
                    "selected_month": r.get::<_, String>(1)?,
                    "payment": r.get::<_, f64>(2)?,
                    "payment_date": r.get::<_, String>(3)?,
                    "date_paid": r.get::<_, String>(4)?,
                }))
            })
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
        if let Some(obj) = row.as_object_mut() {
            obj.insert("payments".into(), Value::Array(payments));
        }
    }
    Ok(())
}

/// Paginated listing with item/branch/ledger embeds and the staff sort
/// options (by due day-of-month, optional due-date range).
pub fn list(db: &DbState, opts: &ListOptions) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let per_page = if opts.per_page > 0 { opts.per_page } else { 50 };
    let offset = (opts.page.max(1) - 1) * per_page;

    let order = match opts.sort.as_deref() {
        Some("asc") => "CAST(strftime('%d', i.installment_due) AS INTEGER) ASC",
        Some("desc") => "CAST(strftime('%d', i.installment_due) AS INTEGER) DESC",
        _ => "i.created_at DESC",
    };

    let sql = format!(
        "{INSTALLMENT_SELECT}
         WHERE (?1 IS NULL OR i.branch_id = ?1)
           AND (?2 IS NULL OR i.installment_due >= ?2)
           AND (?3 IS NULL OR i.installment_due <= ?3)
         ORDER BY {order}
         LIMIT ?4 OFFSET ?5"
    );

    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let mut rows: Vec<Value> = stmt
        .query_map(
            params![opts.branch_id, opts.due_from, opts.due_to, per_page, offset],
            |row| installment_row_json(row),
        )
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    attach_payments(&conn, &mut rows)?;

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM installments i
             WHERE (?1 IS NULL OR i.branch_id = ?1)
               AND (?2 IS NULL OR i.installment_due >= ?2)
               AND (?3 IS NULL OR i.installment_due <= ?3)",
            params![opts.branch_id, opts.due_from, opts.due_to],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({ "data": rows, "count": count }))
}

/// Case-insensitive customer-name search with an item-name fallback when
/// nothing matches, capped at five rows (the search dropdown).
pub fn search(db: &DbState, query: &str, branch_id: Option<&str>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let pattern = format!("%{}%", query.trim().to_lowercase());

    let by_customer = format!(
        "{INSTALLMENT_SELECT}
         WHERE lower(i.customer_name) LIKE ?1
           AND (?2 IS NULL OR i.branch_id = ?2)
         LIMIT 5"
    );
    let mut stmt = conn.prepare(&by_customer).map_err(|e| e.to_string())?;
    let mut rows: Vec<Value> = stmt
        .query_map(params![pattern, branch_id], |row| installment_row_json(row))
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    if rows.is_empty() {
        let by_item = format!(
            "{INSTALLMENT_SELECT}
             WHERE lower(it.item_name) LIKE ?1
               AND (?2 IS NULL OR i.branch_id = ?2)
             LIMIT 5"
        );
        let mut stmt = conn.prepare(&by_item).map_err(|e| e.to_string())?;
        rows = stmt
            .query_map(params![pattern, branch_id], |row| installment_row_json(row))
            .map_err(|e| e.to_string())?
            .filter_map(|r| r.ok())
            .collect();
    }

    attach_payments(&conn, &mut rows)?;
    Ok(serde_json::json!(rows))
}

/// Group every installment in scope into its display bucket.
///
/// When the `dues`/`promote_on_due_payment` setting is on, due-today
/// contracts whose ledger holds a payment dated exactly on the rolling due
/// date are also persisted as `Fully-paid` (the historical side effect,
/// opt-in). With the setting off this is a pure read.
pub fn status_tables(
    db: &DbState,
    branch_id: Option<&str>,
    today: NaiveDate,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let promote = dues::promote_on_due_payment_enabled(&conn);

    let sql = format!(
        "{INSTALLMENT_SELECT}
         WHERE (?1 IS NULL OR i.branch_id = ?1)
         ORDER BY i.latest_payment_date ASC"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let mut rows: Vec<Value> = stmt
        .query_map(params![branch_id], |row| installment_row_json(row))
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();
    attach_payments(&conn, &mut rows)?;

    let mut tables = serde_json::Map::new();
    for bucket in DueBucket::ALL {
        tables.insert(bucket.as_str().to_string(), Value::Array(Vec::new()));
    }

    let mut promoted: Vec<String> = Vec::new();
    for row in rows {
        let status = row
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let latest_raw = row
            .get("latest_payment_date")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let latest = match dues::parse_day(&latest_raw) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "skipping installment with bad due date");
                continue;
            }
        };

        let paid_on_due = row
            .get("payments")
            .and_then(Value::as_array)
            .map(|payments| {
                payments.iter().any(|p| {
                    p.get("date_paid")
                        .and_then(Value::as_str)
                        .and_then(|s| dues::parse_day(s).ok())
                        .map(|d| d == latest)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        let bucket = match dues::classify(&status, latest, today, paid_on_due) {
            Some(b) => b,
            None => continue,
        };

        if promote
            && bucket == DueBucket::Green
            && status == dues::STATUS_ONGOING
            && paid_on_due
        {
            if let Some(id) = row.get("id").and_then(Value::as_str) {
                promoted.push(id.to_string());
            }
        }

        if let Some(Value::Array(arr)) = tables.get_mut(bucket.as_str()) {
            arr.push(row);
        }
    }

    for id in &promoted {
        let _ = conn.execute(
            "UPDATE installments SET status = 'Fully-paid'
             WHERE id = ?1 AND status = 'On-going'",
            params![id],
        );
        info!(installment_id = %id, "promoted to Fully-paid on due-date payment");
    }

    Ok(Value::Object(tables))
}

/// The Dues page subset: due today (purple) and lapsed (yellow) only.
pub fn due_tables(db: &DbState, branch_id: Option<&str>, today: NaiveDate) -> Result<Value, String> {
    let tables = status_tables(db, branch_id, today)?;
    Ok(serde_json::json!({
        "purple": tables.get("purple").cloned().unwrap_or(Value::Array(vec![])),
        "yellow": tables.get("yellow").cloned().unwrap_or(Value::Array(vec![])),
    }))
}
