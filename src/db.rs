//! Local SQLite database layer for Branchline Admin.
//!
//! Uses rusqlite with WAL mode. The store is the system of record for every
//! back-office table (branches, users, inventory, installments, sales, ...).
//! Provides schema migrations, settings helpers, and managed state for use
//! across Tauri commands.

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Tauri managed state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Initialize the database at `{app_data_dir}/branchline.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(app_data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(app_data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = app_data_dir.join("branchline.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let wal = db_path.with_extension("db-wal");
                let shm = db_path.with_extension("db-shm");
                let _ = fs::remove_file(&wal);
                let _ = fs::remove_file(&shm);
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: core back-office tables.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- branches
        CREATE TABLE IF NOT EXISTS branches (
            id TEXT PRIMARY KEY,
            branch_name TEXT NOT NULL,
            branch_address TEXT NOT NULL DEFAULT '',
            branch_contact_number TEXT NOT NULL DEFAULT '',
            branch_total_sales REAL NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- users (login accounts)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            phone_number TEXT DEFAULT '',
            role TEXT NOT NULL DEFAULT 'admin'
                CHECK (role IN ('super', 'admin')),
            branch_id TEXT REFERENCES branches(id),
            is_deactivated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- employees (HR record behind a user account)
        CREATE TABLE IF NOT EXISTS employees (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            phone_number TEXT DEFAULT '',
            branch_id TEXT REFERENCES branches(id),
            number_of_transactions INTEGER NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- product_groups (catalog categories, per branch)
        CREATE TABLE IF NOT EXISTS product_groups (
            id TEXT PRIMARY KEY,
            product_group TEXT NOT NULL,
            branch_id TEXT REFERENCES branches(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- items (sellable units)
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            product_group_id TEXT REFERENCES product_groups(id) ON DELETE CASCADE,
            item_name TEXT NOT NULL,
            item_imei TEXT DEFAULT '',
            serial TEXT DEFAULT '',
            item_price REAL NOT NULL DEFAULT 0,
            stocks INTEGER NOT NULL DEFAULT 0,
            number_of_sold INTEGER NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- installments (in-house financed sales)
        CREATE TABLE IF NOT EXISTS installments (
            id TEXT PRIMARY KEY,
            customer_name TEXT NOT NULL,
            customer_full_address TEXT DEFAULT '',
            customer_occupation TEXT DEFAULT '',
            phone TEXT DEFAULT '',
            trademark TEXT DEFAULT '',
            term INTEGER NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            total REAL NOT NULL DEFAULT 0,
            partial_amount_paid REAL NOT NULL DEFAULT 0,
            monthly_payment REAL NOT NULL DEFAULT 0,
            date_released TEXT NOT NULL,
            installment_due TEXT NOT NULL,
            latest_payment_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'On-going'
                CHECK (status IN ('On-going', 'Fully-paid', 'Deposit', 'Remate')),
            purple REAL NOT NULL DEFAULT 0,
            yellow REAL NOT NULL DEFAULT 0,
            white REAL NOT NULL DEFAULT 0,
            collector_name TEXT DEFAULT '',
            item_id TEXT REFERENCES items(id),
            branch_id TEXT REFERENCES branches(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- installment_payments (monthly ledger, owned by the installment)
        CREATE TABLE IF NOT EXISTS installment_payments (
            id TEXT PRIMARY KEY,
            installment_id TEXT NOT NULL REFERENCES installments(id) ON DELETE CASCADE,
            selected_month TEXT NOT NULL,
            payment REAL NOT NULL,
            payment_date TEXT NOT NULL,
            date_paid TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- customers (registry rows created alongside installments)
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            customer_name TEXT NOT NULL,
            customer_address TEXT DEFAULT '',
            customer_phone_number TEXT DEFAULT '',
            customer_occupation TEXT DEFAULT '',
            customer_trade_mark TEXT DEFAULT '',
            bir_tin TEXT DEFAULT '',
            branch_id TEXT REFERENCES branches(id),
            installment_id TEXT REFERENCES installments(id) ON DELETE CASCADE,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- direct_purchases (one-time cash/GCash sales)
        CREATE TABLE IF NOT EXISTS direct_purchases (
            id TEXT PRIMARY KEY,
            customer_name TEXT NOT NULL DEFAULT '',
            amount REAL NOT NULL DEFAULT 0,
            reference_number TEXT DEFAULT '',
            payment_method TEXT NOT NULL DEFAULT 'Cash',
            collector_name TEXT DEFAULT '',
            branch_id TEXT REFERENCES branches(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS direct_purchase_items (
            id TEXT PRIMARY KEY,
            direct_purchase_id TEXT NOT NULL
                REFERENCES direct_purchases(id) ON DELETE CASCADE,
            item_id TEXT REFERENCES items(id),
            product_name TEXT NOT NULL,
            price REAL NOT NULL DEFAULT 0,
            quantity INTEGER NOT NULL DEFAULT 1
        );

        -- sales (financial transactions, one row per collected amount)
        CREATE TABLE IF NOT EXISTS sales (
            id TEXT PRIMARY KEY,
            amount REAL NOT NULL,
            payment_method TEXT NOT NULL DEFAULT 'Cash',
            date_issued TEXT NOT NULL,
            branch_id TEXT REFERENCES branches(id),
            installment_id TEXT REFERENCES installments(id) ON DELETE SET NULL,
            purchase_id TEXT REFERENCES direct_purchases(id) ON DELETE SET NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- expenses
        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            amount REAL NOT NULL,
            remarks TEXT NOT NULL DEFAULT '',
            employee_name TEXT DEFAULT '',
            branch_id TEXT REFERENCES branches(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- activity_logs (append-only audit trail)
        CREATE TABLE IF NOT EXISTS activity_logs (
            id TEXT PRIMARY KEY,
            log_label TEXT NOT NULL,
            log_category TEXT NOT NULL,
            user_id TEXT,
            installment_id TEXT,
            purchase_id TEXT,
            branch_id TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        CREATE INDEX IF NOT EXISTS idx_employees_user_id ON employees(user_id);
        CREATE INDEX IF NOT EXISTS idx_items_group ON items(product_group_id);
        CREATE INDEX IF NOT EXISTS idx_installments_branch ON installments(branch_id);
        CREATE INDEX IF NOT EXISTS idx_installments_status ON installments(status);
        CREATE INDEX IF NOT EXISTS idx_installment_payments_parent
            ON installment_payments(installment_id);
        CREATE INDEX IF NOT EXISTS idx_customers_installment ON customers(installment_id);
        CREATE INDEX IF NOT EXISTS idx_sales_branch ON sales(branch_id);
        CREATE INDEX IF NOT EXISTS idx_sales_date ON sales(date_issued);
        CREATE INDEX IF NOT EXISTS idx_expenses_branch ON expenses(branch_id);
        CREATE INDEX IF NOT EXISTS idx_activity_logs_branch ON activity_logs(branch_id);
        CREATE INDEX IF NOT EXISTS idx_activity_logs_created ON activity_logs(created_at);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1 (core tables)");
    Ok(())
}

/// Migration v2: third-party financing records.
///
/// Same shape as installments plus the lender column; sales rows gain an
/// optional financing reference.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS financing (
            id TEXT PRIMARY KEY,
            financing TEXT NOT NULL DEFAULT 'Home Credit',
            customer_name TEXT NOT NULL,
            customer_full_address TEXT DEFAULT '',
            customer_occupation TEXT DEFAULT '',
            phone TEXT DEFAULT '',
            trademark TEXT DEFAULT '',
            term INTEGER NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            total REAL NOT NULL DEFAULT 0,
            partial_amount_paid REAL NOT NULL DEFAULT 0,
            monthly_payment REAL NOT NULL DEFAULT 0,
            date_released TEXT NOT NULL,
            installment_due TEXT NOT NULL,
            latest_payment_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'On-going'
                CHECK (status IN ('On-going', 'Fully-paid', 'Deposit', 'Remate')),
            purple REAL NOT NULL DEFAULT 0,
            yellow REAL NOT NULL DEFAULT 0,
            white REAL NOT NULL DEFAULT 0,
            collector_name TEXT DEFAULT '',
            item_id TEXT REFERENCES items(id),
            branch_id TEXT REFERENCES branches(id),
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_financing_branch ON financing(branch_id);

        ALTER TABLE sales ADD COLUMN financing_id TEXT
            REFERENCES financing(id) ON DELETE SET NULL;

        -- Record migration
        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (financing table)");
    Ok(())
}

/// Migration v3: BIR flagging for items and free-form installment comments.
fn migrate_v3(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        ALTER TABLE items ADD COLUMN is_bir INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE installments ADD COLUMN comment TEXT DEFAULT '';

        -- Record migration
        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        format!("migration v3: {e}")
    })?;

    info!("Applied migration v3 (item BIR flag, installment comments)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers (local_settings table)
// ---------------------------------------------------------------------------

/// Read a setting value, or `None` if it does not exist.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings
         WHERE setting_category = ?1 AND setting_key = ?2",
        rusqlite::params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting value.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key)
         DO UPDATE SET setting_value = ?3, updated_at = datetime('now')",
        rusqlite::params![category, key, value],
    )
    .map_err(|e| format!("set setting {category}/{key}: {e}"))?;
    Ok(())
}

/// Return all settings grouped by category.
pub fn get_all_settings(conn: &Connection) -> serde_json::Value {
    let mut result = serde_json::Map::new();

    let mut stmt = match conn
        .prepare("SELECT setting_category, setting_key, setting_value FROM local_settings")
    {
        Ok(s) => s,
        Err(_) => return serde_json::Value::Object(result),
    };

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    });

    if let Ok(rows) = rows {
        for row in rows.flatten() {
            let (category, key, value) = row;
            let entry = result
                .entry(category)
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if let Some(obj) = entry.as_object_mut() {
                obj.insert(key, serde_json::Value::String(value));
            }
        }
    }

    serde_json::Value::Object(result)
}

/// Delete all settings in a category.
pub fn delete_all_settings(conn: &Connection, category: &str) -> Result<(), String> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1",
        rusqlite::params![category],
    )
    .map_err(|e| format!("delete settings {category}: {e}"))?;
    Ok(())
}

/// Run migrations against an arbitrary connection (test helper).
pub fn run_migrations_for_test(conn: &Connection) {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .expect("enable foreign keys");
    run_migrations(conn).expect("test migrations");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("pragma");
        conn
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run");

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn installment_status_check_constraint() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        let bad = conn.execute(
            "INSERT INTO installments (id, customer_name, term, date_released,
                                       installment_due, latest_payment_date, status)
             VALUES ('i-bad', 'X', 6, '2025-01-01', '2025-06-01', '2025-02-01', 'Paid-off')",
            [],
        );
        assert!(bad.is_err(), "unknown status should be rejected");

        conn.execute(
            "INSERT INTO installments (id, customer_name, term, date_released,
                                       installment_due, latest_payment_date, status)
             VALUES ('i-ok', 'X', 6, '2025-01-01', '2025-06-01', '2025-02-01', 'On-going')",
            [],
        )
        .expect("valid status accepted");
    }

    #[test]
    fn payments_cascade_with_installment() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO installments (id, customer_name, term, date_released,
                                       installment_due, latest_payment_date)
             VALUES ('i-1', 'Maria', 6, '2025-01-15', '2025-07-15', '2025-02-15')",
            [],
        )
        .expect("insert installment");
        conn.execute(
            "INSERT INTO installment_payments (id, installment_id, selected_month,
                                               payment, payment_date, date_paid)
             VALUES ('p-1', 'i-1', 'February', 1500.0, '2025-02-15', '2025-02-15')",
            [],
        )
        .expect("insert payment");
        conn.execute(
            "INSERT INTO customers (id, customer_name, installment_id)
             VALUES ('c-1', 'Maria', 'i-1')",
            [],
        )
        .expect("insert customer");

        conn.execute("DELETE FROM installments WHERE id = 'i-1'", [])
            .expect("delete installment");

        let payments: i32 = conn
            .query_row("SELECT COUNT(*) FROM installment_payments", [], |row| {
                row.get(0)
            })
            .unwrap();
        let customers: i32 = conn
            .query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(payments, 0, "payments should cascade-delete");
        assert_eq!(customers, 0, "customer rows should cascade-delete");
    }

    #[test]
    fn sale_keeps_row_when_installment_deleted() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO installments (id, customer_name, term, date_released,
                                       installment_due, latest_payment_date)
             VALUES ('i-2', 'Jun', 3, '2025-03-01', '2025-05-01', '2025-04-01')",
            [],
        )
        .expect("insert installment");
        conn.execute(
            "INSERT INTO sales (id, amount, date_issued, installment_id)
             VALUES ('s-1', 2000.0, '2025-04-01', 'i-2')",
            [],
        )
        .expect("insert sale");

        conn.execute("DELETE FROM installments WHERE id = 'i-2'", [])
            .expect("delete installment");

        let (count, inst_id): (i32, Option<String>) = conn
            .query_row("SELECT COUNT(*), MAX(installment_id) FROM sales", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(count, 1, "financial history survives the delete");
        assert!(inst_id.is_none(), "installment reference is nulled");
    }

    #[test]
    fn migration_v2_financing_table() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO financing (id, financing, customer_name, term, date_released,
                                    installment_due, latest_payment_date)
             VALUES ('f-1', 'Skyro', 'Ana', 12, '2025-02-10', '2026-02-10', '2025-03-10')",
            [],
        )
        .expect("insert financing");

        conn.execute(
            "INSERT INTO sales (id, amount, date_issued, financing_id)
             VALUES ('s-f', 900.0, '2025-03-10', 'f-1')",
            [],
        )
        .expect("sale with financing reference");

        let lender: String = conn
            .query_row("SELECT financing FROM financing WHERE id = 'f-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(lender, "Skyro");
    }

    #[test]
    fn migration_v3_columns() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO items (id, item_name, item_price, stocks, is_bir)
             VALUES ('it-1', 'TV 43\"', 15999.0, 4, 1)",
            [],
        )
        .expect("insert item with BIR flag");

        let is_bir: i32 = conn
            .query_row("SELECT is_bir FROM items WHERE id = 'it-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(is_bir, 1);
    }

    #[test]
    fn user_role_check_constraint() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        let bad = conn.execute(
            "INSERT INTO users (id, email, password_hash, role)
             VALUES ('u-bad', 'x@y.z', 'hash', 'owner')",
            [],
        );
        assert!(bad.is_err(), "unknown role should be rejected");
    }

    #[test]
    fn settings_crud() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        set_setting(&conn, "dues", "promote_on_due_payment", "true").expect("set");
        assert_eq!(
            get_setting(&conn, "dues", "promote_on_due_payment"),
            Some("true".to_string())
        );

        set_setting(&conn, "dues", "promote_on_due_payment", "false").expect("update");
        assert_eq!(
            get_setting(&conn, "dues", "promote_on_due_payment"),
            Some("false".to_string())
        );

        delete_all_settings(&conn, "dues").expect("delete");
        assert!(get_setting(&conn, "dues", "promote_on_due_payment").is_none());
    }
}
