#![recursion_limit = "256"]

//! Branchline Admin - Tauri v2 Backend
//!
//! This module registers all IPC command handlers that the React frontend
//! calls via `@tauri-apps/api/core::invoke()`. Command names are grouped by
//! screen (e.g. `installment_add_payment`, `dues_get_due`).

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// App start time for uptime calculation (epoch seconds).
pub(crate) static APP_START_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Dues reminders re-run on this cadence (seconds) while the app is open.
const DUE_REMINDER_INTERVAL_SECS: u64 = 15 * 60;

mod audit;
mod auth;
mod branches;
mod commands;
mod customers;
mod db;
mod diagnostics;
mod dues;
mod employees;
mod expenses;
mod financing;
mod installments;
mod inventory;
mod sales;
mod search;
mod storage;

pub(crate) fn uptime_seconds() -> u64 {
    let start = APP_START_EPOCH.load(Ordering::Relaxed);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    now.saturating_sub(start)
}

// ============================================================================
// App entry point
// ============================================================================

pub fn run() {
    // Record start time for uptime tracking
    let epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    APP_START_EPOCH.store(epoch, Ordering::Relaxed);

    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,branchline_admin_lib=debug"));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs();

    // Rolling file appender: creates daily log files in the logs directory
    let log_dir = diagnostics::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "admin");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes logs.
    // We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);

    info!("Starting Branchline Admin v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .setup(|app| {
            use std::sync::Arc;
            use tauri::Manager;

            let app_data_dir = app
                .path()
                .app_data_dir()
                .expect("Failed to get app data dir");

            // Main DB connection for Tauri commands
            let db_state = db::init(&app_data_dir).expect("Failed to initialize database");
            app.manage(db_state);

            // Auth + search-guard state
            app.manage(auth::AuthState::new());
            app.manage(search::SearchState::default());

            // Second DB connection for the background dues monitor
            let db_for_dues =
                Arc::new(db::init(&app_data_dir).expect("Failed to init dues database"));
            dues::start_due_reminder_monitor(
                app.handle().clone(),
                db_for_dues,
                DUE_REMINDER_INTERVAL_SECS,
            );

            info!("Database, auth, and dues monitor registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Auth
            commands::auth::auth_login,
            commands::auth::auth_logout,
            commands::auth::auth_get_current_session,
            commands::auth::auth_validate_session,
            commands::auth::auth_restore_session,
            commands::auth::auth_track_activity,
            commands::auth::auth_get_session_stats,
            // Installments
            commands::installments::installment_get_all,
            commands::installments::installment_search,
            commands::installments::installment_create,
            commands::installments::installment_add_payment,
            commands::installments::installment_update_payment,
            commands::installments::installment_set_status,
            commands::installments::installment_set_monthly,
            commands::installments::installment_update_counters,
            commands::installments::installment_get_payments,
            commands::installments::installment_delete,
            commands::installments::installment_get_status_tables,
            // Dues
            commands::installments::dues_get_due,
            commands::installments::dues_get_reminders,
            // Financing
            commands::financing::financing_get_all,
            commands::financing::financing_search,
            commands::financing::financing_create,
            commands::financing::financing_delete,
            // Inventory
            commands::inventory::product_group_create,
            commands::inventory::product_group_get_all,
            commands::inventory::item_create,
            commands::inventory::item_update,
            commands::inventory::item_get_all,
            commands::inventory::inventory_get_stock_metrics,
            commands::inventory::stocks_get_per_branch,
            // Direct purchases & sales
            commands::sales::direct_purchase_create,
            commands::sales::direct_purchase_get_all,
            commands::sales::sales_get_all,
            commands::sales::sales_get_totals_per_branch,
            commands::sales::sales_get_total,
            commands::sales::sales_get_daily_total,
            commands::sales::sale_delete,
            // Expenses
            commands::expenses::expense_create,
            commands::expenses::expense_update,
            commands::expenses::expense_delete,
            commands::expenses::expense_get_all,
            commands::expenses::expense_get_grouped,
            // Employees
            commands::employees::employee_create,
            commands::employees::employee_update,
            commands::employees::employee_set_active,
            commands::employees::employee_get_all,
            // Branches
            commands::branches::branch_create,
            commands::branches::branch_get_all,
            commands::branches::branch_delete,
            // Customers
            commands::customers::customer_get_all,
            commands::customers::customer_search,
            commands::customers::customer_delete,
            // Activity logs
            commands::logs::logs_get_all,
            // Settings
            commands::settings::settings_get,
            commands::settings::settings_set,
            commands::settings::settings_get_all,
            // Diagnostics
            commands::diagnostics::diagnostics_get_about,
            commands::diagnostics::database_health_check,
            commands::diagnostics::database_get_stats,
            commands::diagnostics::diagnostics_export,
        ])
        .run(tauri::generate_context!())
        .expect("error while running Branchline Admin");
}
