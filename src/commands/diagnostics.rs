//! Diagnostics commands: about info, database health, support export.

use serde_json::Value;
use tauri::Manager;

use crate::{auth, db, diagnostics};

#[tauri::command]
pub async fn diagnostics_get_about(
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let mut about = diagnostics::get_about_info();
    if let Some(obj) = about.as_object_mut() {
        obj.insert(
            "dbPath".into(),
            Value::String(db.db_path.to_string_lossy().to_string()),
        );
        obj.insert(
            "uptimeSeconds".into(),
            serde_json::json!(crate::uptime_seconds()),
        );
    }
    Ok(about)
}

#[tauri::command]
pub async fn database_health_check(
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    diagnostics::health_check(&db)
}

#[tauri::command]
pub async fn database_get_stats(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    diagnostics::get_db_stats(&db)
}

#[tauri::command]
pub async fn diagnostics_export(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let output_dir = app
        .path()
        .app_data_dir()
        .map_err(|e| format!("resolve data dir: {e}"))?
        .join("diagnostics");
    std::fs::create_dir_all(&output_dir).map_err(|e| format!("create export dir: {e}"))?;
    let zip_path = diagnostics::export_diagnostics(&db, &output_dir)?;
    Ok(serde_json::json!({ "success": true, "path": zip_path }))
}
