//! Local settings commands (category/key/value store).

use serde::Deserialize;
use serde_json::Value;

use crate::commands::parse_payload;
use crate::{auth, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetSettingPayload {
    category: String,
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetSettingPayload {
    category: String,
    key: String,
    value: String,
}

#[tauri::command]
pub async fn settings_get(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: GetSettingPayload = parse_payload(arg0, "setting")?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(match db::get_setting(&conn, &payload.category, &payload.key) {
        Some(v) => Value::String(v),
        None => Value::Null,
    })
}

#[tauri::command]
pub async fn settings_set(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    if !ctx.is_super() {
        return Err("Only superadmins can change settings".into());
    }
    let payload: SetSettingPayload = parse_payload(arg0, "setting")?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, &payload.category, &payload.key, &payload.value)?;
    Ok(serde_json::json!({ "success": true }))
}

#[tauri::command]
pub async fn settings_get_all(
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(db::get_all_settings(&conn))
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn set_payload_requires_value() {
        let err = parse_payload::<SetSettingPayload>(
            Some(serde_json::json!({ "category": "dues", "key": "promote_on_due_payment" })),
            "setting",
        )
        .expect_err("missing value should fail");
        assert!(err.contains("Invalid setting payload"));
    }
}
