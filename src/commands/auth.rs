//! Login, logout, and session lifecycle commands.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::parse_payload;
use crate::{auth, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    email: String,
    password: String,
    #[serde(default)]
    remember: bool,
}

#[tauri::command]
pub async fn auth_login(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let payload: LoginPayload = parse_payload(arg0, "login")?;
    auth::login(
        &db,
        &auth_state,
        &payload.email,
        payload.password,
        payload.remember,
    )
}

#[tauri::command]
pub async fn auth_logout(auth_state: tauri::State<'_, auth::AuthState>) -> Result<Value, String> {
    auth::logout(&auth_state);
    Ok(serde_json::json!({ "success": true }))
}

#[tauri::command]
pub async fn auth_get_current_session(
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    Ok(auth::get_session_json(&auth_state))
}

#[tauri::command]
pub async fn auth_validate_session(
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    Ok(auth::validate_session(&auth_state))
}

#[tauri::command]
pub async fn auth_restore_session(
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::restore_session(&db, &auth_state)
}

#[tauri::command]
pub async fn auth_track_activity(
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::track_activity(&auth_state);
    Ok(serde_json::json!({ "success": true }))
}

#[tauri::command]
pub async fn auth_get_session_stats(
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    Ok(auth::get_session_stats(&auth_state))
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn login_payload_defaults_remember_to_false() {
        let parsed: LoginPayload = parse_payload(
            Some(serde_json::json!({
                "email": "ana@branchline.app",
                "password": "hunter22"
            })),
            "login",
        )
        .expect("payload should parse");
        assert_eq!(parsed.email, "ana@branchline.app");
        assert!(!parsed.remember);
    }

    #[test]
    fn login_payload_requires_both_fields() {
        let err = parse_payload::<LoginPayload>(
            Some(serde_json::json!({ "email": "ana@branchline.app" })),
            "login",
        )
        .expect_err("missing password should fail");
        assert!(err.contains("Invalid login payload"));

        let err = parse_payload::<LoginPayload>(None, "login").expect_err("missing payload");
        assert!(err.contains("Missing login payload"));
    }
}
