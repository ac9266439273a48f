//! Branch administration commands.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::parse_payload;
use crate::{auth, branches, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBranchPayload {
    branch_name: String,
    branch_address: String,
    #[serde(alias = "branchPhone")]
    branch_contact_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdPayload {
    #[serde(alias = "branch_id", alias = "id")]
    branch_id: String,
}

#[tauri::command]
pub async fn branch_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    if !ctx.is_super() {
        return Err("Only superadmins can manage branches".into());
    }
    let payload: CreateBranchPayload = parse_payload(arg0, "branch")?;
    branches::create(
        &db,
        &payload.branch_name,
        &payload.branch_address,
        &payload.branch_contact_number,
    )
}

#[tauri::command]
pub async fn branch_get_all(
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    branches::list(&db)
}

#[tauri::command]
pub async fn branch_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    if !ctx.is_super() {
        return Err("Only superadmins can manage branches".into());
    }
    let payload: IdPayload = parse_payload(arg0, "branch id")?;
    branches::delete(&db, &payload.branch_id)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn create_payload_accepts_phone_alias() {
        let parsed: CreateBranchPayload = parse_payload(
            Some(serde_json::json!({
                "branchName": "North",
                "branchAddress": "123 Rizal Ave",
                "branchPhone": "09171234567"
            })),
            "branch",
        )
        .expect("payload should parse");
        assert_eq!(parsed.branch_contact_number, "09171234567");
    }
}
