//! Employee administration commands (superadmin only).

use serde::Deserialize;
use serde_json::Value;

use crate::auth::SessionContext;
use crate::commands::{parse_payload, scope_branch};
use crate::employees::{self, NewEmployee};
use crate::{auth, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEmployeePayload {
    first_name: String,
    last_name: String,
    email: String,
    #[serde(default)]
    phone_number: String,
    password: String,
    branch_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEmployeePayload {
    user_id: String,
    first_name: String,
    last_name: String,
    #[serde(default)]
    phone_number: String,
    branch_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetActivePayload {
    user_id: String,
    active: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListPayload {
    #[serde(default)]
    branch_id: Option<String>,
}

fn require_super(ctx: &SessionContext) -> Result<(), String> {
    if !ctx.is_super() {
        return Err("Only superadmins can manage employees".into());
    }
    Ok(())
}

#[tauri::command]
pub async fn employee_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    require_super(&ctx)?;
    let payload: CreateEmployeePayload = parse_payload(arg0, "employee")?;
    employees::create(
        &db,
        &NewEmployee {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            phone_number: payload.phone_number,
            password: payload.password,
            branch_id: payload.branch_id,
        },
    )
}

#[tauri::command]
pub async fn employee_update(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    require_super(&ctx)?;
    let payload: UpdateEmployeePayload = parse_payload(arg0, "employee update")?;
    employees::update(
        &db,
        &payload.user_id,
        &payload.first_name,
        &payload.last_name,
        &payload.phone_number,
        &payload.branch_id,
    )
}

#[tauri::command]
pub async fn employee_set_active(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    require_super(&ctx)?;
    let payload: SetActivePayload = parse_payload(arg0, "employee activation")?;
    employees::set_active(&db, &payload.user_id, payload.active)
}

#[tauri::command]
pub async fn employee_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "employee list")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    employees::list(&db, scope.as_deref())
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn create_payload_parses() {
        let parsed: CreateEmployeePayload = parse_payload(
            Some(serde_json::json!({
                "firstName": "Jun",
                "lastName": "Dela Cruz",
                "email": "jun@branchline.app",
                "password": "secret99",
                "branchId": "b-1"
            })),
            "employee",
        )
        .expect("payload should parse");
        assert_eq!(parsed.first_name, "Jun");
        assert!(parsed.phone_number.is_empty());
    }

    #[test]
    fn set_active_requires_flag() {
        let err = parse_payload::<SetActivePayload>(
            Some(serde_json::json!({ "userId": "u-1" })),
            "employee activation",
        )
        .expect_err("missing flag should fail");
        assert!(err.contains("Invalid employee activation payload"));
    }
}
