//! Expense screen commands.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::{parse_payload, scope_branch};
use crate::{auth, db, expenses};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpensePayload {
    #[serde(default)]
    expense_id: Option<String>,
    amount: f64,
    remarks: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListPayload {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    per_page: Option<i64>,
    #[serde(default)]
    branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdPayload {
    #[serde(alias = "expense_id", alias = "id")]
    expense_id: String,
}

#[tauri::command]
pub async fn expense_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ExpensePayload = parse_payload(arg0, "expense")?;
    expenses::create(&db, &ctx, payload.amount, &payload.remarks)
}

#[tauri::command]
pub async fn expense_update(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: ExpensePayload = parse_payload(arg0, "expense")?;
    let expense_id = payload
        .expense_id
        .clone()
        .ok_or("Missing expenseId for update")?;
    expenses::update(&db, &expense_id, payload.amount, &payload.remarks)
}

#[tauri::command]
pub async fn expense_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: IdPayload = parse_payload(arg0, "expense id")?;
    expenses::delete(&db, &payload.expense_id)
}

#[tauri::command]
pub async fn expense_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "expense list")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    expenses::list(
        &db,
        scope.as_deref(),
        payload.page.unwrap_or(1),
        payload.per_page.unwrap_or(10),
    )
}

#[tauri::command]
pub async fn expense_get_grouped(
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    if !ctx.is_super() {
        return Err("Only superadmins can view expenses across branches".into());
    }
    expenses::grouped_by_branch(&db)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn expense_payload_parses() {
        let parsed: ExpensePayload = parse_payload(
            Some(serde_json::json!({ "amount": 500.0, "remarks": "Electric bill" })),
            "expense",
        )
        .expect("payload should parse");
        assert!(parsed.expense_id.is_none());
        assert_eq!(parsed.amount, 500.0);
    }
}
