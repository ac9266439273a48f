//! Financing screen commands.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::{parse_payload, scope_branch};
use crate::financing::{self, NewFinancing};
use crate::search::SearchState;
use crate::{auth, db};

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
struct CreateFinancingPayload {
    financing: String,
    full_name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    occupation: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    trademark: String,
    term: i64,
    #[serde(default = "default_quantity")]
    quantity: i64,
    unit_id: String,
    total_amount: f64,
    #[serde(default)]
    partial_payment: f64,
    date_released: String,
    #[serde(default)]
    installment_due: Option<String>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    query: String,
    #[serde(default)]
    branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdPayload {
    #[serde(alias = "financing_id", alias = "id")]
    financing_id: String,
}

#[tauri::command]
pub async fn financing_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "financing list")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    financing::list(
        &db,
        scope.as_deref(),
        payload.page.unwrap_or(1),
        payload.per_page.unwrap_or(50),
    )
}

#[tauri::command]
pub async fn financing_search(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
    search_state: tauri::State<'_, SearchState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: SearchPayload = parse_payload(arg0, "search")?;
    let scope = scope_branch(&ctx, payload.branch_id);

    let ticket = search_state.financing.begin();
    let data = financing::search(&db, &payload.query, scope.as_deref())?;
    if !search_state.financing.is_current(ticket) {
        return Ok(serde_json::json!({ "stale": true, "data": [] }));
    }
    Ok(serde_json::json!({ "stale": false, "data": data }))
}

#[tauri::command]
pub async fn financing_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: CreateFinancingPayload = parse_payload(arg0, "financing")?;
    financing::create_financing(
        &db,
        &ctx,
        &NewFinancing {
            financing: payload.financing,
            customer_name: payload.full_name,
            customer_full_address: payload.address,
            customer_occupation: payload.occupation,
            phone: payload.phone,
            trademark: payload.trademark,
            term: payload.term,
            quantity: payload.quantity,
            item_id: payload.unit_id,
            total: payload.total_amount,
            partial_payment: payload.partial_payment,
            date_released: payload.date_released,
            first_due: payload.installment_due,
        },
    )
}

#[tauri::command]
pub async fn financing_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: IdPayload = parse_payload(arg0, "financing id")?;
    financing::delete_financing(&db, &payload.financing_id)
}
