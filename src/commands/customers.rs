//! Customer registry commands.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::{parse_payload, scope_branch};
use crate::search::SearchState;
use crate::{auth, customers, db};

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
struct SearchPayload {
    query: String,
    #[serde(default)]
    branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdPayload {
    #[serde(alias = "customer_id", alias = "id")]
    customer_id: String,
}

#[tauri::command]
pub async fn customer_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "customer list")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    customers::list(
        &db,
        scope.as_deref(),
        payload.page.unwrap_or(1),
        payload.per_page.unwrap_or(10),
    )
}

#[tauri::command]
pub async fn customer_search(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
    search_state: tauri::State<'_, SearchState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: SearchPayload = parse_payload(arg0, "search")?;
    let scope = scope_branch(&ctx, payload.branch_id);

    let ticket = search_state.customers.begin();
    let data = customers::search(&db, &payload.query, scope.as_deref())?;
    if !search_state.customers.is_current(ticket) {
        return Ok(serde_json::json!({ "stale": true, "data": [] }));
    }
    Ok(serde_json::json!({ "stale": false, "data": data }))
}

#[tauri::command]
pub async fn customer_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: IdPayload = parse_payload(arg0, "customer id")?;
    customers::delete(&db, &payload.customer_id)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn id_payload_accepts_aliases() {
        for key in ["customerId", "customer_id", "id"] {
            let parsed: IdPayload =
                parse_payload(Some(serde_json::json!({ key: "c-1" })), "customer id")
                    .expect("alias should parse");
            assert_eq!(parsed.customer_id, "c-1");
        }
    }
}
