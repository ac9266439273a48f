//! Direct purchase and daily-sales commands.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::{parse_payload, scope_branch};
use crate::sales::{self, NewDirectPurchase, PurchaseLine};
use crate::{auth, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseLinePayload {
    item_id: String,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePurchasePayload {
    #[serde(default)]
    customer_name: String,
    #[serde(default)]
    reference_number: String,
    payment_method: String,
    items: Vec<PurchaseLinePayload>,
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
    #[serde(default)]
    date_from: Option<String>,
    #[serde(default)]
    date_to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleIdPayload {
    #[serde(alias = "sale_id", alias = "id")]
    sale_id: String,
}

#[tauri::command]
pub async fn direct_purchase_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: CreatePurchasePayload = parse_payload(arg0, "direct purchase")?;
    sales::create_direct_purchase(
        &db,
        &ctx,
        &NewDirectPurchase {
            customer_name: payload.customer_name,
            reference_number: payload.reference_number,
            payment_method: payload.payment_method,
            lines: payload
                .items
                .into_iter()
                .map(|l| PurchaseLine {
                    item_id: l.item_id,
                    quantity: l.quantity,
                })
                .collect(),
        },
    )
}

#[tauri::command]
pub async fn direct_purchase_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "purchase list")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    sales::list_purchases(
        &db,
        scope.as_deref(),
        payload.page.unwrap_or(1),
        payload.per_page.unwrap_or(50),
    )
}

#[tauri::command]
pub async fn sales_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "sales list")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    sales::list_sales(
        &db,
        scope.as_deref(),
        payload.page.unwrap_or(1),
        payload.per_page.unwrap_or(50),
        payload.date_from.as_deref(),
        payload.date_to.as_deref(),
    )
}

#[tauri::command]
pub async fn sales_get_totals_per_branch(
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    sales::totals_per_branch(&db)
}

#[tauri::command]
pub async fn sales_get_total(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "sales total")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    let total = sales::total_sales(&db, scope.as_deref())?;
    Ok(serde_json::json!({ "total": total }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyTotalPayload {
    date: String,
    #[serde(default)]
    branch_id: Option<String>,
}

#[tauri::command]
pub async fn sales_get_daily_total(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: DailyTotalPayload = parse_payload(arg0, "daily total")?;
    let scope = scope_branch(&ctx, payload.branch_id);
    sales::daily_total(&db, scope.as_deref(), &payload.date)
}

#[tauri::command]
pub async fn sale_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: SaleIdPayload = parse_payload(arg0, "sale id")?;
    sales::delete_sale(&db, &ctx, &payload.sale_id)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn purchase_payload_parses_cart_lines() {
        let parsed: CreatePurchasePayload = parse_payload(
            Some(serde_json::json!({
                "paymentMethod": "GCash",
                "items": [
                    { "itemId": "it-1", "quantity": 2 },
                    { "itemId": "it-2", "quantity": 1 }
                ]
            })),
            "direct purchase",
        )
        .expect("payload should parse");
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].item_id, "it-1");
        assert!(parsed.customer_name.is_empty());
    }

    #[test]
    fn purchase_payload_requires_payment_method() {
        let err = parse_payload::<CreatePurchasePayload>(
            Some(serde_json::json!({ "items": [] })),
            "direct purchase",
        )
        .expect_err("missing payment method should fail");
        assert!(err.contains("Invalid direct purchase payload"));
    }
}
