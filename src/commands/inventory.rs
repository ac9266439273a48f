//! Inventory screen commands: product groups, items, stock rollups.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::{parse_payload, scope_branch};
use crate::inventory::{self, NewItem};
use crate::{auth, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupPayload {
    product_group: String,
    #[serde(default)]
    branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPayload {
    #[serde(default)]
    item_id: Option<String>,
    product_group_id: String,
    item_name: String,
    #[serde(default)]
    item_imei: String,
    #[serde(default)]
    serial: String,
    item_price: f64,
    stocks: i64,
    #[serde(default)]
    is_bir: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListItemsPayload {
    #[serde(default)]
    product_group_id: Option<String>,
    #[serde(default)]
    branch_id: Option<String>,
}

impl ItemPayload {
    fn as_new_item(&self) -> NewItem {
        NewItem {
            product_group_id: self.product_group_id.clone(),
            item_name: self.item_name.clone(),
            item_imei: self.item_imei.clone(),
            serial: self.serial.clone(),
            item_price: self.item_price,
            stocks: self.stocks,
            is_bir: self.is_bir,
        }
    }
}

#[tauri::command]
pub async fn product_group_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: CreateGroupPayload = parse_payload(arg0, "product group")?;
    let branch_id = match scope_branch(&ctx, payload.branch_id) {
        Some(b) => b,
        None => ctx.require_branch()?.to_string(),
    };
    inventory::create_group(&db, &payload.product_group, &branch_id)
}

#[tauri::command]
pub async fn product_group_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListItemsPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "product groups")?,
        None => ListItemsPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    inventory::list_groups(&db, scope.as_deref())
}

#[tauri::command]
pub async fn item_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: ItemPayload = parse_payload(arg0, "item")?;
    inventory::create_item(&db, &payload.as_new_item())
}

#[tauri::command]
pub async fn item_update(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: ItemPayload = parse_payload(arg0, "item")?;
    let item_id = payload
        .item_id
        .clone()
        .ok_or("Missing itemId for update")?;
    inventory::update_item(&db, &item_id, &payload.as_new_item())
}

#[tauri::command]
pub async fn item_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListItemsPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "items")?,
        None => ListItemsPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    inventory::list_items(&db, payload.product_group_id.as_deref(), scope.as_deref())
}

#[tauri::command]
pub async fn inventory_get_stock_metrics(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListItemsPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "stock metrics")?,
        None => ListItemsPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    inventory::stock_metrics(&db, scope.as_deref())
}

#[tauri::command]
pub async fn stocks_get_per_branch(
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    if !ctx.is_super() {
        return Err("Only superadmins can view stocks across branches".into());
    }
    inventory::stocks_per_branch(&db)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn item_payload_parses_with_defaults() {
        let parsed: ItemPayload = parse_payload(
            Some(serde_json::json!({
                "productGroupId": "pg-1",
                "itemName": "TV 43",
                "itemPrice": 15999.0,
                "stocks": 4
            })),
            "item",
        )
        .expect("payload should parse");
        assert!(parsed.item_id.is_none());
        assert!(!parsed.is_bir);
        assert_eq!(parsed.as_new_item().item_name, "TV 43");
    }
}
