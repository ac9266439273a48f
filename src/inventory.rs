//! Catalog and stock: product groups, sellable items, and the stock
//! rollups the dashboard and stocks-per-branch screens read.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;

/// Items at or below this stock level count as "low" in the metrics rollup.
const LOW_STOCK_THRESHOLD: i64 = 3;

// ---------------------------------------------------------------------------
// Product groups
// ---------------------------------------------------------------------------

/// Create a product group for a branch.
pub fn create_group(db: &DbState, name: &str, branch_id: &str) -> Result<Value, String> {
    if name.trim().is_empty() {
        return Err("Please enter a product name!".into());
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO product_groups (id, product_group, branch_id) VALUES (?1, ?2, ?3)",
        params![id, name.trim(), branch_id],
    )
    .map_err(|e| format!("insert product group: {e}"))?;
    info!(group = %name, branch_id = %branch_id, "product group created");
    Ok(serde_json::json!({ "success": true, "groupId": id }))
}

/// Product groups for a branch, each with its item count.
pub fn list_groups(db: &DbState, branch_id: Option<&str>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT g.id, g.product_group, g.branch_id, g.created_at,
                    COUNT(i.id) AS item_count
             FROM product_groups g
             LEFT JOIN items i ON i.product_group_id = g.id
             WHERE (?1 IS NULL OR g.branch_id = ?1)
             GROUP BY g.id
             ORDER BY g.product_group ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![branch_id], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "product_group": row.get::<_, String>(1)?,
                "branch_id": row.get::<_, Option<String>>(2)?,
                "created_at": row.get::<_, String>(3)?,
                "item_count": row.get::<_, i64>(4)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut groups = Vec::new();
    for row in rows {
        match row {
            Ok(g) => groups.push(g),
            Err(e) => warn!("skipping malformed product group row: {e}"),
        }
    }
    Ok(serde_json::json!(groups))
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Input for a new catalog item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub product_group_id: String,
    pub item_name: String,
    pub item_imei: String,
    pub serial: String,
    pub item_price: f64,
    pub stocks: i64,
    pub is_bir: bool,
}

/// Add an item under a product group.
pub fn create_item(db: &DbState, input: &NewItem) -> Result<Value, String> {
    if input.item_name.trim().is_empty() {
        return Err("Missing required field: item name".into());
    }
    if input.item_price < 0.0 || input.stocks < 0 {
        return Err("Price and stocks must not be negative".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let group_exists: Option<String> = conn
        .query_row(
            "SELECT id FROM product_groups WHERE id = ?1",
            params![input.product_group_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("group lookup: {e}"))?;
    if group_exists.is_none() {
        return Err(format!(
            "Product group not found: {}",
            input.product_group_id
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO items (id, product_group_id, item_name, item_imei, serial,
                            item_price, stocks, is_bir)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            input.product_group_id,
            input.item_name.trim(),
            input.item_imei,
            input.serial,
            input.item_price,
            input.stocks,
            input.is_bir as i64,
        ],
    )
    .map_err(|e| format!("insert item: {e}"))?;

    info!(item = %input.item_name, "item created");
    Ok(serde_json::json!({ "success": true, "itemId": id }))
}

/// Update an item's editable fields.
pub fn update_item(db: &DbState, item_id: &str, input: &NewItem) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let changed = conn
        .execute(
            "UPDATE items SET item_name = ?1, item_imei = ?2, serial = ?3,
                              item_price = ?4, stocks = ?5, is_bir = ?6
             WHERE id = ?7",
            params![
                input.item_name.trim(),
                input.item_imei,
                input.serial,
                input.item_price,
                input.stocks,
                input.is_bir as i64,
                item_id
            ],
        )
        .map_err(|e| format!("update item: {e}"))?;
    if changed == 0 {
        return Err(format!("Item not found: {item_id}"));
    }
    Ok(serde_json::json!({ "success": true }))
}

/// Items in a product group (or all items of a branch via its groups).
pub fn list_items(
    db: &DbState,
    product_group_id: Option<&str>,
    branch_id: Option<&str>,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT i.id, i.product_group_id, i.item_name, i.item_imei, i.serial,
                    i.item_price, i.stocks, i.number_of_sold, i.is_bir, i.created_at,
                    g.product_group
             FROM items i
             LEFT JOIN product_groups g ON g.id = i.product_group_id
             WHERE (?1 IS NULL OR i.product_group_id = ?1)
               AND (?2 IS NULL OR g.branch_id = ?2)
             ORDER BY i.item_name ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![product_group_id, branch_id], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "product_group_id": row.get::<_, Option<String>>(1)?,
                "item_name": row.get::<_, String>(2)?,
                "item_imei": row.get::<_, Option<String>>(3)?,
                "serial": row.get::<_, Option<String>>(4)?,
                "item_price": row.get::<_, f64>(5)?,
                "stocks": row.get::<_, i64>(6)?,
                "number_of_sold": row.get::<_, i64>(7)?,
                "is_bir": row.get::<_, i64>(8)? != 0,
                "created_at": row.get::<_, String>(9)?,
                "product_group": row.get::<_, Option<String>>(10)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    for row in rows {
        match row {
            Ok(i) => items.push(i),
            Err(e) => warn!("skipping malformed item row: {e}"),
        }
    }
    Ok(serde_json::json!(items))
}

// ---------------------------------------------------------------------------
// Stock rollups
// ---------------------------------------------------------------------------

/// Dashboard stock metrics: catalog size, total units, low/out-of-stock
/// counts, units sold.
pub fn stock_metrics(db: &DbState, branch_id: Option<&str>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.query_row(
        "SELECT COUNT(i.id),
                COALESCE(SUM(i.stocks), 0),
                COALESCE(SUM(CASE WHEN i.stocks = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.stocks > 0 AND i.stocks <= ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(i.number_of_sold), 0)
         FROM items i
         LEFT JOIN product_groups g ON g.id = i.product_group_id
         WHERE (?1 IS NULL OR g.branch_id = ?1)",
        params![branch_id, LOW_STOCK_THRESHOLD],
        |row| {
            Ok(serde_json::json!({
                "catalog_count": row.get::<_, i64>(0)?,
                "total_stocks": row.get::<_, i64>(1)?,
                "out_of_stock": row.get::<_, i64>(2)?,
                "low_stock": row.get::<_, i64>(3)?,
                "units_sold": row.get::<_, i64>(4)?,
            }))
        },
    )
    .map_err(|e| format!("stock metrics: {e}"))
}

/// Per-branch stock totals for the stocks-per-branch screen.
pub fn stocks_per_branch(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT b.id, b.branch_name,
                    COALESCE(SUM(i.stocks), 0),
                    COALESCE(SUM(i.number_of_sold), 0),
                    COUNT(i.id)
             FROM branches b
             LEFT JOIN product_groups g ON g.branch_id = b.id
             LEFT JOIN items i ON i.product_group_id = g.id
             GROUP BY b.id
             ORDER BY b.branch_name ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "branch_id": row.get::<_, String>(0)?,
                "branch_name": row.get::<_, String>(1)?,
                "total_stocks": row.get::<_, i64>(2)?,
                "units_sold": row.get::<_, i64>(3)?,
                "catalog_count": row.get::<_, i64>(4)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut branches = Vec::new();
    for row in rows {
        match row {
            Ok(b) => branches.push(b),
            Err(e) => warn!("skipping malformed branch stock row: {e}"),
        }
    }
    Ok(serde_json::json!(branches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn test_db_state() -> DbState {
        let conn = rusqlite::Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        conn.execute(
            "INSERT INTO branches (id, branch_name) VALUES ('b-1', 'Main Branch')",
            [],
        )
        .expect("seed branch");
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    fn item(group: &str, name: &str, stocks: i64) -> NewItem {
        NewItem {
            product_group_id: group.into(),
            item_name: name.into(),
            item_imei: "".into(),
            serial: "".into(),
            item_price: 1000.0,
            stocks,
            is_bir: false,
        }
    }

    #[test]
    fn groups_and_items_round_trip() {
        let db_state = test_db_state();
        let group = create_group(&db_state, "Televisions", "b-1").expect("group");
        let group_id = group["groupId"].as_str().unwrap().to_string();

        create_item(&db_state, &item(&group_id, "TV 43", 5)).expect("item");
        create_item(&db_state, &item(&group_id, "TV 55", 0)).expect("item");

        let groups = list_groups(&db_state, Some("b-1")).expect("list groups");
        let arr = groups.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["item_count"], 2);

        let items = list_items(&db_state, Some(&group_id), None).expect("list items");
        assert_eq!(items.as_array().unwrap().len(), 2);

        let err = create_item(&db_state, &item("missing", "X", 1)).expect_err("bad group");
        assert!(err.contains("Product group not found"));
    }

    #[test]
    fn metrics_count_low_and_out_of_stock() {
        let db_state = test_db_state();
        let group = create_group(&db_state, "Appliances", "b-1").expect("group");
        let group_id = group["groupId"].as_str().unwrap().to_string();
        create_item(&db_state, &item(&group_id, "Fan", 2)).expect("item");
        create_item(&db_state, &item(&group_id, "Rice Cooker", 0)).expect("item");
        create_item(&db_state, &item(&group_id, "Fridge", 10)).expect("item");

        let metrics = stock_metrics(&db_state, Some("b-1")).expect("metrics");
        assert_eq!(metrics["catalog_count"], 3);
        assert_eq!(metrics["total_stocks"], 12);
        assert_eq!(metrics["out_of_stock"], 1);
        assert_eq!(metrics["low_stock"], 1);

        let per_branch = stocks_per_branch(&db_state).expect("per branch");
        let arr = per_branch.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["total_stocks"], 12);
    }
}
