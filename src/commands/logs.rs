//! Activity log commands.

use serde::Deserialize;
use serde_json::Value;

use crate::commands::{parse_payload, scope_branch};
use crate::{audit, auth, db};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListPayload {
    #[serde(default)]
    branch_id: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[tauri::command]
pub async fn logs_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "log list")?,
        None => ListPayload::default(),
    };
    let scope = scope_branch(&ctx, payload.branch_id);
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    audit::list(
        &conn,
        scope.as_deref(),
        payload.query.as_deref(),
        payload.limit.unwrap_or(200),
    )
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn list_payload_defaults() {
        let parsed: ListPayload =
            parse_payload(Some(serde_json::json!({})), "log list").expect("payload should parse");
        assert!(parsed.branch_id.is_none());
        assert!(parsed.query.is_none());
        assert!(parsed.limit.is_none());
    }
}
