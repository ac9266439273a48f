//! IPC command handlers, grouped by screen. Each wrapper parses its payload,
//! resolves the operator's session context, and delegates to the owning
//! module.

pub mod auth;
pub mod branches;
pub mod customers;
pub mod diagnostics;
pub mod employees;
pub mod expenses;
pub mod financing;
pub mod installments;
pub mod inventory;
pub mod logs;
pub mod sales;
pub mod settings;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::SessionContext;

/// Deserialize an IPC payload into a typed DTO.
pub(crate) fn parse_payload<T: DeserializeOwned>(
    payload: Option<Value>,
    what: &str,
) -> Result<T, String> {
    let payload = payload.ok_or_else(|| format!("Missing {what} payload"))?;
    serde_json::from_value(payload).map_err(|e| format!("Invalid {what} payload: {e}"))
}

/// Resolve the branch scope for a query: superadmins see the branch they
/// asked for (or all branches), everyone else is pinned to their own.
pub(crate) fn scope_branch(ctx: &SessionContext, requested: Option<String>) -> Option<String> {
    if ctx.is_super() {
        requested.filter(|b| !b.is_empty())
    } else {
        ctx.branch_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: &str, branch: Option<&str>) -> SessionContext {
        SessionContext {
            user_id: "u-1".into(),
            name: "Ana".into(),
            role: role.into(),
            branch_id: branch.map(String::from),
            branch_name: None,
        }
    }

    #[test]
    fn super_sees_requested_scope_admin_is_pinned() {
        let admin = ctx("admin", Some("b-1"));
        assert_eq!(
            scope_branch(&admin, Some("b-2".into())),
            Some("b-1".to_string()),
            "admins cannot widen their scope"
        );

        let superadmin = ctx("super", None);
        assert_eq!(scope_branch(&superadmin, Some("b-2".into())), Some("b-2".to_string()));
        assert_eq!(scope_branch(&superadmin, None), None, "all branches");
        assert_eq!(scope_branch(&superadmin, Some("".into())), None);
    }
}
