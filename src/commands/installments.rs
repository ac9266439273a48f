//! Installment screen commands: listing, search, contract creation, the
//! payment ledger, status actions, and the dues projections.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::commands::{parse_payload, scope_branch};
use crate::installments::{self, ListOptions, NewInstallment};
use crate::search::SearchState;
use crate::{auth, db, dues};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPayload {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    per_page: Option<i64>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    due_from: Option<String>,
    #[serde(default)]
    due_to: Option<String>,
    #[serde(default)]
    branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstallmentPayload {
    full_name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    occupation: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    trademark: String,
    #[serde(default)]
    bir_tin: String,
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
struct AddPaymentPayload {
    installment_id: String,
    #[serde(default)]
    selected_month: String,
    #[serde(default)]
    payment: f64,
    #[serde(default)]
    payment_date: String,
    #[serde(default)]
    date_paid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePaymentPayload {
    payment_id: String,
    selected_month: String,
    payment: f64,
    payment_date: String,
    date_paid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetStatusPayload {
    installment_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountersPayload {
    installment_id: String,
    #[serde(default)]
    purple: Option<f64>,
    #[serde(default)]
    yellow: Option<f64>,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdPayload {
    #[serde(alias = "installment_id", alias = "id")]
    installment_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    query: String,
    #[serde(default)]
    branch_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DuesPayload {
    #[serde(default)]
    branch_id: Option<String>,
    /// Classification date, defaults to today. Lets staff preview a date.
    #[serde(default)]
    date: Option<String>,
}

fn dues_date(payload: &DuesPayload) -> Result<chrono::NaiveDate, String> {
    match &payload.date {
        Some(d) if !d.trim().is_empty() => dues::parse_day(d),
        _ => Ok(Utc::now().date_naive()),
    }
}

#[tauri::command]
pub async fn installment_get_all(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: ListPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "installment list")?,
        None => ListPayload {
            page: None,
            per_page: None,
            sort: None,
            due_from: None,
            due_to: None,
            branch_id: None,
        },
    };
    installments::list(
        &db,
        &ListOptions {
            branch_id: scope_branch(&ctx, payload.branch_id),
            page: payload.page.unwrap_or(1),
            per_page: payload.per_page.unwrap_or(50),
            sort: payload.sort,
            due_from: payload.due_from,
            due_to: payload.due_to,
        },
    )
}

#[tauri::command]
pub async fn installment_search(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
    search_state: tauri::State<'_, SearchState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: SearchPayload = parse_payload(arg0, "search")?;
    let scope = scope_branch(&ctx, payload.branch_id);

    let ticket = search_state.installments.begin();
    let data = installments::search(&db, &payload.query, scope.as_deref())?;
    if !search_state.installments.is_current(ticket) {
        return Ok(serde_json::json!({ "stale": true, "data": [] }));
    }
    Ok(serde_json::json!({ "stale": false, "data": data }))
}

#[tauri::command]
pub async fn installment_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: CreateInstallmentPayload = parse_payload(arg0, "installment")?;
    installments::create_installment(
        &db,
        &ctx,
        &NewInstallment {
            customer_name: payload.full_name,
            customer_full_address: payload.address,
            customer_occupation: payload.occupation,
            phone: payload.phone,
            trademark: payload.trademark,
            bir_tin: payload.bir_tin,
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
pub async fn installment_add_payment(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: AddPaymentPayload = parse_payload(arg0, "payment")?;
    installments::add_payment(
        &db,
        &ctx,
        &payload.installment_id,
        &payload.selected_month,
        payload.payment,
        &payload.payment_date,
        &payload.date_paid,
    )
}

#[tauri::command]
pub async fn installment_update_payment(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: UpdatePaymentPayload = parse_payload(arg0, "payment update")?;
    installments::update_payment(
        &db,
        &payload.payment_id,
        &payload.selected_month,
        payload.payment,
        &payload.payment_date,
        &payload.date_paid,
    )
}

#[tauri::command]
pub async fn installment_set_status(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: SetStatusPayload = parse_payload(arg0, "status")?;
    installments::set_status(&db, &ctx, &payload.installment_id, &payload.status)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthlyPayload {
    installment_id: String,
    monthly_payment: f64,
}

#[tauri::command]
pub async fn installment_set_monthly(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: MonthlyPayload = parse_payload(arg0, "monthly payment")?;
    installments::set_monthly_payment(&db, &payload.installment_id, payload.monthly_payment)
}

#[tauri::command]
pub async fn installment_update_counters(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: CountersPayload = parse_payload(arg0, "counters")?;
    installments::update_counters(
        &db,
        &payload.installment_id,
        payload.purple,
        payload.yellow,
        payload.comment.as_deref(),
    )
}

#[tauri::command]
pub async fn installment_get_payments(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: IdPayload = parse_payload(arg0, "installment id")?;
    installments::get_payments(&db, &payload.installment_id)
}

#[tauri::command]
pub async fn installment_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::context(&auth_state)?;
    let payload: IdPayload = parse_payload(arg0, "installment id")?;
    installments::delete_installment(&db, &payload.installment_id)
}

#[tauri::command]
pub async fn installment_get_status_tables(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: DuesPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "dues")?,
        None => DuesPayload::default(),
    };
    let today = dues_date(&payload)?;
    let scope = scope_branch(&ctx, payload.branch_id);
    installments::status_tables(&db, scope.as_deref(), today)
}

#[tauri::command]
pub async fn dues_get_due(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: DuesPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "dues")?,
        None => DuesPayload::default(),
    };
    let today = dues_date(&payload)?;
    let scope = scope_branch(&ctx, payload.branch_id);
    installments::due_tables(&db, scope.as_deref(), today)
}

#[tauri::command]
pub async fn dues_get_reminders(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    let ctx = auth::context(&auth_state)?;
    let payload: DuesPayload = match arg0 {
        Some(v) => parse_payload(Some(v), "dues")?,
        None => DuesPayload::default(),
    };
    let today = dues_date(&payload)?;
    let scope = scope_branch(&ctx, payload.branch_id);
    let reminders = dues::collect_reminders(&db, scope.as_deref(), today)?;
    Ok(serde_json::json!({
        "count": reminders.len(),
        "reminders": reminders,
    }))
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn create_payload_parses_with_defaults() {
        let parsed: CreateInstallmentPayload = parse_payload(
            Some(serde_json::json!({
                "fullName": "Maria Santos",
                "term": 6,
                "unitId": "it-1",
                "totalAmount": 15000.0,
                "dateReleased": "2025-01-15"
            })),
            "installment",
        )
        .expect("payload should parse");
        assert_eq!(parsed.full_name, "Maria Santos");
        assert_eq!(parsed.quantity, 1, "quantity defaults to 1");
        assert_eq!(parsed.partial_payment, 0.0);
        assert!(parsed.installment_due.is_none());
    }

    #[test]
    fn add_payment_payload_requires_installment_id() {
        let err = parse_payload::<AddPaymentPayload>(
            Some(serde_json::json!({ "selectedMonth": "March" })),
            "payment",
        )
        .expect_err("missing installmentId should fail");
        assert!(err.contains("Invalid payment payload"));
    }

    #[test]
    fn id_payload_accepts_aliases() {
        for key in ["installmentId", "installment_id", "id"] {
            let parsed: IdPayload =
                parse_payload(Some(serde_json::json!({ key: "i-1" })), "installment id")
                    .expect("alias should parse");
            assert_eq!(parsed.installment_id, "i-1");
        }
    }

    #[test]
    fn dues_payload_date_defaults_to_today() {
        let payload = DuesPayload::default();
        let date = dues_date(&payload).expect("date");
        assert_eq!(date, Utc::now().date_naive());

        let pinned = DuesPayload {
            branch_id: None,
            date: Some("2025-04-10".into()),
        };
        assert_eq!(
            dues_date(&pinned).unwrap(),
            dues::parse_day("2025-04-10").unwrap()
        );
    }
}
