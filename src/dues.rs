//! Installment due-date arithmetic and status classification.
//!
//! Everything date-shaped in the installment flow funnels through here:
//! computing the final due date at contract creation, advancing the rolling
//! `latest_payment_date` when a monthly payment lands, bucketing accounts
//! into the color groups the dues screens render, and producing the
//! due-today / overdue reminder feed.
//!
//! All arithmetic is calendar-day based. Dates are date-only (`NaiveDate`);
//! day differences are whole calendar days, so time-of-day and timezone can
//! never shift a due date across midnight.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tauri::Emitter;
use tracing::{info, warn};

use crate::db::{self, DbState};

/// Installment lifecycle states. `On-going` is the only non-terminal one.
pub const STATUS_ONGOING: &str = "On-going";
pub const STATUS_FULLY_PAID: &str = "Fully-paid";
pub const STATUS_DEPOSIT: &str = "Deposit";
pub const STATUS_REMATE: &str = "Remate";

/// Overdue threshold: seven whole days past the rolling due date moves an
/// account from the grace window into the lapsed (yellow) group.
const OVERDUE_LAPSE_DAYS: i64 = 7;

/// Display buckets for the dues screens, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DueBucket {
    Green,
    White,
    Purple,
    Yellow,
    Blue,
    Red,
}

impl DueBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            DueBucket::Green => "green",
            DueBucket::White => "white",
            DueBucket::Purple => "purple",
            DueBucket::Yellow => "yellow",
            DueBucket::Blue => "blue",
            DueBucket::Red => "red",
        }
    }

    /// Staff-facing caption shown under each bucket table.
    pub fn caption(&self) -> &'static str {
        match self {
            DueBucket::Green => "Fully paid",
            DueBucket::White => "Not yet paid",
            DueBucket::Purple => "Due Date Now",
            DueBucket::Yellow => "Lapse within 7 days/For deposit",
            DueBucket::Blue => "Deposit",
            DueBucket::Red => "Remate",
        }
    }

    pub const ALL: [DueBucket; 6] = [
        DueBucket::Green,
        DueBucket::White,
        DueBucket::Purple,
        DueBucket::Yellow,
        DueBucket::Blue,
        DueBucket::Red,
    ];
}

// ---------------------------------------------------------------------------
// Calendar arithmetic
// ---------------------------------------------------------------------------

/// Parse a stored date value. Accepts plain `YYYY-MM-DD` as well as longer
/// ISO timestamps, from which only the date portion is taken.
pub fn parse_day(value: &str) -> Result<NaiveDate, String> {
    let day_part = value.split('T').next().unwrap_or(value).trim();
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d").map_err(|e| format!("invalid date {value}: {e}"))
}

/// Build a date from a year, zero-based month, and one-based day, letting
/// out-of-range components roll forward/backward (month 12 becomes January
/// of the next year, February 30 becomes early March, day 0 the last day of
/// the previous month). Short months shift a due day forward rather than
/// clamping it.
pub fn ymd_rolling(year: i32, month0: i64, day: i64) -> Result<NaiveDate, String> {
    let year = year as i64 + month0.div_euclid(12);
    let month = month0.rem_euclid(12) as u32 + 1;
    let year =
        i32::try_from(year).map_err(|_| format!("date out of range: year {year} overflows"))?;

    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| format!("date out of range: {year}-{month:02}-01"))?;
    first
        .checked_add_signed(Duration::days(day - 1))
        .ok_or_else(|| format!("date out of range: {year}-{month:02} day {day}"))
}

/// Advance a date by whole calendar months, keeping the day-of-month (with
/// rolling normalization when the target month is shorter).
pub fn add_months(date: NaiveDate, months: i64) -> Result<NaiveDate, String> {
    ymd_rolling(date.year(), date.month0() as i64 + months, date.day() as i64)
}

/// Whole calendar days from `today` until `due` (negative when overdue).
pub fn days_until(due: NaiveDate, today: NaiveDate) -> i64 {
    (due - today).num_days()
}

// ---------------------------------------------------------------------------
// Due-date calculator
// ---------------------------------------------------------------------------

/// Final due date of an in-house installment contract.
///
/// The first monthly due date counts as installment #1, so a 6-month term
/// starting 2025-02-15 ends 2025-07-15: `first_due + (term - 1)` months,
/// day-of-month preserved, December wrapping into the next year.
pub fn final_due_date(first_due: NaiveDate, term: i64) -> Result<NaiveDate, String> {
    validate_term(term)?;
    add_months(first_due, term - 1)
}

/// Final due date of a lender-brokered financing record. Financing terms
/// run a full `term` months past the first due date.
pub fn financing_due_date(first_due: NaiveDate, term: i64) -> Result<NaiveDate, String> {
    validate_term(term)?;
    add_months(first_due, term)
}

/// The first rolling due date at contract creation. A down payment covers
/// the first cycle, pushing the next collection one month out.
pub fn first_payment_date(first_due: NaiveDate, has_down_payment: bool) -> Result<NaiveDate, String> {
    if has_down_payment {
        add_months(first_due, 1)
    } else {
        Ok(first_due)
    }
}

fn validate_term(term: i64) -> Result<(), String> {
    if term < 1 {
        return Err(format!("Invalid term: {term}. Must be at least 1 month"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Payment ledger rollover
// ---------------------------------------------------------------------------

/// Next rolling due date after a payment satisfying the due date `paid_due`.
///
/// Lands in the month after `paid_due`, on the day after the contract's
/// final-due day-of-month. The +1 day is the collectors' convention: the
/// follow-up visit is scheduled the day after the contractual day.
pub fn next_due_date(paid_due: NaiveDate, installment_due: NaiveDate) -> Result<NaiveDate, String> {
    ymd_rolling(
        paid_due.year(),
        paid_due.month0() as i64 + 1,
        installment_due.day() as i64 + 1,
    )
}

// ---------------------------------------------------------------------------
// Status classifier
// ---------------------------------------------------------------------------

/// Assign an installment to its display bucket.
///
/// Pure projection: nothing is written here. `paid_on_due` tells the
/// classifier whether a ledger entry exists dated exactly on the rolling
/// due date, which promotes a due-today account straight to green.
///
/// Evaluation order for `On-going` accounts:
/// 1. due date in the future -> white;
/// 2. day-of-month matches today -> purple (or green when `paid_on_due`),
///    which also catches accounts a full cycle behind on their cycle day;
/// 3. seven or more days past -> yellow;
/// 4. otherwise (1-6 days past, off-cycle) -> white grace window.
pub fn classify(
    status: &str,
    latest_payment_date: NaiveDate,
    today: NaiveDate,
    paid_on_due: bool,
) -> Option<DueBucket> {
    match status {
        STATUS_FULLY_PAID => Some(DueBucket::Green),
        STATUS_DEPOSIT => Some(DueBucket::Blue),
        STATUS_REMATE => Some(DueBucket::Red),
        STATUS_ONGOING => {
            let diff_days = days_until(latest_payment_date, today);
            if diff_days > 0 {
                Some(DueBucket::White)
            } else if latest_payment_date.day() == today.day() {
                if paid_on_due {
                    Some(DueBucket::Green)
                } else {
                    Some(DueBucket::Purple)
                }
            } else if diff_days <= -OVERDUE_LAPSE_DAYS {
                Some(DueBucket::Yellow)
            } else {
                Some(DueBucket::White)
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Reminders
// ---------------------------------------------------------------------------

/// Urgency tier of a dues reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderTier {
    DueToday,
    Overdue,
    LongOverdue,
}

/// A reminder line for the notification feed.
#[derive(Debug, Clone, Serialize)]
pub struct Reminder {
    pub tier: ReminderTier,
    pub installment_id: String,
    pub customer_name: String,
    pub phone: String,
    pub days_overdue: i64,
    pub message: String,
}

/// Build the reminder for one account, if it needs one today.
///
/// Due today, overdue by up to a week, and overdue by one-to-two weeks each
/// get a message; anything older is already in collections follow-up and is
/// left to the yellow table.
pub fn reminder_for(
    installment_id: &str,
    customer_name: &str,
    phone: &str,
    latest_payment_date: NaiveDate,
    today: NaiveDate,
) -> Option<Reminder> {
    let diff_days = days_until(latest_payment_date, today);

    let (tier, message) = if diff_days == 0 {
        (
            ReminderTier::DueToday,
            format!(
                "{customer_name}'s installment is due today! Please remind them. Call {phone}"
            ),
        )
    } else if diff_days < 0 && diff_days >= -OVERDUE_LAPSE_DAYS {
        (
            ReminderTier::Overdue,
            format!(
                "{customer_name}'s installment is overdue by {} day(s)! Contact them to notify. Call {phone}",
                -diff_days
            ),
        )
    } else if diff_days < -OVERDUE_LAPSE_DAYS && diff_days >= -2 * OVERDUE_LAPSE_DAYS {
        (
            ReminderTier::LongOverdue,
            format!(
                "{customer_name}'s installment is overdue for more than a week but less than two weeks. Check the installment status. Call {phone}"
            ),
        )
    } else {
        return None;
    };

    Some(Reminder {
        tier,
        installment_id: installment_id.to_string(),
        customer_name: customer_name.to_string(),
        phone: phone.to_string(),
        days_overdue: (-diff_days).max(0),
        message,
    })
}

/// Collect reminders for every on-going installment, optionally scoped to
/// one branch.
pub fn collect_reminders(
    db: &DbState,
    branch_id: Option<&str>,
    today: NaiveDate,
) -> Result<Vec<Reminder>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT id, customer_name, phone, latest_payment_date
             FROM installments
             WHERE status = 'On-going'
               AND (?1 IS NULL OR branch_id = ?1)
             ORDER BY latest_payment_date ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(rusqlite::params![branch_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| e.to_string())?;

    let mut reminders = Vec::new();
    for row in rows {
        let (id, name, phone, latest) = row.map_err(|e| e.to_string())?;
        let latest = match parse_day(&latest) {
            Ok(d) => d,
            Err(e) => {
                warn!(installment_id = %id, error = %e, "skipping reminder with bad date");
                continue;
            }
        };
        if let Some(r) = reminder_for(&id, &name, phone.as_deref().unwrap_or(""), latest, today) {
            reminders.push(r);
        }
    }

    Ok(reminders)
}

/// Background dues monitor: periodically re-collects reminders and pushes
/// them to the frontend as a `dues_reminder` event.
pub fn start_due_reminder_monitor(app: tauri::AppHandle, db: Arc<DbState>, interval_secs: u64) {
    let cadence = std::time::Duration::from_secs(interval_secs.max(60));
    tauri::async_runtime::spawn(async move {
        info!(
            interval_secs = cadence.as_secs(),
            "Dues reminder monitor started"
        );
        loop {
            let today = chrono::Utc::now().date_naive();
            match collect_reminders(db.as_ref(), None, today) {
                Ok(reminders) if !reminders.is_empty() => {
                    let payload = serde_json::json!({
                        "date": today.to_string(),
                        "count": reminders.len(),
                        "reminders": reminders,
                    });
                    let _ = app.emit("dues_reminder", payload);
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(error = %error, "Dues reminder iteration failed");
                }
            }

            tokio::time::sleep(cadence).await;
        }
    });
}

/// Whether the read-time promotion of due-today accounts with an on-date
/// payment should also persist `Fully-paid`. Off by default; the classifier
/// itself never writes.
pub fn promote_on_due_payment_enabled(conn: &rusqlite::Connection) -> bool {
    db::get_setting(conn, "dues", "promote_on_due_payment")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("test date")
    }

    // -- calendar arithmetic ------------------------------------------------

    #[test]
    fn add_months_preserves_day() {
        assert_eq!(add_months(d("2025-01-15"), 1).unwrap(), d("2025-02-15"));
        assert_eq!(add_months(d("2025-03-05"), 4).unwrap(), d("2025-07-05"));
    }

    #[test]
    fn add_months_wraps_december_into_next_year() {
        assert_eq!(add_months(d("2025-11-20"), 2).unwrap(), d("2026-01-20"));
        assert_eq!(add_months(d("2025-12-31"), 1).unwrap(), d("2026-01-31"));
    }

    #[test]
    fn add_months_rolls_past_short_months() {
        // Jan 31 + 1 month: February has no 31st, rolls into early March.
        assert_eq!(add_months(d("2025-01-31"), 1).unwrap(), d("2025-03-03"));
        // Leap year February keeps one extra day before rolling.
        assert_eq!(add_months(d("2024-01-31"), 1).unwrap(), d("2024-03-02"));
    }

    #[test]
    fn ymd_rolling_normalizes_out_of_range_components() {
        assert_eq!(ymd_rolling(2025, 12, 1).unwrap(), d("2026-01-01"));
        assert_eq!(ymd_rolling(2025, -1, 15).unwrap(), d("2024-12-15"));
        assert_eq!(ymd_rolling(2025, 0, 32).unwrap(), d("2025-02-01"));
        assert_eq!(ymd_rolling(2025, 1, 0).unwrap(), d("2025-01-31"));
    }

    #[test]
    fn parse_day_accepts_timestamps() {
        assert_eq!(parse_day("2025-04-09").unwrap(), d("2025-04-09"));
        assert_eq!(parse_day("2025-04-09T16:20:00.000Z").unwrap(), d("2025-04-09"));
        assert!(parse_day("April 9").is_err());
    }

    // -- due-date calculator ------------------------------------------------

    #[test]
    fn final_due_counts_first_due_as_first_installment() {
        // 6 monthly payments starting Feb 15: Feb..Jul, final due Jul 15.
        assert_eq!(final_due_date(d("2025-02-15"), 6).unwrap(), d("2025-07-15"));
        // Released 2025-01-15 with the conventional first due one month
        // later lands the final due six months after release.
        let first_due = add_months(d("2025-01-15"), 1).unwrap();
        assert_eq!(final_due_date(first_due, 6).unwrap(), d("2025-07-15"));
    }

    #[test]
    fn final_due_month_index_property() {
        // month0(final) == (month0(first_due) + term - 1) mod 12
        for term in 1..=24i64 {
            let first_due = d("2025-06-10");
            let due = final_due_date(first_due, term).unwrap();
            assert_eq!(
                due.month0() as i64,
                (first_due.month0() as i64 + term - 1).rem_euclid(12),
                "term {term}"
            );
            assert_eq!(due.day(), 10, "term {term}");
        }
    }

    #[test]
    fn final_due_single_month_term_is_the_first_due() {
        assert_eq!(final_due_date(d("2025-05-20"), 1).unwrap(), d("2025-05-20"));
    }

    #[test]
    fn final_due_rejects_invalid_term() {
        assert!(final_due_date(d("2025-05-20"), 0).is_err());
        assert!(final_due_date(d("2025-05-20"), -3).is_err());
    }

    #[test]
    fn financing_due_runs_full_term() {
        assert_eq!(
            financing_due_date(d("2025-02-15"), 6).unwrap(),
            d("2025-08-15")
        );
        assert!(financing_due_date(d("2025-02-15"), 0).is_err());
    }

    #[test]
    fn first_payment_date_shifts_for_down_payment() {
        assert_eq!(
            first_payment_date(d("2025-02-15"), false).unwrap(),
            d("2025-02-15")
        );
        assert_eq!(
            first_payment_date(d("2025-02-15"), true).unwrap(),
            d("2025-03-15")
        );
    }

    // -- ledger rollover ----------------------------------------------------

    #[test]
    fn next_due_lands_month_after_payment_on_due_day_plus_one() {
        // Contract day-of-month 15; paying the March 15 due moves the
        // rolling date to April 16.
        let next = next_due_date(d("2025-03-15"), d("2025-07-15")).unwrap();
        assert_eq!(next, d("2025-04-16"));
    }

    #[test]
    fn next_due_wraps_year_end() {
        let next = next_due_date(d("2025-12-10"), d("2026-03-10")).unwrap();
        assert_eq!(next, d("2026-01-11"));
    }

    #[test]
    fn next_due_rolls_when_target_month_is_short() {
        // Due day 30 (+1 = 31) into February rolls forward into March.
        let next = next_due_date(d("2025-01-30"), d("2025-06-30")).unwrap();
        assert_eq!(next, d("2025-03-03"));
    }

    // -- classifier ---------------------------------------------------------

    #[test]
    fn fully_paid_is_green_regardless_of_dates() {
        let today = d("2025-04-10");
        assert_eq!(
            classify(STATUS_FULLY_PAID, d("2020-01-01"), today, false),
            Some(DueBucket::Green)
        );
    }

    #[test]
    fn future_due_is_white_even_on_matching_day() {
        let today = d("2025-04-10");
        // Exactly one month out shares the day-of-month but is not due yet.
        assert_eq!(
            classify(STATUS_ONGOING, d("2025-05-10"), today, false),
            Some(DueBucket::White)
        );
        assert_eq!(
            classify(STATUS_ONGOING, d("2025-04-11"), today, false),
            Some(DueBucket::White)
        );
    }

    #[test]
    fn due_today_is_purple() {
        let today = d("2025-04-10");
        assert_eq!(
            classify(STATUS_ONGOING, today, today, false),
            Some(DueBucket::Purple)
        );
    }

    #[test]
    fn due_today_with_on_date_payment_promotes_to_green() {
        let today = d("2025-04-10");
        assert_eq!(
            classify(STATUS_ONGOING, today, today, true),
            Some(DueBucket::Green)
        );
    }

    #[test]
    fn cycle_day_match_a_month_behind_is_purple() {
        // A full cycle behind, but today is the contract's cycle day.
        let today = d("2025-04-10");
        assert_eq!(
            classify(STATUS_ONGOING, d("2025-03-10"), today, false),
            Some(DueBucket::Purple)
        );
    }

    #[test]
    fn eight_days_past_is_yellow() {
        let today = d("2025-04-18");
        assert_eq!(
            classify(STATUS_ONGOING, d("2025-04-10"), today, false),
            Some(DueBucket::Yellow)
        );
    }

    #[test]
    fn exactly_seven_days_past_is_yellow() {
        let today = d("2025-04-17");
        assert_eq!(
            classify(STATUS_ONGOING, d("2025-04-10"), today, false),
            Some(DueBucket::Yellow)
        );
    }

    #[test]
    fn six_days_past_is_grace_white() {
        let today = d("2025-04-16");
        assert_eq!(
            classify(STATUS_ONGOING, d("2025-04-10"), today, false),
            Some(DueBucket::White)
        );
    }

    #[test]
    fn terminal_statuses_map_to_their_buckets() {
        let today = d("2025-04-10");
        assert_eq!(
            classify(STATUS_DEPOSIT, d("2025-04-10"), today, false),
            Some(DueBucket::Blue)
        );
        assert_eq!(
            classify(STATUS_REMATE, d("2025-04-10"), today, false),
            Some(DueBucket::Red)
        );
        assert_eq!(classify("Archived", d("2025-04-10"), today, false), None);
    }

    #[test]
    fn rollover_does_not_reenter_purple_until_new_due_day() {
        // Pay the April 10 due on time; the rolling date moves to May 11.
        let installment_due = d("2025-09-10");
        let new_latest = next_due_date(d("2025-04-10"), installment_due).unwrap();
        assert_eq!(new_latest, d("2025-05-11"));

        // The rest of April and early May never classify purple again.
        let mut day = d("2025-04-10");
        while day < new_latest {
            assert_eq!(
                classify(STATUS_ONGOING, new_latest, day, false),
                Some(DueBucket::White),
                "{day} should stay white"
            );
            day += Duration::days(1);
        }
        assert_eq!(
            classify(STATUS_ONGOING, new_latest, new_latest, false),
            Some(DueBucket::Purple)
        );
    }

    // -- reminders ----------------------------------------------------------

    #[test]
    fn reminder_tiers() {
        let today = d("2025-04-20");
        let due_today = reminder_for("i-1", "Maria", "0917", d("2025-04-20"), today).unwrap();
        assert_eq!(due_today.tier, ReminderTier::DueToday);
        assert!(due_today.message.contains("due today"));

        let overdue = reminder_for("i-2", "Jun", "0918", d("2025-04-16"), today).unwrap();
        assert_eq!(overdue.tier, ReminderTier::Overdue);
        assert_eq!(overdue.days_overdue, 4);
        assert!(overdue.message.contains("overdue by 4 day(s)"));

        let long_overdue = reminder_for("i-3", "Ana", "0919", d("2025-04-10"), today).unwrap();
        assert_eq!(long_overdue.tier, ReminderTier::LongOverdue);

        // Upcoming and ancient accounts produce no reminder.
        assert!(reminder_for("i-4", "Lee", "0920", d("2025-04-25"), today).is_none());
        assert!(reminder_for("i-5", "Gio", "0921", d("2025-03-01"), today).is_none());
    }
}
