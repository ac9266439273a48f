//! Email + password authentication with bcrypt.
//!
//! Verifies staff accounts against the `users` table, tracks a single
//! interactive session in memory, and persists failed-attempt lockout state
//! in `local_settings` so restarting the app does not clear it. The session
//! context (who, which role, which branch) is threaded explicitly into every
//! business operation; nothing reads ambient credential state.

use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::{db, storage};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_INACTIVITY_MINUTES: i64 = 30;
const SESSION_MAX_DURATION_HOURS: i64 = 12;
const LOCKOUT_ATTEMPTS_KEY: &str = "lockout_attempts";
const LOCKOUT_LAST_ATTEMPT_KEY: &str = "lockout_last_attempt";

/// Role that sees every branch.
pub const ROLE_SUPER: &str = "super";
/// Branch-scoped staff role.
pub const ROLE_ADMIN: &str = "admin";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The signed-in operator, passed into business operations that need to
/// attribute writes (audit logs, collector names, transaction counters).
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub branch_id: Option<String>,
    pub branch_name: Option<String>,
}

impl SessionContext {
    pub fn is_super(&self) -> bool {
        self.role == ROLE_SUPER
    }

    /// Branch id required for branch-scoped writes.
    pub fn require_branch(&self) -> Result<&str, String> {
        self.branch_id
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| "No branch assigned to this account".to_string())
    }
}

/// An active interactive session.
#[derive(Clone)]
struct Session {
    session_id: String,
    ctx: SessionContext,
    email: String,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Check whether this session has expired (inactivity or max duration).
    fn is_expired(&self) -> bool {
        let now = Utc::now();
        if now >= self.expires_at {
            return true;
        }
        if now - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES) {
            return true;
        }
        false
    }

    /// Convert to the JSON shape the frontend expects.
    fn to_user_json(&self) -> Value {
        serde_json::json!({
            "id": self.ctx.user_id,
            "email": self.email,
            "name": self.ctx.name,
            "role": self.ctx.role,
            "branch_id": self.ctx.branch_id,
            "branch_name": self.ctx.branch_name,
            "sessionId": self.session_id,
        })
    }
}

/// Lockout tracking entry.
struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

/// Tauri managed state for authentication.
pub struct AuthState {
    current: Mutex<Option<Session>>,
    lockout: Mutex<LockoutEntry>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            lockout: Mutex::new(LockoutEntry {
                attempts: 0,
                last_attempt: Utc::now(),
            }),
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Lockout helpers
// ---------------------------------------------------------------------------

/// Check whether logins are currently locked out.
fn check_lockout(lockout: &LockoutEntry) -> Result<(), String> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            let remaining = LOCKOUT_MINUTES - elapsed.num_minutes();
            return Err(format!(
                "Too many failed attempts. Try again in {remaining} minute(s)."
            ));
        }
        // Lockout period has elapsed — will be reset on next successful login
    }
    Ok(())
}

fn record_failure(lockout: &mut LockoutEntry) {
    lockout.attempts += 1;
    lockout.last_attempt = Utc::now();
    warn!(attempts = lockout.attempts, "failed login attempt");
}

fn reset_lockout(lockout: &mut LockoutEntry) {
    lockout.attempts = 0;
    lockout.last_attempt = Utc::now();
}

/// Load persisted lockout state from local_settings.
fn load_lockout_from_db(conn: &rusqlite::Connection) -> LockoutEntry {
    let attempts = db::get_setting(conn, "auth", LOCKOUT_ATTEMPTS_KEY)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, "auth", LOCKOUT_LAST_ATTEMPT_KEY)
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    LockoutEntry {
        attempts,
        last_attempt,
    }
}

/// Persist lockout state in local_settings.
fn persist_lockout_to_db(conn: &rusqlite::Connection, lockout: &LockoutEntry) {
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_ATTEMPTS_KEY,
        &lockout.attempts.to_string(),
    );
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_LAST_ATTEMPT_KEY,
        &lockout.last_attempt.to_rfc3339(),
    );
}

// ---------------------------------------------------------------------------
// User lookup
// ---------------------------------------------------------------------------

struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    branch_id: Option<String>,
    is_deactivated: bool,
}

fn find_user_by_email(conn: &rusqlite::Connection, email: &str) -> Result<Option<UserRow>, String> {
    conn.query_row(
        "SELECT id, email, password_hash, first_name, last_name, role, branch_id, is_deactivated
         FROM users WHERE email = ?1",
        rusqlite::params![email],
        |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                first_name: row.get(3)?,
                last_name: row.get(4)?,
                role: row.get(5)?,
                branch_id: row.get(6)?,
                is_deactivated: row.get::<_, i64>(7)? != 0,
            })
        },
    )
    .optional()
    .map_err(|e| format!("user lookup: {e}"))
}

fn branch_name_for(conn: &rusqlite::Connection, branch_id: Option<&str>) -> Option<String> {
    let branch_id = branch_id?;
    conn.query_row(
        "SELECT branch_name FROM branches WHERE id = ?1",
        rusqlite::params![branch_id],
        |row| row.get(0),
    )
    .optional()
    .ok()
    .flatten()
}

fn session_from_user(conn: &rusqlite::Connection, user: &UserRow) -> Session {
    let now = Utc::now();
    Session {
        session_id: Uuid::new_v4().to_string(),
        ctx: SessionContext {
            user_id: user.id.clone(),
            name: format!("{} {}", user.first_name, user.last_name)
                .trim()
                .to_string(),
            role: user.role.clone(),
            branch_id: user.branch_id.clone(),
            branch_name: branch_name_for(conn, user.branch_id.as_deref()),
        },
        email: user.email.clone(),
        login_time: now,
        last_activity: now,
        expires_at: now + Duration::hours(SESSION_MAX_DURATION_HOURS),
    }
}

// ---------------------------------------------------------------------------
// Public command implementations
// ---------------------------------------------------------------------------

/// Verify credentials and open a session.
///
/// The plaintext password is wiped from memory once verification finishes,
/// pass or fail.
pub fn login(
    db: &db::DbState,
    auth: &AuthState,
    email: &str,
    mut password: String,
    remember: bool,
) -> Result<Value, String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        password.zeroize();
        return Err("Please input all fields!".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    // Synchronize lockout state from durable storage.
    {
        let mut lockout = auth.lockout.lock().unwrap();
        *lockout = load_lockout_from_db(&conn);
        if let Err(e) = check_lockout(&lockout) {
            password.zeroize();
            return Err(e);
        }
    }

    let user = find_user_by_email(&conn, &email)?;
    let verified = match &user {
        Some(u) => bcrypt::verify(&password, &u.password_hash).unwrap_or(false),
        None => {
            // Burn comparable time so a missing account is indistinguishable
            // from a wrong password.
            let _ = bcrypt::verify(&password, "$2b$12$invalidsaltinvalidsaltinvalidsalt12345678");
            false
        }
    };
    password.zeroize();

    let user = match (user, verified) {
        (Some(u), true) => u,
        _ => {
            let mut lockout = auth.lockout.lock().unwrap();
            record_failure(&mut lockout);
            persist_lockout_to_db(&conn, &lockout);
            return Err("Invalid credentials. Please try again.".into());
        }
    };

    if user.is_deactivated {
        return Err(
            "Your account has been deactivated. Please contact the administrator.".into(),
        );
    }

    {
        let mut lockout = auth.lockout.lock().unwrap();
        reset_lockout(&mut lockout);
        persist_lockout_to_db(&conn, &lockout);
    }

    let session = session_from_user(&conn, &user);
    let user_json = session.to_user_json();

    if remember {
        if let Err(e) = storage::save_session(&user_json) {
            warn!(error = %e, "failed to persist remembered session");
        }
    }

    info!(user_id = %session.ctx.user_id, role = %session.ctx.role, "login successful");
    *auth.current.lock().unwrap() = Some(session);

    Ok(serde_json::json!({ "success": true, "user": user_json }))
}

/// Invalidate the current session and forget the remembered one.
pub fn logout(auth: &AuthState) {
    let mut current = auth.current.lock().unwrap();
    if let Some(session) = current.take() {
        info!(session_id = %session.session_id, "session logged out");
    }
    if let Err(e) = storage::clear_session() {
        warn!(error = %e, "failed to clear remembered session");
    }
}

fn current_session(auth: &AuthState) -> Option<Session> {
    let guard = auth.current.lock().unwrap();
    let session = guard.as_ref()?.clone();
    if session.is_expired() {
        return None;
    }
    Some(session)
}

/// Return the current session user or null.
pub fn get_session_json(auth: &AuthState) -> Value {
    match current_session(auth) {
        Some(s) => s.to_user_json(),
        None => Value::Null,
    }
}

/// Validate the current session, clearing it when expired.
pub fn validate_session(auth: &AuthState) -> Value {
    match current_session(auth) {
        Some(_) => serde_json::json!({ "valid": true }),
        None => {
            let mut current = auth.current.lock().unwrap();
            *current = None;
            serde_json::json!({ "valid": false, "reason": "Session expired or not found" })
        }
    }
}

/// Refresh the inactivity timer.
pub fn track_activity(auth: &AuthState) {
    let mut guard = auth.current.lock().unwrap();
    if let Some(session) = guard.as_mut() {
        session.last_activity = Utc::now();
    }
}

/// Session stats for the settings screen.
pub fn get_session_stats(auth: &AuthState) -> Value {
    match current_session(auth) {
        Some(s) => serde_json::json!({
            "sessionId": s.session_id,
            "role": s.ctx.role,
            "loginTime": s.login_time.to_rfc3339(),
            "lastActivity": s.last_activity.to_rfc3339(),
            "expiresAt": s.expires_at.to_rfc3339(),
        }),
        None => serde_json::json!({}),
    }
}

/// Rebuild a session from the remembered keyring blob at startup.
///
/// The stored user is re-verified against the database; deactivated or
/// deleted accounts drop the blob instead of restoring.
pub fn restore_session(db: &db::DbState, auth: &AuthState) -> Result<Value, String> {
    let blob = match storage::load_session() {
        Some(b) => b,
        None => return Ok(Value::Null),
    };
    let email = blob
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if email.is_empty() {
        let _ = storage::clear_session();
        return Ok(Value::Null);
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let user = match find_user_by_email(&conn, &email)? {
        Some(u) if !u.is_deactivated => u,
        _ => {
            let _ = storage::clear_session();
            return Ok(Value::Null);
        }
    };

    let session = session_from_user(&conn, &user);
    let user_json = session.to_user_json();
    info!(user_id = %session.ctx.user_id, "session restored from keyring");
    *auth.current.lock().unwrap() = Some(session);
    Ok(user_json)
}

/// Current operator context for business operations.
pub fn context(auth: &AuthState) -> Result<SessionContext, String> {
    current_session(auth)
        .map(|s| s.ctx)
        .ok_or_else(|| "Not signed in".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::path::PathBuf;

    fn test_db_state() -> db::DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        db::DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    fn seed_user(db_state: &db::DbState, email: &str, password: &str, deactivated: bool) {
        let conn = db_state.conn.lock().expect("db lock");
        conn.execute(
            "INSERT INTO branches (id, branch_name) VALUES ('b-1', 'Main Branch')
             ON CONFLICT(id) DO NOTHING",
            [],
        )
        .expect("seed branch");
        let hash = bcrypt::hash(password, 4).expect("hash test password");
        conn.execute(
            "INSERT INTO users (id, email, password_hash, first_name, last_name,
                                role, branch_id, is_deactivated)
             VALUES (?1, ?2, ?3, 'Test', 'User', 'admin', 'b-1', ?4)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                email,
                hash,
                deactivated as i64
            ],
        )
        .expect("seed user");
    }

    fn lockout_attempts(db_state: &db::DbState) -> u32 {
        let conn = db_state.conn.lock().expect("db lock");
        db::get_setting(&conn, "auth", LOCKOUT_ATTEMPTS_KEY)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    #[test]
    fn login_succeeds_and_builds_branch_scoped_context() {
        let db_state = test_db_state();
        seed_user(&db_state, "staff@branchline.app", "hunter22", false);
        let auth = AuthState::new();

        let result = login(
            &db_state,
            &auth,
            "staff@branchline.app",
            "hunter22".to_string(),
            false,
        )
        .expect("valid login");
        assert_eq!(result.get("success").and_then(Value::as_bool), Some(true));

        let ctx = context(&auth).expect("session context");
        assert_eq!(ctx.role, ROLE_ADMIN);
        assert_eq!(ctx.name, "Test User");
        assert_eq!(ctx.branch_id.as_deref(), Some("b-1"));
        assert_eq!(ctx.branch_name.as_deref(), Some("Main Branch"));
        assert_eq!(ctx.require_branch().unwrap(), "b-1");
    }

    #[test]
    fn deactivated_account_is_rejected() {
        let db_state = test_db_state();
        seed_user(&db_state, "old@branchline.app", "hunter22", true);
        let auth = AuthState::new();

        let err = login(
            &db_state,
            &auth,
            "old@branchline.app",
            "hunter22".to_string(),
            false,
        )
        .expect_err("deactivated login should fail");
        assert!(err.contains("deactivated"));
        assert!(context(&auth).is_err(), "no session should be created");
    }

    #[test]
    fn lockout_persists_across_auth_state_restart() {
        let db_state = test_db_state();
        let auth_before_restart = AuthState::new();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let err = login(
                &db_state,
                &auth_before_restart,
                "ghost@branchline.app",
                "wrong".to_string(),
                false,
            )
            .expect_err("invalid login should fail");
            assert_eq!(err, "Invalid credentials. Please try again.");
        }

        assert_eq!(lockout_attempts(&db_state), MAX_FAILED_ATTEMPTS);

        let auth_after_restart = AuthState::new();
        let err = login(
            &db_state,
            &auth_after_restart,
            "ghost@branchline.app",
            "wrong".to_string(),
            false,
        )
        .expect_err("lockout should remain active after restart");

        assert!(
            err.contains("Too many failed attempts"),
            "unexpected lockout error message: {err}"
        );
        assert_eq!(
            lockout_attempts(&db_state),
            MAX_FAILED_ATTEMPTS,
            "blocked attempt should not increment counter while lockout is active"
        );
    }

    #[test]
    fn successful_login_resets_persisted_lockout() {
        let db_state = test_db_state();
        seed_user(&db_state, "staff@branchline.app", "hunter22", false);

        let auth = AuthState::new();
        for _ in 0..2 {
            let _ = login(
                &db_state,
                &auth,
                "staff@branchline.app",
                "wrong".to_string(),
                false,
            )
            .expect_err("invalid login should fail");
        }
        assert_eq!(lockout_attempts(&db_state), 2);

        login(
            &db_state,
            &auth,
            "staff@branchline.app",
            "hunter22".to_string(),
            false,
        )
        .expect("valid login should succeed");
        assert_eq!(
            lockout_attempts(&db_state),
            0,
            "successful login should persist reset lockout counter"
        );
    }

    #[test]
    fn logout_clears_context() {
        let db_state = test_db_state();
        seed_user(&db_state, "staff@branchline.app", "hunter22", false);
        let auth = AuthState::new();
        login(
            &db_state,
            &auth,
            "staff@branchline.app",
            "hunter22".to_string(),
            false,
        )
        .expect("login");
        assert!(context(&auth).is_ok());

        logout(&auth);
        assert!(context(&auth).is_err());
    }
}
