//! Remembered sign-in storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. Only the session blob lives here;
//! account records and password hashes stay in SQLite.

use keyring::Entry;
use serde_json::Value;
use tracing::warn;

const SERVICE_NAME: &str = "branchline-admin";

/// Keyring entry holding the serialized remembered session.
const KEY_SESSION: &str = "remembered_session";

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Session blob API
// ---------------------------------------------------------------------------

/// Persist the remembered-session blob after a successful login.
pub fn save_session(session: &Value) -> Result<(), String> {
    set_credential(KEY_SESSION, &session.to_string())
}

/// Load the remembered session, if one was stored and still parses.
pub fn load_session() -> Option<Value> {
    let raw = get_credential(KEY_SESSION)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "discarding unparsable remembered session");
            let _ = delete_credential(KEY_SESSION);
            None
        }
    }
}

/// Forget the remembered session (logout / deactivation).
pub fn clear_session() -> Result<(), String> {
    delete_credential(KEY_SESSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // These run against the real OS keyring, so they share one entry and
    // must not run concurrently with each other.

    #[test]
    #[serial]
    fn session_round_trip() {
        let session = serde_json::json!({
            "user_id": "u-test",
            "email": "test@branchline.app",
            "role": "admin",
        });
        if save_session(&session).is_err() {
            // No keyring backend on this machine (headless CI); nothing to assert.
            return;
        }

        let loaded = load_session().expect("session should load back");
        assert_eq!(loaded.get("user_id"), session.get("user_id"));

        clear_session().expect("clear");
        assert!(load_session().is_none());
    }

    #[test]
    #[serial]
    fn clear_without_saved_session_is_ok() {
        let _ = clear_session();
        assert!(clear_session().is_ok());
    }
}
