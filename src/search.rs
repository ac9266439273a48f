//! Stale-response guard for search-as-you-type queries.
//!
//! The frontend debounces keystrokes, but two queries can still overlap when
//! a slow one is in flight as the next fires. Each search begins by taking a
//! ticket; before returning, the caller checks the ticket is still current
//! and flags the response as stale otherwise, so an older result can never
//! overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone ticket counter, one per searchable surface. Managed as Tauri
/// state (`SearchState`).
#[derive(Default)]
pub struct RequestSequence {
    latest: AtomicU64,
}

impl RequestSequence {
    /// Start a new request, invalidating every earlier ticket.
    pub fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `ticket` is still the newest request.
    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}

/// One sequence per search box.
#[derive(Default)]
pub struct SearchState {
    pub installments: RequestSequence,
    pub financing: RequestSequence,
    pub customers: RequestSequence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickets_are_monotone_and_only_newest_is_current() {
        let seq = RequestSequence::default();
        let t1 = seq.begin();
        let t2 = seq.begin();
        assert!(t2 > t1);
        assert!(!seq.is_current(t1), "older ticket must be stale");
        assert!(seq.is_current(t2));

        let t3 = seq.begin();
        assert!(!seq.is_current(t2));
        assert!(seq.is_current(t3));
    }

    #[test]
    fn sequences_are_independent() {
        let state = SearchState::default();
        let inst = state.installments.begin();
        let fin = state.financing.begin();
        assert!(state.installments.is_current(inst));
        assert!(state.financing.is_current(fin));
        state.installments.begin();
        assert!(!state.installments.is_current(inst));
        assert!(state.financing.is_current(fin), "other surface unaffected");
    }
}
