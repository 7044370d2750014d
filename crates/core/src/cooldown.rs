use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

pub const COOLDOWN_SECONDS: i64 = 5;

#[derive(Debug, Default)]
struct GateState {
    last_accepted: HashMap<String, DateTime<Utc>>,
    suspended_until: HashMap<String, DateTime<Utc>>,
}

/// Fixed-window spacing between one user's accepted messages.
///
/// Only the first message per window proceeds; rejected messages leave no
/// trace, so a user spamming inside the window does not extend it.
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    state: Mutex<GateState>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(Duration::seconds(COOLDOWN_SECONDS))
    }
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self { window, state: Mutex::new(GateState::default()) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();

        if let Some(until) = state.suspended_until.get(user_id) {
            if now < *until {
                debug!(
                    event_name = "gate.user_suspended",
                    user_id,
                    until = %until,
                    "dropping message from suspended user"
                );
                return false;
            }
        }

        if let Some(last) = state.last_accepted.get(user_id) {
            if now - *last < self.window {
                debug!(event_name = "gate.user_throttled", user_id, "dropping message inside window");
                return false;
            }
        }

        let window = self.window;
        state.last_accepted.retain(|_, last| now - *last < window);
        state.suspended_until.retain(|_, until| now < *until);
        state.last_accepted.insert(user_id.to_owned(), now);
        true
    }

    /// Blocks dispatch for `user_id` until `until`, independent of the spacing
    /// window. A later suspension never shortens an earlier one.
    pub fn suspend(&self, user_id: &str, until: DateTime<Utc>) {
        let mut state = self.lock();
        let entry = state.suspended_until.entry(user_id.to_owned()).or_insert(until);
        if until > *entry {
            *entry = until;
        }
    }

    pub fn last_accepted(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.lock().last_accepted.get(user_id).copied()
    }

    /// Users with a live window or suspension.
    pub fn tracked_users(&self) -> usize {
        let state = self.lock();
        let mut users: Vec<&String> =
            state.last_accepted.keys().chain(state.suspended_until.keys()).collect();
        users.sort();
        users.dedup();
        users.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.last_accepted.clear();
        state.suspended_until.clear();
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
