use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{info, warn};

use crate::errors::DomainError;

pub const COOLDOWN_DURATION_SECS: i64 = 40;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RotationError {
    #[error("credential pool is empty; configure at least one llm api key")]
    EmptyCredentialPool,
    #[error("no model tiers are configured")]
    NoTiers,
    #[error("model tier `{0}` has no models")]
    EmptyTier(String),
    #[error("default model tier `{0}` is not configured")]
    UnknownDefaultTier(String),
}

/// An API key together with its position in the pool.
#[derive(Clone, Debug)]
pub struct Credential {
    position: usize,
    secret: SecretString,
}

impl Credential {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Last four characters of the key, safe to show in chat and logs.
    pub fn fingerprint(&self) -> String {
        let key = self.secret.expose_secret();
        let tail: String =
            key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        format!("...{tail}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Available,
    Cooling { until: DateTime<Utc> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct TierEntry {
    model: String,
    cooling_until: Option<DateTime<Utc>>,
}

impl TierEntry {
    fn state(&self, now: DateTime<Utc>) -> ModelState {
        match self.cooling_until {
            Some(until) if now < until => ModelState::Cooling { until },
            _ => ModelState::Available,
        }
    }
}

#[derive(Clone, Debug)]
struct ActiveTier {
    name: String,
    entries: Vec<TierEntry>,
    cursor: usize,
}

impl ActiveTier {
    fn fresh(name: &str, models: &[String]) -> Self {
        Self {
            name: name.to_owned(),
            entries: models
                .iter()
                .map(|model| TierEntry { model: model.clone(), cooling_until: None })
                .collect(),
            cursor: 0,
        }
    }
}

#[derive(Debug)]
struct SchedulerState {
    credential_cursor: usize,
    last_rotation: Option<DateTime<Utc>>,
    tier: ActiveTier,
}

/// What `on_rate_limited` changed, for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitAction {
    pub credential_position: usize,
    pub penalized_model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub tier: String,
    pub model: String,
    pub credential_position: usize,
    pub credential_count: usize,
    pub credential_fingerprint: String,
    pub cooling: Vec<(String, DateTime<Utc>)>,
}

/// Chooses the credential and model for each completion attempt and moves
/// away from exhausted choices.
///
/// A rate limit always rotates the credential. Only a second rate limit
/// within the cooldown window of the previous rotation also penalizes the
/// failing model and moves the tier cursor past it. Concurrent dispatches may
/// race on the cursors; the last writer wins.
#[derive(Debug)]
pub struct RotationScheduler {
    credentials: Vec<Credential>,
    tiers: BTreeMap<String, Vec<String>>,
    default_tier: String,
    cooldown: Duration,
    state: Mutex<SchedulerState>,
}

impl RotationScheduler {
    pub fn new(
        credentials: Vec<SecretString>,
        tiers: BTreeMap<String, Vec<String>>,
        default_tier: &str,
        cooldown: Duration,
    ) -> Result<Self, RotationError> {
        if credentials.is_empty() {
            return Err(RotationError::EmptyCredentialPool);
        }
        if tiers.is_empty() {
            return Err(RotationError::NoTiers);
        }
        if let Some((name, _)) = tiers.iter().find(|(_, models)| models.is_empty()) {
            return Err(RotationError::EmptyTier(name.clone()));
        }
        let default_models = tiers
            .get(default_tier)
            .ok_or_else(|| RotationError::UnknownDefaultTier(default_tier.to_owned()))?;

        let tier = ActiveTier::fresh(default_tier, default_models);
        let credentials = credentials
            .into_iter()
            .enumerate()
            .map(|(position, secret)| Credential { position, secret })
            .collect();

        Ok(Self {
            credentials,
            tiers,
            default_tier: default_tier.to_owned(),
            cooldown,
            state: Mutex::new(SchedulerState {
                credential_cursor: 0,
                last_rotation: None,
                tier,
            }),
        })
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.keys().cloned().collect()
    }

    pub fn active_tier(&self) -> String {
        self.lock().tier.name.clone()
    }

    pub fn current_credential(&self) -> Credential {
        let cursor = self.lock().credential_cursor;
        self.credentials[cursor % self.credentials.len()].clone()
    }

    /// Returns the credential at the cursor, then advances the cursor
    /// circularly.
    pub fn next_credential(&self, now: DateTime<Utc>) -> Credential {
        let mut state = self.lock();
        let credential = self.credentials[state.credential_cursor].clone();
        self.rotate_credential(&mut state, now);
        credential
    }

    pub fn select_model(&self, now: DateTime<Utc>) -> String {
        let mut state = self.lock();
        let tier = &mut state.tier;
        let len = tier.entries.len();

        for offset in 0..len {
            let index = (tier.cursor + offset) % len;
            if tier.entries[index].state(now) == ModelState::Available {
                tier.cursor = index;
                return tier.entries[index].model.clone();
            }
        }

        warn!(
            event_name = "rotation.all_models_cooling",
            tier = %tier.name,
            "every model in tier is cooling; forcing first entry"
        );
        tier.entries[0].model.clone()
    }

    pub fn on_rate_limited(&self, model_id: &str, now: DateTime<Utc>) -> RateLimitAction {
        let mut state = self.lock();
        let repeated = state.last_rotation.is_some_and(|last| now - last < self.cooldown);
        let credential_position = self.rotate_credential(&mut state, now);

        info!(
            event_name = "rotation.credential_rotated",
            credential_position,
            credential = %self.credentials[credential_position].fingerprint(),
            repeated,
            "rate limited; rotated credential"
        );

        if !repeated {
            return RateLimitAction { credential_position, penalized_model: None };
        }

        let until = now + self.cooldown;
        let tier = &mut state.tier;
        let len = tier.entries.len();
        let failing = tier.entries.iter().position(|entry| entry.model == model_id);
        let penalized_model = failing.map(|index| {
            tier.entries[index].cooling_until = Some(until);
            tier.cursor = (index + 1) % len;
            tier.entries[index].model.clone()
        });
        if penalized_model.is_none() {
            tier.cursor = (tier.cursor + 1) % len;
        }

        warn!(
            event_name = "rotation.model_penalized",
            tier = %tier.name,
            model = model_id,
            until = %until,
            "repeated rate limit; model placed on cooldown"
        );

        RateLimitAction { credential_position, penalized_model }
    }

    pub fn switch_tier(&self, name: &str) -> Result<(), DomainError> {
        let models = self.tiers.get(name).ok_or_else(|| DomainError::UnknownTier(name.to_owned()))?;
        self.lock().tier = ActiveTier::fresh(name, models);
        info!(event_name = "rotation.tier_switched", tier = name, "model tier switched");
        Ok(())
    }

    pub fn model_state(&self, model_id: &str, now: DateTime<Utc>) -> Option<ModelState> {
        self.lock()
            .tier
            .entries
            .iter()
            .find(|entry| entry.model == model_id)
            .map(|entry| entry.state(now))
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SchedulerSnapshot {
        let state = self.lock();
        let credential = &self.credentials[state.credential_cursor];
        SchedulerSnapshot {
            tier: state.tier.name.clone(),
            model: state.tier.entries[state.tier.cursor].model.clone(),
            credential_position: credential.position,
            credential_count: self.credentials.len(),
            credential_fingerprint: credential.fingerprint(),
            cooling: state
                .tier
                .entries
                .iter()
                .filter_map(|entry| match entry.state(now) {
                    ModelState::Cooling { until } => Some((entry.model.clone(), until)),
                    ModelState::Available => None,
                })
                .collect(),
        }
    }

    /// Back to the default tier with a fresh cursor and no model cooldowns.
    pub fn reset_tier(&self) {
        let models = &self.tiers[&self.default_tier];
        self.lock().tier = ActiveTier::fresh(&self.default_tier, models);
    }

    pub fn reset(&self) {
        let models = &self.tiers[&self.default_tier];
        let mut state = self.lock();
        state.tier = ActiveTier::fresh(&self.default_tier, models);
        state.credential_cursor = 0;
        state.last_rotation = None;
    }

    fn rotate_credential(&self, state: &mut SchedulerState, now: DateTime<Utc>) -> usize {
        state.credential_cursor = (state.credential_cursor + 1) % self.credentials.len();
        state.last_rotation = Some(now);
        state.credential_cursor
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
