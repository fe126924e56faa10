//! Per-user admission: a cooldown between consecutive messages plus an hourly
//! message quota whose window resets at the next clock hour.
//!
//! Rate state lives in a [`RateStore`] that is injected into the
//! [`AdmissionController`]. Every user gets an individually locked entry, so
//! messages from different users never contend and messages from the same user
//! are serialized.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::domain::UserId;

const HOUR_SECS: i64 = 3600;

/// Why a message was not admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    Cooldown,
    Quota,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Cooldown => f.write_str("cooldown"),
            DenyReason::Quota => f.write_str("quota"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied(DenyReason),
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Rate bookkeeping for one user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateState {
    pub last_message_at: Option<DateTime<Utc>>,
    pub count_in_window: u32,
    pub window_reset_at: Option<DateTime<Utc>>,
}

impl RateState {
    /// Clear the hourly count once `now` has passed the window boundary.
    fn roll_window(&mut self, now: DateTime<Utc>) {
        if let Some(reset_at) = self.window_reset_at {
            if now > reset_at {
                self.count_in_window = 0;
                self.window_reset_at = None;
            }
        }
    }

    fn decide(&mut self, now: DateTime<Utc>, limits: &AdmissionLimits) -> Admission {
        self.roll_window(now);

        if let Some(last) = self.last_message_at {
            if now.signed_duration_since(last) < limits.cooldown {
                return Admission::Denied(DenyReason::Cooldown);
            }
        }

        if self.count_in_window >= limits.max_messages_per_hour {
            return Admission::Denied(DenyReason::Quota);
        }

        Admission::Admitted
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.last_message_at = Some(now);
        self.count_in_window = self.count_in_window.saturating_add(1);
        self.window_reset_at = Some(next_hour_boundary(now));
    }
}

/// Start of the clock hour following `now` (not `now + 1h`).
pub fn next_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let secs = now.timestamp();
    let hour_start = secs - secs.rem_euclid(HOUR_SECS);
    DateTime::<Utc>::from_timestamp(hour_start + HOUR_SECS, 0)
        .unwrap_or_else(|| now + TimeDelta::hours(1))
}

#[derive(Clone, Copy, Debug)]
pub struct AdmissionLimits {
    pub cooldown: TimeDelta,
    pub max_messages_per_hour: u32,
}

impl AdmissionLimits {
    pub fn new(cooldown: Duration, max_messages_per_hour: u32) -> Self {
        Self {
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
            max_messages_per_hour,
        }
    }
}

/// Process-lifetime owner of all per-user rate state.
///
/// Entries are created lazily and never removed.
#[derive(Default)]
pub struct RateStore {
    users: Mutex<HashMap<UserId, Arc<Mutex<RateState>>>>,
}

impl RateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The map lock is only held long enough to fetch or create the entry.
    async fn entry(&self, user_id: UserId) -> Arc<Mutex<RateState>> {
        let mut users = self.users.lock().await;
        users
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(RateState::default())))
            .clone()
    }

    pub async fn get(&self, user_id: UserId) -> Option<RateState> {
        let entry = self.users.lock().await.get(&user_id).cloned()?;
        let state = entry.lock().await.clone();
        Some(state)
    }
}

pub struct AdmissionController {
    store: Arc<RateStore>,
    limits: AdmissionLimits,
}

impl AdmissionController {
    pub fn new(store: Arc<RateStore>, limits: AdmissionLimits) -> Self {
        Self { store, limits }
    }

    /// Check and record in one step under the user's lock.
    ///
    /// Two concurrent messages from the same user can never both be admitted
    /// past the cooldown.
    pub async fn admit(&self, user_id: UserId) -> Admission {
        self.admit_at(user_id, Utc::now()).await
    }

    pub async fn admit_at(&self, user_id: UserId, now: DateTime<Utc>) -> Admission {
        let entry = self.store.entry(user_id).await;
        let mut state = entry.lock().await;
        let decision = state.decide(now, &self.limits);
        if decision.is_admitted() {
            state.record(now);
        }
        decision
    }

    /// Check only. A denied check leaves the cooldown clock untouched.
    ///
    /// Callers that proceed must follow up with [`record`](Self::record). Another
    /// task may pass `check` for the same user between the two calls; use
    /// [`admit`](Self::admit) when that matters.
    pub async fn check(&self, user_id: UserId) -> Admission {
        self.check_at(user_id, Utc::now()).await
    }

    pub async fn check_at(&self, user_id: UserId, now: DateTime<Utc>) -> Admission {
        let entry = self.store.entry(user_id).await;
        let mut state = entry.lock().await;
        state.decide(now, &self.limits)
    }

    pub async fn record(&self, user_id: UserId) {
        self.record_at(user_id, Utc::now()).await
    }

    pub async fn record_at(&self, user_id: UserId, now: DateTime<Utc>) {
        let entry = self.store.entry(user_id).await;
        entry.lock().await.record(now);
    }

    pub async fn snapshot(&self, user_id: UserId) -> Option<RateState> {
        self.store.get(user_id).await
    }
}
