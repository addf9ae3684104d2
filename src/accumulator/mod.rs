//! Per-session usage accumulation from cumulative snapshots.
//!
//! Hosts re-send the running totals of a message every time it grows, so the
//! accumulator remembers the last snapshot of every message and only adds the
//! difference. A session's stats and its snapshot table share one [`DashMap`]
//! entry: an update holds that entry's write guard for the whole
//! read-modify-write, and readers clone under the read guard.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::debug_log;
use crate::types::{EventTime, MessageRole, SessionStats, UsageDelta, UsageSnapshot};

/// What to do when a snapshot reports less than the previous one for the same message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NegativeDeltaPolicy {
    /// Subtract the difference from the running totals.
    #[default]
    Unclamped,
    /// Treat decreasing fields as unchanged.
    Clamped,
}

/// Stats plus the latest snapshot of every message in one session.
#[derive(Debug, Clone)]
struct SessionEntry {
    stats: SessionStats,
    snapshots: HashMap<String, UsageSnapshot>,
}

impl SessionEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            stats: SessionStats::new(now),
            snapshots: HashMap::new(),
        }
    }
}

pub struct SessionAccumulator {
    sessions: DashMap<String, SessionEntry>,
    policy: NegativeDeltaPolicy,
}

impl Default for SessionAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAccumulator {
    /// Create an empty accumulator using [`NegativeDeltaPolicy::Unclamped`].
    pub fn new() -> Self {
        Self::with_policy(NegativeDeltaPolicy::default())
    }

    pub fn with_policy(policy: NegativeDeltaPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            policy,
        }
    }

    /// Fold one cumulative usage snapshot into its session.
    ///
    /// Non-assistant roles are ignored. The first snapshot of a message counts
    /// it once; later snapshots of the same message only add their difference
    /// to the previous one, so re-sending an identical snapshot is a no-op.
    pub fn apply_update(
        &self,
        session_id: &str,
        message_id: &str,
        role: MessageRole,
        snapshot: UsageSnapshot,
        model_id: &str,
        provider_id: &str,
    ) {
        self.apply_update_at(
            session_id,
            message_id,
            role,
            snapshot,
            model_id,
            provider_id,
            EventTime::default(),
        );
    }

    /// [`apply_update`](Self::apply_update) with the host's timestamps. The
    /// session starts at the earliest time seen and was last updated at the
    /// latest; updates without timestamps count as happening now.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_update_at(
        &self,
        session_id: &str,
        message_id: &str,
        role: MessageRole,
        snapshot: UsageSnapshot,
        model_id: &str,
        provider_id: &str,
        time: EventTime,
    ) {
        if role != MessageRole::Assistant {
            return;
        }

        let now = Utc::now();
        let started = time.start_or(now);
        let updated = time.end_or(now);
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug_log::session_event("CREATED", || session_id.to_string());
                SessionEntry::new(started)
            });
        let SessionEntry { stats, snapshots } = &mut *entry;

        let (prior, is_new_message) = match snapshots.get(message_id) {
            Some(prior) => (*prior, false),
            None => (UsageSnapshot::default(), true),
        };

        let mut delta = UsageDelta::between(&prior, &snapshot);
        if delta.is_negative() {
            debug_log::session_event("NEGATIVE_DELTA", || {
                format!("{session_id}/{message_id}: {delta:?} ({:?})", self.policy)
            });
            if self.policy == NegativeDeltaPolicy::Clamped {
                delta = delta.clamped();
            }
        }

        *stats += delta;
        if is_new_message {
            stats.messages += 1;
        }
        stats.record_model(model_id);
        stats.record_provider(provider_id);
        stats.started_at = stats.started_at.min(started);
        stats.last_updated_at = stats.last_updated_at.max(updated);

        snapshots.insert(message_id.to_string(), snapshot);
    }

    /// Copy of a session's stats, if any update has been recorded for it.
    pub fn session_stats(&self, session_id: &str) -> Option<SessionStats> {
        self.sessions.get(session_id).map(|e| e.stats.clone())
    }

    /// Latest snapshot stored for a message.
    #[cfg(test)]
    pub fn message_snapshot(&self, session_id: &str, message_id: &str) -> Option<UsageSnapshot> {
        self.sessions
            .get(session_id)
            .and_then(|e| e.snapshots.get(message_id).copied())
    }

    /// Known session ids, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop a finished session together with its message snapshots.
    /// Returns the final stats when the session was known.
    pub fn end_session(&self, session_id: &str) -> Option<SessionStats> {
        let removed = self.sessions.remove(session_id).map(|(_, e)| e.stats);
        if removed.is_some() {
            debug_log::session_event("ENDED", || session_id.to_string());
        }
        removed
    }

    /// Drop every session whose last update is older than `max_idle` at `now`.
    /// Returns the number of evicted sessions.
    pub fn evict_idle(&self, max_idle: Duration, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|session_id, entry| {
            let keep = now - entry.stats.last_updated_at <= max_idle;
            if !keep {
                debug_log::session_event("EVICTED", || session_id.clone());
            }
            keep
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            self.sessions.shrink_to_fit();
        }
        evicted
    }
}

#[cfg(test)]
mod tests;
