use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intern::{IdKey, intern_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

/// Coarse size classification of a model, used to pick an energy-per-token rate.
/// Ordered by impact so the dominant tier of a session is simply the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative usage reported for one message at one point in time.
///
/// Hosts re-emit the running totals of a message on every update, so two
/// snapshots of the same message must be diffed, never summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost: f64,
}

/// Field-wise difference between two snapshots of the same message.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageDelta {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub reasoning_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub cost: f64,
}

impl UsageDelta {
    pub fn between(prior: &UsageSnapshot, current: &UsageSnapshot) -> Self {
        Self {
            input_tokens: signed_diff(current.input_tokens, prior.input_tokens),
            output_tokens: signed_diff(current.output_tokens, prior.output_tokens),
            reasoning_tokens: signed_diff(current.reasoning_tokens, prior.reasoning_tokens),
            cache_read_tokens: signed_diff(current.cache_read_tokens, prior.cache_read_tokens),
            cache_write_tokens: signed_diff(current.cache_write_tokens, prior.cache_write_tokens),
            cost: current.cost - prior.cost,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.input_tokens < 0
            || self.output_tokens < 0
            || self.reasoning_tokens < 0
            || self.cache_read_tokens < 0
            || self.cache_write_tokens < 0
            || self.cost < 0.0
    }

    /// Drop every negative component to zero.
    pub fn clamped(self) -> Self {
        Self {
            input_tokens: self.input_tokens.max(0),
            output_tokens: self.output_tokens.max(0),
            reasoning_tokens: self.reasoning_tokens.max(0),
            cache_read_tokens: self.cache_read_tokens.max(0),
            cache_write_tokens: self.cache_write_tokens.max(0),
            cost: self.cost.max(0.0),
        }
    }
}

fn signed_diff(current: u64, prior: u64) -> i64 {
    (current as i128 - prior as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// When the host says a message was created and completed, if it said so.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTime {
    pub created: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

impl EventTime {
    /// Earliest instant the update vouches for, or `fallback`.
    pub fn start_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.created.or(self.completed).unwrap_or(fallback)
    }

    /// Latest instant the update vouches for, or `fallback`.
    pub fn end_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.completed.or(self.created).unwrap_or(fallback)
    }
}

/// Running totals for one session.
///
/// Token totals are signed: an out-of-order snapshot under the unclamped
/// policy is allowed to pull them down.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub reasoning_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub cost: f64,
    /// Distinct assistant messages, not update events
    pub messages: u32,
    pub models: BTreeSet<IdKey>,
    pub providers: BTreeSet<IdKey>,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl SessionStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            reasoning_tokens: 0,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            cost: 0.0,
            messages: 0,
            models: BTreeSet::new(),
            providers: BTreeSet::new(),
            started_at,
            last_updated_at: started_at,
        }
    }

    /// Tokens that count towards the energy estimate. Cache traffic is reported
    /// but not charged.
    pub fn total_tokens(&self) -> u64 {
        let total = self
            .input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.reasoning_tokens);
        total.max(0) as u64
    }

    pub fn record_model(&mut self, model_id: &str) {
        if let Some(key) = intern_id(model_id) {
            self.models.insert(key);
        }
    }

    pub fn record_provider(&mut self, provider_id: &str) {
        if let Some(key) = intern_id(provider_id) {
            self.providers.insert(key);
        }
    }

    /// Model identifiers seen in this session, sorted by name.
    pub fn model_names(&self) -> Vec<&'static str> {
        sorted_names(&self.models)
    }

    /// Provider identifiers seen in this session, sorted by name.
    pub fn provider_names(&self) -> Vec<&'static str> {
        sorted_names(&self.providers)
    }
}

fn sorted_names(keys: &BTreeSet<IdKey>) -> Vec<&'static str> {
    let mut names: Vec<_> = keys.iter().map(|k| k.resolve()).collect();
    names.sort_unstable();
    names
}

impl std::ops::AddAssign<UsageDelta> for SessionStats {
    fn add_assign(&mut self, rhs: UsageDelta) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(rhs.reasoning_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(rhs.cache_read_tokens);
        self.cache_write_tokens = self
            .cache_write_tokens
            .saturating_add(rhs.cache_write_tokens);
        self.cost += rhs.cost;
    }
}

/// Letter grade for a session's CO2-per-message efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EcoGrade {
    pub letter: &'static str,
    pub label: &'static str,
    /// Severity from 1 (negligible) to 10 (heavy)
    pub level: u8,
    pub tip: &'static str,
}
