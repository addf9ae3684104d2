//! Host events and the event sink feeding the accumulator.
//!
//! Hosts publish events as `{"type": ..., "properties": {...}}`. Only message
//! updates and session deletions matter here; every other kind decodes to
//! [`HostEvent::Other`] and is dropped.

use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::accumulator::SessionAccumulator;
use crate::intern::UNKNOWN_ID;
use crate::types::{EventTime, MessageRole, UsageSnapshot};
use crate::utils::warn_once;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheTokens {
    #[serde(default)]
    pub read: u64,
    #[serde(default)]
    pub write: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
    #[serde(default)]
    pub cache: CacheTokens,
}

/// Message timestamps in Unix milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub completed: Option<i64>,
}

fn ms_to_datetime(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub role: MessageRole,
    #[serde(rename = "modelID")]
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(rename = "providerID")]
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub tokens: Option<TokenUsage>,
    #[serde(default)]
    pub time: MessageTime,
}

impl MessageInfo {
    /// Cumulative usage carried by this update.
    pub fn snapshot(&self) -> UsageSnapshot {
        let tokens = self.tokens.clone().unwrap_or_default();
        UsageSnapshot {
            input_tokens: tokens.input,
            output_tokens: tokens.output,
            reasoning_tokens: tokens.reasoning,
            cache_read_tokens: tokens.cache.read,
            cache_write_tokens: tokens.cache.write,
            cost: self.cost.unwrap_or(0.0).max(0.0),
        }
    }

    pub fn event_time(&self) -> EventTime {
        EventTime {
            created: ms_to_datetime(self.time.created),
            completed: ms_to_datetime(self.time.completed),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageUpdatedProperties {
    pub info: MessageInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionDeletedProperties {
    pub info: SessionInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    #[serde(rename = "message.updated")]
    MessageUpdated { properties: MessageUpdatedProperties },
    #[serde(rename = "session.deleted")]
    SessionDeleted { properties: SessionDeletedProperties },
    #[serde(other)]
    Other,
}

/// What the sink did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Recorded,
    SessionEnded,
    Ignored,
}

/// Decode one JSON-encoded host event.
pub fn decode_event(raw: &str) -> Result<HostEvent> {
    let mut bytes = raw.as_bytes().to_vec();
    simd_json::from_slice(&mut bytes).context("Failed to decode host event")
}

impl SessionAccumulator {
    /// Event sink: route a host event into the accumulator.
    pub fn handle_event(&self, event: &HostEvent) -> EventOutcome {
        match event {
            HostEvent::MessageUpdated { properties } => {
                let info = &properties.info;
                if info.role != MessageRole::Assistant {
                    return EventOutcome::Ignored;
                }
                self.apply_update_at(
                    &info.session_id,
                    &info.id,
                    info.role,
                    info.snapshot(),
                    info.model_id.as_deref().unwrap_or(UNKNOWN_ID),
                    info.provider_id.as_deref().unwrap_or(UNKNOWN_ID),
                    info.event_time(),
                );
                EventOutcome::Recorded
            }
            HostEvent::SessionDeleted { properties } => {
                self.end_session(&properties.info.id);
                EventOutcome::SessionEnded
            }
            HostEvent::Other => EventOutcome::Ignored,
        }
    }
}

/// Counts from replaying an event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub recorded: usize,
    pub sessions_ended: usize,
    pub ignored: usize,
    pub malformed: usize,
}

impl ReplaySummary {
    pub fn count(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Recorded => self.recorded += 1,
            EventOutcome::SessionEnded => self.sessions_ended += 1,
            EventOutcome::Ignored => self.ignored += 1,
        }
    }

    pub fn merge(&mut self, other: ReplaySummary) {
        self.recorded += other.recorded;
        self.sessions_ended += other.sessions_ended;
        self.ignored += other.ignored;
        self.malformed += other.malformed;
    }
}

/// Feed newline-delimited JSON events into the accumulator. Blank lines are
/// skipped; lines that fail to decode are counted and reported once.
pub fn replay_events<R: BufRead>(reader: R, accumulator: &SessionAccumulator) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for line in reader.lines() {
        let line = line.context("Failed to read event log")?;
        summary.merge(apply_line(&line, accumulator));
    }

    Ok(summary)
}

/// Decode and apply a single event-log line.
pub fn apply_line(line: &str, accumulator: &SessionAccumulator) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let line = line.trim();
    if line.is_empty() {
        return summary;
    }

    match decode_event(line) {
        Ok(event) => summary.count(accumulator.handle_event(&event)),
        Err(e) => {
            warn_once(format!("Warning: skipping undecodable event: {e:#}"));
            summary.malformed += 1;
        }
    }

    summary
}
