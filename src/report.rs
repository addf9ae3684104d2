//! Session carbon report: figures and Markdown rendering.

use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accumulator::SessionAccumulator;
use crate::estimate::{dominant_tier, estimate};
use crate::grade::{co2_per_message, grade, impact_bar};
use crate::types::{EcoGrade, ModelTier, SessionStats};
use crate::utils::{NumberFormatOptions, format_duration, format_quantity, format_signed};

/// Response to a report query for a session without recorded assistant messages.
pub const NO_DATA_MESSAGE: &str =
    "No carbon data yet for this session. Send a message to the assistant and try again.";

// Grams of CO2 per unit of each everyday equivalent
const GRAMS_PER_SEARCH: f64 = 0.2;
const GRAMS_PER_PHONE_CHARGE: f64 = 8.22;
const GRAMS_PER_STREAMING_SECOND: f64 = 0.01;
const GRAMS_PER_LED_MINUTE: f64 = 0.0667;
const GRAMS_PER_KM_DRIVEN: f64 = 121.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Equivalents {
    pub web_searches: f64,
    pub phone_charges: f64,
    pub streaming_seconds: f64,
    pub led_bulb_minutes: f64,
    pub km_driven: f64,
}

impl Equivalents {
    pub fn from_co2(co2_grams: f64) -> Self {
        Self {
            web_searches: co2_grams / GRAMS_PER_SEARCH,
            phone_charges: co2_grams / GRAMS_PER_PHONE_CHARGE,
            streaming_seconds: co2_grams / GRAMS_PER_STREAMING_SECOND,
            led_bulb_minutes: co2_grams / GRAMS_PER_LED_MINUTE,
            km_driven: co2_grams / GRAMS_PER_KM_DRIVEN,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenBreakdown {
    pub input: i64,
    pub output: i64,
    pub reasoning: i64,
    pub cache_read: i64,
    pub cache_write: i64,
}

/// Everything a carbon report shows, computed from one session's stats.
#[derive(Debug, Clone, Serialize)]
pub struct EcoReport {
    pub total_tokens: u64,
    pub tokens: TokenBreakdown,
    pub messages: u32,
    pub cost: f64,
    pub tier: ModelTier,
    pub grid_intensity: f64,
    pub energy_kwh: f64,
    pub co2_grams: f64,
    pub co2_per_message: f64,
    pub grade: EcoGrade,
    pub duration_seconds: i64,
    pub models: Vec<&'static str>,
    pub providers: Vec<&'static str>,
    pub equivalents: Equivalents,
}

/// Compute the report figures for `stats` at `now`.
pub fn build_report(stats: &SessionStats, grid_intensity: f64, now: DateTime<Utc>) -> EcoReport {
    let models = stats.model_names();
    let tier = dominant_tier(models.iter().copied());
    let total_tokens = stats.total_tokens();
    let est = estimate(total_tokens, tier, grid_intensity);

    EcoReport {
        total_tokens,
        tokens: TokenBreakdown {
            input: stats.input_tokens,
            output: stats.output_tokens,
            reasoning: stats.reasoning_tokens,
            cache_read: stats.cache_read_tokens,
            cache_write: stats.cache_write_tokens,
        },
        messages: stats.messages,
        cost: stats.cost,
        tier,
        grid_intensity,
        energy_kwh: est.energy_kwh,
        co2_grams: est.co2_grams,
        co2_per_message: co2_per_message(est.co2_grams, stats.messages),
        grade: grade(est.co2_grams, stats.messages),
        duration_seconds: (now - stats.started_at).num_seconds().max(0),
        models,
        providers: stats.provider_names(),
        equivalents: Equivalents::from_co2(est.co2_grams),
    }
}

/// Render a report as Markdown.
pub fn render_report(report: &EcoReport, options: &NumberFormatOptions) -> String {
    let mut out = String::new();
    match render_into(&mut out, report, options) {
        Ok(()) => out,
        Err(_) => String::new(),
    }
}

fn render_into(out: &mut String, report: &EcoReport, options: &NumberFormatOptions) -> fmt::Result {
    let dp = options.decimal_places;
    let n = |v: i64| format_signed(v, options);
    let q = |v: f64| format_quantity(v, dp);

    writeln!(out, "# 🌱 Session Carbon Footprint")?;
    writeln!(out)?;

    writeln!(out, "## Summary")?;
    writeln!(out, "- **Messages:** {}", report.messages)?;
    writeln!(out, "- **Total tokens:** {}", n(report.total_tokens as i64))?;
    writeln!(out, "- **Cost:** ${:.4}", report.cost)?;
    writeln!(
        out,
        "- **Duration:** {}",
        format_duration(chrono::Duration::seconds(report.duration_seconds))
    )?;
    writeln!(out)?;

    writeln!(out, "## Energy & Emissions")?;
    writeln!(out, "- **Energy:** {} kWh", q(report.energy_kwh))?;
    writeln!(out, "- **CO2:** {} g", q(report.co2_grams))?;
    writeln!(out, "- **CO2 per message:** {} g", q(report.co2_per_message))?;
    writeln!(out, "- **Model tier:** {}", report.tier)?;
    writeln!(out, "- **Grid intensity:** {} gCO2/kWh", q(report.grid_intensity))?;
    writeln!(out)?;

    writeln!(out, "## Eco Grade")?;
    writeln!(
        out,
        "**{}** ({})  `{}` {}/10",
        report.grade.letter,
        report.grade.label,
        impact_bar(report.grade.level as i32),
        report.grade.level
    )?;
    writeln!(out)?;

    writeln!(out, "## Token Breakdown")?;
    writeln!(out, "| Type | Tokens |")?;
    writeln!(out, "|---|---:|")?;
    writeln!(out, "| Input | {} |", n(report.tokens.input))?;
    writeln!(out, "| Output | {} |", n(report.tokens.output))?;
    writeln!(out, "| Reasoning | {} |", n(report.tokens.reasoning))?;
    writeln!(out, "| Cache read | {} |", n(report.tokens.cache_read))?;
    writeln!(out, "| Cache write | {} |", n(report.tokens.cache_write))?;
    writeln!(out)?;

    writeln!(out, "## Models")?;
    write_list(out, &report.models)?;
    writeln!(out)?;

    writeln!(out, "## Providers")?;
    write_list(out, &report.providers)?;
    writeln!(out)?;

    let eq = &report.equivalents;
    writeln!(out, "## Equivalent To")?;
    writeln!(out, "- 🔍 {} web searches", q(eq.web_searches))?;
    writeln!(out, "- 📱 {} smartphone charges", q(eq.phone_charges))?;
    writeln!(out, "- 📺 {} seconds of video streaming", q(eq.streaming_seconds))?;
    writeln!(out, "- 💡 {} minutes of a 10W LED bulb", q(eq.led_bulb_minutes))?;
    writeln!(out, "- 🚗 {} km driven", q(eq.km_driven))?;
    writeln!(out)?;

    writeln!(out, "## Tip")?;
    writeln!(out, "{}", report.grade.tip)?;
    writeln!(out)?;
    write!(
        out,
        "_Estimates only: energy per token is approximated by model tier._"
    )
}

fn write_list(out: &mut String, items: &[&str]) -> fmt::Result {
    if items.is_empty() {
        writeln!(out, "- (none)")?;
    }
    for item in items {
        writeln!(out, "- {item}")?;
    }
    Ok(())
}

/// Instant a session's duration is measured up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportClock {
    /// Wall-clock time, for sessions that are still running
    Now,
    /// The session's last update, for replayed logs
    LastEvent,
}

/// Figures for one session, or `None` when it has no recorded assistant
/// messages. The stats are read once, so the figures are consistent.
pub fn session_report(
    accumulator: &SessionAccumulator,
    session_id: &str,
    grid_intensity: f64,
    clock: ReportClock,
) -> Option<EcoReport> {
    let stats = accumulator
        .session_stats(session_id)
        .filter(|stats| stats.messages > 0)?;
    let now = match clock {
        ReportClock::Now => Utc::now(),
        ReportClock::LastEvent => stats.last_updated_at,
    };
    Some(build_report(&stats, grid_intensity, now))
}

/// Answer a report query: the rendered report, or [`NO_DATA_MESSAGE`] when the
/// session has no recorded assistant messages.
pub fn query_report(
    accumulator: &SessionAccumulator,
    session_id: &str,
    grid_intensity: f64,
    options: &NumberFormatOptions,
) -> String {
    match session_report(accumulator, session_id, grid_intensity, ReportClock::Now) {
        Some(report) => render_report(&report, options),
        None => NO_DATA_MESSAGE.to_string(),
    }
}
