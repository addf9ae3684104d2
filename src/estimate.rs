//! Energy and CO2 estimation from token counts.

use serde::Serialize;

use crate::models::{DEFAULT_TIER, classify, energy_per_token_kwh};
use crate::types::ModelTier;

/// Environment variable overriding the grid carbon intensity (gCO2/kWh).
pub const GRID_INTENSITY_ENV: &str = "ECOTRAIL_GRID_INTENSITY";

/// Grid carbon intensity used when no valid override is configured, in gCO2/kWh.
pub const DEFAULT_GRID_INTENSITY: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub energy_kwh: f64,
    pub co2_grams: f64,
}

/// Estimate the energy and emissions of `total_tokens` processed by a model of
/// the given tier on a grid emitting `grid_intensity` gCO2/kWh.
pub fn estimate(total_tokens: u64, tier: ModelTier, grid_intensity: f64) -> Estimate {
    let energy_kwh = total_tokens as f64 * energy_per_token_kwh(tier);
    Estimate {
        energy_kwh,
        co2_grams: energy_kwh * grid_intensity,
    }
}

/// Highest-impact tier among the given models. Sessions only track totals, not
/// tokens per model, so one large model makes the whole session large.
pub fn dominant_tier<'a, I>(model_ids: I) -> ModelTier
where
    I: IntoIterator<Item = &'a str>,
{
    model_ids
        .into_iter()
        .map(classify)
        .max()
        .unwrap_or(DEFAULT_TIER)
}

/// Parse a grid-intensity setting. Only positive finite decimals are accepted.
pub fn parse_grid_intensity(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
}

/// Resolve the grid intensity from a raw override, falling back to `fallback`
/// (if itself valid) and then to [`DEFAULT_GRID_INTENSITY`].
pub fn resolve_grid_intensity(raw: Option<&str>, fallback: Option<f64>) -> f64 {
    parse_grid_intensity(raw)
        .or(fallback.filter(|value| value.is_finite() && *value > 0.0))
        .unwrap_or(DEFAULT_GRID_INTENSITY)
}

/// Read the grid intensity from [`GRID_INTENSITY_ENV`].
pub fn grid_intensity_from_env(fallback: Option<f64>) -> f64 {
    let raw = std::env::var(GRID_INTENSITY_ENV).ok();
    resolve_grid_intensity(raw.as_deref(), fallback)
}

/// Held by tests that set or read [`GRID_INTENSITY_ENV`].
#[cfg(test)]
pub static GRID_ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn small_tier_scenario() {
        let tier = dominant_tier(["claude-haiku-4-5"]);
        assert_eq!(tier, ModelTier::Small);

        let est = estimate(1500, tier, DEFAULT_GRID_INTENSITY);
        assert!((est.energy_kwh - 0.00045).abs() < EPSILON);
        assert!((est.co2_grams - 0.18).abs() < EPSILON);
    }

    #[test]
    fn zero_tokens_zero_emissions() {
        let est = estimate(0, ModelTier::Large, 900.0);
        assert_eq!(est.energy_kwh, 0.0);
        assert_eq!(est.co2_grams, 0.0);
    }

    #[test]
    fn large_model_dominates_session() {
        let models = ["claude-haiku-4-5", "gpt-4o-mini", "claude-opus-4-1", "gpt-4o"];
        assert_eq!(dominant_tier(models), ModelTier::Large);
        assert_eq!(dominant_tier(["claude-haiku-4-5", "gpt-4o"]), ModelTier::Medium);
        assert_eq!(dominant_tier(["claude-haiku-4-5"]), ModelTier::Small);
    }

    #[test]
    fn no_models_uses_default_tier() {
        assert_eq!(dominant_tier(std::iter::empty::<&str>()), ModelTier::Medium);
    }

    #[test]
    fn grid_override_round_trip() {
        let intensity = resolve_grid_intensity(Some("50"), None);
        assert_eq!(intensity, 50.0);

        let est = estimate(10_000, ModelTier::Medium, intensity);
        assert_eq!(est.co2_grams, est.energy_kwh * 50.0);
    }

    #[test]
    fn invalid_grid_override_falls_back_to_default() {
        for raw in [Some("-5"), Some("abc"), Some("0"), Some("inf"), Some("NaN"), Some(""), None] {
            assert_eq!(
                resolve_grid_intensity(raw, None),
                DEFAULT_GRID_INTENSITY,
                "override {raw:?}"
            );
        }
    }

    #[test]
    fn configured_fallback_used_before_default() {
        assert_eq!(resolve_grid_intensity(Some("abc"), Some(250.0)), 250.0);
        assert_eq!(resolve_grid_intensity(None, Some(-1.0)), DEFAULT_GRID_INTENSITY);
        assert_eq!(resolve_grid_intensity(Some(" 75.5 "), Some(250.0)), 75.5);
    }
}
