use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use crate::accumulator::NegativeDeltaPolicy;
use crate::estimate::{DEFAULT_GRID_INTENSITY, grid_intensity_from_env};
use crate::utils::NumberFormatOptions;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub estimation: EstimationConfig,
    pub accumulator: AccumulatorConfig,
    pub formatting: FormattingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EstimationConfig {
    /// Grams of CO2 per kWh; `ECOTRAIL_GRID_INTENSITY` overrides it
    pub grid_intensity: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccumulatorConfig {
    pub clamp_negative_deltas: bool,
    /// Evict sessions idle for this long; 0 keeps them for the process lifetime
    pub session_ttl_minutes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FormattingConfig {
    pub number_comma: bool,
    pub number_human: bool,
    pub locale: String,
    pub decimal_places: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            estimation: EstimationConfig {
                grid_intensity: DEFAULT_GRID_INTENSITY,
            },
            accumulator: AccumulatorConfig {
                clamp_negative_deltas: false,
                session_ttl_minutes: 0,
            },
            formatting: FormattingConfig {
                number_comma: true,
                number_human: false,
                locale: "en".to_string(),
                decimal_places: 2,
            },
        }
    }
}

thread_local! {
    static TEST_CONFIG_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

#[cfg(test)]
pub fn set_test_config_path(path: PathBuf) {
    TEST_CONFIG_PATH.with(|p| *p.borrow_mut() = Some(path));
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            if let Some(path) = TEST_CONFIG_PATH.with(|p| p.borrow().clone()) {
                return Ok(path);
            }
        }

        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".ecotrail.toml"))
    }

    pub fn load() -> Result<Option<Config>> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(Some(config))
    }

    pub fn save(&self, silent: bool) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        if !silent {
            println!("✅ Configuration saved to: {}", config_path.display());
        }

        Ok(())
    }

    /// Grid intensity after applying the environment override.
    pub fn effective_grid_intensity(&self) -> f64 {
        grid_intensity_from_env(Some(self.estimation.grid_intensity))
    }

    pub fn negative_delta_policy(&self) -> NegativeDeltaPolicy {
        if self.accumulator.clamp_negative_deltas {
            NegativeDeltaPolicy::Clamped
        } else {
            NegativeDeltaPolicy::Unclamped
        }
    }

    /// Idle time after which a session is evicted, if eviction is enabled.
    pub fn session_ttl(&self) -> Option<Duration> {
        match self.accumulator.session_ttl_minutes {
            0 => None,
            minutes => Some(Duration::minutes(minutes.min(i64::MAX as u64 / 60_000) as i64)),
        }
    }

    pub fn number_format_options(&self) -> NumberFormatOptions {
        NumberFormatOptions {
            use_comma: self.formatting.number_comma,
            use_human: self.formatting.number_human,
            locale: self.formatting.locale.clone(),
            decimal_places: self.formatting.decimal_places,
        }
    }
}

// CLI helper functions
pub fn create_default_config(overwrite: bool) -> Result<()> {
    let config = Config::default();
    if !std::fs::exists(Config::config_path()?)? || overwrite {
        config.save(true)?;

        println!("📝 Created default configuration file.");
        println!("📍 Set your grid's carbon intensity with:");
        println!("   ecotrail config set grid-intensity 250");
        println!("or edit");
        println!("   {}", Config::config_path()?.display());
    } else {
        println!("Configuration already exists.  Pass `--overwrite` to overwrite.");
    }

    Ok(())
}

pub fn show_config() -> Result<()> {
    match Config::load()? {
        Some(config) => {
            println!("🔧 Current configuration:");
            println!(
                "   Grid Intensity: {} gCO2/kWh",
                config.estimation.grid_intensity
            );
            println!(
                "   Effective Grid Intensity: {} gCO2/kWh",
                config.effective_grid_intensity()
            );
            println!(
                "   Clamp Negative Deltas: {}",
                config.accumulator.clamp_negative_deltas
            );
            println!(
                "   Session TTL: {}",
                match config.accumulator.session_ttl_minutes {
                    0 => "never".to_string(),
                    m => format!("{m} min"),
                }
            );
            println!("   Number Comma: {}", config.formatting.number_comma);
            println!("   Number Human: {}", config.formatting.number_human);
            println!("   Locale: {}", config.formatting.locale);
            println!("   Decimal Places: {}", config.formatting.decimal_places);
        }
        None => {
            println!("❌ No configuration file found.");
            println!("   Run 'ecotrail config init' to create one.");
        }
    }
    Ok(())
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?.unwrap_or_default();

    match key {
        "grid-intensity" => {
            let intensity = value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .context("Invalid grid intensity. Use a positive number of gCO2/kWh")?;
            config.estimation.grid_intensity = intensity;
        }
        "clamp-negative-deltas" => {
            let enabled = value
                .parse::<bool>()
                .context("Invalid boolean value. Use 'true' or 'false'")?;
            config.accumulator.clamp_negative_deltas = enabled;
        }
        "session-ttl-minutes" => {
            let minutes = value.parse::<u64>().context("Invalid number value")?;
            config.accumulator.session_ttl_minutes = minutes;
        }
        "number-comma" => {
            let enabled = value
                .parse::<bool>()
                .context("Invalid boolean value. Use 'true' or 'false'")?;
            config.formatting.number_comma = enabled;
        }
        "number-human" => {
            let enabled = value
                .parse::<bool>()
                .context("Invalid boolean value. Use 'true' or 'false'")?;
            config.formatting.number_human = enabled;
        }
        "locale" => {
            config.formatting.locale = value.to_string();
        }
        "decimal-places" => {
            let places = value.parse::<usize>().context("Invalid number value")?;
            config.formatting.decimal_places = places;
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    config.save(false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{GRID_ENV_LOCK, GRID_INTENSITY_ENV};
    use tempfile::TempDir;

    fn setup_test_config() -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join(".ecotrail.toml");
        set_test_config_path(config_path.clone());
        (dir, config_path)
    }

    #[test]
    fn default_config_round_trip() {
        let (_dir, _path) = setup_test_config();
        create_default_config(true).expect("create_default_config");

        let loaded = Config::load()
            .expect("load config")
            .expect("config should exist");

        assert_eq!(loaded.estimation.grid_intensity, 400.0);
        assert!(!loaded.accumulator.clamp_negative_deltas);
        assert_eq!(loaded.session_ttl(), None);
        assert_eq!(loaded.negative_delta_policy(), NegativeDeltaPolicy::Unclamped);
        assert_eq!(loaded.formatting.locale, "en");
    }

    #[test]
    fn set_config_value_behaviour() {
        let (_dir, _path) = setup_test_config();
        create_default_config(true).expect("create_default_config");

        set_config_value("grid-intensity", "250").expect("set grid-intensity");
        set_config_value("clamp-negative-deltas", "true").expect("set clamp-negative-deltas");
        set_config_value("session-ttl-minutes", "90").expect("set session-ttl-minutes");
        set_config_value("number-comma", "false").expect("set number-comma");
        set_config_value("number-human", "true").expect("set number-human");
        set_config_value("locale", "de").expect("set locale");
        set_config_value("decimal-places", "3").expect("set decimal-places");

        let cfg = Config::load()
            .expect("load config")
            .expect("config should exist");

        assert_eq!(cfg.estimation.grid_intensity, 250.0);
        assert_eq!(cfg.negative_delta_policy(), NegativeDeltaPolicy::Clamped);
        assert_eq!(cfg.session_ttl(), Some(Duration::minutes(90)));
        let options = cfg.number_format_options();
        assert!(!options.use_comma);
        assert!(options.use_human);
        assert_eq!(options.locale, "de");
        assert_eq!(options.decimal_places, 3);

        let err = set_config_value("unknown-key", "value").unwrap_err();
        let msg = format!("{err}");
        assert!(
            msg.contains("Unknown config key"),
            "unexpected error message: {msg}"
        );
        for bad in ["-5", "abc", "0"] {
            let err = set_config_value("grid-intensity", bad).unwrap_err();
            assert!(
                format!("{err}").contains("Invalid grid intensity"),
                "accepted {bad}"
            );
        }
        let err = set_config_value("clamp-negative-deltas", "not-a-bool").unwrap_err();
        assert!(format!("{err}").contains("Invalid boolean value"));
    }

    #[test]
    fn grid_intensity_env_overrides_config() {
        let _guard = GRID_ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let saved = std::env::var(GRID_INTENSITY_ENV).ok();

        // SAFETY: GRID_ENV_LOCK serializes every test touching the variable
        unsafe { std::env::set_var(GRID_INTENSITY_ENV, "50") };
        assert_eq!(Config::default().effective_grid_intensity(), 50.0);

        unsafe { std::env::set_var(GRID_INTENSITY_ENV, "abc") };
        assert_eq!(Config::default().effective_grid_intensity(), 400.0);

        let mut config = Config::default();
        config.estimation.grid_intensity = 250.0;
        assert_eq!(config.effective_grid_intensity(), 250.0);

        unsafe { std::env::remove_var(GRID_INTENSITY_ENV) };
        assert_eq!(config.effective_grid_intensity(), 250.0);

        match saved {
            Some(value) => unsafe { std::env::set_var(GRID_INTENSITY_ENV, value) },
            None => unsafe { std::env::remove_var(GRID_INTENSITY_ENV) },
        }
    }
}
