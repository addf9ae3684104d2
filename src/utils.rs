use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use chrono::Duration;
use num_format::{Locale, ToFormattedString};

static WARNED_MESSAGES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

pub fn warn_once(message: impl Into<String>) {
    let message = message.into();
    let cache = WARNED_MESSAGES.get_or_init(|| Mutex::new(HashSet::new()));

    if let Ok(mut warned) = cache.lock()
        && warned.insert(message.clone())
    {
        eprintln!("{message}");
    }
}

#[derive(Clone)]
pub struct NumberFormatOptions {
    pub use_comma: bool,
    pub use_human: bool,
    pub locale: String,
    pub decimal_places: usize,
}

impl Default for NumberFormatOptions {
    fn default() -> Self {
        Self {
            use_comma: true,
            use_human: false,
            locale: "en".to_string(),
            decimal_places: 2,
        }
    }
}

/// Format a number for display. Accepts both u32 and u64.
pub fn format_number(n: impl Into<u64>, options: &NumberFormatOptions) -> String {
    let n: u64 = n.into();
    let locale = match options.locale.as_str() {
        "de" => Locale::de,
        "fr" => Locale::fr,
        "es" => Locale::es,
        "it" => Locale::it,
        "ja" => Locale::ja,
        "ko" => Locale::ko,
        "zh" => Locale::zh,
        _ => Locale::en,
    };

    if options.use_human {
        if n >= 1_000_000_000_000 {
            format!(
                "{:.prec$}t",
                n as f64 / 1_000_000_000_000.0,
                prec = options.decimal_places
            )
        } else if n >= 1_000_000_000 {
            format!(
                "{:.prec$}b",
                n as f64 / 1_000_000_000.0,
                prec = options.decimal_places
            )
        } else if n >= 1_000_000 {
            format!(
                "{:.prec$}m",
                n as f64 / 1_000_000.0,
                prec = options.decimal_places
            )
        } else if n >= 1_000 {
            format!(
                "{:.prec$}k",
                n as f64 / 1_000.0,
                prec = options.decimal_places
            )
        } else {
            n.to_string()
        }
    } else if options.use_comma {
        n.to_formatted_string(&locale)
    } else {
        n.to_string()
    }
}

/// Format a signed running total. Negative totals only appear after
/// out-of-order snapshots and are shown as-is.
pub fn format_signed(n: i64, options: &NumberFormatOptions) -> String {
    if n < 0 {
        format!("-{}", format_number(n.unsigned_abs(), options))
    } else {
        format_number(n as u64, options)
    }
}

/// Format a small physical quantity with enough precision to stay readable:
/// values under 1 get significant digits, larger ones `decimal_places`.
pub fn format_quantity(value: f64, decimal_places: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.abs() >= 1.0 {
        return format!("{value:.decimal_places$}");
    }

    // Keep three significant digits for sub-unit values
    let magnitude = value.abs().log10().floor() as i32;
    let precision = (2 - magnitude).clamp(0, 12) as usize;
    format!("{value:.precision$}")
}

/// Format an elapsed duration as e.g. "1h 05m", "12m 30s" or "42s".
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests;
