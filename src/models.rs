use phf::phf_map;

use crate::types::ModelTier;

/// Known model identifiers and their size tier. Anything not listed here goes
/// through [`TIER_RULES`].
static MODEL_TIERS: phf::Map<&'static str, ModelTier> = phf_map! {
    // Anthropic
    "claude-opus-4-1" => ModelTier::Large,
    "claude-opus-4-1-20250805" => ModelTier::Large,
    "claude-opus-4" => ModelTier::Large,
    "claude-opus-4-20250514" => ModelTier::Large,
    "claude-opus-4-5" => ModelTier::Large,
    "claude-3-opus" => ModelTier::Large,
    "claude-3-opus-20240229" => ModelTier::Large,
    "claude-sonnet-4-5" => ModelTier::Medium,
    "claude-sonnet-4-5-20250929" => ModelTier::Medium,
    "claude-sonnet-4" => ModelTier::Medium,
    "claude-sonnet-4-20250514" => ModelTier::Medium,
    "claude-3-7-sonnet" => ModelTier::Medium,
    "claude-3-7-sonnet-20250219" => ModelTier::Medium,
    "claude-3-5-sonnet" => ModelTier::Medium,
    "claude-3-5-sonnet-20241022" => ModelTier::Medium,
    "claude-haiku-4-5" => ModelTier::Small,
    "claude-haiku-4-5-20251001" => ModelTier::Small,
    "claude-3-5-haiku" => ModelTier::Small,
    "claude-3-5-haiku-20241022" => ModelTier::Small,
    "claude-3-haiku" => ModelTier::Small,
    "claude-3-haiku-20240307" => ModelTier::Small,

    // OpenAI
    "gpt-5" => ModelTier::Large,
    "gpt-5-codex" => ModelTier::Large,
    "gpt-5-mini" => ModelTier::Small,
    "gpt-5-nano" => ModelTier::Small,
    "gpt-4.1" => ModelTier::Medium,
    "gpt-4.1-mini" => ModelTier::Small,
    "gpt-4.1-nano" => ModelTier::Small,
    "gpt-4o" => ModelTier::Medium,
    "gpt-4o-mini" => ModelTier::Small,
    "gpt-4.5-preview" => ModelTier::Large,
    "o1" => ModelTier::Large,
    "o1-pro" => ModelTier::Large,
    "o1-mini" => ModelTier::Small,
    "o3" => ModelTier::Large,
    "o3-pro" => ModelTier::Large,
    "o3-mini" => ModelTier::Small,
    "o4-mini" => ModelTier::Small,
    "gpt-oss-120b" => ModelTier::Medium,
    "gpt-oss-20b" => ModelTier::Small,

    // Google
    "gemini-3-pro-preview" => ModelTier::Large,
    "gemini-2.5-pro" => ModelTier::Large,
    "gemini-2.5-flash" => ModelTier::Small,
    "gemini-2.5-flash-lite" => ModelTier::Small,
    "gemini-2.0-flash" => ModelTier::Small,
    "gemini-1.5-pro" => ModelTier::Medium,

    // Others commonly routed through coding agents
    "grok-4" => ModelTier::Large,
    "grok-code-fast-1" => ModelTier::Small,
    "kimi-k2" => ModelTier::Large,
    "qwen3-coder" => ModelTier::Large,
    "glm-4.6" => ModelTier::Medium,
    "deepseek-chat" => ModelTier::Medium,
    "deepseek-reasoner" => ModelTier::Medium,
    "codestral-latest" => ModelTier::Small,
    "mistral-large-latest" => ModelTier::Large,
};

/// One step of the substring fallback.
pub struct TierRule {
    pub marker: &'static str,
    /// The rule is skipped when the id also contains this qualifier
    pub unless: Option<&'static str>,
    pub tier: ModelTier,
}

/// Substring heuristics for ids missing from [`MODEL_TIERS`], evaluated in
/// order against the lower-cased id. Small markers come first so that e.g.
/// "o3-mini" never reaches the "o3" large marker. The mini marker carries its
/// dash because "gemini" contains "mini".
pub static TIER_RULES: &[TierRule] = &[
    TierRule { marker: "haiku", unless: None, tier: ModelTier::Small },
    TierRule { marker: "-mini", unless: None, tier: ModelTier::Small },
    TierRule { marker: "nano", unless: None, tier: ModelTier::Small },
    TierRule { marker: "flash", unless: None, tier: ModelTier::Small },
    TierRule { marker: "lite", unless: None, tier: ModelTier::Small },
    TierRule { marker: "small", unless: None, tier: ModelTier::Small },
    TierRule { marker: "8b", unless: None, tier: ModelTier::Small },
    TierRule { marker: "7b", unless: None, tier: ModelTier::Small },
    TierRule { marker: "3b", unless: None, tier: ModelTier::Small },
    TierRule { marker: "1b", unless: None, tier: ModelTier::Small },
    TierRule { marker: "opus", unless: None, tier: ModelTier::Large },
    TierRule { marker: "o1", unless: Some("-mini"), tier: ModelTier::Large },
    TierRule { marker: "o3", unless: Some("-mini"), tier: ModelTier::Large },
    TierRule { marker: "gpt-4.5", unless: None, tier: ModelTier::Large },
    TierRule { marker: "ultra", unless: None, tier: ModelTier::Large },
    TierRule { marker: "405b", unless: None, tier: ModelTier::Large },
    TierRule { marker: "-pro", unless: None, tier: ModelTier::Large },
    TierRule { marker: "large", unless: None, tier: ModelTier::Large },
];

/// Tier used when neither the table nor the heuristics recognize an id.
pub const DEFAULT_TIER: ModelTier = ModelTier::Medium;

impl TierRule {
    fn matches(&self, lowered: &str) -> bool {
        lowered.contains(self.marker) && !self.unless.is_some_and(|q| lowered.contains(q))
    }
}

/// Classify a model identifier into a size tier. Unknown ids never fail; they
/// fall through to [`DEFAULT_TIER`].
pub fn classify(model_id: &str) -> ModelTier {
    if let Some(&tier) = MODEL_TIERS.get(model_id) {
        return tier;
    }

    classify_heuristic(model_id).unwrap_or(DEFAULT_TIER)
}

/// Apply only the substring rules. Returns `None` when no rule matches.
pub fn classify_heuristic(model_id: &str) -> Option<ModelTier> {
    let lowered = model_id.to_lowercase();
    TIER_RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.tier)
}

/// Energy drawn per processed token, in kWh.
pub fn energy_per_token_kwh(tier: ModelTier) -> f64 {
    match tier {
        ModelTier::Small => 0.000_000_3,
        ModelTier::Medium => 0.000_001,
        ModelTier::Large => 0.000_003,
    }
}
