use schemars::JsonSchema;
use schemars::transform::RecursiveTransform;
use serde::{Deserialize, Serialize};

use crate::report::EcoReport;

/// Strips non-standard numeric `format` annotations from JSON Schemas.
///
/// The `schemars` crate emits format values like `"uint64"`, `"int32"`, and `"double"` for Rust
/// numeric types. These are not defined by the JSON Schema specification and cause noisy warnings
/// in strict validators such as `ajv` (used by OpenCode and other MCP clients).
fn strip_non_standard_format(schema: &mut schemars::Schema) {
    let dominated = schema
        .get("format")
        .and_then(|v| v.as_str())
        .is_some_and(|f| {
            matches!(
                f,
                "uint8"
                    | "int8"
                    | "uint16"
                    | "int16"
                    | "uint32"
                    | "int32"
                    | "uint64"
                    | "int64"
                    | "uint"
                    | "int"
                    | "float"
                    | "double"
            )
        });
    if dominated {
        schema.remove("format");
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RecordEventRequest {
    /// One host event as JSON, e.g. `{"type":"message.updated","properties":{"info":{...}}}`.
    pub event: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetEcoReportRequest {
    /// Session identifier reported by the host.
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EndSessionRequest {
    /// Session identifier reported by the host.
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListSessionsRequest {}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RecordEventResponse {
    /// "recorded", "session_ended" or "ignored"
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct ReportFigures {
    pub messages: u32,
    pub total_tokens: u64,
    pub model_tier: String,
    pub grid_intensity: f64,
    pub energy_kwh: f64,
    pub co2_grams: f64,
    pub grade: String,
    pub grade_level: u8,
}

impl From<&EcoReport> for ReportFigures {
    fn from(report: &EcoReport) -> Self {
        Self {
            messages: report.messages,
            total_tokens: report.total_tokens,
            model_tier: report.tier.to_string(),
            grid_intensity: report.grid_intensity,
            energy_kwh: report.energy_kwh,
            co2_grams: report.co2_grams,
            grade: report.grade.letter.to_string(),
            grade_level: report.grade.level,
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct EcoReportResponse {
    pub session_id: String,
    /// Markdown report, or the "no data yet" message
    pub report: String,
    /// Present only when the session has recorded assistant messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figures: Option<ReportFigures>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct SessionSummary {
    pub session_id: String,
    pub messages: u32,
    pub total_tokens: u64,
    pub co2_grams: f64,
    pub grade: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct EndSessionResponse {
    pub removed: bool,
}
