use std::sync::Arc;

use chrono::Utc;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, Implementation, ListResourcesResult, PaginatedRequestParam, ProtocolVersion,
    RawResource, ReadResourceRequestParam, ReadResourceResult, ResourceContents,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{
    ErrorData as McpError, Json, RoleServer, ServerHandler, ServiceExt, tool, tool_handler,
    tool_router,
};

use crate::accumulator::SessionAccumulator;
use crate::config::Config;
use crate::events::{EventOutcome, decode_event};
use crate::report::{
    NO_DATA_MESSAGE, ReportClock, build_report, render_report, session_report,
};
use crate::utils::NumberFormatOptions;

use super::types::*;

/// Resource URI constants
mod resource_uris {
    pub const SESSIONS: &str = "ecotrail://sessions";
}

/// The ecotrail MCP server. Hosts push their events through `record_event`
/// and ask for reports through `get_eco_report`.
#[derive(Clone)]
pub struct EcotrailMcpServer {
    tool_router: ToolRouter<Self>,
    accumulator: Arc<SessionAccumulator>,
    grid_intensity: f64,
    format_options: NumberFormatOptions,
    session_ttl: Option<chrono::Duration>,
}

impl EcotrailMcpServer {
    pub fn new(config: &Config, format_options: NumberFormatOptions) -> Self {
        Self {
            tool_router: Self::tool_router(),
            accumulator: Arc::new(SessionAccumulator::with_policy(
                config.negative_delta_policy(),
            )),
            grid_intensity: config.effective_grid_intensity(),
            format_options,
            session_ttl: config.session_ttl(),
        }
    }

    fn session_summaries(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        self.accumulator
            .session_ids()
            .into_iter()
            .filter_map(|session_id| {
                let stats = self.accumulator.session_stats(&session_id)?;
                let report = build_report(&stats, self.grid_intensity, now);
                Some(SessionSummary {
                    session_id,
                    messages: report.messages,
                    total_tokens: report.total_tokens,
                    co2_grams: report.co2_grams,
                    grade: report.grade.letter.to_string(),
                })
            })
            .collect()
    }
}

#[tool_router]
impl EcotrailMcpServer {
    #[tool(
        name = "record_event",
        description = "Record one host event (JSON). message.updated events from the assistant update the session's token totals; session.deleted drops the session; other events are ignored."
    )]
    async fn record_event(
        &self,
        Parameters(req): Parameters<RecordEventRequest>,
    ) -> Result<Json<RecordEventResponse>, String> {
        let event = decode_event(&req.event).map_err(|e| format!("{e:#}"))?;
        let outcome = self.accumulator.handle_event(&event);

        if let Some(ttl) = self.session_ttl {
            self.accumulator.evict_idle(ttl, Utc::now());
        }

        let outcome = match outcome {
            EventOutcome::Recorded => "recorded",
            EventOutcome::SessionEnded => "session_ended",
            EventOutcome::Ignored => "ignored",
        };
        Ok(Json(RecordEventResponse {
            outcome: outcome.to_string(),
        }))
    }

    #[tool(
        name = "get_eco_report",
        description = "Get the estimated energy use, CO2 emissions and eco grade of a coding session as a Markdown report."
    )]
    async fn get_eco_report(
        &self,
        Parameters(req): Parameters<GetEcoReportRequest>,
    ) -> Result<Json<EcoReportResponse>, String> {
        let eco = session_report(
            &self.accumulator,
            &req.session_id,
            self.grid_intensity,
            ReportClock::Now,
        );
        let (report, figures) = match eco {
            Some(eco) => (
                render_report(&eco, &self.format_options),
                Some(ReportFigures::from(&eco)),
            ),
            None => (NO_DATA_MESSAGE.to_string(), None),
        };

        Ok(Json(EcoReportResponse {
            session_id: req.session_id,
            report,
            figures,
        }))
    }

    #[tool(
        name = "list_sessions",
        description = "List the sessions with recorded usage, with their message count, CO2 estimate and grade."
    )]
    async fn list_sessions(
        &self,
        Parameters(_req): Parameters<ListSessionsRequest>,
    ) -> Result<Json<SessionListResponse>, String> {
        Ok(Json(SessionListResponse {
            sessions: self.session_summaries(),
        }))
    }

    #[tool(
        name = "end_session",
        description = "Forget a finished session and all of its recorded usage."
    )]
    async fn end_session(
        &self,
        Parameters(req): Parameters<EndSessionRequest>,
    ) -> Result<Json<EndSessionResponse>, String> {
        let removed = self.accumulator.end_session(&req.session_id).is_some();
        Ok(Json(EndSessionResponse { removed }))
    }
}

#[tool_handler]
impl ServerHandler for EcotrailMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "ecotrail".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Ecotrail Carbon Reports".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Ecotrail MCP Server - carbon footprint estimates for AI coding sessions. \
                 Record host message events, then ask for a session's eco report."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![
                RawResource::new(resource_uris::SESSIONS, "Tracked Sessions".to_string())
                    .no_annotation(),
            ],
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match uri.as_str() {
            resource_uris::SESSIONS => {
                let lines: Vec<String> = self
                    .session_summaries()
                    .iter()
                    .map(|s| {
                        format!(
                            "{}: {} messages, {} tokens, {:.3} g CO2, grade {}",
                            s.session_id, s.messages, s.total_tokens, s.co2_grams, s.grade
                        )
                    })
                    .collect();

                let content = if lines.is_empty() {
                    "No sessions tracked yet".to_string()
                } else {
                    lines.join("\n")
                };

                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(content, uri)],
                })
            }
            _ => Err(McpError::resource_not_found(
                "resource_not_found",
                Some(rmcp::serde_json::json!({ "uri": uri })),
            )),
        }
    }
}

/// Run the MCP server with stdio transport
pub async fn run_mcp_server(config: &Config, format_options: NumberFormatOptions) -> anyhow::Result<()> {
    use rmcp::transport::stdio;

    let server = EcotrailMcpServer::new(config, format_options);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
