use rmcp::{model::*, ServiceExt};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::actions::default_timeframe;
use crate::config::AppConfig;
use crate::session::Session;
use crate::summarize::summarize_link;
use crate::types::*;
use crate::AppState;

/// The dashboard's actions exposed as MCP tools. One stdio client is one
/// user, so the service owns a single session.
#[derive(Clone)]
pub struct McpService {
    pub state: Arc<AppState>,
    session: Arc<Mutex<Session>>,
}

#[derive(serde::Deserialize)]
struct SummarizeUrlArgs {
    url: String,
}

impl McpService {
    pub fn new() -> anyhow::Result<Self> {
        // stdout carries the protocol
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();

        let config = AppConfig::from_env()?;
        info!("Starting MCP Service");
        info!("Search endpoint: {}", config.search_endpoint);

        Ok(Self::with_state(Arc::new(AppState::new(config)?)))
    }

    pub fn with_state(state: Arc<AppState>) -> Self {
        Self { state, session: Arc::new(Mutex::new(Session::new())) }
    }
}

fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
    match value {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    }
}

fn tool(name: &'static str, description: &'static str, input: serde_json::Value) -> Tool {
    Tool {
        name: Cow::Borrowed(name),
        description: Some(Cow::Borrowed(description)),
        input_schema: schema(input),
        output_schema: None,
        annotations: None,
    }
}

fn parse_args<T: DeserializeOwned>(request: &CallToolRequestParam) -> Result<T, ErrorData> {
    let args = request.arguments.clone().ok_or_else(|| {
        ErrorData::new(ErrorCode::INVALID_PARAMS, "Missing required arguments object", None)
    })?;
    serde_json::from_value(serde_json::Value::Object(args)).map_err(|e| {
        ErrorData::new(ErrorCode::INVALID_PARAMS, format!("Invalid arguments: {}", e), None)
    })
}

fn render_notices(text: &mut String, notices: &[Notice]) {
    for notice in notices {
        let tag = match notice.level {
            NoticeLevel::Success => "OK",
            NoticeLevel::Warning => "WARNING",
            NoticeLevel::Error => "ERROR",
        };
        text.push_str(&format!("[{}] {}\n", tag, notice.message));
    }
}

fn render_trends(view: &TrendsView) -> String {
    let mut text = String::new();
    render_notices(&mut text, &view.notices);
    if view.series.is_empty() {
        return text;
    }
    text.push_str(&format!("**{}**\n\n", view.title));
    for series in &view.series {
        text.push_str(&format!("{}:\n", series.keyword));
        for point in &series.points {
            text.push_str(&format!("  {} {}\n", point.date, point.value));
        }
    }
    text
}

fn render_regions(view: &RegionView) -> String {
    let mut text = String::new();
    render_notices(&mut text, &view.notices);
    if view.regions.is_empty() {
        return text;
    }
    let mut regions = view.regions.clone();
    regions.sort_by(|a, b| b.interest.cmp(&a.interest).then_with(|| a.region.cmp(&b.region)));
    text.push_str(&format!("**{}**\n\n", view.title));
    for r in regions.iter().filter(|r| r.interest > 0) {
        text.push_str(&format!("- {}: {}\n", r.region, r.interest));
    }
    text
}

fn render_search(view: &SearchView) -> String {
    let mut text = String::new();
    render_notices(&mut text, &view.notices);
    for card in &view.results {
        text.push_str(&format!("{}. **{}**\n   URL: {}\n", card.index + 1, card.title, card.link));
        if let Some(snippet) = &card.snippet {
            text.push_str(&format!("   Snippet: {}\n", snippet));
        }
        text.push('\n');
    }
    text
}

impl rmcp::ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: "trendi-search".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Google Trends exploration, trending regions, Google Custom Search and web page summarization.".to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let date_props = serde_json::json!({
            "type": "string",
            "format": "date",
            "description": "YYYY-MM-DD"
        });
        let tools = vec![
            tool(
                "google_trends",
                "Interest over time (0-100) for up to 10 keywords. Dates default to the last four years.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "keywords": { "type": "array", "items": { "type": "string" }, "maxItems": 10 },
                        "start_date": date_props,
                        "end_date": date_props
                    },
                    "required": ["keywords"]
                }),
            ),
            tool(
                "trending_regions",
                "Interest by country (0-100) for one keyword.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "keyword": { "type": "string" },
                        "start_date": date_props,
                        "end_date": date_props
                    },
                    "required": ["keyword"]
                }),
            ),
            tool(
                "google_search",
                "Search with Google Custom Search. Returns up to 10 results.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "date_range": {
                            "type": "string",
                            "enum": ["all_time", "last_day", "last_week", "last_month", "last_three_months", "last_year", "last_five_years"]
                        },
                        "content_type": { "type": "string", "enum": ["web", "image"] },
                        "domain_filter": {
                            "type": "string",
                            "description": "Appended to the query, e.g. site:wikipedia.org or -site:example.com"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            tool(
                "summarize_url",
                "Fetch an HTML page and summarize its text.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "The page to summarize" }
                    },
                    "required": ["url"]
                }),
            ),
        ];

        Ok(ListToolsResult {
            tools,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        info!("MCP tool call: {} with args: {:?}", request.name, request.arguments);
        let today = chrono::Local::now().date_naive();
        let (default_start, default_end) = default_timeframe(today);

        let text = match request.name.as_ref() {
            "google_trends" => {
                let args: TrendsRequest = parse_args(&request)?;
                let view = self
                    .state
                    .show_trends(
                        &args.keywords,
                        args.start_date.unwrap_or(default_start),
                        args.end_date.unwrap_or(default_end),
                        today,
                    )
                    .await;
                render_trends(&view)
            }
            "trending_regions" => {
                let args: RegionsRequest = parse_args(&request)?;
                let view = self
                    .state
                    .show_trending_regions(
                        &args.keyword,
                        args.start_date.unwrap_or(default_start),
                        args.end_date.unwrap_or(default_end),
                        today,
                    )
                    .await;
                render_regions(&view)
            }
            "google_search" => {
                let args: SearchRequest = parse_args(&request)?;
                let mut session = self.session.lock().await;
                render_search(&self.state.search(&mut session, args).await)
            }
            "summarize_url" => {
                let args: SummarizeUrlArgs = parse_args(&request)?;
                let _permit = self.state.outbound_limit.acquire().await.ok();
                summarize_link(self.state.summarizer, &self.state.fetcher, &args.url).await
            }
            _ => {
                error!("Unknown tool requested: {}", request.name);
                return Err(ErrorData::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("Unknown tool: {}", request.name),
                    None,
                ));
            }
        };

        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

pub async fn run() -> anyhow::Result<()> {
    let service = McpService::new()?;
    let server = service.serve(rmcp::transport::stdio()).await?;
    info!("MCP stdio server running");
    let _quit_reason = server.waiting().await?;
    Ok(())
}
