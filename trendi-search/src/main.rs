use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use trendi_search::actions::{default_timeframe, stored_summary};
use trendi_search::config::AppConfig;
use trendi_search::session::SharedSession;
use trendi_search::{types::*, AppState};

type ApiError = (StatusCode, Json<ErrorResponse>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Starting trendi-search");
    info!("Search endpoint: {}", config.search_endpoint);
    info!("Trends endpoint: {}", config.trends_url);
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(AppState::new(config)?);
    if state.summarizer.is_none() {
        warn!("Summarizer model unavailable; summaries will show a placeholder");
    }

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/trends", post(trends_handler))
        .route("/trends/regions", post(regions_handler))
        .route("/sessions", post(create_session))
        .route("/sessions/:id/search", post(search_handler))
        .route("/sessions/:id/summaries", post(summarize_handler))
        .route("/sessions/:id/summaries/:search_id/:index", get(stored_summary_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("trendi-search listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "trendi-search",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn dates(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (default_start, default_end) = default_timeframe(today);
    (start.unwrap_or(default_start), end.unwrap_or(default_end))
}

async fn trends_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrendsRequest>,
) -> Json<TrendsView> {
    let today = today();
    let (start, end) = dates(request.start_date, request.end_date, today);
    Json(state.show_trends(&request.keywords, start, end, today).await)
}

async fn regions_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegionsRequest>,
) -> Json<RegionView> {
    let today = today();
    let (start, end) = dates(request.start_date, request.end_date, today);
    Json(state.show_trending_regions(&request.keyword, start, end, today).await)
}

async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionCreated>) {
    let (session_id, _) = state.sessions.create().await;
    info!("Created session {}", session_id);
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn find_session(state: &AppState, id: Uuid) -> Result<SharedSession, ApiError> {
    state.sessions.get(&id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: format!("Unknown session: {}", id) }),
        )
    })
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchView>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    Ok(Json(state.search(&mut session, request).await))
}

async fn summarize_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummaryView>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    Ok(Json(state.summarize_item(&mut session, request.search_id, request.index).await))
}

async fn stored_summary_handler(
    State(state): State<Arc<AppState>>,
    Path((id, search_id, index)): Path<(Uuid, u64, usize)>,
) -> Result<Json<StoredSummaryView>, ApiError> {
    let session = find_session(&state, id).await?;
    let session = session.lock().await;
    Ok(Json(stored_summary(&session, search_id, index)))
}
