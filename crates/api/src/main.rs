mod cache;
mod config;
mod metrics;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use dashmap::DashMap;
use dispatch::{Orchestrator, RunError, RunRequest, RunStatus};
use plan::{ConstituentSet, Entity, PathEdge, QueryPlanner, Session, SessionError};
use serde::{Deserialize, Serialize};
use service::{AnalysisService, HttpAnalysisService};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{AnswerCache, CacheStats};
use crate::config::AppConfig;
use crate::metrics::{Metrics, MetricsSnapshot};

struct AppState {
    service: Arc<HttpAnalysisService>,
    orchestrator: Arc<Orchestrator<HttpAnalysisService>>,
    sessions: DashMap<String, SessionEntry>,
    runs: DashMap<String, RunSlot>,
    cache: Arc<AnswerCache>,
    metrics: Arc<Metrics>,
}

struct SessionEntry {
    session: Session,
    touched: Instant,
}

impl SessionEntry {
    fn new(session: Session) -> Self {
        Self {
            session,
            touched: Instant::now(),
        }
    }
}

enum RunSlot {
    Cached(String),
    Live {
        status: watch::Receiver<RunStatus>,
        cancel: CancellationToken,
    },
}

impl RunSlot {
    fn status(&self) -> RunStatus {
        match self {
            RunSlot::Cached(answer) => RunStatus::Resolved {
                answer: answer.clone(),
            },
            RunSlot::Live { status, .. } => status.borrow().clone(),
        }
    }

    fn cancel(&self) {
        if let RunSlot::Live { cancel, .. } = self {
            cancel.cancel();
        }
    }

    fn is_active(&self) -> bool {
        match self {
            RunSlot::Cached(_) => false,
            RunSlot::Live { status, .. } => !status.borrow().is_terminal(),
        }
    }
}

/// Store `slot` as the session's run, cancelling whatever run it displaces.
fn replace_run(runs: &DashMap<String, RunSlot>, session_id: &str, slot: RunSlot) {
    if let Some(previous) = runs.insert(session_id.to_string(), slot) {
        previous.cancel();
    }
}

/// Drop sessions untouched for longer than `ttl` along with their runs.
/// Sessions with a run still in flight are kept.
fn expire_idle_sessions(
    sessions: &DashMap<String, SessionEntry>,
    runs: &DashMap<String, RunSlot>,
    ttl: Duration,
    now: Instant,
) -> usize {
    let expired: Vec<String> = sessions
        .iter()
        .filter(|entry| now.saturating_duration_since(entry.touched) > ttl)
        .filter(|entry| runs.get(entry.key()).is_none_or(|slot| !slot.is_active()))
        .map(|entry| entry.key().clone())
        .collect();

    for id in &expired {
        sessions.remove(id);
        if let Some((_, slot)) = runs.remove(id) {
            slot.cancel();
        }
    }
    expired.len()
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    backend: String,
    sessions: usize,
    runs: usize,
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    question: String,
}

#[derive(Serialize)]
struct SessionView {
    session_id: String,
    question: String,
    entities: Vec<Entity>,
    constituents: ConstituentSet,
    edges: Vec<PathEdge>,
}

impl SessionView {
    fn new(session_id: &str, session: &Session) -> Self {
        Self {
            session_id: session_id.to_string(),
            question: session.question().to_string(),
            entities: session.entities().to_vec(),
            constituents: session.constituents().clone(),
            edges: session.edges().to_vec(),
        }
    }
}

#[derive(Deserialize)]
struct AddEntityRequest {
    name: String,
    entity_type: String,
}

#[derive(Deserialize)]
struct AddConstituentsRequest {
    entity: String,
    /// Comma-separated constituent names.
    input: String,
}

#[derive(Serialize)]
struct RunView {
    session_id: String,
    status: RunStatus,
}

#[derive(Serialize)]
struct MetricsResponse {
    metrics: MetricsSnapshot,
    cache: CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = AppConfig::load()?;
    info!(backend = %config.service.base_url, "Loaded configuration");

    let service = Arc::new(
        HttpAnalysisService::new(config.service.base_url.clone(), config.request_timeout())
            .context("Failed to build analysis service client")?,
    );

    let orchestrator = Orchestrator::new(Arc::clone(&service))
        .with_planner(QueryPlanner::new(config.planner.dedup))
        .with_poll_policy(config.poll_policy())
        .with_retry_policy(config.retry_policy());

    let cache_entries = if config.cache.enabled {
        config.cache.max_entries
    } else {
        0
    };

    let state = Arc::new(AppState {
        service,
        orchestrator: Arc::new(orchestrator),
        sessions: DashMap::new(),
        runs: DashMap::new(),
        cache: Arc::new(AnswerCache::new(cache_entries)),
        metrics: Metrics::new(),
    });

    if let Some(ttl) = config.session_ttl() {
        let sweeper = Arc::clone(&state);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl.min(Duration::from_secs(60)));
            loop {
                interval.tick().await;
                let expired =
                    expire_idle_sessions(&sweeper.sessions, &sweeper.runs, ttl, Instant::now());
                if expired > 0 {
                    info!(expired, "Expired idle sessions");
                }
            }
        });
    }

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/entities", post(add_entity))
        .route("/sessions/:id/entities/:name", delete(remove_entity))
        .route("/sessions/:id/constituents", post(add_constituents))
        .route(
            "/sessions/:id/entities/:name/constituents/:constituent",
            delete(remove_constituent),
        )
        .route(
            "/sessions/:id/run",
            post(start_run).get(get_run).delete(cancel_run),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!("Server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.service.base_url().to_string(),
        sessions: state.sessions.len(),
        runs: state.runs.len(),
    })
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        metrics: state.metrics.snapshot(),
        cache: state.cache.stats(),
    })
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let entities = state
        .service
        .extract_entities(question)
        .await
        .map_err(|e| {
            warn!(error = %e, "Entity extraction failed");
            StatusCode::BAD_GATEWAY
        })?;

    let mut session = Session::new(question);
    session.set_entities(entities).map_err(|e| {
        warn!(error = %e, "Backend returned unusable entities");
        StatusCode::BAD_GATEWAY
    })?;

    let session_id = Uuid::new_v4().to_string();
    let view = SessionView::new(&session_id, &session);
    state.sessions.insert(session_id, SessionEntry::new(session));

    Ok(Json(view))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, StatusCode> {
    let entry = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(SessionView::new(&id, &entry.session)))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    if let Some((_, slot)) = state.runs.remove(&id) {
        slot.cancel();
    }
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn add_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddEntityRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    update_session(&state, &id, |session| {
        session.add_entity(Entity::new(req.name.trim(), req.entity_type))
    })
}

async fn remove_entity(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<SessionView>, StatusCode> {
    update_session(&state, &id, |session| session.remove_entity(&name).map(|_| ()))
}

async fn add_constituents(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddConstituentsRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    let constituents = plan::parse_constituent_input(&req.input);
    if constituents.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    update_session(&state, &id, |session| {
        session.add_constituents(&req.entity, constituents)
    })
}

async fn remove_constituent(
    State(state): State<Arc<AppState>>,
    Path((id, name, constituent)): Path<(String, String, String)>,
) -> Result<Json<SessionView>, StatusCode> {
    update_session(&state, &id, |session| {
        session.remove_constituent(&name, &constituent)
    })
}

fn update_session(
    state: &AppState,
    id: &str,
    update: impl FnOnce(&mut Session) -> Result<(), SessionError>,
) -> Result<Json<SessionView>, StatusCode> {
    let mut entry = state.sessions.get_mut(id).ok_or(StatusCode::NOT_FOUND)?;
    entry.touched = Instant::now();
    update(&mut entry.session).map_err(|e| {
        warn!(session_id = id, error = %e, "Session update rejected");
        session_error_status(&e)
    })?;
    Ok(Json(SessionView::new(id, &entry.session)))
}

fn session_error_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::DuplicateEntity(_) => StatusCode::CONFLICT,
        SessionError::UnknownEntity(_) => StatusCode::NOT_FOUND,
        SessionError::EmptyEntityName
        | SessionError::NotRefinable { .. }
        | SessionError::EmptyConstituent(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunView>, StatusCode> {
    let request = {
        let mut entry = state.sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
        entry.touched = Instant::now();
        RunRequest {
            question: entry.session.question().to_string(),
            input: entry.session.snapshot(),
        }
    };

    if let Some((_, previous)) = state.runs.remove(&id) {
        previous.cancel();
    }
    state.metrics.record_run_started();

    if let Some(answer) = state.cache.get_answer(&request.question) {
        info!(session_id = %id, "Answer served from local cache");
        state.metrics.record_local_cache_hit();
        let slot = RunSlot::Cached(answer);
        let status = slot.status();
        replace_run(&state.runs, &id, slot);
        return Ok(Json(RunView {
            session_id: id,
            status,
        }));
    }

    let question = request.question.clone();
    let handle = state.orchestrator.spawn(request);
    let slot = RunSlot::Live {
        status: handle.subscribe(),
        cancel: handle.cancel_token(),
    };
    let status = slot.status();
    replace_run(&state.runs, &id, slot);

    let cache = Arc::clone(&state.cache);
    let metrics = Arc::clone(&state.metrics);
    let session_id = id.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        match handle.join().await {
            Ok(report) => {
                info!(
                    session_id = %session_id,
                    from_cache = report.from_cache,
                    combinations = report.combinations,
                    "Run resolved"
                );
                metrics.record_resolved(&report, started.elapsed());
                cache.set_answer(&question, report.answer);
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Run ended without an answer");
                metrics.record_failed(matches!(e, RunError::Cancelled));
            }
        }
    });

    Ok(Json(RunView {
        session_id: id,
        status,
    }))
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunView>, StatusCode> {
    let slot = state.runs.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(RunView {
        status: slot.status(),
        session_id: id,
    }))
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunView>, StatusCode> {
    let slot = state.runs.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    slot.cancel();
    Ok(Json(RunView {
        status: slot.status(),
        session_id: id,
    }))
}
