use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use shuttle_axum::axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::auth::AuthConfig;
use crate::config::{ModelConfig, PipelineConfig};
use crate::error::GenerateError;
use crate::generate::model_client::{build_model_client, ModelClient};
use crate::generate::{now_unix, GenerateOptions, Generator};
use crate::history::HistoryTracker;
use crate::ingest::classifier::{ClassifierConfig, ToolSignalClassifier};
use crate::ingest::SignalAggregator;
use crate::metrics::Metrics;
use crate::source_weights::SourceWeightsConfig;
use crate::store::{BatchStore, DailyBatch, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
    pub store: BatchStore,
    pub auth: AuthConfig,
    pub keep_days: u32,
    pub runs_hours: u32,
}

impl AppState {
    pub fn new(
        generator: Arc<Generator>,
        store: BatchStore,
        auth: AuthConfig,
        cfg: &PipelineConfig,
    ) -> Self {
        Self {
            generator,
            store,
            auth,
            keep_days: cfg.store.keep_days,
            runs_hours: cfg.history.hours,
        }
    }

    /// Wire the live pipeline from config files and environment.
    /// `AI_TEST_MODE=mock` uses the scripted model and skips live feeds.
    pub fn from_env() -> anyhow::Result<Self> {
        let cfg = PipelineConfig::load()?;
        let model = ModelConfig::load()?;
        let store = BatchStore::from_config(&cfg.store);
        let classifier = ToolSignalClassifier::from_config(&ClassifierConfig::load()?)?;
        let weights = SourceWeightsConfig::load();

        let signals = if model.provider == "mock" {
            SignalAggregator::new(Vec::new(), Vec::new(), classifier, weights, cfg.signals.clone())
        } else {
            let http = reqwest::Client::builder()
                .user_agent(concat!("toolpulse/", env!("CARGO_PKG_VERSION")))
                .connect_timeout(Duration::from_secs(5))
                .timeout(Duration::from_secs(10))
                .build()?;
            SignalAggregator::live(http, classifier, weights, cfg.signals.clone())?
        };
        let history = HistoryTracker::new(cfg.history.clone()).with_store(Arc::new(store.clone()));
        let client: Arc<dyn ModelClient> =
            Arc::from(build_model_client(&model, cfg.contract.target_count)?);

        info!(
            provider = %model.provider,
            model = %model.model,
            store = %store.dir().display(),
            "pipeline wired"
        );
        let generator = Generator::new(cfg.clone(), model, signals, history, client);
        Ok(Self::new(Arc::new(generator), store, AuthConfig::from_env(), &cfg))
    }
}

pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/generate", post(generate))
        .route("/api/daily", get(daily))
        .route("/api/mark", post(mark))
        .route("/api/runs", get(runs))
        .route("/api/cron", get(cron))
        .route("/api/auth", post(login).delete(logout))
        .layer(CorsLayer::very_permissive())
        .with_state(state);
    match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = if e.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else if e.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            error!(target: "store", error = %e, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, e.to_string())
    }
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        error!(target: "generate", kind = e.kind(), error = %e, "generation failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        error!(target: "store", error = %e, "store task failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store task failed")
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run file-backed store calls on the blocking pool.
async fn with_store<T, F>(store: &BatchStore, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&BatchStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
}

fn require_auth(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    if state.auth.is_authorized(headers) {
        Ok(())
    } else {
        Err(ApiError::unauthorized())
    }
}

/// Empty body → `T::default()`; otherwise JSON.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

fn flag(v: &Option<String>) -> bool {
    v.as_deref()
        .is_some_and(|s| !s.is_empty() && s != "false" && s != "0")
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn generate_and_save(state: &AppState, opts: GenerateOptions) -> ApiResult<DailyBatch> {
    let now = now_unix();
    let posts = state.generator.generate_at(now, opts).await?;
    let date = state.store.day_key(now);
    with_store(&state.store, move |store| {
        let batch = store.save_daily(&date, &posts)?;
        store.save_run(now, &posts)?;
        Ok(batch)
    })
    .await
}

async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    require_auth(&state, &headers)?;
    let opts: GenerateOptions = parse_body(&body)?;
    let batch = generate_and_save(&state, opts).await?;
    Ok(Json(json!({ "success": true, "data": batch })))
}

#[derive(Debug, Default, Deserialize)]
struct DailyQuery {
    list: Option<String>,
    date: Option<String>,
}

async fn daily(
    State(state): State<AppState>,
    Query(q): Query<DailyQuery>,
) -> ApiResult<Json<Value>> {
    if flag(&q.list) {
        let dates = with_store(&state.store, BatchStore::available_dates).await?;
        return Ok(Json(json!({ "success": true, "dates": dates })));
    }

    let (date, source) = match non_empty(q.date) {
        Some(d) => (d, "history"),
        None => (state.store.day_key(now_unix()), "cache"),
    };
    match with_store(&state.store, move |store| store.load_daily(&date)).await? {
        Some(batch) => Ok(Json(json!({ "success": true, "data": batch, "source": source }))),
        None => Ok(Json(json!({ "success": true, "data": null, "source": "empty" }))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct MarkRequest {
    date: Option<String>,
    index: Option<i64>,
}

async fn mark(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    require_auth(&state, &headers)?;
    let req: MarkRequest = parse_body(&body)?;
    let (Some(date), Some(index)) = (non_empty(req.date), req.index) else {
        return Err(ApiError::bad_request("Missing date or index"));
    };
    let index = usize::try_from(index).map_err(|_| ApiError::bad_request("index must be >= 0"))?;
    let post = with_store(&state.store, move |store| store.toggle_posted(&date, index)).await?;
    Ok(Json(json!({ "success": true, "tweetedStatus": post.posted })))
}

#[derive(Debug, Default, Deserialize)]
struct RunsQuery {
    list: Option<String>,
    id: Option<String>,
}

async fn runs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<RunsQuery>,
) -> ApiResult<Json<Value>> {
    require_auth(&state, &headers)?;
    if let Some(id) = non_empty(q.id) {
        return match with_store(&state.store, move |store| store.load_run(&id)).await? {
            Some(run) => Ok(Json(json!({ "success": true, "data": run }))),
            None => Err(ApiError::new(StatusCode::NOT_FOUND, "Saved run not found")),
        };
    }
    if flag(&q.list) {
        let hours = state.runs_hours;
        let runs = with_store(&state.store, move |store| store.list_runs(now_unix(), hours)).await?;
        return Ok(Json(json!({ "success": true, "data": runs })));
    }
    Err(ApiError::bad_request("Missing query parameter: list or id"))
}

async fn cron(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    if !state.auth.cron_authorized(&headers) {
        warn!(target: "api", "cron call rejected");
        return Err(ApiError::unauthorized());
    }
    let keep_days = state.keep_days;
    let cleaned = with_store(&state.store, move |store| store.cleanup(keep_days, now_unix())).await?;
    let batch = generate_and_save(&state, GenerateOptions::default()).await?;
    info!(target: "api", cleaned, date = %batch.date, posts = batch.tweets.len(), "cron run finished");
    Ok(Json(json!({ "success": true, "data": batch, "cleaned": cleaned })))
}

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    password: Option<String>,
}

async fn login(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let req: LoginRequest = parse_body(&body)?;
    if !state.auth.check_password(req.password.as_deref()) {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid password"));
    }
    Ok((
        [(header::SET_COOKIE, state.auth.login_cookie())],
        Json(json!({ "success": true })),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>) -> Response {
    (
        [(header::SET_COOKIE, state.auth.logout_cookie())],
        Json(json!({ "success": true })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_store_errors_map_to_http_status() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = BatchStore::new(tmp.path(), 0);

        let err = with_store(&store, |s| s.load_daily("not-a-date"))
            .await
            .expect_err("invalid key");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = with_store(&store, |s| s.toggle_posted("2025-10-09", 0))
            .await
            .expect_err("missing day");
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let dates = with_store(&store, BatchStore::available_dates)
            .await
            .expect("list");
        assert!(dates.is_empty());
    }

    #[tokio::test]
    async fn a_panicking_store_call_becomes_a_500() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = BatchStore::new(tmp.path(), 0);
        let err = with_store(&store, |_| -> Result<(), StoreError> { panic!("disk on fire") })
            .await
            .expect_err("join error");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
