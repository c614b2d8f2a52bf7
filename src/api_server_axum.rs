use crate::analysis::{self, Analysis};
use crate::app_config::{self, AppConfig};
use crate::config::{self, ProviderConfig};
use crate::debug::{DebugSnapshot, DebugState};
use crate::debug;
use crate::error::{ConfigError, NetGexError};
use crate::logging;
use crate::models::{self, NetGexRow, OptionRow, QuoteRequest};
use crate::net_gex::{CalibrationParams, KSource, NetGexMetrics};
use crate::processor;
use crate::provider_client::YahooOptionsClient;
use crate::render::{self, PageView};
use anyhow::Result;
use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

// -----------------------------------------------
// API REQUEST/RESPONSE MODELS
// -----------------------------------------------

/// Form fields of the page and query of the JSON endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct CalculateQuery {
    pub ticker: Option<String>,
    pub expiration: Option<String>,
    pub k: Option<String>,
    pub calculate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpirationsQuery {
    pub ticker: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T, started: Instant) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            processing_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    fn fail(error: impl ToString, started: Instant) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            processing_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NetGexResponse {
    pub ticker: String,
    pub spot: f64,
    pub snapshot_ts: i64,
    pub expiration: Option<NaiveDate>,
    pub expirations: Vec<NaiveDate>,
    pub provider_rows: Vec<OptionRow>,
    pub net_gex_rows: Vec<NetGexRow>,
    pub metrics: NetGexMetrics,
}

#[derive(Debug, Serialize)]
pub struct ExpirationsResponse {
    pub ticker: String,
    pub expirations: Vec<NaiveDate>,
    pub nearest: Option<NaiveDate>,
}

// -----------------------------------------------
// APPLICATION STATE
// -----------------------------------------------

#[derive(Clone)]
pub struct AppState {
    provider: Result<Arc<YahooOptionsClient>, ConfigError>,
    debug: Arc<DebugState>,
    last: Arc<RwLock<Option<Analysis>>>,
    fixed_k: Option<f64>,
    params: CalibrationParams,
    log_dir: PathBuf,
}

impl AppState {
    /// Credentials from the environment. Missing credentials do not stop the
    /// server; the page shows the error instead.
    pub fn new(app_config: &AppConfig) -> Result<Self> {
        let provider = ProviderConfig::from_env().map(|cfg| cfg.with_timeout(app_config.http_timeout));
        Self::with_provider(provider, Some(app_config.debug_dir.clone()), app_config.fixed_k)
    }

    pub fn with_provider(
        provider: Result<ProviderConfig, ConfigError>,
        debug_dir: Option<PathBuf>,
        fixed_k: Option<f64>,
    ) -> Result<Self> {
        let provider = match provider {
            Ok(cfg) => Ok(Arc::new(YahooOptionsClient::new(cfg)?)),
            Err(e) => {
                error!(error = %e, "provider configuration invalid; requests are disabled");
                Err(e)
            }
        };

        Ok(Self {
            provider,
            debug: Arc::new(DebugState::new(debug_dir)),
            last: Arc::new(RwLock::new(None)),
            fixed_k,
            params: CalibrationParams::default(),
            log_dir: PathBuf::from(logging::LOG_DIR),
        })
    }

    /// Directory served by `/api/log`.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn debug(&self) -> &DebugState {
        &self.debug
    }

    fn k_source(&self, override_k: Option<f64>) -> KSource {
        match override_k.or(self.fixed_k) {
            Some(k) => KSource::Fixed(k),
            None => KSource::Calibrated,
        }
    }

    /// One calculate action. Config errors block the request entirely.
    async fn calculate(&self, request: &QuoteRequest, override_k: Option<f64>) -> Result<Analysis, NetGexError> {
        let client = match &self.provider {
            Ok(client) => client,
            Err(e) => {
                self.debug.log_error(format!("configuration: {}", e)).await;
                return Err(e.clone().into());
            }
        };

        let analysis = analysis::analyze(
            client,
            request,
            self.k_source(override_k),
            &self.params,
            &self.debug,
        )
        .await?;

        *self.last.write().await = Some(analysis.clone());
        Ok(analysis)
    }
}

/// Parsed form input; user mistakes become messages, not failures.
struct ParsedInput {
    request: QuoteRequest,
    k: Option<f64>,
}

fn parse_input(query: &CalculateQuery) -> Result<ParsedInput, String> {
    let ticker = query.ticker.as_deref().unwrap_or_default();

    let expiration = match query.expiration.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(app_config::parse_expiration(raw).map_err(|e| e.to_string())?),
    };

    let k = match query.k.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<f64>() {
            Ok(k) if k.is_finite() => Some(k),
            _ => return Err(format!("Invalid k '{}': expected a number", raw)),
        },
    };

    Ok(ParsedInput {
        request: QuoteRequest::new(ticker, expiration),
        k,
    })
}

// -----------------------------------------------
// PAGE HANDLER
// -----------------------------------------------

/// GET / - form, tables, chart and debug panel. Fetches only when `calculate` is set.
async fn get_page(Query(query): Query<CalculateQuery>, State(app_state): State<AppState>) -> Html<String> {
    let mut error_message = None;
    let mut analysis = None;

    let (request, k) = match parse_input(&query) {
        Ok(input) => (input.request, input.k),
        Err(msg) => {
            app_state.debug.log_error(msg.clone()).await;
            error_message = Some(msg);
            (QuoteRequest::new(query.ticker.as_deref().unwrap_or_default(), None), None)
        }
    };

    if query.calculate.is_some() && error_message.is_none() {
        match app_state.calculate(&request, k).await {
            Ok(a) => analysis = Some(a),
            Err(e) => error_message = Some(e.to_string()),
        }
    }

    if let Err(e) = &app_state.provider {
        error_message.get_or_insert_with(|| NetGexError::from(e.clone()).to_string());
    }

    // Selector options come from the latest response for this ticker.
    let remembered = if analysis.is_none() {
        app_state
            .last
            .read()
            .await
            .as_ref()
            .filter(|a| a.request.ticker == request.ticker)
            .map(|a| a.snapshot.expirations.clone())
    } else {
        None
    };
    let expirations = analysis
        .as_ref()
        .map(|a| a.snapshot.expirations.clone())
        .or(remembered)
        .unwrap_or_default();

    let selected_expiration = request
        .expiration
        .or_else(|| {
            analysis
                .as_ref()
                .and_then(|a| a.snapshot.expiration_ts)
                .and_then(models::ts_to_date)
        })
        .or_else(|| {
            processor::nearest_expiration(&expirations, Utc::now().timestamp(), config::EXPIRATION_GRACE_SECS)
                .and_then(models::ts_to_date)
        });

    let debug: DebugSnapshot = app_state.debug.snapshot().await;

    Html(render::render_page(&PageView {
        ticker: &request.ticker,
        selected_expiration,
        expirations: &expirations,
        fixed_k: k.or(app_state.fixed_k),
        error: error_message,
        analysis: analysis.as_ref(),
        debug: &debug,
    }))
}

// -----------------------------------------------
// API HANDLERS
// -----------------------------------------------

/// GET /api/net-gex?ticker=SPY&expiration=2025-01-17&k=2.5 - Net GEX table as JSON
async fn get_net_gex(
    Query(query): Query<CalculateQuery>,
    State(app_state): State<AppState>,
) -> Result<Json<ApiResponse<NetGexResponse>>, StatusCode> {
    let start_time = Instant::now();

    let input = match parse_input(&query) {
        Ok(input) => input,
        Err(msg) => return Ok(Json(ApiResponse::fail(msg, start_time))),
    };

    match app_state.calculate(&input.request, input.k).await {
        Ok(analysis) => {
            let snap = analysis.snapshot;
            Ok(Json(ApiResponse::ok(
                NetGexResponse {
                    ticker: snap.symbol,
                    spot: snap.spot,
                    snapshot_ts: snap.snapshot_ts,
                    expiration: snap.expiration_ts.and_then(models::ts_to_date),
                    expirations: snap.expirations.iter().filter_map(|t| models::ts_to_date(*t)).collect(),
                    provider_rows: snap.rows,
                    net_gex_rows: analysis.result.rows,
                    metrics: analysis.result.metrics,
                },
                start_time,
            )))
        }
        Err(e) => Ok(Json(ApiResponse::fail(e, start_time))),
    }
}

/// GET /api/expirations?ticker=SPY - Expiration dates and the nearest one
async fn get_expirations(
    Query(query): Query<ExpirationsQuery>,
    State(app_state): State<AppState>,
) -> Result<Json<ApiResponse<ExpirationsResponse>>, StatusCode> {
    let start_time = Instant::now();
    let ticker = app_config::normalize_ticker(query.ticker.as_deref().unwrap_or_default());

    let client = match &app_state.provider {
        Ok(client) => client.clone(),
        Err(e) => {
            app_state.debug.log_error(format!("configuration: {}", e)).await;
            return Ok(Json(ApiResponse::fail(NetGexError::from(e.clone()), start_time)));
        }
    };

    match client.fetch_expirations(&ticker).await {
        Ok(dates) => {
            let nearest = processor::nearest_expiration(&dates, Utc::now().timestamp(), config::EXPIRATION_GRACE_SECS)
                .and_then(models::ts_to_date);
            Ok(Json(ApiResponse::ok(
                ExpirationsResponse {
                    ticker,
                    expirations: dates.iter().filter_map(|t| models::ts_to_date(*t)).collect(),
                    nearest,
                },
                start_time,
            )))
        }
        Err(e) => {
            error!(ticker = %ticker, error = %e, "expirations lookup failed");
            app_state.debug.log_error(format!("{}: {}", ticker, e)).await;
            Ok(Json(ApiResponse::fail(e, start_time)))
        }
    }
}

/// GET /api/raw.json - Last provider body, unmodified
async fn get_raw_json(State(app_state): State<AppState>) -> Response {
    match app_state.debug.last_body().await {
        Some(body) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"raw.json\""),
            ],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "No provider response yet").into_response(),
    }
}

/// GET /api/net-gex.csv - Last Net GEX table as CSV
async fn get_net_gex_csv(State(app_state): State<AppState>) -> Response {
    let last = app_state.last.read().await;
    match last.as_ref() {
        Some(analysis) => {
            let file_name = format!(
                "attachment; filename=\"provider_plus_netgex_{}_{}.csv\"",
                analysis.snapshot.symbol,
                analysis
                    .snapshot
                    .expiration_ts
                    .and_then(models::ts_to_date)
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "nearest".to_string()),
            );
            (
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, file_name),
                ],
                render::render_csv(&analysis.result.rows),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "No calculation yet").into_response(),
    }
}

/// GET /api/log - Newest rolling log file
async fn get_log(State(app_state): State<AppState>) -> Response {
    let Some(path) = debug::newest_file(&app_state.log_dir, logging::LOG_FILE) else {
        return (StatusCode::NOT_FOUND, "No log file yet").into_response();
    };
    file_download(&path, "text/plain; charset=utf-8").await
}

/// GET /api/debug-file/latest - Newest dump in the debug directory
async fn get_latest_debug_file(State(app_state): State<AppState>) -> Response {
    let Some(path) = app_state.debug.latest_dump() else {
        return (StatusCode::NOT_FOUND, "No debug file yet").into_response();
    };
    file_download(&path, "application/json").await
}

async fn file_download(path: &Path, content_type: &'static str) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".to_string());
            (
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read file for download");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

/// GET /api/debug - Request metadata and error log
async fn get_debug(State(app_state): State<AppState>) -> Json<DebugSnapshot> {
    Json(app_state.debug.snapshot().await)
}

// -----------------------------------------------
// SERVER SETUP
// -----------------------------------------------

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(get_page))
        .route("/api/net-gex", get(get_net_gex))
        .route("/api/expirations", get(get_expirations))
        .route("/api/raw.json", get(get_raw_json))
        .route("/api/net-gex.csv", get(get_net_gex_csv))
        .route("/api/debug", get(get_debug))
        .route("/api/log", get(get_log))
        .route("/api/debug-file/latest", get(get_latest_debug_file))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub async fn start_server(app_config: &AppConfig) -> Result<()> {
    let app_state = AppState::new(app_config)?;
    let app = router(app_state);

    let addr = format!("127.0.0.1:{}", app_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "net gex server listening");
    println!("Net GEX server running on http://{}", addr);
    println!("Available endpoints:");
    println!("   GET  /?ticker=SPY&expiration=2025-01-17&calculate=1");
    println!("   GET  /api/net-gex?ticker=SPY&expiration=2025-01-17");
    println!("   GET  /api/expirations?ticker=SPY");
    println!("   GET  /api/raw.json");
    println!("   GET  /api/net-gex.csv");
    println!("   GET  /api/debug");
    println!("   GET  /api/log");
    println!("   GET  /api/debug-file/latest");
    println!();

    axum::serve(listener, app).await?;
    Ok(())
}
