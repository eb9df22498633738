use super::master::InstrumentMaster;
use crate::analysis::scan::{
    ChainSource, ScanOptions, ScanReport, load_snapshot, market_today, nearest_expiry, scan_universe,
};
use crate::analysis::{AnalysisConfig, ChainAnalysis, ScoringWeights, analyze};
use anyhow::Result;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

// -----------------------------------------------
// API REQUEST/RESPONSE MODELS
// -----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExpiriesQuery {
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisQuery {
    pub symbol: String,
    pub expiry: Option<String>,
    pub w_iv: Option<f64>,
    pub w_delta: Option<f64>,
    pub w_oi: Option<f64>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub decay_threshold: Option<f64>,
    #[serde(default)]
    pub otm_levels: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T, start_time: Instant) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
        })
    }

    fn err(error: impl Into<String>, start_time: Instant) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(error.into()),
            processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub symbols_loaded: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SymbolListResponse {
    pub count: usize,
    pub symbols: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpiriesResponse {
    pub symbol: String,
    pub expiries: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub symbol: String,
    pub expiry: String,
    /// False when the chain came back empty
    pub has_data: bool,
    pub analysis: ChainAnalysis,
}

// -----------------------------------------------
// APPLICATION STATE
// -----------------------------------------------

const CACHE_DURATION: Duration = Duration::from_secs(300);

type ExpiryCache = HashMap<String, (Vec<String>, Instant)>;

pub struct AppState<S> {
    source: Arc<S>,
    master: Arc<InstrumentMaster>,
    config: AnalysisConfig,
    max_concurrent: usize,
    scan_timeout: Option<Duration>,
    expiry_cache: Arc<RwLock<ExpiryCache>>,
}

// derive(Clone) would require S: Clone
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            master: Arc::clone(&self.master),
            config: self.config,
            max_concurrent: self.max_concurrent,
            scan_timeout: self.scan_timeout,
            expiry_cache: Arc::clone(&self.expiry_cache),
        }
    }
}

impl<S: ChainSource + 'static> AppState<S> {
    pub fn new(source: Arc<S>, master: Arc<InstrumentMaster>, config: AnalysisConfig) -> Self {
        Self {
            source,
            master,
            config,
            max_concurrent: super::config::DEFAULT_MAX_CONCURRENT,
            scan_timeout: None,
            expiry_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_scan_limits(mut self, max_concurrent: usize, scan_timeout: Option<Duration>) -> Self {
        self.max_concurrent = max_concurrent;
        self.scan_timeout = scan_timeout;
        self
    }

    async fn expiries_for(&self, instrument_key: &str) -> Result<Vec<String>> {
        {
            let cache = self.expiry_cache.read().await;
            if let Some((expiries, cached_at)) = cache.get(instrument_key) {
                if cached_at.elapsed() < CACHE_DURATION {
                    return Ok(expiries.clone());
                }
            }
        }

        let expiries = self.source.fetch_expiries(instrument_key).await?;
        self.expiry_cache
            .write()
            .await
            .insert(instrument_key.to_string(), (expiries.clone(), Instant::now()));
        Ok(expiries)
    }

    /// Nearest listed expiry, through the cache. A failed lookup counts as none.
    async fn nearest_expiry_for(&self, instrument_key: &str) -> Option<String> {
        let expiries = self.expiries_for(instrument_key).await.unwrap_or_else(|e| {
            tracing::warn!(instrument_key, error = %e, "Failed to fetch expiries");
            Vec::new()
        });
        nearest_expiry(&expiries, market_today())
    }
}

// -----------------------------------------------
// API HANDLERS
// -----------------------------------------------

/// GET /api/health
async fn get_health<S: ChainSource + 'static>(
    State(app_state): State<AppState<S>>,
) -> Result<Json<ApiResponse<HealthResponse>>, StatusCode> {
    let start_time = Instant::now();
    Ok(ApiResponse::ok(
        HealthResponse {
            status: "ok".to_string(),
            symbols_loaded: app_state.master.len(),
        },
        start_time,
    ))
}

/// GET /api/symbols - All symbols of the instrument master
async fn get_symbols<S: ChainSource + 'static>(
    State(app_state): State<AppState<S>>,
) -> Result<Json<ApiResponse<SymbolListResponse>>, StatusCode> {
    let start_time = Instant::now();
    let symbols = app_state.master.symbols();
    Ok(ApiResponse::ok(
        SymbolListResponse {
            count: symbols.len(),
            symbols,
        },
        start_time,
    ))
}

/// GET /api/expiries?symbol=NIFTY
async fn get_expiries<S: ChainSource + 'static>(
    Query(query): Query<ExpiriesQuery>,
    State(app_state): State<AppState<S>>,
) -> Result<Json<ApiResponse<ExpiriesResponse>>, StatusCode> {
    let start_time = Instant::now();
    let symbol = query.symbol.trim().to_uppercase();

    let Some(key) = app_state.master.resolve(&symbol) else {
        return Ok(ApiResponse::err(format!("Unknown symbol: {}", symbol), start_time));
    };

    match app_state.expiries_for(key).await {
        Ok(expiries) => Ok(ApiResponse::ok(ExpiriesResponse { symbol, expiries }, start_time)),
        Err(e) => {
            tracing::warn!(symbol = %symbol, error = %e, "Expiry lookup failed");
            Ok(ApiResponse::err(e.to_string(), start_time))
        }
    }
}

/// GET /api/analysis?symbol=NIFTY[&expiry=2025-12-30][&w_iv=..&w_delta=..&w_oi=..][&top_k=5]
async fn get_analysis<S: ChainSource + 'static>(
    Query(query): Query<AnalysisQuery>,
    State(app_state): State<AppState<S>>,
) -> Result<Json<ApiResponse<AnalysisResponse>>, StatusCode> {
    let start_time = Instant::now();
    let symbol = query.symbol.trim().to_uppercase();

    let Some(key) = app_state.master.resolve(&symbol) else {
        return Ok(ApiResponse::err(format!("Unknown symbol: {}", symbol), start_time));
    };

    let requested = query.expiry.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let expiry = match requested {
        Some(expiry) => Some(expiry.to_string()),
        None => app_state.nearest_expiry_for(key).await,
    };
    let Some(expiry) = expiry else {
        return Ok(ApiResponse::err(format!("No expiries available for {}", symbol), start_time));
    };

    let mut config = app_state.config;
    let defaults = config.weights;
    config.weights = ScoringWeights::new(
        query.w_iv.unwrap_or(defaults.iv),
        query.w_delta.unwrap_or(defaults.delta),
        query.w_oi.unwrap_or(defaults.oi),
    );
    if let Some(top_k) = query.top_k {
        config.top_k = top_k;
    }

    let snapshot = load_snapshot(app_state.source.as_ref(), key, &expiry).await;
    let analysis = analyze(&snapshot, &config);

    Ok(ApiResponse::ok(
        AnalysisResponse {
            symbol,
            expiry,
            has_data: !snapshot.is_empty(),
            analysis,
        },
        start_time,
    ))
}

/// POST /api/scan - Decay scan over the given symbols or the whole master
async fn run_scan<S: ChainSource + 'static>(
    State(app_state): State<AppState<S>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ApiResponse<ScanReport>>, StatusCode> {
    let start_time = Instant::now();

    let symbols = request
        .symbols
        .map(|list| {
            list.iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| app_state.master.symbols());

    let options = ScanOptions {
        otm_levels: request.otm_levels.unwrap_or(app_state.config.scan_otm_levels),
        decay_threshold: request.decay_threshold.unwrap_or(app_state.config.decay_threshold),
        max_concurrent: app_state.max_concurrent,
        timeout: app_state.scan_timeout,
    };

    let report = scan_universe(
        Arc::clone(&app_state.source),
        Arc::clone(&app_state.master),
        symbols,
        &options,
        Arc::new(AtomicBool::new(false)),
    )
    .await;

    Ok(ApiResponse::ok(report, start_time))
}

// -----------------------------------------------
// SERVER SETUP
// -----------------------------------------------

pub fn router<S: ChainSource + 'static>(app_state: AppState<S>) -> Router {
    Router::new()
        .route("/api/health", get(get_health::<S>))
        .route("/api/symbols", get(get_symbols::<S>))
        .route("/api/expiries", get(get_expiries::<S>))
        .route("/api/analysis", get(get_analysis::<S>))
        .route("/api/scan", post(run_scan::<S>))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub async fn start_server<S: ChainSource + 'static>(app_state: AppState<S>, port: u16) -> Result<()> {
    let app = router(app_state);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "API server listening");
    println!("🚀 OI Analyzer API Server running on http://{}", addr);
    println!("📋 Available endpoints:");
    println!("   GET  /api/health");
    println!("   GET  /api/symbols");
    println!("   GET  /api/expiries?symbol=NIFTY");
    println!("   GET  /api/analysis?symbol=NIFTY&expiry=2025-12-30");
    println!("   POST /api/scan");
    println!();

    axum::serve(listener, app).await?;
    Ok(())
}
