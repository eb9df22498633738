use super::decay::{ScanRow, SymbolSnapshot, scan_batch};
use super::snapshot::{Snapshot, normalize};
use crate::upstox::master::InstrumentMaster;
use crate::upstox::models::RawStrikeRecord;
use crate::utility::timing::{AggregateTimer, TimingStats};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

// -----------------------------------------------
// DATA SOURCE
// -----------------------------------------------

/// Where option chains come from. An error is logged by the caller and
/// then handled like an empty answer.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Expiries as `YYYY-MM-DD`, ascending
    async fn fetch_expiries(&self, instrument_key: &str) -> Result<Vec<String>>;

    async fn fetch_chain(&self, instrument_key: &str, expiry: &str) -> Result<Vec<RawStrikeRecord>>;
}

/// IST, +05:30
const MARKET_UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Calendar date on the exchange at `now`, whatever the host timezone
pub fn market_date(now: DateTime<Utc>) -> NaiveDate {
    match FixedOffset::east_opt(MARKET_UTC_OFFSET_SECS) {
        Some(ist) => now.with_timezone(&ist).date_naive(),
        None => now.date_naive(),
    }
}

pub fn market_today() -> NaiveDate {
    market_date(Utc::now())
}

/// Earliest expiry that is not before `today`. Unparsable dates are ignored.
pub fn nearest_expiry(expiries: &[String], today: NaiveDate) -> Option<String> {
    expiries
        .iter()
        .filter_map(|e| {
            NaiveDate::parse_from_str(e, "%Y-%m-%d")
                .ok()
                .map(|date| (date, e))
        })
        .filter(|(date, _)| *date >= today)
        .min_by_key(|(date, _)| *date)
        .map(|(_, e)| e.clone())
}

// -----------------------------------------------
// SCAN TYPES
// -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoInstrumentKey,
    NoExpiries,
    EmptyChain,
    Cancelled,
    TimedOut,
    TaskFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub otm_levels: usize,
    pub decay_threshold: f64,
    pub max_concurrent: usize,
    /// Whole-scan deadline; `None` waits for every symbol
    pub timeout: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            otm_levels: 3,
            decay_threshold: -20.0,
            max_concurrent: crate::upstox::config::DEFAULT_MAX_CONCURRENT,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Flagged symbols only, in universe order
    pub rows: Vec<ScanRow>,
    pub total_symbols: usize,
    /// Symbols that produced a non-empty snapshot
    pub scanned: usize,
    pub skipped: Vec<SkippedSymbol>,
    pub cancelled: bool,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub symbol_timing: TimingStats,
}

impl ScanReport {
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }
}

// -----------------------------------------------
// PER-SYMBOL PIPELINE
// -----------------------------------------------

/// Expiry to analyze: the requested one, or the nearest listed one.
/// A failed lookup is logged and treated as "no expiries".
pub async fn resolve_expiry<S: ChainSource + ?Sized>(
    source: &S,
    instrument_key: &str,
    requested: Option<&str>,
    today: NaiveDate,
) -> Option<String> {
    if let Some(expiry) = requested.filter(|e| !e.trim().is_empty()) {
        return Some(expiry.trim().to_string());
    }

    let expiries = source.fetch_expiries(instrument_key).await.unwrap_or_else(|e| {
        tracing::warn!(instrument_key, error = %e, "Failed to fetch expiries");
        Vec::new()
    });
    nearest_expiry(&expiries, today)
}

/// Fetch and normalize one chain. A failed fetch is logged and gives the
/// same empty snapshot as a chain with no rows.
pub async fn load_snapshot<S: ChainSource + ?Sized>(
    source: &S,
    instrument_key: &str,
    expiry: &str,
) -> Snapshot {
    let records = source.fetch_chain(instrument_key, expiry).await.unwrap_or_else(|e| {
        tracing::warn!(instrument_key, expiry, error = %e, "Failed to fetch option chain");
        Vec::new()
    });
    normalize(&records, 0.0)
}

/// Resolve, pick the nearest expiry, fetch and normalize one symbol.
/// The cancel flag is checked between the network steps.
pub async fn fetch_symbol<S: ChainSource + ?Sized>(
    source: &S,
    master: &InstrumentMaster,
    symbol: &str,
    today: NaiveDate,
    cancel: &AtomicBool,
) -> Result<SymbolSnapshot, SkipReason> {
    let key = master.resolve(symbol).ok_or(SkipReason::NoInstrumentKey)?;

    if cancel.load(Ordering::Relaxed) {
        return Err(SkipReason::Cancelled);
    }

    let expiry = resolve_expiry(source, key, None, today)
        .await
        .ok_or(SkipReason::NoExpiries)?;

    if cancel.load(Ordering::Relaxed) {
        return Err(SkipReason::Cancelled);
    }

    let snapshot = load_snapshot(source, key, &expiry).await;
    if snapshot.is_empty() {
        return Err(SkipReason::EmptyChain);
    }

    Ok(SymbolSnapshot {
        symbol: symbol.to_string(),
        expiry,
        snapshot,
    })
}

/// Aborts every scan task when dropped. A scan future that is dropped
/// early (client gone, outer timeout) stops fetching right away.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

struct SymbolOutcome {
    symbol: String,
    result: Result<SymbolSnapshot, SkipReason>,
    elapsed: Duration,
}

// -----------------------------------------------
// SCAN ALL
// -----------------------------------------------

/// Fetch every symbol on a bounded set of tokio tasks, then run the decay
/// scanner over the collected snapshots on the rayon pool.
///
/// Returns after all tasks finish, the timeout elapses or cancellation
/// drains the queue. Tasks still running at the deadline are aborted and
/// reported as `TimedOut`. Dropping the returned future aborts them too.
pub async fn scan_universe<S: ChainSource + 'static>(
    source: Arc<S>,
    master: Arc<InstrumentMaster>,
    symbols: Vec<String>,
    options: &ScanOptions,
    cancel: Arc<AtomicBool>,
) -> ScanReport {
    let started = Instant::now();
    let deadline = options.timeout.map(|t| tokio::time::Instant::now() + t);
    let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
    let today = market_today();
    let total_symbols = symbols.len();

    tracing::info!(
        symbols = total_symbols,
        max_concurrent = options.max_concurrent,
        timeout_secs = options.timeout.map(|t| t.as_secs()),
        "Starting scan"
    );

    let mut tasks = AbortOnDrop(Vec::with_capacity(total_symbols));
    let mut pending = FuturesUnordered::new();

    for (index, symbol) in symbols.iter().enumerate() {
        let source = Arc::clone(&source);
        let master = Arc::clone(&master);
        let sem = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);
        let symbol = symbol.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let begin = Instant::now();

            let result = if cancel.load(Ordering::Relaxed) {
                Err(SkipReason::Cancelled)
            } else {
                fetch_symbol(source.as_ref(), &master, &symbol, today, &cancel).await
            };

            SymbolOutcome {
                symbol,
                result,
                elapsed: begin.elapsed(),
            }
        });

        tasks.0.push(handle.abort_handle());
        pending.push(handle.map(move |joined| (index, joined)));
    }

    let mut outcomes: Vec<Option<Result<SymbolSnapshot, SkipReason>>> = vec![None; total_symbols];
    let mut timer = AggregateTimer::new("scan symbol");
    let mut timed_out = false;

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(next) => next,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            },
            None => pending.next().await,
        };

        let Some((index, joined)) = next else {
            break;
        };

        match joined {
            Ok(outcome) => {
                if let Err(reason) = &outcome.result {
                    tracing::debug!(symbol = %outcome.symbol, ?reason, "Symbol skipped");
                } else {
                    timer.record(outcome.elapsed);
                }
                outcomes[index] = Some(outcome.result);
            }
            Err(e) => {
                tracing::error!(symbol = %symbols[index], error = %e, "Scan task failed");
                outcomes[index] = Some(Err(SkipReason::TaskFailed));
            }
        }
    }

    if timed_out {
        tracing::warn!("Scan timed out, aborting unfinished symbols");
    }
    drop(tasks);

    let mut batch = Vec::new();
    let mut skipped = Vec::new();
    for (symbol, outcome) in symbols.into_iter().zip(outcomes) {
        match outcome {
            Some(Ok(item)) => batch.push(item),
            Some(Err(reason)) => skipped.push(SkippedSymbol { symbol, reason }),
            None => skipped.push(SkippedSymbol { symbol, reason: SkipReason::TimedOut }),
        }
    }

    let scanned = batch.len();
    let (otm_levels, threshold) = (options.otm_levels, options.decay_threshold);
    let rows = match tokio::task::spawn_blocking(move || scan_batch(&batch, otm_levels, threshold)).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Decay scan stage failed");
            Vec::new()
        }
    };

    let cancelled = cancel.load(Ordering::Relaxed);
    timer.log_summary();

    let report = ScanReport {
        rows,
        total_symbols,
        scanned,
        skipped,
        cancelled,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
        symbol_timing: timer.stats(),
    };

    tracing::info!(
        scanned = report.scanned,
        flagged = report.rows.len(),
        skipped = report.skipped.len(),
        cancelled,
        timed_out,
        elapsed_ms = report.elapsed_ms,
        "Scan finished"
    );

    report
}
