use super::processor::{AnnotatedSnapshot, annotate};
use super::snapshot::{OptionSide, Snapshot};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One of the nearest out-of-the-money strikes of a side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayLevel {
    /// 1 = nearest OTM strike
    pub rank: usize,
    pub strike: f64,
    pub oi: f64,
    pub prev_oi: f64,
    /// Negative = OI reduction
    pub oi_change_pct: f64,
    pub otm_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideDecay {
    pub side: OptionSide,
    pub levels: Vec<DecayLevel>,
    pub flagged: bool,
}

/// Decay picture of one snapshot, both sides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayReport {
    pub spot: f64,
    pub threshold: f64,
    #[serde(rename = "CE")]
    pub call: SideDecay,
    #[serde(rename = "PE")]
    pub put: SideDecay,
}

impl DecayReport {
    pub fn is_flagged(&self) -> bool {
        self.call.flagged || self.put.flagged
    }

    pub fn side(&self, side: OptionSide) -> &SideDecay {
        match side {
            OptionSide::Call => &self.call,
            OptionSide::Put => &self.put,
        }
    }
}

/// A negative threshold is met at or below it, a positive one at or above
pub fn meets_threshold(oi_change_pct: f64, threshold: f64) -> bool {
    if threshold <= 0.0 {
        oi_change_pct <= threshold
    } else {
        oi_change_pct >= threshold
    }
}

/// The `n` strikes with the smallest strictly positive OTM distance for
/// `side`, nearest first
pub fn nearest_otm(snapshot: &AnnotatedSnapshot, side: OptionSide, n: usize) -> Vec<DecayLevel> {
    let mut candidates: Vec<DecayLevel> = snapshot
        .rows
        .iter()
        .filter(|row| row.metrics(side).otm_distance > 0.0)
        .map(|row| {
            let quote = row.quote.side(side);
            let metrics = row.metrics(side);
            DecayLevel {
                rank: 0,
                strike: row.strike(),
                oi: quote.oi,
                prev_oi: quote.prev_oi,
                oi_change_pct: metrics.oi_change_pct,
                otm_distance: metrics.otm_distance,
            }
        })
        .collect();

    candidates.sort_by(|a, b| a.otm_distance.total_cmp(&b.otm_distance));
    candidates.truncate(n);
    for (i, level) in candidates.iter_mut().enumerate() {
        level.rank = i + 1;
    }
    candidates
}

/// True when two levels at consecutive ranks both meet the threshold.
/// A single decaying strike is not enough.
pub fn has_consecutive_decay(levels: &[DecayLevel], threshold: f64) -> bool {
    levels.windows(2).any(|pair| {
        meets_threshold(pair[0].oi_change_pct, threshold)
            && meets_threshold(pair[1].oi_change_pct, threshold)
    })
}

fn side_decay(snapshot: &AnnotatedSnapshot, side: OptionSide, n: usize, threshold: f64) -> SideDecay {
    let levels = nearest_otm(snapshot, side, n);
    let flagged = has_consecutive_decay(&levels, threshold);
    SideDecay { side, levels, flagged }
}

/// Decay tables for both sides of one annotated snapshot
pub fn scan_snapshot(snapshot: &AnnotatedSnapshot, otm_levels: usize, threshold: f64) -> DecayReport {
    DecayReport {
        spot: snapshot.spot,
        threshold,
        call: side_decay(snapshot, OptionSide::Call, otm_levels, threshold),
        put: side_decay(snapshot, OptionSide::Put, otm_levels, threshold),
    }
}

// -----------------------------------------------
// FLAT SCAN TABLE
// -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelCell {
    pub strike: f64,
    pub decay_pct: f64,
}

/// One flagged symbol of a scan: close plus per-level strike and decay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRow {
    pub symbol: String,
    pub expiry: String,
    pub close: f64,
    pub ce_flagged: bool,
    pub pe_flagged: bool,
    #[serde(rename = "CE")]
    pub ce_levels: Vec<LevelCell>,
    #[serde(rename = "PE")]
    pub pe_levels: Vec<LevelCell>,
}

impl ScanRow {
    fn from_report(symbol: &str, expiry: &str, report: &DecayReport) -> Self {
        let cells = |side: &SideDecay| {
            side.levels
                .iter()
                .map(|l| LevelCell { strike: l.strike, decay_pct: l.oi_change_pct })
                .collect()
        };

        Self {
            symbol: symbol.to_string(),
            expiry: expiry.to_string(),
            close: report.spot,
            ce_flagged: report.call.flagged,
            pe_flagged: report.put.flagged,
            ce_levels: cells(&report.call),
            pe_levels: cells(&report.put),
        }
    }
}

/// A fetched, normalized snapshot waiting to be scanned
#[derive(Debug, Clone)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub expiry: String,
    pub snapshot: Snapshot,
}

/// Scan one symbol; `None` when neither side is flagged or there is no data
pub fn scan_symbol_snapshot(
    item: &SymbolSnapshot,
    otm_levels: usize,
    threshold: f64,
) -> Option<ScanRow> {
    if item.snapshot.is_empty() {
        return None;
    }

    let report = scan_snapshot(&annotate(&item.snapshot), otm_levels, threshold);
    report
        .is_flagged()
        .then(|| ScanRow::from_report(&item.symbol, &item.expiry, &report))
}

/// Scan many snapshots in parallel. Only flagged symbols are returned,
/// in input order.
pub fn scan_batch(batch: &[SymbolSnapshot], otm_levels: usize, threshold: f64) -> Vec<ScanRow> {
    batch
        .par_iter()
        .filter_map(|item| scan_symbol_snapshot(item, otm_levels, threshold))
        .collect()
}
