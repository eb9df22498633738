pub mod decay;
pub mod processor;
pub mod scan;
pub mod snapshot;
pub mod suggestions;

use crate::upstox::config::env_or;
use serde::{Deserialize, Serialize};

pub use decay::{DecayReport, ScanRow, SymbolSnapshot, scan_batch, scan_snapshot};
pub use processor::{AnnotatedSnapshot, IvEvent, PcrPoint, annotate, iv_events, pcr_trend};
pub use scan::{ChainSource, ScanOptions, ScanReport, SkipReason, scan_universe};
pub use snapshot::{OptionSide, Snapshot, StrikeQuote, normalize};
pub use suggestions::{ScoringWeights, SuggestionConfig, Suggestions, suggest};

/// Thresholds and weights used by one analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub iv_spike_threshold: f64,
    pub iv_crush_threshold: f64,
    /// Negative percent; OI change at or below it counts as decay
    pub decay_threshold: f64,
    pub single_otm_levels: usize,
    pub scan_otm_levels: usize,
    pub weights: ScoringWeights,
    pub top_k: usize,
    pub pcr_min: f64,
    pub pcr_max: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            iv_spike_threshold: 20.0,
            iv_crush_threshold: -20.0,
            decay_threshold: -20.0,
            single_otm_levels: 2,
            scan_otm_levels: 3,
            weights: ScoringWeights::default(),
            top_k: 5,
            pcr_min: 0.0,
            pcr_max: 2.0,
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `OI_IV_SPIKE`, `OI_IV_CRUSH`,
    /// `OI_DECAY_THRESHOLD`, `OI_W_IV`, `OI_W_DELTA`, `OI_W_OI` and `OI_TOP_K`
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            iv_spike_threshold: env_or("OI_IV_SPIKE", d.iv_spike_threshold),
            iv_crush_threshold: env_or("OI_IV_CRUSH", d.iv_crush_threshold),
            decay_threshold: env_or("OI_DECAY_THRESHOLD", d.decay_threshold),
            weights: ScoringWeights::new(
                env_or("OI_W_IV", d.weights.iv),
                env_or("OI_W_DELTA", d.weights.delta),
                env_or("OI_W_OI", d.weights.oi),
            ),
            top_k: env_or("OI_TOP_K", d.top_k),
            ..d
        }
    }

    pub fn suggestion_config(&self) -> SuggestionConfig {
        SuggestionConfig {
            weights: self.weights,
            iv_spike_threshold: self.iv_spike_threshold,
            iv_crush_threshold: self.iv_crush_threshold,
            top_k: self.top_k,
        }
    }

    pub fn scan_options(&self, max_concurrent: usize, timeout: Option<std::time::Duration>) -> ScanOptions {
        ScanOptions {
            otm_levels: self.scan_otm_levels,
            decay_threshold: self.decay_threshold,
            max_concurrent,
            timeout,
        }
    }
}

/// Everything the presentation layer shows for one symbol and expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainAnalysis {
    pub spot: f64,
    pub atm_strike: Option<f64>,
    pub strikes: AnnotatedSnapshot,
    pub decay: DecayReport,
    pub iv_events: Vec<IvEvent>,
    pub pcr_trend: Vec<PcrPoint>,
    pub suggestions: Suggestions,
}

/// One full pass: indicators, decay tables, IV events, PCR trend and
/// suggestions. An empty snapshot yields empty tables and "-" picks.
pub fn analyze(snapshot: &Snapshot, config: &AnalysisConfig) -> ChainAnalysis {
    let strikes = annotate(snapshot);

    ChainAnalysis {
        spot: strikes.spot,
        atm_strike: strikes.atm_strike,
        decay: scan_snapshot(&strikes, config.single_otm_levels, config.decay_threshold),
        iv_events: iv_events(&strikes, config.iv_spike_threshold, config.iv_crush_threshold),
        pcr_trend: pcr_trend(&strikes, config.pcr_min, config.pcr_max),
        suggestions: suggest(&strikes, &config.suggestion_config()),
        strikes,
    }
}
