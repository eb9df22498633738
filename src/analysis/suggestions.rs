use super::processor::{AnnotatedSnapshot, Moneyness, classify_moneyness};
use super::snapshot::OptionSide;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shown as the top pick when a side has no candidates
pub const NO_PICK: &str = "-";

// -----------------------------------------------
// WEIGHTS
// -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub iv: f64,
    pub delta: f64,
    pub oi: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { iv: 0.4, delta: 0.3, oi: 0.3 }
    }
}

impl ScoringWeights {
    pub fn new(iv: f64, delta: f64, oi: f64) -> Self {
        Self { iv, delta, oi }
    }

    /// Scale the weights to sum to 1. Negative or non-finite weights count
    /// as 0; if nothing is left the defaults are used.
    pub fn normalized(&self) -> Self {
        let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let (iv, delta, oi) = (clean(self.iv), clean(self.delta), clean(self.oi));

        if iv + delta + oi <= 0.0 {
            return Self::default();
        }

        // the sum of huge finite weights overflows; rescale by the largest
        let (iv, delta, oi) = if (iv + delta + oi).is_finite() {
            (iv, delta, oi)
        } else {
            let largest = iv.max(delta).max(oi);
            (iv / largest, delta / largest, oi / largest)
        };
        let total = iv + delta + oi;

        Self {
            iv: iv / total,
            delta: delta / total,
            oi: oi / total,
        }
    }
}

// -----------------------------------------------
// CANDIDATES
// -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Rationale {
    IvSpike,
    IvCrush,
    OiUp,
    OiDown,
    Delta(f64),
}

impl fmt::Display for Rationale {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rationale::IvSpike => f.write_str("IV Spike"),
            Rationale::IvCrush => f.write_str("IV Crush"),
            Rationale::OiUp => f.write_str("OI ↑"),
            Rationale::OiDown => f.write_str("OI ↓"),
            Rationale::Delta(d) => write!(f, "delta={:.2}", d),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub strike: f64,
    pub side: OptionSide,
    pub score: f64,
    pub moneyness: Moneyness,
    pub iv_change_pct: f64,
    pub oi_change_pct: f64,
    pub delta: f64,
    pub ltp: f64,
    pub rationale: Vec<Rationale>,
}

impl ScoredCandidate {
    pub fn reason(&self) -> String {
        self.rationale
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Ranked candidates for both sides plus a one-line pick per side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestions {
    pub weights: ScoringWeights,
    pub calls: Vec<ScoredCandidate>,
    pub puts: Vec<ScoredCandidate>,
    pub call_pick: String,
    pub put_pick: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    pub weights: ScoringWeights,
    pub iv_spike_threshold: f64,
    pub iv_crush_threshold: f64,
    pub top_k: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            iv_spike_threshold: 20.0,
            iv_crush_threshold: -20.0,
            top_k: 5,
        }
    }
}

/// Shared denominators, taken over both sides of the whole snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBase {
    pub max_iv_change: f64,
    pub max_delta: f64,
    pub max_oi_change: f64,
}

impl NormalizationBase {
    /// Max absolute value of each metric, never below 1
    pub fn from_snapshot(snapshot: &AnnotatedSnapshot) -> Self {
        let mut base = Self { max_iv_change: 1.0, max_delta: 1.0, max_oi_change: 1.0 };

        for row in &snapshot.rows {
            for side in OptionSide::BOTH {
                let metrics = row.metrics(side);
                base.max_iv_change = base.max_iv_change.max(metrics.iv_change_pct.abs());
                base.max_delta = base.max_delta.max(row.quote.side(side).delta.abs());
                base.max_oi_change = base.max_oi_change.max(metrics.oi_change_pct.abs());
            }
        }

        base
    }
}

fn rationale(iv_change: f64, oi_change: f64, delta: f64, config: &SuggestionConfig) -> Vec<Rationale> {
    let mut tags = Vec::new();
    if iv_change > config.iv_spike_threshold {
        tags.push(Rationale::IvSpike);
    }
    if iv_change < config.iv_crush_threshold {
        tags.push(Rationale::IvCrush);
    }
    if oi_change > 0.0 {
        tags.push(Rationale::OiUp);
    }
    if oi_change < 0.0 {
        tags.push(Rationale::OiDown);
    }
    tags.push(Rationale::Delta(delta));
    tags
}

/// Score every strike of one side and return the best `top_k`, highest
/// score first. Equal scores keep ascending strike order.
pub fn rank_side(
    snapshot: &AnnotatedSnapshot,
    side: OptionSide,
    base: &NormalizationBase,
    config: &SuggestionConfig,
) -> Vec<ScoredCandidate> {
    let weights = config.weights.normalized();

    let mut scored: Vec<ScoredCandidate> = snapshot
        .rows
        .iter()
        .map(|row| {
            let quote = row.quote.side(side);
            let metrics = row.metrics(side);

            let score = weights.iv * (metrics.iv_change_pct / base.max_iv_change)
                + weights.delta * (quote.delta.abs() / base.max_delta)
                + weights.oi * (metrics.oi_change_pct / base.max_oi_change);

            ScoredCandidate {
                strike: row.strike(),
                side,
                score,
                moneyness: classify_moneyness(row.strike(), snapshot.spot, snapshot.atm_strike, side),
                iv_change_pct: metrics.iv_change_pct,
                oi_change_pct: metrics.oi_change_pct,
                delta: quote.delta,
                ltp: quote.ltp,
                rationale: rationale(metrics.iv_change_pct, metrics.oi_change_pct, quote.delta, config),
            }
        })
        .collect();

    // stable: ties stay in ascending strike order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(config.top_k);
    scored
}

pub fn top_pick_text(ranked: &[ScoredCandidate]) -> String {
    match ranked.first() {
        Some(c) => format!(
            "Pick Strike {} ({}), Score {:.4}. Reason: {}",
            c.strike,
            c.moneyness.label(),
            c.score,
            c.reason()
        ),
        None => NO_PICK.to_string(),
    }
}

/// Ranked calls and puts for one snapshot
pub fn suggest(snapshot: &AnnotatedSnapshot, config: &SuggestionConfig) -> Suggestions {
    let base = NormalizationBase::from_snapshot(snapshot);
    let calls = rank_side(snapshot, OptionSide::Call, &base, config);
    let puts = rank_side(snapshot, OptionSide::Put, &base, config);

    Suggestions {
        weights: config.weights.normalized(),
        call_pick: top_pick_text(&calls),
        put_pick: top_pick_text(&puts),
        calls,
        puts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::processor::annotate;
    use crate::analysis::snapshot::{SideQuote, Snapshot, StrikeQuote};

    #[test]
    fn test_weights_normalize_to_one() {
        for (iv, delta, oi) in [(1.0, 1.0, 1.0), (0.5, 0.0, 0.0), (3.0, 2.0, 5.0), (0.4, 0.3, 0.3)] {
            let w = ScoringWeights::new(iv, delta, oi).normalized();
            assert!((w.iv + w.delta + w.oi - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_huge_weights_still_sum_to_one() {
        let w = ScoringWeights::new(1e308, 1e308, 0.0).normalized();
        assert_eq!(w, ScoringWeights::new(0.5, 0.5, 0.0));

        let w = ScoringWeights::new(f64::MAX, f64::MAX, f64::MAX).normalized();
        assert!((w.iv + w.delta + w.oi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_default() {
        let w = ScoringWeights::new(0.0, 0.0, 0.0).normalized();
        assert_eq!(w, ScoringWeights::new(0.4, 0.3, 0.3));
        let w = ScoringWeights::new(-1.0, f64::NAN, 0.0).normalized();
        assert_eq!(w, ScoringWeights::default());
    }

    #[test]
    fn test_rationale_tags() {
        let config = SuggestionConfig::default();
        let tags = rationale(25.0, -3.0, 0.456, &config);
        assert_eq!(tags, vec![Rationale::IvSpike, Rationale::OiDown, Rationale::Delta(0.456)]);

        let text: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        assert_eq!(text, vec!["IV Spike", "OI ↓", "delta=0.46"]);

        let tags = rationale(-25.0, 0.0, -0.2, &config);
        assert_eq!(tags, vec![Rationale::IvCrush, Rationale::Delta(-0.2)]);
    }

    #[test]
    fn test_normalization_base_floor() {
        let base = NormalizationBase::from_snapshot(&AnnotatedSnapshot::default());
        assert_eq!(base, NormalizationBase { max_iv_change: 1.0, max_delta: 1.0, max_oi_change: 1.0 });
    }

    #[test]
    fn test_equal_scores_keep_strike_order() {
        let same = SideQuote { delta: 0.5, ..Default::default() };
        let rows = [110.0, 100.0, 105.0]
            .iter()
            .map(|&strike| StrikeQuote { strike, spot: 0.0, pcr: 0.0, call: same, put: same })
            .collect::<Vec<_>>();
        let annotated = annotate(&Snapshot::from_quotes(104.0, rows));

        let ranked = suggest(&annotated, &SuggestionConfig::default());
        let strikes: Vec<f64> = ranked.calls.iter().map(|c| c.strike).collect();
        assert_eq!(strikes, vec![100.0, 105.0, 110.0]);
    }

    #[test]
    fn test_empty_snapshot_has_no_pick() {
        let ranked = suggest(&AnnotatedSnapshot::default(), &SuggestionConfig::default());
        assert!(ranked.calls.is_empty() && ranked.puts.is_empty());
        assert_eq!(ranked.call_pick, NO_PICK);
        assert_eq!(ranked.put_pick, NO_PICK);
    }
}
