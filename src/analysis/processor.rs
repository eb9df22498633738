use super::snapshot::{OptionSide, Snapshot, StrikeQuote};
use serde::{Deserialize, Serialize};

/// Derived columns of one side of a strike
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideMetrics {
    /// Change of IV against the next lower strike, in percent
    pub iv_change_pct: f64,
    /// Change of OI since the previous session, in percent (negative = unwind)
    pub oi_change_pct: f64,
    /// Distance from spot, positive when this side is out of the money
    pub otm_distance: f64,
}

/// A strike together with its derived metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedStrike {
    #[serde(flatten)]
    pub quote: StrikeQuote,
    #[serde(rename = "CE_metrics")]
    pub call: SideMetrics,
    #[serde(rename = "PE_metrics")]
    pub put: SideMetrics,
    pub is_atm: bool,
    /// CE ltp + PE ltp
    pub premium: f64,
    pub premium_change_pct: f64,
}

impl AnnotatedStrike {
    pub fn strike(&self) -> f64 {
        self.quote.strike
    }

    pub fn metrics(&self, side: OptionSide) -> &SideMetrics {
        match side {
            OptionSide::Call => &self.call,
            OptionSide::Put => &self.put,
        }
    }
}

/// Snapshot with every derived column attached. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSnapshot {
    pub spot: f64,
    pub atm_strike: Option<f64>,
    pub rows: Vec<AnnotatedStrike>,
}

impl AnnotatedSnapshot {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// ITM / ATM / OTM for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Moneyness {
    #[serde(rename = "ITM")]
    InTheMoney,
    #[serde(rename = "ATM")]
    AtTheMoney,
    #[serde(rename = "OTM")]
    OutOfTheMoney,
}

impl Moneyness {
    pub fn label(&self) -> &'static str {
        match self {
            Moneyness::InTheMoney => "ITM",
            Moneyness::AtTheMoney => "ATM",
            Moneyness::OutOfTheMoney => "OTM",
        }
    }
}

// -----------------------------------------------
// PERCENT CHANGES
// -----------------------------------------------

/// `(curr - prev) / prev * 100`, or 0 when `prev` is 0
pub fn pct_change(curr: f64, prev: f64) -> f64 {
    if prev == 0.0 {
        0.0
    } else {
        (curr - prev) / prev * 100.0
    }
}

/// Percent change of each value against the one before it. The first
/// element, and any element after a zero, is 0.
pub fn sequential_pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for (i, &value) in values.iter().enumerate() {
        let change = match i {
            0 => 0.0,
            _ => pct_change(value, values[i - 1]),
        };
        out.push(change);
    }
    out
}

/// OI change since the previous session (0 when there was no previous OI)
pub fn oi_change_pct(oi: f64, prev_oi: f64) -> f64 {
    pct_change(oi, prev_oi)
}

/// Signed distance from spot; positive means OTM for that side
pub fn otm_distance(strike: f64, spot: f64, side: OptionSide) -> f64 {
    match side {
        OptionSide::Call => strike - spot,
        OptionSide::Put => spot - strike,
    }
}

// -----------------------------------------------
// ATM / MONEYNESS
// -----------------------------------------------

/// Index of the strike closest to spot; on a tie the lower strike wins
pub fn find_atm_index(rows: &[StrikeQuote], spot: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (idx, row) in rows.iter().enumerate() {
        let distance = (row.strike - spot).abs();
        match best {
            Some((_, min_distance)) if distance >= min_distance => {}
            _ => best = Some((idx, distance)),
        }
    }

    best.map(|(idx, _)| idx)
}

/// Moneyness of `strike` for `side`. The ATM strike is always ATM, calls
/// below spot and puts above spot are ITM.
pub fn classify_moneyness(
    strike: f64,
    spot: f64,
    atm_strike: Option<f64>,
    side: OptionSide,
) -> Moneyness {
    if atm_strike == Some(strike) {
        return Moneyness::AtTheMoney;
    }

    let distance = otm_distance(strike, spot, side);
    if distance > 0.0 {
        Moneyness::OutOfTheMoney
    } else if distance < 0.0 {
        Moneyness::InTheMoney
    } else {
        Moneyness::AtTheMoney
    }
}

// -----------------------------------------------
// ANNOTATION
// -----------------------------------------------

fn side_iv_changes(rows: &[StrikeQuote], side: OptionSide) -> Vec<f64> {
    let ivs: Vec<f64> = rows.iter().map(|r| r.side(side).iv).collect();
    sequential_pct_change(&ivs)
}

/// Attach every derived column to `snapshot`. Pure; running it twice on the
/// same snapshot gives the same result.
pub fn annotate(snapshot: &Snapshot) -> AnnotatedSnapshot {
    let rows = snapshot.rows();
    let spot = snapshot.spot();

    // 1. IV change, strike to strike
    let ce_iv_change = side_iv_changes(rows, OptionSide::Call);
    let pe_iv_change = side_iv_changes(rows, OptionSide::Put);

    // 4. ATM
    let atm_index = find_atm_index(rows, spot);

    // 5. combined premium
    let premiums: Vec<f64> = rows.iter().map(|r| r.call.ltp + r.put.ltp).collect();
    let premium_change = sequential_pct_change(&premiums);

    let annotated = rows
        .iter()
        .enumerate()
        .map(|(i, quote)| {
            // 2. + 3. OI change and OTM distance per side
            let metrics = |side: OptionSide, iv_change: f64| {
                let q = quote.side(side);
                SideMetrics {
                    iv_change_pct: iv_change,
                    oi_change_pct: oi_change_pct(q.oi, q.prev_oi),
                    otm_distance: otm_distance(quote.strike, spot, side),
                }
            };

            AnnotatedStrike {
                quote: *quote,
                call: metrics(OptionSide::Call, ce_iv_change[i]),
                put: metrics(OptionSide::Put, pe_iv_change[i]),
                is_atm: atm_index == Some(i),
                premium: premiums[i],
                premium_change_pct: premium_change[i],
            }
        })
        .collect();

    AnnotatedSnapshot {
        spot,
        atm_strike: atm_index.map(|i| rows[i].strike),
        rows: annotated,
    }
}

// -----------------------------------------------
// IV EVENTS / PCR TREND
// -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvSignal {
    #[serde(rename = "IV Spike")]
    Spike,
    #[serde(rename = "IV Crush")]
    Crush,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvEvent {
    pub strike: f64,
    pub side: OptionSide,
    pub signal: IvSignal,
    pub iv_change_pct: f64,
    pub ltp: f64,
}

/// IV change beyond the spike/crush thresholds, per strike and side
pub fn iv_events(snapshot: &AnnotatedSnapshot, spike: f64, crush: f64) -> Vec<IvEvent> {
    let mut events = Vec::new();

    for row in &snapshot.rows {
        for side in OptionSide::BOTH {
            let change = row.metrics(side).iv_change_pct;
            let signal = if change > spike {
                IvSignal::Spike
            } else if change < crush {
                IvSignal::Crush
            } else {
                continue;
            };

            events.push(IvEvent {
                strike: row.strike(),
                side,
                signal,
                iv_change_pct: change,
                ltp: row.quote.side(side).ltp,
            });
        }
    }

    events
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PcrPoint {
    pub strike: f64,
    pub pcr: f64,
}

/// Strikes whose PCR lies inside `[min, max]`
pub fn pcr_trend(snapshot: &AnnotatedSnapshot, min: f64, max: f64) -> Vec<PcrPoint> {
    snapshot
        .rows
        .iter()
        .filter(|r| (min..=max).contains(&r.quote.pcr))
        .map(|r| PcrPoint {
            strike: r.strike(),
            pcr: r.quote.pcr,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::snapshot::SideQuote;

    fn quote(strike: f64, ce: SideQuote, pe: SideQuote) -> StrikeQuote {
        StrikeQuote { strike, spot: 0.0, pcr: 0.0, call: ce, put: pe }
    }

    fn iv(iv: f64) -> SideQuote {
        SideQuote { iv, ..Default::default() }
    }

    #[test]
    fn test_sequential_pct_change() {
        assert_eq!(sequential_pct_change(&[]), Vec::<f64>::new());
        assert_eq!(sequential_pct_change(&[10.0, 12.0, 9.0]), vec![0.0, 20.0, -25.0]);
        // previous value of zero never divides
        assert_eq!(sequential_pct_change(&[0.0, 5.0, 10.0]), vec![0.0, 0.0, 100.0]);
    }

    #[test]
    fn test_oi_change_zero_prev() {
        assert_eq!(oi_change_pct(500.0, 0.0), 0.0);
        assert_eq!(oi_change_pct(150.0, 100.0), 50.0);
        assert_eq!(oi_change_pct(40.0, 100.0), -60.0);
    }

    #[test]
    fn test_find_atm_index() {
        let rows: Vec<StrikeQuote> = [95.0, 100.0, 105.0]
            .iter()
            .map(|&s| quote(s, SideQuote::default(), SideQuote::default()))
            .collect();

        assert_eq!(find_atm_index(&rows, 100.0), Some(1));
        assert_eq!(find_atm_index(&rows, 104.0), Some(2));
        // tie between 95 and 100: first in ascending order
        assert_eq!(find_atm_index(&rows, 97.5), Some(0));
        assert_eq!(find_atm_index(&[], 100.0), None);
    }

    #[test]
    fn test_classify_moneyness_is_side_aware() {
        let atm = Some(100.0);
        assert_eq!(classify_moneyness(100.0, 101.0, atm, OptionSide::Call), Moneyness::AtTheMoney);
        assert_eq!(classify_moneyness(100.0, 101.0, atm, OptionSide::Put), Moneyness::AtTheMoney);

        assert_eq!(classify_moneyness(95.0, 101.0, atm, OptionSide::Call), Moneyness::InTheMoney);
        assert_eq!(classify_moneyness(95.0, 101.0, atm, OptionSide::Put), Moneyness::OutOfTheMoney);

        assert_eq!(classify_moneyness(105.0, 101.0, atm, OptionSide::Call), Moneyness::OutOfTheMoney);
        assert_eq!(classify_moneyness(105.0, 101.0, atm, OptionSide::Put), Moneyness::InTheMoney);
    }

    #[test]
    fn test_annotate_columns() {
        let rows = vec![
            quote(95.0, iv(10.0), iv(20.0)),
            quote(100.0, iv(12.0), iv(15.0)),
            quote(105.0, iv(0.0), iv(30.0)),
        ];
        let snapshot = Snapshot::from_quotes(100.0, rows);
        let annotated = annotate(&snapshot);

        assert_eq!(annotated.atm_strike, Some(100.0));
        assert!(annotated.rows[1].is_atm);
        assert!(!annotated.rows[0].is_atm && !annotated.rows[2].is_atm);

        let ce: Vec<f64> = annotated.rows.iter().map(|r| r.call.iv_change_pct).collect();
        assert_eq!(ce, vec![0.0, 20.0, -100.0]);
        let pe: Vec<f64> = annotated.rows.iter().map(|r| r.put.iv_change_pct).collect();
        assert_eq!(pe, vec![0.0, -25.0, 100.0]);

        assert_eq!(annotated.rows[0].call.otm_distance, -5.0);
        assert_eq!(annotated.rows[0].put.otm_distance, 5.0);
        assert_eq!(annotated.rows[2].call.otm_distance, 5.0);
    }

    #[test]
    fn test_annotate_premium() {
        let side = |ltp: f64| SideQuote { ltp, ..Default::default() };
        let snapshot = Snapshot::from_quotes(
            100.0,
            vec![quote(95.0, side(6.0), side(2.0)), quote(100.0, side(3.0), side(3.0))],
        );
        let annotated = annotate(&snapshot);
        assert_eq!(annotated.rows[0].premium, 8.0);
        assert_eq!(annotated.rows[1].premium, 6.0);
        assert_eq!(annotated.rows[1].premium_change_pct, -25.0);
    }

    #[test]
    fn test_annotate_is_idempotent() {
        let snapshot = Snapshot::from_quotes(
            101.0,
            vec![quote(100.0, iv(11.0), iv(12.0)), quote(102.0, iv(13.0), iv(9.0))],
        );
        assert_eq!(annotate(&snapshot), annotate(&snapshot));
    }

    #[test]
    fn test_annotate_empty() {
        let annotated = annotate(&Snapshot::default());
        assert!(annotated.is_empty());
        assert_eq!(annotated.atm_strike, None);
    }

    #[test]
    fn test_iv_events_and_pcr_trend() {
        let mut rows = vec![
            quote(95.0, iv(10.0), iv(20.0)),
            quote(100.0, iv(13.0), iv(15.0)),
        ];
        rows[0].pcr = 2.5;
        rows[1].pcr = 0.8;
        let annotated = annotate(&Snapshot::from_quotes(100.0, rows));

        let events = iv_events(&annotated, 20.0, -20.0);
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].side, events[0].signal), (OptionSide::Call, IvSignal::Spike));
        assert_eq!((events[1].side, events[1].signal), (OptionSide::Put, IvSignal::Crush));

        let trend = pcr_trend(&annotated, 0.0, 2.0);
        assert_eq!(trend, vec![PcrPoint { strike: 100.0, pcr: 0.8 }]);
    }
}
