use crate::upstox::models::{RawOptionSide, RawStrikeRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call (`CE`) or put (`PE`) side of a strike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionSide {
    pub const BOTH: [OptionSide; 2] = [OptionSide::Call, OptionSide::Put];

    pub fn code(&self) -> &'static str {
        match self {
            OptionSide::Call => "CE",
            OptionSide::Put => "PE",
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Market data and greeks of one side of a strike
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideQuote {
    pub ltp: f64,
    pub oi: f64,
    pub prev_oi: f64,
    pub iv: f64,
    pub delta: f64,
    pub theta: f64,
}

/// One row of the chain: a strike with both sides
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeQuote {
    pub strike: f64,
    pub spot: f64,
    pub pcr: f64,
    #[serde(rename = "CE")]
    pub call: SideQuote,
    #[serde(rename = "PE")]
    pub put: SideQuote,
}

impl StrikeQuote {
    pub fn side(&self, side: OptionSide) -> &SideQuote {
        match side {
            OptionSide::Call => &self.call,
            OptionSide::Put => &self.put,
        }
    }
}

/// Strikes of one (underlying, expiry) pair, ascending and unique,
/// all sharing the same spot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    spot: f64,
    rows: Vec<StrikeQuote>,
}

impl Snapshot {
    pub fn spot(&self) -> f64 {
        self.spot
    }

    pub fn rows(&self) -> &[StrikeQuote] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Empty means "no data" for the expiry, not a failure
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build from already-typed quotes. Rows are sorted by strike, the first
    /// occurrence of a duplicated strike is kept and every row is stamped
    /// with `spot`.
    pub fn from_quotes(spot: f64, quotes: impl IntoIterator<Item = StrikeQuote>) -> Self {
        let mut rows: Vec<StrikeQuote> = quotes
            .into_iter()
            .map(|q| StrikeQuote { spot, ..q })
            .collect();
        rows.sort_by(|a, b| a.strike.total_cmp(&b.strike));
        rows.dedup_by(|later, earlier| later.strike == earlier.strike);

        Self { spot, rows }
    }
}

// -----------------------------------------------
// NORMALIZER
// -----------------------------------------------

/// Fields read from one side of a raw row
#[derive(Debug, Clone, Copy)]
enum SideField {
    Ltp,
    Oi,
    PrevOi,
    Iv,
    Delta,
    Theta,
}

impl SideField {
    /// record side → market_data / option_greeks → field
    fn lookup(self, side: Option<&RawOptionSide>) -> Option<f64> {
        let side = side?;
        match self {
            SideField::Ltp => side.market_data.as_ref()?.ltp,
            SideField::Oi => side.market_data.as_ref()?.oi,
            SideField::PrevOi => side.market_data.as_ref()?.prev_oi,
            SideField::Iv => side.option_greeks.as_ref()?.iv,
            SideField::Delta => side.option_greeks.as_ref()?.delta,
            SideField::Theta => side.option_greeks.as_ref()?.theta,
        }
    }
}

fn normalize_side(side: Option<&RawOptionSide>, default: f64) -> SideQuote {
    let get = |field: SideField| field.lookup(side).unwrap_or(default);
    SideQuote {
        ltp: get(SideField::Ltp),
        oi: get(SideField::Oi),
        prev_oi: get(SideField::PrevOi),
        iv: get(SideField::Iv),
        delta: get(SideField::Delta),
        theta: get(SideField::Theta),
    }
}

/// Turn raw chain rows into a `Snapshot`. Any absent field, at any depth,
/// becomes `default`. The spot of the first row is used for the whole
/// snapshot. An empty input gives an empty snapshot.
pub fn normalize(records: &[RawStrikeRecord], default: f64) -> Snapshot {
    let Some(first) = records.first() else {
        return Snapshot::default();
    };
    let spot = first.underlying_spot_price.unwrap_or(default);

    let quotes = records.iter().map(|row| StrikeQuote {
        strike: row.strike_price.unwrap_or(default),
        spot,
        pcr: row.pcr.unwrap_or(default),
        call: normalize_side(row.call_options.as_ref(), default),
        put: normalize_side(row.put_options.as_ref(), default),
    });

    Snapshot::from_quotes(spot, quotes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> Vec<RawStrikeRecord> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_input_is_empty_snapshot() {
        let snapshot = normalize(&[], 0.0);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.spot(), 0.0);
    }

    #[test]
    fn test_missing_fields_take_default() {
        let rows = raw(json!([
            { "strike_price": 100, "underlying_spot_price": 101.5 },
            { "strike_price": 105, "call_options": { "market_data": {} } },
            { "strike_price": 95, "put_options": { "option_greeks": { "iv": 18.0 } } }
        ]));

        let snapshot = normalize(&rows, 0.0);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.spot(), 101.5);

        // sorted ascending, spot stamped on every row
        let strikes: Vec<f64> = snapshot.rows().iter().map(|r| r.strike).collect();
        assert_eq!(strikes, vec![95.0, 100.0, 105.0]);
        assert!(snapshot.rows().iter().all(|r| r.spot == 101.5));

        assert_eq!(snapshot.rows()[0].put.iv, 18.0);
        assert_eq!(snapshot.rows()[0].put.oi, 0.0);
        assert_eq!(snapshot.rows()[2].call, SideQuote::default());
    }

    #[test]
    fn test_custom_default_is_applied() {
        let rows = raw(json!([{ "strike_price": 100, "underlying_spot_price": 100 }]));
        let snapshot = normalize(&rows, -1.0);
        let row = snapshot.rows()[0];
        assert_eq!(row.pcr, -1.0);
        assert_eq!(row.call.theta, -1.0);
        assert_eq!(row.put.prev_oi, -1.0);
    }

    #[test]
    fn test_duplicate_strikes_keep_first() {
        let rows = raw(json!([
            { "strike_price": 100, "underlying_spot_price": 100,
              "call_options": { "market_data": { "oi": 10 } } },
            { "strike_price": 100,
              "call_options": { "market_data": { "oi": 99 } } }
        ]));
        let snapshot = normalize(&rows, 0.0);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.rows()[0].call.oi, 10.0);
    }

    #[test]
    fn test_full_row() {
        let rows = raw(json!([{
            "strike_price": 22000,
            "underlying_spot_price": 22010.4,
            "pcr": 1.25,
            "call_options": {
                "market_data": { "ltp": 120.5, "oi": 5000, "prev_oi": 4000 },
                "option_greeks": { "iv": 14.2, "delta": 0.52, "theta": -11.3 }
            },
            "put_options": {
                "market_data": { "ltp": 98.0, "oi": 7000, "prev_oi": 7500 },
                "option_greeks": { "iv": 15.1, "delta": -0.48, "theta": -9.8 }
            }
        }]));

        let row = normalize(&rows, 0.0).rows()[0];
        assert_eq!(row.pcr, 1.25);
        assert_eq!(row.side(OptionSide::Call).ltp, 120.5);
        assert_eq!(row.side(OptionSide::Call).theta, -11.3);
        assert_eq!(row.side(OptionSide::Put).delta, -0.48);
        assert_eq!(row.side(OptionSide::Put).prev_oi, 7500.0);
    }
}
