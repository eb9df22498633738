use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// -----------------------------------------------
// LENIENT NUMERIC PARSE
// -----------------------------------------------

/// Accepts a JSON number, a numeric string, `null` or anything else.
/// Anything that is not a finite number ends up as `None`.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

pub fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Nested object that may be missing, null or of the wrong type.
/// Anything that does not deserialize as `T` ends up as `None`.
pub fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Ok(Some(s)),
        _ => Ok(None),
    }
}

// -----------------------------------------------
// OPTION CHAIN (GET /option/chain)
// -----------------------------------------------

/// Envelope returned by every Upstox v2 endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,

    #[serde(default)]
    pub data: Option<T>,
}

/// Rows of an envelope's `data` array. A row that does not parse is
/// dropped on its own; the rest are kept.
pub fn parse_rows<T: DeserializeOwned>(text: &str) -> serde_json::Result<Vec<T>> {
    let envelope: ApiEnvelope<Vec<Value>> = serde_json::from_str(text)?;
    let raw = envelope.data.unwrap_or_default();
    let total = raw.len();

    let rows: Vec<T> = raw
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect();
    if rows.len() < total {
        tracing::debug!(dropped = total - rows.len(), total, "Dropped malformed rows");
    }
    Ok(rows)
}

/// One strike row of the option chain, every level may be missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStrikeRecord {
    #[serde(default)]
    pub expiry: Option<Value>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub pcr: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub strike_price: Option<f64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub underlying_key: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub underlying_spot_price: Option<f64>,

    #[serde(default, deserialize_with = "lenient_object")]
    pub call_options: Option<RawOptionSide>,

    #[serde(default, deserialize_with = "lenient_object")]
    pub put_options: Option<RawOptionSide>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOptionSide {
    #[serde(default, deserialize_with = "lenient_string")]
    pub instrument_key: Option<String>,

    #[serde(default, deserialize_with = "lenient_object")]
    pub market_data: Option<RawMarketData>,

    #[serde(default, deserialize_with = "lenient_object")]
    pub option_greeks: Option<RawGreeks>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMarketData {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ltp: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub oi: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub close_price: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub prev_oi: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGreeks {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub vega: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub theta: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub gamma: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub delta: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub iv: Option<f64>,
}

// -----------------------------------------------
// OPTION CONTRACTS (GET /option/contract)
// -----------------------------------------------

/// Only the expiry matters here; it arrives as a date string or an epoch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContract {
    #[serde(default, alias = "expiryDate", alias = "expiry_date")]
    pub expiry: Option<Value>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub instrument_key: Option<String>,
}

// -----------------------------------------------
// INSTRUMENT MASTER
// -----------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterEntry {
    #[serde(default)]
    pub underlying_symbol: Option<String>,

    #[serde(
        default,
        alias = "underlyingInstrumentKey",
        alias = "underlyingInstrument_key"
    )]
    pub underlying_key: Option<String>,
}
