use std::time::Duration;

// -----------------------------------------------
// UPSTOX API ENDPOINTS
// -----------------------------------------------
pub const UPSTOX_BASE_URL: &str = "https://api.upstox.com/v2";

pub fn option_contract_url(base_url: &str, instrument_key: &str) -> String {
    format!(
        "{}/option/contract?instrument_key={}",
        base_url,
        urlencoding::encode(instrument_key)
    )
}

pub fn option_chain_url(base_url: &str, instrument_key: &str, expiry: &str) -> String {
    format!(
        "{}/option/chain?instrument_key={}&expiry_date={}",
        base_url,
        urlencoding::encode(instrument_key),
        urlencoding::encode(expiry)
    )
}

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                               AppleWebKit/537.36 (KHTML, like Gecko) \
                               Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "en-IN,en;q=0.9",
];

pub const HEADER_ACCEPT_JSON: &str = "application/json";

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// -----------------------------------------------
// RETRY CONFIG
// -----------------------------------------------
pub const RETRY_BASE_DELAY_MS: u64 = 100;
pub const RETRY_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_SECS: u64 = 3;
pub const RETRY_MAX_ATTEMPTS: usize = 3;

// -----------------------------------------------
// SCAN CONCURRENCY
// -----------------------------------------------
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const MAX_CONCURRENT_LIMIT: usize = 50;

// -----------------------------------------------
// RUNTIME CONFIGURATION
// -----------------------------------------------
pub const DEFAULT_MODE: &str = "single";
pub const DEFAULT_SYMBOL: &str = "NIFTY";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_MASTER_PATH: &str = "complete.json";

/// Bearer token for the Upstox API
pub fn get_access_token() -> Option<String> {
    std::env::var("UPSTOX_ACCESS_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
}

/// Execution mode: single, scan or server
pub fn get_execution_mode() -> String {
    std::env::var("OI_MODE").unwrap_or_else(|_| DEFAULT_MODE.to_string())
}

pub fn get_single_symbol() -> String {
    std::env::var("OI_SYMBOL").unwrap_or_else(|_| DEFAULT_SYMBOL.to_string())
}

/// Expiry for single mode; nearest expiry is used when unset
pub fn get_single_expiry() -> Option<String> {
    std::env::var("OI_EXPIRY").ok().filter(|e| !e.is_empty())
}

pub fn get_port() -> u16 {
    std::env::var("OI_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub fn get_master_path() -> String {
    std::env::var("OI_MASTER_PATH").unwrap_or_else(|_| DEFAULT_MASTER_PATH.to_string())
}

/// Scan concurrency, clamped to 1..=50
pub fn get_max_concurrent() -> usize {
    std::env::var("OI_MAX_CONCURRENT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|n| n.clamp(1, MAX_CONCURRENT_LIMIT))
        .unwrap_or(DEFAULT_MAX_CONCURRENT)
}

/// Overall scan timeout; 0 or unset means none
pub fn get_scan_timeout() -> Option<Duration> {
    std::env::var("OI_SCAN_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Comma separated symbols to scan; the whole master when unset
pub fn get_scan_symbols() -> Option<Vec<String>> {
    let raw = std::env::var("OI_SCAN_SYMBOLS").ok()?;
    parse_symbol_list(&raw)
}

pub fn parse_symbol_list(raw: &str) -> Option<Vec<String>> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    (!symbols.is_empty()).then_some(symbols)
}

/// Parse an env var, keeping `default` when it is unset or malformed
pub fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_encoded() {
        assert_eq!(
            option_contract_url(UPSTOX_BASE_URL, "NSE_INDEX|Nifty 50"),
            "https://api.upstox.com/v2/option/contract?instrument_key=NSE_INDEX%7CNifty%2050"
        );
        assert_eq!(
            option_chain_url("http://localhost", "NSE_EQ|INE002A01018", "2025-12-30"),
            "http://localhost/option/chain?instrument_key=NSE_EQ%7CINE002A01018&expiry_date=2025-12-30"
        );
    }

    #[test]
    fn test_parse_symbol_list() {
        assert_eq!(
            parse_symbol_list(" nifty, RELIANCE ,,tcs"),
            Some(vec!["NIFTY".to_string(), "RELIANCE".to_string(), "TCS".to_string()])
        );
        assert_eq!(parse_symbol_list(" , "), None);
    }
}
