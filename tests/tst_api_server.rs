use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use oi_analyzer::analysis::AnalysisConfig;
use oi_analyzer::analysis::scan::ChainSource;
use oi_analyzer::upstox::models::MasterEntry;
use oi_analyzer::upstox::upstox_api_server::{AppState, router};
use oi_analyzer::upstox::{InstrumentMaster, RawStrikeRecord};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

/// NIFTY has a decaying call side; BANKNIFTY has expiries but no rows;
/// every other key fails.
#[derive(Default)]
struct FakeSource {
    expiry_calls: AtomicUsize,
}

#[async_trait]
impl ChainSource for FakeSource {
    async fn fetch_expiries(&self, instrument_key: &str) -> Result<Vec<String>> {
        self.expiry_calls.fetch_add(1, Ordering::SeqCst);
        match instrument_key {
            "NSE_INDEX|Nifty 50" | "NSE_INDEX|Nifty Bank" => {
                Ok(vec!["2099-01-29".to_string(), "2099-02-26".to_string()])
            }
            _ => Err(anyhow!("HTTP 401")),
        }
    }

    async fn fetch_chain(&self, instrument_key: &str, _expiry: &str) -> Result<Vec<RawStrikeRecord>> {
        if instrument_key != "NSE_INDEX|Nifty 50" {
            return Ok(Vec::new());
        }
        let rows = json!([
            { "strike_price": 22000, "underlying_spot_price": 22010, "pcr": 1.2,
              "call_options": { "market_data": { "ltp": 90, "oi": 1000, "prev_oi": 1000 },
                                "option_greeks": { "iv": 12, "delta": 0.52 } },
              "put_options": { "market_data": { "ltp": 80, "oi": 1000, "prev_oi": 1000 },
                               "option_greeks": { "iv": 13, "delta": -0.48 } } },
            { "strike_price": 22100, "underlying_spot_price": 22010, "pcr": 0.7,
              "call_options": { "market_data": { "ltp": 40, "oi": 500, "prev_oi": 1000 },
                                "option_greeks": { "iv": 13, "delta": 0.3 } } },
            { "strike_price": 22200, "underlying_spot_price": 22010, "pcr": 0.5,
              "call_options": { "market_data": { "ltp": 15, "oi": 600, "prev_oi": 1000 },
                                "option_greeks": { "iv": 14, "delta": 0.15 } } }
        ]);
        Ok(serde_json::from_value(rows)?)
    }
}

fn state() -> (Arc<FakeSource>, AppState<FakeSource>) {
    let master = InstrumentMaster::from_entries(
        [
            ("NIFTY", "NSE_INDEX|Nifty 50"),
            ("BANKNIFTY", "NSE_INDEX|Nifty Bank"),
            ("RELIANCE", "NSE_EQ|INE002A01018"),
        ]
        .iter()
        .map(|(s, k)| MasterEntry {
            underlying_symbol: Some(s.to_string()),
            underlying_key: Some(k.to_string()),
        }),
    );
    let source = Arc::new(FakeSource::default());
    let state = AppState::new(Arc::clone(&source), Arc::new(master), AnalysisConfig::default());
    (source, state)
}

async fn call(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_and_symbols() {
        let (_, state) = state();

        let (status, body) = call(router(state.clone()), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["symbols_loaded"], 3);

        let (_, body) = call(router(state), get("/api/symbols")).await;
        assert_eq!(body["data"]["symbols"], json!(["BANKNIFTY", "NIFTY", "RELIANCE"]));
        assert!(body["processing_time_ms"].is_u64());
    }

    #[tokio::test]
    async fn test_expiries_are_cached() {
        let (source, state) = state();

        let (_, body) = call(router(state.clone()), get("/api/expiries?symbol=nifty")).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["symbol"], "NIFTY");
        assert_eq!(body["data"]["expiries"], json!(["2099-01-29", "2099-02-26"]));

        call(router(state), get("/api/expiries?symbol=NIFTY")).await;
        assert_eq!(source.expiry_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analysis_reuses_cached_expiries() {
        let (source, state) = state();

        call(router(state.clone()), get("/api/expiries?symbol=NIFTY")).await;
        let (_, body) = call(router(state.clone()), get("/api/analysis?symbol=NIFTY")).await;
        assert_eq!(body["data"]["expiry"], "2099-01-29");
        call(router(state), get("/api/analysis?symbol=nifty")).await;

        assert_eq!(source.expiry_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_errors_are_envelopes() {
        let (_, state) = state();

        let (status, body) = call(router(state.clone()), get("/api/expiries?symbol=TCS")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Unknown symbol: TCS");

        let (_, body) = call(router(state), get("/api/expiries?symbol=RELIANCE")).await;
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_analysis_nearest_expiry() {
        let (_, state) = state();

        let (_, body) = call(router(state), get("/api/analysis?symbol=NIFTY&top_k=2")).await;
        assert_eq!(body["success"], true);

        let data = &body["data"];
        assert_eq!(data["expiry"], "2099-01-29");
        assert_eq!(data["has_data"], true);
        assert_eq!(data["analysis"]["atm_strike"], 22000.0);
        assert_eq!(data["analysis"]["decay"]["CE"]["flagged"], true);
        assert_eq!(data["analysis"]["suggestions"]["calls"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analysis_empty_chain_is_not_an_error() {
        let (_, state) = state();

        let (_, body) = call(
            router(state),
            get("/api/analysis?symbol=BANKNIFTY&expiry=2099-02-26"),
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["has_data"], false);
        assert_eq!(body["data"]["analysis"]["suggestions"]["call_pick"], "-");
    }

    #[tokio::test]
    async fn test_analysis_without_expiries() {
        let (_, state) = state();

        let (_, body) = call(router(state), get("/api/analysis?symbol=RELIANCE")).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No expiries available for RELIANCE");
    }

    #[tokio::test]
    async fn test_scan_endpoint() {
        let (_, state) = state();

        let (status, body) = call(
            router(state),
            post_json("/api/scan", json!({ "otm_levels": 2, "decay_threshold": -20.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let report = &body["data"];
        assert_eq!(report["total_symbols"], 3);
        assert_eq!(report["scanned"], 1);
        assert_eq!(report["rows"][0]["symbol"], "NIFTY");
        assert_eq!(report["rows"][0]["ce_flagged"], true);

        let reasons: Vec<&str> = report["skipped"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["reason"].as_str().unwrap())
            .collect();
        assert_eq!(reasons, vec!["empty_chain", "no_expiries"]);
    }
}
