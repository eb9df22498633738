use super::master::InstrumentMaster;
use super::upstox_api_server::{self, AppState};
use super::upstox_client::UpstoxClient;
use crate::analysis::decay::{LevelCell, SideDecay};
use crate::analysis::scan::{
    ScanReport, SkipReason, load_snapshot, market_today, resolve_expiry, scan_universe,
};
use crate::analysis::suggestions::ScoredCandidate;
use crate::analysis::{ChainAnalysis, analyze};
use crate::app_config::AppConfig;
use crate::utility::timing::Timer;

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const ANALYSIS_FILE: &str = "analysis.json";
pub const SCAN_FILE: &str = "oi_decay_scan.json";

/// Upstox Command Handler - the three CLI modes
pub struct UpstoxCommands;

impl UpstoxCommands {
    fn banner(title: &str) {
        println!("{}", "=".repeat(60).blue());
        println!("{}", title.green().bold());
        println!("{}", "=".repeat(60).blue());
        println!();
    }

    fn load_master(path: &str) -> Result<InstrumentMaster> {
        let master = InstrumentMaster::load(path)
            .with_context(|| format!("Failed to load instrument master from {}", path))?;
        println!("{} Loaded {} symbols from {}", "✓".green(), master.len(), path);
        Ok(master)
    }

    /// Analyze one symbol and expiry, print the tables and write analysis.json
    pub async fn run_single(app: &AppConfig) -> Result<()> {
        Self::banner("OI Analyzer - Single Symbol");
        let timer = Timer::start("Single analysis");

        let client = UpstoxClient::from_env()?;
        let master = Self::load_master(&app.master_path)?;

        let key = master
            .resolve(&app.symbol)
            .ok_or_else(|| anyhow!("Symbol {} not found in instrument master", app.symbol))?;

        let today = market_today();
        let expiry = resolve_expiry(&client, key, app.expiry.as_deref(), today)
            .await
            .ok_or_else(|| anyhow!("No expiries available for {}", app.symbol))?;

        println!("{} Fetching option chain for {}...", "→".cyan(), app.symbol.yellow());
        println!("{} Expiry: {}", "→".cyan(), expiry.yellow());
        println!();

        let snapshot = load_snapshot(&client, key, &expiry).await;
        if snapshot.is_empty() {
            println!("{} No option chain data for {} {}", "ℹ".blue(), app.symbol, expiry);
            return Ok(());
        }

        let analysis = analyze(&snapshot, &app.analysis);
        Self::display_analysis(&app.symbol, &expiry, &analysis);

        let output = serde_json::json!({
            "symbol": app.symbol,
            "expiry": expiry,
            "analysis": analysis,
        });
        std::fs::write(ANALYSIS_FILE, serde_json::to_string_pretty(&output)?)
            .with_context(|| format!("Failed to write {}", ANALYSIS_FILE))?;
        println!("{} Saved analysis to {}", "✓".green(), ANALYSIS_FILE);

        timer.stop();
        Ok(())
    }

    /// Decay scan over the configured universe. Ctrl-C stops starting new
    /// symbols and reports what finished.
    pub async fn run_scan(app: &AppConfig) -> Result<()> {
        Self::banner("OI Analyzer - OTM Decay Scan");

        let client = Arc::new(UpstoxClient::from_env()?);
        let master = Arc::new(Self::load_master(&app.master_path)?);
        let symbols = app.scan_symbols.clone().unwrap_or_else(|| master.symbols());

        println!("{} Scanning {} symbols...", "→".cyan(), symbols.len());
        println!();

        let cancel = Arc::new(AtomicBool::new(false));
        let watcher = {
            let cancel = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    println!("\n{} Ctrl-C received, finishing current symbols...", "⚠".yellow());
                    cancel.store(true, Ordering::Relaxed);
                }
            })
        };

        let options = app.analysis.scan_options(app.max_concurrent, app.scan_timeout);
        let report = scan_universe(client, master, symbols, &options, cancel).await;
        watcher.abort();

        Self::display_scan_report(&report);

        std::fs::write(SCAN_FILE, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {}", SCAN_FILE))?;
        println!("{} Saved scan to {}", "✓".green(), SCAN_FILE);

        Ok(())
    }

    /// Run API server mode
    pub async fn run_server(app: &AppConfig) -> Result<()> {
        Self::banner("OI Analyzer API Server");

        let client = Arc::new(UpstoxClient::from_env()?);
        let master = Arc::new(Self::load_master(&app.master_path)?);
        let state = AppState::new(client, master, app.analysis)
            .with_scan_limits(app.max_concurrent, app.scan_timeout);

        upstox_api_server::start_server(state, app.port).await
    }

    // -----------------------------------------------
    // DISPLAY
    // -----------------------------------------------

    fn display_analysis(symbol: &str, expiry: &str, analysis: &ChainAnalysis) {
        Timer::section(format!("{} {}", symbol, expiry));
        println!("{} Spot (close): {:.2}", "✓".green(), analysis.spot);
        match analysis.atm_strike {
            Some(atm) => println!("{} ATM strike: {}", "✓".green(), atm),
            None => println!("{} ATM strike: -", "✓".green()),
        }
        println!("{} Strikes: {}", "✓".green(), analysis.strikes.rows.len());
        println!();

        println!("{}", "Greeks / IV".cyan().bold());
        println!(
            "  {:>10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>6}",
            "Strike", "CE IV", "CE Δ", "CE Θ", "PE IV", "PE Δ", "PE Θ", "PCR"
        );
        for row in &analysis.strikes.rows {
            let q = &row.quote;
            let line = format!(
                "  {:>10} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>6.2}",
                q.strike, q.call.iv, q.call.delta, q.call.theta, q.put.iv, q.put.delta, q.put.theta, q.pcr
            );
            if row.is_atm {
                println!("{}", line.yellow().bold());
            } else {
                println!("{}", line);
            }
        }
        println!();

        println!("{} (threshold {:.1}%)", "OTM Decay".cyan().bold(), analysis.decay.threshold);
        Self::display_side_decay(&analysis.decay.call);
        Self::display_side_decay(&analysis.decay.put);
        println!();

        if analysis.iv_events.is_empty() {
            println!("{} No IV spikes or crushes", "ℹ".blue());
        } else {
            println!("{}", "IV Events".cyan().bold());
            for event in &analysis.iv_events {
                println!(
                    "  {} {} {} {:+.2}% (ltp {:.2})",
                    "•".yellow(),
                    event.strike,
                    event.side,
                    event.iv_change_pct,
                    event.ltp
                );
            }
        }
        println!("{} PCR points in range: {}", "ℹ".blue(), analysis.pcr_trend.len());
        println!();

        println!("{}", "Suggestions".cyan().bold());
        Self::display_candidates("CE", &analysis.suggestions.calls);
        Self::display_candidates("PE", &analysis.suggestions.puts);
        println!("{} CE: {}", "★".green(), analysis.suggestions.call_pick);
        println!("{} PE: {}", "★".green(), analysis.suggestions.put_pick);
        println!("{}", "=".repeat(60).blue());
    }

    fn display_side_decay(side: &SideDecay) {
        let flag = if side.flagged { "DECAYING".red().bold() } else { "ok".green() };
        println!("  {} [{}]", side.side, flag);
        for level in &side.levels {
            println!(
                "    OTM{} {:>10} OI {:>12.0} prev {:>12.0} {:+8.2}%",
                level.rank, level.strike, level.oi, level.prev_oi, level.oi_change_pct
            );
        }
    }

    fn display_candidates(label: &str, ranked: &[ScoredCandidate]) {
        for (i, c) in ranked.iter().enumerate() {
            println!(
                "  {} #{} {:>10} {} score {:.4}  {}",
                label,
                i + 1,
                c.strike,
                c.moneyness.label(),
                c.score,
                c.reason()
            );
        }
    }

    fn format_levels(levels: &[LevelCell]) -> String {
        levels
            .iter()
            .map(|l| format!("{} ({:+.1}%)", l.strike, l.decay_pct))
            .collect::<Vec<_>>()
            .join("  ")
    }

    fn display_scan_report(report: &ScanReport) {
        println!("{}", "=".repeat(60).blue());
        println!("{}", "Summary".cyan().bold());
        println!("{}", "=".repeat(60).blue());
        println!("{} Symbols: {}", "ℹ".blue(), report.total_symbols);
        println!("{} Scanned: {}", "✓".green(), report.scanned);
        println!("{} Flagged: {}", "⚠".yellow(), report.rows.len());
        for reason in [
            SkipReason::NoInstrumentKey,
            SkipReason::NoExpiries,
            SkipReason::EmptyChain,
            SkipReason::Cancelled,
            SkipReason::TimedOut,
            SkipReason::TaskFailed,
        ] {
            let count = report.skipped_for(reason);
            if count > 0 {
                println!("{} Skipped ({:?}): {}", "✗".red(), reason, count);
            }
        }
        if report.cancelled {
            println!("{} Scan was cancelled", "⚠".yellow());
        }
        if report.timed_out {
            println!("{} Scan timed out", "⏱".yellow());
        }
        println!("{} Time taken: {:.2}s", "⏱".yellow(), report.elapsed_ms as f64 / 1000.0);
        println!("{} Avg time per symbol: {}ms", "⏱".yellow(), report.symbol_timing.avg_ms);
        println!();

        if report.rows.is_empty() {
            println!("{} No symbols with OTM OI decay", "ℹ".blue());
            return;
        }

        for row in &report.rows {
            println!(
                "{} {} close {:.2} expiry {}",
                "•".yellow(),
                row.symbol.yellow().bold(),
                row.close,
                row.expiry
            );
            if row.ce_flagged {
                println!("    CE {}", Self::format_levels(&row.ce_levels).red());
            }
            if row.pe_flagged {
                println!("    PE {}", Self::format_levels(&row.pe_levels).red());
            }
        }
        println!();
    }

    /// Print usage instructions
    pub fn print_usage() {
        eprintln!("Set OI_MODE environment variable to control execution mode");
        eprintln!("Examples:");
        eprintln!("  OI_MODE=single OI_SYMBOL=NIFTY OI_EXPIRY=2025-12-30 cargo run");
        eprintln!("  OI_MODE=scan OI_MAX_CONCURRENT=10 OI_SCAN_TIMEOUT_SECS=300 cargo run");
        eprintln!("  OI_MODE=server OI_PORT=3001 cargo run");
        eprintln!("UPSTOX_ACCESS_TOKEN and an instrument master (OI_MASTER_PATH) are required");
    }
}
