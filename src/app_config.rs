use crate::analysis::AnalysisConfig;
use crate::upstox::config;
use anyhow::{Result, bail};
use colored::Colorize;
use std::time::Duration;

pub const MODES: &[&str] = &["single", "scan", "server"];

/// Application configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: String,
    pub symbol: String,
    pub expiry: Option<String>,
    pub port: u16,
    pub master_path: String,
    pub max_concurrent: usize,
    pub scan_timeout: Option<Duration>,
    pub scan_symbols: Option<Vec<String>>,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Create new configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            mode: config::get_execution_mode().trim().to_lowercase(),
            symbol: config::get_single_symbol().trim().to_uppercase(),
            expiry: config::get_single_expiry(),
            port: config::get_port(),
            master_path: config::get_master_path(),
            max_concurrent: config::get_max_concurrent(),
            scan_timeout: config::get_scan_timeout(),
            scan_symbols: config::get_scan_symbols(),
            analysis: AnalysisConfig::from_env(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !MODES.contains(&self.mode.as_str()) {
            bail!("Invalid mode '{}'. Use one of: {}", self.mode, MODES.join(", "));
        }
        if self.symbol.is_empty() {
            bail!("OI_SYMBOL must not be empty");
        }
        Ok(())
    }

    pub fn log_config(&self) {
        println!("{} Mode: {}", "→".cyan(), self.mode.yellow());
        println!("{} Master file: {}", "→".cyan(), self.master_path);
        match self.mode.as_str() {
            "single" => {
                println!("{} Symbol: {}", "→".cyan(), self.symbol.yellow());
                println!(
                    "{} Expiry: {}",
                    "→".cyan(),
                    self.expiry.as_deref().unwrap_or("nearest").yellow()
                );
            }
            "scan" => {
                println!("{} Max concurrent requests: {}", "ℹ".blue(), self.max_concurrent);
                match self.scan_timeout {
                    Some(t) => println!("{} Scan timeout: {}s", "⏱".yellow(), t.as_secs()),
                    None => println!("{} Scan timeout: none", "⏱".yellow()),
                }
            }
            _ => println!("{} Port: {}", "→".cyan(), self.port),
        }
        println!();

        tracing::info!(mode = %self.mode, config = ?self.analysis, "Configuration loaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            mode: "single".into(),
            symbol: "NIFTY".into(),
            expiry: None,
            port: config::DEFAULT_PORT,
            master_path: config::DEFAULT_MASTER_PATH.into(),
            max_concurrent: config::DEFAULT_MAX_CONCURRENT,
            scan_timeout: None,
            scan_symbols: None,
            analysis: AnalysisConfig::default(),
        }
    }

    #[test]
    fn test_validate_modes() {
        for mode in MODES {
            let cfg = AppConfig { mode: mode.to_string(), ..base() };
            assert!(cfg.validate().is_ok());
        }
        let cfg = AppConfig { mode: "batch".into(), ..base() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_empty_symbol() {
        let cfg = AppConfig { symbol: String::new(), ..base() };
        assert!(cfg.validate().is_err());
    }
}
