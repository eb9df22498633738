pub mod analysis;
pub mod app_config;
pub mod logging;
pub mod upstox;
pub mod utility;

// Re-exports for convenience
pub use analysis::{AnalysisConfig, ChainAnalysis, analyze};
pub use app_config::AppConfig;
pub use upstox::{InstrumentMaster, UpstoxClient, UpstoxError};
