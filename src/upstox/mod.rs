pub mod config;
pub mod error;
pub mod master;
pub mod models;
pub mod upstox_api_server;
pub mod upstox_client;
pub mod upstox_commands;

// Re-exports for convenience
pub use error::UpstoxError;
pub use master::InstrumentMaster;
pub use models::{RawContract, RawStrikeRecord};
pub use upstox_client::UpstoxClient;
pub use upstox_commands::UpstoxCommands;
