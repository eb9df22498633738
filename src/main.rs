use anyhow::Result;
use colored::Colorize;
use oi_analyzer::logging;
use oi_analyzer::upstox::UpstoxCommands;
use oi_analyzer::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let app = AppConfig::from_env();
    if let Err(e) = app.validate() {
        eprintln!("{} {}", "✗".red(), e);
        UpstoxCommands::print_usage();
        std::process::exit(1);
    }
    app.log_config();

    match app.mode.as_str() {
        "server" => UpstoxCommands::run_server(&app).await?,
        "scan" => UpstoxCommands::run_scan(&app).await?,
        _ => UpstoxCommands::run_single(&app).await?,
    }

    Ok(())
}
