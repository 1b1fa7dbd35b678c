use std::sync::Arc;

use clap::Parser;
use httpmeter::{
    demo, http::setup_http_server, init_telemetry, settings::config::Settings, shutdown,
    HttpMetrics, MiddlewareConfig,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "httpmeter")]
#[command(about = "Demo server instrumented with HTTP request metrics")]
#[clap(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Parser)]
enum Commands {
    /// Show current configuration and exit
    Config,
    /// Start the demo server (default)
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new()?;

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Config => {
            println!("{:#?}", &settings);
            return Ok(());
        }
        Commands::Run => {}
    }

    init_telemetry::init_tracing()?;

    let config = MiddlewareConfig::from_settings(&settings.metrics);
    info!("Metrics configuration: {:?}", config);
    let metrics = Arc::new(HttpMetrics::new(config)?);

    let stop_flag = shutdown::StopFlag::new();
    shutdown::register_signal_handler(&stop_flag);

    let handle = setup_http_server(
        demo::router(&metrics),
        &settings.bind_address,
        stop_flag,
    )
    .await?;

    handle.await??;
    info!("All tasks are done");

    Ok(())
}
