//! Inteceleri Shapes - Main Entry Point

use clap::Parser;
use inteceleri_shapes::cli::{cmd_info, cmd_predict, cmd_serve, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_default();
    let config = command.config()?;

    // Initialize logging; RUST_LOG wins over the profile default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .init();

    match command {
        Commands::Serve { .. } => cmd_serve(config).await?,
        Commands::Predict { backend, image, .. } => cmd_predict(&config, backend, &image)?,
        Commands::Info { .. } => cmd_info(&config)?,
    }

    Ok(())
}
