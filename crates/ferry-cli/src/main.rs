//! CLI entry point - the composition root.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ferry_cli::handlers::{self, upload::UploadArgs};
use ferry_cli::{Cli, CliError, Commands, config};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::resolve(cli.config.as_deref(), &cli.queue.to_settings())?;
    tracing::debug!(?config, "Queue configuration");

    match cli.command {
        Commands::Upload {
            files,
            endpoint,
            json,
        } => {
            let args = UploadArgs {
                files,
                endpoint,
                json,
            };
            handlers::upload::execute(config, args).await?;
        }
        Commands::Check { files } => {
            handlers::check::execute(&config, &files).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads FERRY_*
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        eprintln!("Error: {err:#}");
        std::process::exit(code);
    }
}
