//! CLI entry point.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bgdl_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads BGDL_STAGING_DIR
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cancel_grace = Duration::try_from_secs_f64(cli.cancel_grace)
        .map_err(|e| CliError::Arguments(format!("--cancel-grace: {e}")))?;
    let config = CliConfig::with_defaults(cli.staging_dir)?.with_cancel_grace(cancel_grace);
    let staging = config.staging_dir.display().to_string();
    let ctx = bootstrap(config)
        .await
        .with_context(|| format!("cannot open staging directory {staging}"))?;

    match cli.command {
        Commands::Fetch(args) => handlers::fetch::execute(&ctx, args).await?,
        Commands::List { json } => handlers::list::execute(&ctx, json).await?,
        Commands::Stop { target } => handlers::stop::execute(&ctx, &target).await?,
    }
    Ok(())
}
