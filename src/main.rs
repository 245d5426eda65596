use clap::Parser;
use gemscout::cli::{self, Cli};
use tracing::error;

mod main_runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli::load_config(&cli)?;
    main_runtime::init_logging(&config.logging);

    if let Err(e) = cli::run(cli, config).await {
        error!(error = %e, "command failed");
        return Err(e);
    }
    Ok(())
}
