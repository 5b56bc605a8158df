use anyhow::Result;
use autorent::cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    autorent::telemetry::init(cli.verbose, cli.log_json);
    cli.run().await
}
