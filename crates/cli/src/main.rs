mod args;
mod logging;
mod run;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::setup_logging();
    let args = args::CliArgs::parse();
    run::run(args).await
}
