mod commands;
mod opts;
mod stats;

use anyhow::Result;
use opts::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let args = opts::parse_args();

    tracing_subscriber::fmt::init();

    match args.command {
        Command::Scenario(c) => commands::scenario::handle(c).await,
        Command::Instance(c) => commands::instance::handle(c).await,
    }
}
