use anyhow::Result;
use clap::Parser;

mod bet_logic;
use bet_logic::{config, runner};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let cli = config::Config::parse();
    runner::run(cli).await
}
