use anyhow::Result;

mod cli;

use cli::CliApp;

#[tokio::main]
async fn main() -> Result<()> {
    CliApp::run().await
}
