mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let code = cli::app::run(cli).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
