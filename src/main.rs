use clap::Parser;
use contextual_rag_engine::cli::{self, Cli, Command};
use contextual_rag_engine::infrastructure::logging::init_logging;
use contextual_rag_engine::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    init_logging(&config.logging);

    match cli.command {
        Command::Ask(args) => cli::ask::run(config, args).await,
        Command::Config => cli::show_config::run(&config),
    }
}
