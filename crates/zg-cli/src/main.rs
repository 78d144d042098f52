//! zg - install software from signed feeds

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zg_cli::{Cli, Commands, FeedCommands, cmd, load_config};
use zg_core::Action;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise warnings only, or debug with -v.
    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }

    let config = load_config(cli.timeout)?;
    match cli.command {
        Commands::Install {
            feed_url,
            no_verify,
            no_cache,
        } => cmd::install::install(config, &feed_url, no_verify, no_cache),
        Commands::Uninstall { feed_url } => cmd::action::run(config, &feed_url, Action::Uninstall),
        Commands::Run { feed_url } => cmd::action::run(config, &feed_url, Action::Run),
        Commands::Feed { command } => match command {
            FeedCommands::Import { feed_url } => cmd::feed::import(&config, &feed_url),
            FeedCommands::List => cmd::feed::list(&config),
            FeedCommands::Remove { feed_url } => cmd::feed::remove(&config, &feed_url),
        },
        Commands::Completions { .. } => Ok(()),
    }
}
