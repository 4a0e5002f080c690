mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;

use fedsync_auth::SyncConfig;
use fedsync_directory::{DirectoryStore, FlatFile};
use fedsync_observability::LogConfig;

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    fedsync_observability::init_with(&LogConfig {
        default_filter: cli.log_level.clone(),
        json: false,
    });

    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_json_file(path)?
            .with_overrides(|key| std::env::var(key).ok())?,
        None => SyncConfig::from_env()?,
    };
    if let Some(path) = cli.file {
        config.user_file = path;
    }
    tracing::debug!(file = %config.user_file.display(), "using user file");

    let store = DirectoryStore::with_options(FlatFile::new(config.user_file.clone()), config.store);
    let mut stdout = std::io::stdout().lock();
    commands::run(&store, cli.command, &mut stdout)
        .with_context(|| format!("operating on {}", config.user_file.display()))
}
