use clap::Parser;
use gitvend::{
    cli::args::{CliArgs, Command},
    config::GitvendConfig,
    Gitvend,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();
    let config = GitvendConfig::load()?;

    let mut builder = Gitvend::builder().root(&cli_args.root);
    if let Some(config_file) = cli_args.config_file.or(config.project.file) {
        builder = builder.config_file_name(config_file);
    }
    if let Some(cache_directory) = cli_args.cache_directory.or(config.cache.dir) {
        builder = builder.cache_directory(cache_directory);
    }
    let gitvend = builder.try_build()?;

    match cli_args.cmd.unwrap_or(Command::Sync {
        force: cli_args.force,
    }) {
        Command::Sync { force } => gitvend.sync(force).await,
        Command::Add { url, pick } => {
            let key = gitvend.add(&url, &pick).await?;
            log::info!("Added {}", key);
            Ok(())
        }
        Command::Remove { key } => gitvend.remove(&key),
        Command::Update { key } => gitvend.update(key.as_deref()).await,
        Command::Init => gitvend.init(),
        Command::ClearCache => gitvend.clear_cache(),
    }
}
