use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use mneme_lib::catalog::StaticCatalog;
use mneme_lib::config::StudyConfig;
use mneme_lib::scheduler::SessionCoordinator;
use mneme_lib::server::{router, AppState};
use mneme_lib::store::{CardStateStore, MemoryStore};

#[derive(Parser)]
#[command(name = "mneme-server", about = "Spaced-repetition study backend", version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7151")]
    listen: SocketAddr,

    /// Scheduling configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for review journals (default: platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("mneme"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StudyConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => StudyConfig::default(),
    };

    let data_dir = cli
        .data_dir
        .or_else(default_data_dir)
        .context("Could not determine a data directory")?;
    let journal_dir = data_dir.join("journals");

    // Card states are a derived cache: rebuild them from the journals,
    // then serve
    let store: Arc<dyn CardStateStore> = Arc::new(
        MemoryStore::load(journal_dir.clone())
            .with_context(|| format!("Failed to load journals from {:?}", journal_dir))?,
    );

    let coordinator = Arc::new(SessionCoordinator::new(Arc::clone(&store), config));
    let app = router(AppState {
        coordinator,
        store,
        catalog: Arc::new(StaticCatalog::new()),
    });

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    log::info!("mneme-server listening on {}", cli.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
