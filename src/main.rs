use batch_relay::config::{RelayConfig, StoreBackend};
use batch_relay::ingest::RelayListener;
use batch_relay::relay::{IdleSweeper, RelayEngine};
use batch_relay::store::{FsStore, InMemoryStore, StoreClient};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RelayConfig::load(Path::new(&path))?,
        None => {
            warn!("no config file given, using defaults");
            RelayConfig::default()
        }
    }
    .with_env_overrides();
    config.validate()?;

    info!(
        "starting relay: threshold={} max_delay={:?} cap={} retry={}x",
        config.flush_threshold,
        config.max_delay,
        config.max_buffered_per_key,
        config.retry.max_attempts
    );

    match config.store.clone() {
        StoreBackend::Memory => {
            warn!("memory store backend selected; flushed batches are not persisted");
            serve(config, Arc::new(InMemoryStore::new())).await
        }
        StoreBackend::Fs { dir } => {
            info!("writing batches under {}", dir.display());
            serve(config, Arc::new(FsStore::new(dir)?)).await
        }
    }
}

async fn serve<C: StoreClient>(
    config: RelayConfig,
    client: Arc<C>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RelayEngine::new(&config, client);

    if let Some(ttl) = config.idle_ttl {
        let sweeper = IdleSweeper::new(engine.clone(), ttl);
        tokio::spawn(sweeper.run());
    }

    let listener = RelayListener::bind(&config.listen_addr, engine.clone()).await?;
    tokio::spawn(listener.serve());

    tokio::signal::ctrl_c().await?;
    info!("shutting down, flushing pending buffers");
    engine.flush_all().await;

    let stats = engine.stats();
    info!(
        "relay stopped: {} submitted, {} batches / {} rows flushed, {} batches dropped",
        stats.submitted, stats.flushed_batches, stats.flushed_rows, stats.dropped_batches
    );
    Ok(())
}
