//! The `/seafhttp` HTTP binding for the sync protocol core,
//! plus the REST upload/download surface and the process-wide singletons
//! this binary owns at boot (storage manager, token store, chunker config) —
//! previously this entry point only ran a file-watching loop against a
//! single local directory; now it serves requests instead.

mod config;
mod error;
mod extract;
mod routes;
mod state;

#[cfg(test)]
mod tests;

use camino::Utf8PathBuf;
use chunker::{AdaptiveSizer, ChunkerConfig};
use object_backend::{ObjectBackend, S3Backend, Tier};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use store::MetadataStore;
use storage_manager::StorageManager;
use sync_protocol::SyncProtocolEngine;
use token_store::{DbTokenStore, InMemoryTokenStore, TokenStore};

use crate::config::{ServerConfig, StorageClassConfig};
use crate::state::AppState;

fn build_backend(name: &str, cfg: &StorageClassConfig, spill_dir: &Utf8PathBuf) -> anyhow::Result<Arc<dyn ObjectBackend>> {
    let store: Arc<dyn ObjectStore> = match cfg.backend_type.as_str() {
        "memory" => Arc::new(InMemory::new()),
        "local" => {
            let root = cfg
                .local_root
                .clone()
                .unwrap_or_else(|| format!("/tmp/seafhttp-local-{name}"));
            std::fs::create_dir_all(&root)?;
            Arc::new(LocalFileSystem::new_with_prefix(&root)?)
        }
        "s3" => {
            let mut builder = AmazonS3Builder::new().with_virtual_hosted_style_request(!cfg.use_path_style);
            if let Some(bucket) = &cfg.bucket {
                builder = builder.with_bucket_name(bucket);
            }
            if let Some(region) = &cfg.region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = &cfg.endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            if let Some(key) = &cfg.access_key {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = &cfg.secret_key {
                builder = builder.with_secret_access_key(secret);
            }
            Arc::new(builder.build()?)
        }
        other => anyhow::bail!("unknown storage backend type {other:?} for class {name}"),
    };
    Ok(Arc::new(S3Backend::new(store, "", cfg.tier, spill_dir.clone())))
}

async fn run_health_loop(storage: Arc<StorageManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        storage.check_all_health().await;
    }
}

async fn run_sweep_loop(tokens: Arc<InMemoryTokenStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let evicted = tokens.sweep_expired().await;
        if evicted > 0 {
            tracing::debug!(evicted, "swept expired tokens");
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining background tasks");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("SEAFHTTP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = ServerConfig::load_or_init(&config_path)?;
    tracing::info!(path = %config_path, "loaded configuration");

    install_default_drivers();
    let pool = AnyPoolOptions::new().max_connections(16).connect(&config.database_url).await?;
    let store = Arc::new(MetadataStore::new(pool).await?);

    let spill_dir = Utf8PathBuf::from(&config.spill.temp_dir);
    std::fs::create_dir_all(&spill_dir)?;

    let storage = Arc::new(StorageManager::new());
    for (name, class_cfg) in &config.storage.classes {
        let backend = build_backend(name, class_cfg, &spill_dir)?;
        storage.register_class(name.clone(), backend, class_cfg.failover_class.clone()).await;
    }
    storage.set_default_class(config.storage.default_class.clone()).await;
    for (hostname, region) in &config.storage.endpoint_regions {
        storage.register_hostname_region(hostname.clone(), region.clone()).await;
    }
    for (region, classes) in &config.storage.region_classes {
        storage.register_region(region.clone(), classes.hot.clone(), classes.cold.clone()).await;
    }
    storage.check_all_health().await;

    let (tokens, in_memory_tokens): (Arc<dyn TokenStore>, Option<Arc<InMemoryTokenStore>>) =
        match config.token.backend.as_str() {
            "database" => (Arc::new(DbTokenStore::new(store.clone())) as Arc<dyn TokenStore>, None),
            _ => {
                let mem = Arc::new(InMemoryTokenStore::new());
                (mem.clone() as Arc<dyn TokenStore>, Some(mem))
            }
        };

    let fs_graph = Arc::new(fs_graph::FsGraphEngine::new(store.clone()));
    let translator = Arc::new(id_translator::IdTranslator::new(store.clone()));
    let engine = Arc::new(SyncProtocolEngine::new(store.clone(), fs_graph.clone(), translator.clone(), storage.clone()));

    let chunker_config = ChunkerConfig::new(config.chunker.min_size, config.chunker.avg_size, config.chunker.max_size)?;
    let adaptive = Arc::new(AdaptiveSizer::new(
        config.adaptive.initial_size,
        config.adaptive.absolute_min,
        config.adaptive.absolute_max,
        config.adaptive.target_seconds,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        storage: storage.clone(),
        tokens,
        engine,
        fs_graph,
        translator,
        chunker_config,
        adaptive,
        spill_dir,
        spill_threshold: config.spill.threshold_bytes,
    };

    tokio::spawn(run_health_loop(storage, Duration::from_secs(config.health_check_interval_secs.max(1))));
    if let Some(mem) = in_memory_tokens {
        tokio::spawn(run_sweep_loop(mem, Duration::from_secs(config.token.sweep_interval_secs.max(1))));
    }

    let app = routes::router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}
