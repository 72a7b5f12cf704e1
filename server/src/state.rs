use chunker::{AdaptiveSizer, ChunkerConfig};
use std::sync::Arc;
use store::MetadataStore;
use storage_manager::StorageManager;
use sync_protocol::SyncProtocolEngine;
use token_store::TokenStore;

use crate::config::ServerConfig;

/// Everything a route handler needs, shared behind `Arc`s: the process-wide
/// singletons (storage manager, token store, chunker config) live here once
/// and every request handle clones a cheap reference to them.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<MetadataStore>,
    pub storage: Arc<StorageManager>,
    pub tokens: Arc<dyn TokenStore>,
    pub engine: Arc<SyncProtocolEngine>,
    pub fs_graph: Arc<fs_graph::FsGraphEngine>,
    pub translator: Arc<id_translator::IdTranslator>,
    pub chunker_config: ChunkerConfig,
    pub adaptive: Arc<AdaptiveSizer>,
    pub spill_dir: camino::Utf8PathBuf,
    pub spill_threshold: u64,
}
