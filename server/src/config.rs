//! Configuration: a single TOML file loaded into a `ServerConfig`,
//! write-defaults-if-absent so the binary can boot from a bare directory.
//! The schema is richer than a single-directory sync client would need,
//! since this binary fronts many storage classes and tenants at once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerSettings {
    pub algorithm: String,
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
    pub hash_algorithm: String,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            algorithm: "fastcdc".to_string(),
            min_size: 8 * 1024,
            avg_size: 32 * 1024,
            max_size: 128 * 1024,
            hash_algorithm: "sha256".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSettings {
    pub enabled: bool,
    pub absolute_min: u64,
    pub absolute_max: u64,
    pub initial_size: u64,
    pub target_seconds: f64,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            absolute_min: 64 * 1024,
            absolute_max: 128 * 1024 * 1024,
            initial_size: 8 * 1024 * 1024,
            target_seconds: 8.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub size: usize,
    pub timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self { size: 1024 * 1024, timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub chunk_timeout_secs: u64,
    pub max_retries: u32,
    pub reduce_on_timeout: f64,
    pub reduce_on_failure: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            chunk_timeout_secs: 30,
            max_retries: 3,
            reduce_on_timeout: 0.5,
            reduce_on_failure: 0.5,
        }
    }
}

/// One registered storage class (`storage.classes.{name}`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageClassConfig {
    /// `"memory"` / `"local"` / `"s3"` — which `object_store` backend to
    /// build. `"memory"` and `"local"` exist so this binary can boot and be
    /// exercised without live cloud credentials; `"s3"` is the production path.
    #[serde(rename = "type")]
    pub backend_type: String,
    pub tier: object_backend::Tier,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub use_path_style: bool,
    pub failover_class: Option<String>,
    /// Local-disk root, only meaningful for `backend_type = "local"`.
    pub local_root: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RegionClassConfig {
    pub hot: Option<String>,
    pub cold: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    pub default_class: String,
    pub classes: HashMap<String, StorageClassConfig>,
    pub endpoint_regions: HashMap<String, String>,
    pub region_classes: HashMap<String, RegionClassConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// `"memory"` or `"database"` (: both are interchangeable).
    pub backend: String,
    pub upload_ttl_secs: u64,
    pub download_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            upload_ttl_secs: 3600,
            download_ttl_secs: 24 * 3600,
            sweep_interval_secs: token_store::DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpillSettings {
    pub threshold_bytes: u64,
    pub temp_dir: String,
    pub temp_prefix: String,
}

impl Default for SpillSettings {
    fn default() -> Self {
        Self {
            threshold_bytes: 16 * 1024 * 1024,
            temp_dir: std::env::temp_dir().to_string_lossy().to_string(),
            temp_prefix: "seafhttp-spill-".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// `sqlx::Any`-compatible connection string for the metadata store
    /// Defaults to an in-process sqlite so the binary boots
    /// without any external database for local exercising.
    pub database_url: String,
    pub chunker: ChunkerSettings,
    pub adaptive: AdaptiveSettings,
    pub probe: ProbeSettings,
    pub retry: RetrySettings,
    pub storage: StorageSettings,
    pub token: TokenSettings,
    pub spill: SpillSettings,
    pub health_check_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut classes = HashMap::new();
        classes.insert(
            "hot-default".to_string(),
            StorageClassConfig {
                backend_type: "memory".to_string(),
                tier: object_backend::Tier::Hot,
                endpoint: None,
                bucket: None,
                region: None,
                access_key: None,
                secret_key: None,
                use_path_style: false,
                failover_class: None,
                local_root: None,
            },
        );
        Self {
            bind_addr: "0.0.0.0:8082".to_string(),
            database_url: "sqlite::memory:".to_string(),
            chunker: ChunkerSettings::default(),
            adaptive: AdaptiveSettings::default(),
            probe: ProbeSettings::default(),
            retry: RetrySettings::default(),
            storage: StorageSettings {
                default_class: "hot-default".to_string(),
                classes,
                endpoint_regions: HashMap::new(),
                region_classes: HashMap::new(),
            },
            token: TokenSettings::default(),
            spill: SpillSettings::default(),
            health_check_interval_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Reads `path`; if it doesn't exist, writes the defaults there first
    /// so a fresh deployment has something to edit.
    pub fn load_or_init(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, toml::to_string_pretty(&config)?)?;
            return Ok(config);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}
