use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use rocksdb::{DB, Options};
use serde::Deserialize;

use crate::cache::ReadCache;
use crate::eth_rpc::{EthNode, HttpEthClient};

static CONFIG: OnceLock<AppConfig> = OnceLock::new();
static ETH_NODE: OnceLock<Arc<dyn EthNode>> = OnceLock::new();
static ETHEX_DB: OnceLock<Arc<DB>> = OnceLock::new();
static READ_CACHE: OnceLock<ReadCache> = OnceLock::new();

fn default_db_path() -> String {
    "./db".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cache_capacity() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub eth_rpc_url: String,
    #[serde(default)]
    pub eth_rpc_user: String,
    #[serde(default)]
    pub eth_rpc_pass: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub start_height: u64,
    #[serde(default)]
    pub parallelism: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub eth_rpc_url: String,
    pub eth_rpc_user: String,
    pub eth_rpc_pass: String,
    pub db_path: String,
    pub port: u16,
    pub cache_capacity: usize,
    /// Height the scan starts from; 0 means "skip the scan".
    pub start_height: u64,
    /// Upper bound on concurrently in-flight block fetches; 0 = CPU count.
    pub parallelism: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Path to JSON config file.
    #[arg(long, default_value = "./config.json")]
    pub config_path: String,

    /// Block height the scan starts from (overrides the config file).
    #[arg(long)]
    pub start: Option<u64>,

    /// Number of parallel block fetches (overrides the config file).
    #[arg(long)]
    pub parallelism: Option<usize>,
}

fn load_config_file(path: &str) -> Result<ConfigFile> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read config file: {path}"))?;
    serde_json::from_str(&raw).context("failed to parse config JSON")
}

impl AppConfig {
    fn from_file(file: ConfigFile, cli: &CliArgs) -> Self {
        Self {
            eth_rpc_url: file.eth_rpc_url,
            eth_rpc_user: file.eth_rpc_user,
            eth_rpc_pass: file.eth_rpc_pass,
            db_path: file.db_path,
            port: file.port,
            cache_capacity: file.cache_capacity,
            start_height: cli.start.unwrap_or(file.start_height),
            parallelism: cli.parallelism.unwrap_or(file.parallelism),
        }
    }
}

pub fn init_config() -> Result<()> {
    let cli = CliArgs::parse();
    let file = load_config_file(&cli.config_path)?;
    init_config_from(AppConfig::from_file(file, &cli))
}

pub fn init_config_from(cfg: AppConfig) -> Result<()> {
    // --- validations ---
    if cfg.eth_rpc_url.trim().is_empty() {
        anyhow::bail!("eth_rpc_url must be provided");
    }

    let db_root = Path::new(&cfg.db_path);
    if !db_root.exists() {
        fs::create_dir_all(db_root)
            .with_context(|| format!("failed to create db_path {}", cfg.db_path))?;
    } else if !db_root.is_dir() {
        anyhow::bail!("db_path is not a directory: {}", cfg.db_path);
    }

    // --- init node client once ---
    let auth = if !cfg.eth_rpc_user.is_empty() && !cfg.eth_rpc_pass.is_empty() {
        Some((cfg.eth_rpc_user.clone(), cfg.eth_rpc_pass.clone()))
    } else {
        None
    };
    let node = HttpEthClient::new(&cfg.eth_rpc_url, auth)?;

    // --- init RocksDB once ---
    let mut opts = Options::default();
    opts.create_if_missing(true);
    let db = Arc::new(DB::open(&opts, db_root.join("chain"))?);

    install(cfg, Arc::new(node), db)
}

/// Shared by startup and the test harness, which swaps in a mock node and a
/// scratch database.
pub(crate) fn install(cfg: AppConfig, node: Arc<dyn EthNode>, db: Arc<DB>) -> Result<()> {
    READ_CACHE
        .set(ReadCache::new(cfg.cache_capacity))
        .map_err(|_| anyhow::anyhow!("read cache already initialized"))?;
    CONFIG.set(cfg).map_err(|_| anyhow::anyhow!("config already initialized"))?;
    ETH_NODE.set(node).map_err(|_| anyhow::anyhow!("eth node client already initialized"))?;
    ETHEX_DB.set(db).map_err(|_| anyhow::anyhow!("chain DB already initialized"))?;
    Ok(())
}

pub fn get_config() -> &'static AppConfig {
    CONFIG.get().expect("init_config() must be called once at startup")
}

pub fn get_eth_node() -> Arc<dyn EthNode> {
    ETH_NODE.get().expect("init_config() must be called once at startup").clone()
}

/// Cloneable handle to the global RocksDB.
pub fn get_ethex_db() -> Arc<DB> {
    Arc::clone(ETHEX_DB.get().expect("init_config() must be called once at startup"))
}

pub fn get_read_cache() -> &'static ReadCache {
    READ_CACHE.get().expect("init_config() must be called once at startup")
}
