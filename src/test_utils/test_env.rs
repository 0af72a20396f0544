use std::sync::Arc;

use anyhow::Result;
use rocksdb::{DB, Options};
use tempfile::TempDir;

use crate::config::{AppConfig, install};
use crate::eth_rpc::EthNode;
use crate::storage::BlockStore;

/// Scratch durable store in a temp dir. Keep the `TempDir` alive for the
/// duration of the test.
pub fn scratch_store() -> (TempDir, BlockStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let mut opts = Options::default();
    opts.create_if_missing(true);
    let db = DB::open(&opts, dir.path().join("chain")).expect("open scratch DB");
    (dir, BlockStore::new(Arc::new(db)))
}

/// Install config globals with a mock node and a scratch database for API
/// tests. The globals are set-once, so call this once per test process.
pub fn install_test_env(node: Arc<dyn EthNode>, dir: &std::path::Path) -> Result<Arc<DB>> {
    let cfg = AppConfig {
        eth_rpc_url: "http://127.0.0.1:0".to_string(),
        eth_rpc_user: String::new(),
        eth_rpc_pass: String::new(),
        db_path: dir.display().to_string(),
        port: 0,
        cache_capacity: 64,
        start_height: 0,
        parallelism: 0,
    };
    let mut opts = Options::default();
    opts.create_if_missing(true);
    let db = Arc::new(DB::open(&opts, dir.join("chain"))?);
    install(cfg, node, db.clone())?;
    Ok(db)
}
