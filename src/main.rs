use std::net::SocketAddr;

use anyhow::Result;

use ethex::api::run_api;
use ethex::config::{get_config, get_eth_node, get_ethex_db, init_config};
use ethex::core::scan::scan_from;
use ethex::storage::BlockStore;

#[tokio::main]
async fn main() -> Result<()> {
    init_config()?;
    let cfg = get_config().clone();

    // Chain id sanity check; the blocking client must stay off runtime threads.
    match tokio::task::spawn_blocking(|| get_eth_node().chain_id()).await? {
        Ok(id) => eprintln!("[main] connected to chain id {id}"),
        Err(e) => eprintln!("[main] chain id lookup failed: {e:?}"),
    }

    let scan_handle = std::thread::spawn(move || {
        let node = get_eth_node();
        let store = BlockStore::new(get_ethex_db());
        if let Err(e) = scan_from(node.as_ref(), &store, cfg.start_height, cfg.parallelism) {
            eprintln!("[scan] aborted: {e:?}");
        }
    });
    std::thread::spawn(move || {
        if let Err(err) = scan_handle.join() {
            eprintln!("[scan] thread panicked: {err:?}");
            std::process::abort();
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], get_config().port));
    eprintln!("[api] listening on {addr}");
    run_api(addr).await
}
