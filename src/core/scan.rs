use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::Instant;

use alloy_primitives::B256;
use anyhow::{Context, Result, anyhow};

use crate::eth_rpc::EthNode;
use crate::storage::{BlockStore, PersistStats};
use crate::utils::fmt_duration;

use super::fetch::{BlockFetcher, HeightFetch};
use super::resolve::resolve;
use super::store::ChainStore;

/// Log a progress line every this many applied heights.
const PROGRESS_EVERY: u64 = 500;

/// Typed failure reason for a scan. Fetch failures carry the height so the
/// abort policy can change without touching the workers.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("empty scan range: from {from} must be below to {to}")]
    EmptyRange { from: u64, to: u64 },
    #[error("fetch failed at height {height}")]
    Fetch {
        height: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("duplicate block hash {hash} in scanned range")]
    DuplicateHash { hash: B256 },
    #[error("two blocks claim height {height}: {first} and {second}")]
    DuplicateHeight { height: u64, first: B256, second: B256 },
    #[error("scan applied {applied} of {expected} heights")]
    Incomplete { applied: u64, expected: u64 },
}

/// Outcome of a caller-level scan request, including the precondition skips.
#[derive(Debug)]
pub enum ScanStatus {
    /// No start height configured; nothing attempted.
    StartUnset { tip: u64 },
    /// The start height must sit strictly below the chain tip.
    StartNotBelowTip { start: u64, tip: u64 },
    /// The terminal block is already present in the durable store.
    AlreadyScanned { tip: u64 },
    Completed {
        from: u64,
        to: u64,
        blocks: usize,
        transactions: usize,
        persisted: PersistStats,
    },
}

struct HeightResult {
    height: u64,
    outcome: Result<HeightFetch>,
}

/// Fan out fetches over `from..=to` (inclusive, `from < to`) with at most
/// `parallelism` in-flight heights (0 = CPU count) and collect the results
/// into a fresh dedup store.
///
/// Workers claim heights off a shared counter and block on network I/O;
/// results are applied in arrival order, which is explicitly unordered. The
/// first fetch or integrity error flips the cancellation flag so the
/// remaining workers stop claiming, the channel drains, and the error is
/// returned with nothing committed anywhere.
pub fn scan(
    node: &dyn EthNode,
    store: &BlockStore,
    from: u64,
    to: u64,
    parallelism: usize,
) -> Result<ChainStore, ScanError> {
    if from >= to {
        return Err(ScanError::EmptyRange { from, to });
    }

    let span = to - from + 1;
    let workers = if parallelism == 0 { num_cpus::get() } else { parallelism };
    let workers = workers.max(1).min(span as usize);

    let next = AtomicU64::new(from);
    let cancelled = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<HeightResult>();

    let started = Instant::now();
    eprintln!("[scan] scanning heights {from}..={to} with {workers} workers");

    let mut chain = ChainStore::new();
    let mut first_error: Option<ScanError> = None;
    let mut applied: u64 = 0;

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            let cancelled = &cancelled;
            scope.spawn(move || {
                let fetcher = BlockFetcher::new(node, store);
                loop {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    let height = next.fetch_add(1, Ordering::Relaxed);
                    if height > to {
                        break;
                    }
                    let outcome = fetcher.fetch_height(height);
                    if outcome.is_err() {
                        cancelled.store(true, Ordering::Relaxed);
                    }
                    if tx.send(HeightResult { height, outcome }).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        // Single owner of the dedup store: one applied result at a time, so
        // once any two workers have completed, every hash either touched is
        // visible to both.
        for result in rx {
            match result.outcome {
                Ok(fetch) => {
                    if first_error.is_some() {
                        continue;
                    }
                    if let Err(e) = apply(&mut chain, result.height, fetch, to) {
                        cancelled.store(true, Ordering::Relaxed);
                        first_error = Some(e);
                        continue;
                    }
                    applied += 1;
                    if applied % PROGRESS_EVERY == 0 {
                        eprintln!("[scan] {applied}/{span} heights applied");
                    }
                }
                Err(source) => {
                    if first_error.is_none() {
                        first_error = Some(ScanError::Fetch { height: result.height, source });
                    }
                }
            }
        }
    });

    if let Some(e) = first_error {
        return Err(e);
    }
    if applied != span {
        return Err(ScanError::Incomplete { applied, expected: span });
    }

    eprintln!(
        "[scan] fetched {} blocks / {} transactions in {}",
        chain.block_count(),
        chain.transaction_count(),
        fmt_duration(started.elapsed())
    );
    Ok(chain)
}

fn apply(chain: &mut ChainStore, height: u64, fetch: HeightFetch, to: u64) -> Result<(), ScanError> {
    let HeightFetch { block, association, transactions } = fetch;
    for record in transactions {
        chain.insert_transaction(record);
    }
    let block = chain.insert_block(block)?;
    if let Some(association) = association {
        chain.push_association(association);
    }
    if height == to {
        chain.set_terminal(block.hash);
    }
    Ok(())
}

/// Caller-level entry: resolve the chain tip, run the precondition checks,
/// then scan, link and persist the terminal block's subgraph.
///
/// Preconditions reported (not errors): no start height configured, start at
/// or above the tip, or the target range already scanned.
pub fn scan_from(
    node: &dyn EthNode,
    store: &BlockStore,
    start: u64,
    parallelism: usize,
) -> Result<ScanStatus> {
    let tip = node.block_number().context("query latest block number")?;

    if start == 0 {
        eprintln!("[scan] latest block number is {tip}");
        eprintln!("[scan] pass --start <height> to choose where scanning begins");
        return Ok(ScanStatus::StartUnset { tip });
    }
    if start >= tip {
        eprintln!("[scan] latest block number is {tip}; start must be lower");
        return Ok(ScanStatus::StartNotBelowTip { start, tip });
    }
    if store.has_block_at_height(tip).context("check scanned state")? {
        eprintln!("[scan] latest block {tip} already scanned");
        return Ok(ScanStatus::AlreadyScanned { tip });
    }

    let chain = scan(node, store, start, tip, parallelism)?;
    let graph = resolve(&chain)?;
    let terminal =
        graph.terminal().ok_or_else(|| anyhow!("scan finished without a terminal block"))?;

    eprintln!("[scan] total {} blocks associated, persisting...", chain.associations().len());
    let persisted = store.persist_graph(&terminal)?;
    eprintln!(
        "[scan] persist done: {} blocks, {} transactions, {} uncles",
        persisted.blocks, persisted.transactions, persisted.uncles
    );

    Ok(ScanStatus::Completed {
        from: start,
        to: tip,
        blocks: chain.block_count(),
        transactions: chain.transaction_count(),
        persisted,
    })
}
