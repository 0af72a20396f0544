// End-to-end coverage of the scan -> dedup -> resolve -> persist pipeline
// against a mock node.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;

use ethex::core::records::BlockAssociation;
use ethex::core::resolve::{ResolveError, resolve};
use ethex::core::scan::{ScanError, ScanStatus, scan, scan_from};
use ethex::core::store::ChainStore;
use ethex::test_utils::{ChainBuilder, MockEthNode, scratch_store};

#[test]
fn scan_links_parent_chain_and_leaves_boundary_empty() {
    let mut node = MockEthNode::new();
    let chain = ChainBuilder::starting_at(100).add_blocks(10).build();
    node.set_chain(chain.clone());

    let (_dir, store) = scratch_store();
    let result = scan(&node, &store, 100, 110, 4).unwrap();

    // Exactly one record per distinct hash, one per height.
    assert_eq!(result.block_count(), 11);
    assert_eq!(result.associations().len(), 11);

    let graph = resolve(&result).unwrap();
    assert_eq!(graph.len(), 11);

    for record in &chain {
        let linked = graph.block(&record.hash).expect("block resolved");
        if record.number == 100 {
            // Parent at height 99 is outside the scanned range.
            assert!(linked.parent.is_none());
        } else {
            let parent = linked.parent.as_ref().expect("parent attached");
            assert_eq!(parent.record.hash, record.parent_hash);
            assert_eq!(parent.record.number, record.number - 1);
        }
    }

    let terminal = graph.terminal().expect("terminal block");
    assert_eq!(terminal.record.number, 110);
}

#[test]
fn uncle_within_range_resolves_to_full_record() {
    // Block 101 names the block scanned at height 100 as an uncle.
    let builder = ChainBuilder::starting_at(100);
    let uncle_hash = builder.tip_hash();
    let chain = builder
        .add_block_with(Vec::new(), vec![uncle_hash])
        .add_block_with(Vec::new(), vec![ChainBuilder::tx_hash("uncle-below-range")])
        .build();

    let mut node = MockEthNode::new();
    node.set_chain(chain.clone());

    let (_dir, store) = scratch_store();
    let result = scan(&node, &store, 100, 102, 2).unwrap();
    let graph = resolve(&result).unwrap();

    let nephew = graph.block(&chain[1].hash).unwrap();
    assert_eq!(nephew.uncles.len(), 1);
    // Full record, not a stub: all metadata fields came along.
    assert_eq!(nephew.uncles[0].as_ref(), &chain[0]);

    // An uncle hash pointing outside the range is silently skipped.
    let other = graph.block(&chain[2].hash).unwrap();
    assert!(other.uncles.is_empty());
}

#[test]
fn shared_transaction_resolves_to_one_record_by_identity() {
    let shared = ChainBuilder::tx_hash("shared");
    let chain = ChainBuilder::starting_at(100)
        .add_block_with(vec![shared], Vec::new())
        .add_block_with(vec![shared, ChainBuilder::tx_hash("solo")], Vec::new())
        .build();

    let mut node = MockEthNode::new();
    node.set_chain(chain.clone());

    let (_dir, store) = scratch_store();
    let result = scan(&node, &store, 100, 102, 4).unwrap();

    // One record for the shared hash, however many times it was referenced.
    assert_eq!(result.transaction_count(), 2);

    let graph = resolve(&result).unwrap();
    let first = graph.block(&chain[1].hash).unwrap();
    let second = graph.block(&chain[2].hash).unwrap();

    assert_eq!(first.transactions.len(), 1);
    assert_eq!(second.transactions.len(), 2);
    assert!(Arc::ptr_eq(&first.transactions[0], &second.transactions[0]));
    assert!(!first.transactions[0].is_stub());
    // Inclusion order survives resolution.
    assert_eq!(second.transactions[0].hash, shared);
    assert_eq!(second.transactions[1].hash, ChainBuilder::tx_hash("solo"));
}

#[test]
fn rescanning_the_same_range_is_deterministic() {
    let mut node = MockEthNode::new();
    let chain = ChainBuilder::starting_at(100)
        .add_block_with(vec![ChainBuilder::tx_hash("a")], Vec::new())
        .add_blocks(3)
        .build();
    node.set_chain(chain);

    let (_dir_a, store_a) = scratch_store();
    let (_dir_b, store_b) = scratch_store();

    let first = resolve(&scan(&node, &store_a, 100, 104, 3).unwrap()).unwrap();
    let second = resolve(&scan(&node, &store_b, 100, 104, 1).unwrap()).unwrap();

    assert_eq!(projection(&first), projection(&second));
}

/// Order-independent fingerprint of a resolved graph.
fn projection(
    graph: &ethex::core::resolve::ChainGraph,
) -> Vec<(u64, B256, Option<B256>, Vec<B256>, Vec<B256>)> {
    let mut rows: Vec<_> = graph
        .blocks()
        .map(|node| {
            (
                node.record.number,
                node.record.hash,
                node.parent.as_ref().map(|p| p.record.hash),
                node.uncles.iter().map(|u| u.hash).collect::<Vec<_>>(),
                node.transactions.iter().map(|t| t.hash).collect::<Vec<_>>(),
            )
        })
        .collect();
    rows.sort_by_key(|row| row.0);
    rows
}

#[test]
fn parallel_scan_with_latency_creates_single_records() {
    let shared = ChainBuilder::tx_hash("hot");
    let mut builder = ChainBuilder::starting_at(100);
    for _ in 0..16 {
        builder = builder.add_block_with(vec![shared], Vec::new());
    }
    let chain = builder.build();

    let mut node = MockEthNode::new();
    node.set_chain(chain.clone());
    let node = node.with_latency(Duration::from_millis(3));

    let (_dir, store) = scratch_store();
    let result = scan(&node, &store, 100, 116, 8).unwrap();

    assert_eq!(result.block_count(), 17);
    assert_eq!(result.transaction_count(), 1);
    for record in &chain {
        // Every height claimed exactly once despite 8 racing workers.
        assert_eq!(node.block_fetches(record.number), 1);
    }

    let graph = resolve(&result).unwrap();
    let mut iter = chain.iter().skip(1);
    let first = graph.block(&iter.next().unwrap().hash).unwrap();
    for record in iter {
        let other = graph.block(&record.hash).unwrap();
        assert!(Arc::ptr_eq(&first.transactions[0], &other.transactions[0]));
    }
}

#[test]
fn fetch_failure_aborts_the_whole_scan() {
    let mut node = MockEthNode::new();
    node.set_chain(ChainBuilder::starting_at(100).add_blocks(10).build());
    node.fail_at_height(105);

    let (_dir, store) = scratch_store();
    let err = scan_from(&node, &store, 100, 2).unwrap_err();
    let scan_err = err.downcast_ref::<ScanError>().expect("typed scan error");
    assert!(matches!(scan_err, ScanError::Fetch { height: 105, .. }));

    // No partial commit: the durable store stays untouched.
    for height in 100..=110 {
        assert!(!store.has_block_at_height(height).unwrap());
    }
}

#[test]
fn preconditions_skip_the_scan() {
    let mut node = MockEthNode::new();
    node.set_chain(ChainBuilder::starting_at(100).add_blocks(5).build());

    let (_dir, store) = scratch_store();

    assert!(matches!(
        scan_from(&node, &store, 0, 1).unwrap(),
        ScanStatus::StartUnset { tip: 105 }
    ));
    assert!(matches!(
        scan_from(&node, &store, 105, 1).unwrap(),
        ScanStatus::StartNotBelowTip { start: 105, tip: 105 }
    ));
    assert!(matches!(
        scan_from(&node, &store, 200, 1).unwrap(),
        ScanStatus::StartNotBelowTip { start: 200, tip: 105 }
    ));

    // A completed scan flips the "already scanned" check for the same tip.
    assert!(matches!(scan_from(&node, &store, 100, 2).unwrap(), ScanStatus::Completed { .. }));
    assert!(matches!(
        scan_from(&node, &store, 100, 2).unwrap(),
        ScanStatus::AlreadyScanned { tip: 105 }
    ));
}

#[test]
fn completed_scan_persists_the_terminal_cascade() {
    let shared = ChainBuilder::tx_hash("p0");
    let chain = ChainBuilder::starting_at(100)
        .add_block_with(vec![shared], Vec::new())
        .add_blocks(2)
        .build();

    let mut node = MockEthNode::new();
    node.set_chain(chain.clone());

    let (_dir, store) = scratch_store();
    let status = scan_from(&node, &store, 100, 2).unwrap();
    let ScanStatus::Completed { from, to, blocks, persisted, .. } = status else {
        panic!("expected completed scan, got {status:?}");
    };
    assert_eq!((from, to), (100, 103));
    assert_eq!(blocks, 4);
    assert_eq!(persisted.blocks, 4);
    assert_eq!(persisted.transactions, 1);

    for record in &chain {
        assert!(store.has_block_at_height(record.number).unwrap());
        assert_eq!(store.block_by_hash(&record.hash).unwrap().as_ref(), Some(record));
    }
    assert_eq!(store.transaction_owner(&shared).unwrap(), Some(chain[1].hash));
}

#[test]
fn persisted_blocks_are_reused_not_refetched() {
    let chain = ChainBuilder::starting_at(100).add_blocks(4).build();

    let mut node = MockEthNode::new();
    node.set_chain(chain[..3].to_vec());
    let (_dir, store) = scratch_store();

    // First pass persists heights 100..=102.
    assert!(matches!(scan_from(&node, &store, 100, 2).unwrap(), ScanStatus::Completed { .. }));

    // Chain grows by two blocks; a fresh node tracks fetch counts.
    let mut later = MockEthNode::new();
    later.set_chain(chain.clone());

    let status = scan_from(&later, &store, 100, 2).unwrap();
    let ScanStatus::Completed { blocks, .. } = status else {
        panic!("expected completed scan, got {status:?}");
    };
    assert_eq!(blocks, 5);

    // Heights already in the durable store were answered by the existence
    // check, not the node.
    for height in 100..=102 {
        assert_eq!(later.block_fetches(height), 0);
    }
    assert_eq!(later.block_fetches(103), 1);
    assert_eq!(later.block_fetches(104), 1);

    // The new blocks persisted and link back through the reused ones.
    assert!(store.has_block_at_height(104).unwrap());
    assert_eq!(
        store.block_by_hash(&chain[3].hash).unwrap().map(|b| b.parent_hash),
        Some(chain[2].hash)
    );
}

#[test]
fn association_for_unknown_block_is_a_resolution_error() {
    // Out-of-range references are skipped, but an association whose own
    // block is missing from the store is a bug, not boundary behavior.
    let mut chain = ChainStore::new();
    chain.push_association(BlockAssociation {
        block_hash: ChainBuilder::tx_hash("ghost"),
        parent_hash: B256::ZERO,
        uncle_hashes: Vec::new(),
        transaction_hashes: Vec::new(),
    });

    let err = resolve(&chain).unwrap_err();
    assert!(matches!(err, ResolveError::UnknownBlock { .. }));
}

#[test]
fn reused_transactions_come_back_as_stubs() {
    let shared = ChainBuilder::tx_hash("seen");
    let chain = ChainBuilder::starting_at(100)
        .add_block_with(vec![shared], Vec::new())
        .add_blocks(1)
        .build();

    let mut node = MockEthNode::new();
    node.set_chain(chain[..2].to_vec());
    let (_dir, store) = scratch_store();
    assert!(matches!(scan_from(&node, &store, 100, 1).unwrap(), ScanStatus::Completed { .. }));

    // Re-scan a taller chain that repeats the persisted transaction.
    let mut later = MockEthNode::new();
    later.set_chain(chain.clone());
    let taller = ChainBuilder::starting_at(100)
        .add_block_with(vec![shared], Vec::new())
        .add_blocks(1)
        .add_block_with(vec![shared], Vec::new())
        .build();
    later.add_block(taller[3].clone());

    let result = scan(&later, &store, 100, 103, 2).unwrap();
    let record = result.transaction(&shared).expect("transaction present");
    assert!(record.is_stub());
    assert_eq!(later.transaction_fetches(&shared), 0);
}
