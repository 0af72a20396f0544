use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::B256;

use super::records::{BlockAssociation, BlockRecord, TransactionRecord};
use super::store::ChainStore;

/// A block with its relationships wired to the records in the dedup store.
#[derive(Debug)]
pub struct LinkedBlock {
    pub record: Arc<BlockRecord>,
    pub parent: Option<Arc<LinkedBlock>>,
    /// Full uncle records, in the order their hashes appeared.
    pub uncles: Vec<Arc<BlockRecord>>,
    /// Shared transaction records, in inclusion order.
    pub transactions: Vec<Arc<TransactionRecord>>,
}

/// Fully resolved scan output; `terminal` is the upper-bound block, the root
/// of the subgraph handed to persistence.
#[derive(Debug)]
pub struct ChainGraph {
    blocks: HashMap<B256, Arc<LinkedBlock>>,
    terminal: Option<Arc<LinkedBlock>>,
}

impl ChainGraph {
    pub fn block(&self, hash: &B256) -> Option<&Arc<LinkedBlock>> {
        self.blocks.get(hash)
    }

    pub fn terminal(&self) -> Option<Arc<LinkedBlock>> {
        self.terminal.clone()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Arc<LinkedBlock>> {
        self.blocks.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// An association names a block the scan never stored. Distinct from the
    /// boundary case: hashes pointing outside the scanned range are skipped,
    /// a missing in-range block is a bug.
    #[error("association references block {hash} missing from the scan store")]
    UnknownBlock { hash: B256 },
}

/// Wire parent/uncle/transaction references after the fetch barrier.
///
/// Every stored block gets a node, association or not, so children of an
/// already-persisted block can still attach it. Nodes are built lowest height
/// first, which guarantees a parent node exists before any child links to it
/// regardless of the order associations were accumulated in; that also makes
/// resolution deterministic for a given store. Hashes absent from the store
/// refer to entities outside the scanned range and are skipped — the parent
/// pointer of the lowest in-range block stays empty.
pub fn resolve(chain: &ChainStore) -> Result<ChainGraph, ResolveError> {
    let mut by_block: HashMap<B256, &BlockAssociation> = HashMap::new();
    for association in chain.associations() {
        if chain.block(&association.block_hash).is_none() {
            return Err(ResolveError::UnknownBlock { hash: association.block_hash });
        }
        by_block.insert(association.block_hash, association);
    }

    let mut ordered: Vec<&Arc<BlockRecord>> = chain.blocks().collect();
    ordered.sort_by_key(|block| block.number);

    let mut blocks: HashMap<B256, Arc<LinkedBlock>> = HashMap::with_capacity(ordered.len());
    for record in ordered {
        let mut parent = None;
        let mut uncles = Vec::new();
        let mut transactions = Vec::new();

        if let Some(association) = by_block.get(&record.hash) {
            parent = blocks.get(&association.parent_hash).cloned();
            for uncle_hash in &association.uncle_hashes {
                if let Some(uncle) = chain.block(uncle_hash) {
                    uncles.push(uncle.clone());
                }
            }
            for tx_hash in &association.transaction_hashes {
                if let Some(tx) = chain.transaction(tx_hash) {
                    transactions.push(tx.clone());
                }
            }
        }

        let node = Arc::new(LinkedBlock { record: record.clone(), parent, uncles, transactions });
        blocks.insert(node.record.hash, node);
    }

    let terminal = chain.terminal().and_then(|hash| blocks.get(&hash).cloned());
    Ok(ChainGraph { blocks, terminal })
}
