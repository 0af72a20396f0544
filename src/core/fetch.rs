use alloy_primitives::B256;
use anyhow::{Context, Result};

use crate::eth_rpc::EthNode;
use crate::storage::BlockStore;

use super::records::{BlockAssociation, BlockRecord, TransactionRecord, TxDetail};

/// Everything one height contributes to the dedup store. `association` is
/// empty when the block was already persisted and needs no further linking.
#[derive(Debug)]
pub struct HeightFetch {
    pub block: BlockRecord,
    pub association: Option<BlockAssociation>,
    pub transactions: Vec<TransactionRecord>,
}

/// Fetches one height: durable store first, then the node. Pure
/// request/response against the borrowed collaborators, so each scan worker
/// owns one.
pub struct BlockFetcher<'a> {
    node: &'a dyn EthNode,
    store: &'a BlockStore,
}

impl<'a> BlockFetcher<'a> {
    pub fn new(node: &'a dyn EthNode, store: &'a BlockStore) -> Self {
        Self { node, store }
    }

    pub fn fetch_height(&self, height: u64) -> Result<HeightFetch> {
        // Already persisted: reuse the stored record, nothing left to link.
        if let Some(block) = self
            .store
            .block_at_height(height)
            .with_context(|| format!("existence check for height {height}"))?
        {
            return Ok(HeightFetch { block, association: None, transactions: Vec::new() });
        }

        eprintln!("[scan] fetch block {height}");
        let block = self
            .node
            .block_by_number(height)
            .with_context(|| format!("block detail for height {height}"))?;
        let association = block.association();

        let mut transactions = Vec::with_capacity(association.transaction_hashes.len());
        for &hash in &association.transaction_hashes {
            transactions.push(self.fetch_transaction(hash)?);
        }

        Ok(HeightFetch { block, association: Some(association), transactions })
    }

    /// Persisted transactions are reused as hash-only stubs, never re-fetched.
    fn fetch_transaction(&self, hash: B256) -> Result<TransactionRecord> {
        if self
            .store
            .has_transaction(&hash)
            .with_context(|| format!("existence check for transaction {hash}"))?
        {
            return Ok(TransactionRecord::stub(hash));
        }

        let info = self
            .node
            .transaction_by_hash(hash)
            .with_context(|| format!("transaction detail for {hash}"))?;
        let receipt = self
            .node
            .transaction_receipt(hash)
            .with_context(|| format!("receipt for {hash}"))?;

        Ok(TransactionRecord {
            hash,
            detail: Some(TxDetail {
                from: info.from,
                to: info.to,
                nonce: info.nonce,
                input: info.input,
                value: info.value,
                logs: receipt.logs,
            }),
        })
    }
}
