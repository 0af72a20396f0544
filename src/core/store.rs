use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::B256;

use super::records::{BlockAssociation, BlockRecord, TransactionRecord};
use super::scan::ScanError;

/// In-memory dedup store for one scan: content hash -> record, plus the
/// association list accumulated as fetches complete.
///
/// Owned exclusively by the orchestrator thread; workers hand their results
/// over a channel instead of locking the maps, so applying one height is
/// atomic with respect to every other worker. The resolver only runs after
/// the fetch barrier and reads without synchronization.
#[derive(Debug, Default)]
pub struct ChainStore {
    blocks: HashMap<B256, Arc<BlockRecord>>,
    heights: HashMap<u64, B256>,
    transactions: HashMap<B256, Arc<TransactionRecord>>,
    associations: Vec<BlockAssociation>,
    terminal: Option<B256>,
}

impl ChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate hash or height across distinct records is a data-integrity
    /// violation, never papered over.
    pub fn insert_block(&mut self, record: BlockRecord) -> Result<Arc<BlockRecord>, ScanError> {
        if self.blocks.contains_key(&record.hash) {
            return Err(ScanError::DuplicateHash { hash: record.hash });
        }
        if let Some(prior) = self.heights.get(&record.number) {
            return Err(ScanError::DuplicateHeight {
                height: record.number,
                first: *prior,
                second: record.hash,
            });
        }
        let record = Arc::new(record);
        self.heights.insert(record.number, record.hash);
        self.blocks.insert(record.hash, record.clone());
        Ok(record)
    }

    /// First writer wins: a record already present is kept as-is, so every
    /// later reference resolves to the same instance.
    pub fn insert_transaction(&mut self, record: TransactionRecord) -> Arc<TransactionRecord> {
        self.transactions
            .entry(record.hash)
            .or_insert_with(|| Arc::new(record))
            .clone()
    }

    pub fn push_association(&mut self, association: BlockAssociation) {
        self.associations.push(association);
    }

    pub fn set_terminal(&mut self, hash: B256) {
        self.terminal = Some(hash);
    }

    pub fn block(&self, hash: &B256) -> Option<&Arc<BlockRecord>> {
        self.blocks.get(hash)
    }

    pub fn block_at_height(&self, height: u64) -> Option<&Arc<BlockRecord>> {
        self.heights.get(&height).and_then(|hash| self.blocks.get(hash))
    }

    pub fn transaction(&self, hash: &B256) -> Option<&Arc<TransactionRecord>> {
        self.transactions.get(hash)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Arc<BlockRecord>> {
        self.blocks.values()
    }

    pub fn associations(&self) -> &[BlockAssociation] {
        &self.associations
    }

    pub fn terminal(&self) -> Option<B256> {
        self.terminal
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ChainBuilder;
    use alloy_primitives::U256;
    use crate::core::records::TxDetail;

    #[test]
    fn duplicate_block_hash_is_rejected() {
        let chain = ChainBuilder::starting_at(100).add_blocks(1).build();
        let mut store = ChainStore::new();
        store.insert_block(chain[0].clone()).unwrap();

        // Same record again (same hash) must be refused.
        let mut dup = chain[0].clone();
        dup.number = 999;
        assert!(matches!(
            store.insert_block(dup),
            Err(ScanError::DuplicateHash { .. })
        ));
    }

    #[test]
    fn duplicate_height_is_rejected() {
        let chain = ChainBuilder::starting_at(100).add_blocks(1).build();
        let mut store = ChainStore::new();
        store.insert_block(chain[0].clone()).unwrap();

        let mut other = chain[1].clone();
        other.number = 100;
        assert!(matches!(
            store.insert_block(other),
            Err(ScanError::DuplicateHeight { height: 100, .. })
        ));
    }

    #[test]
    fn first_transaction_writer_wins() {
        let hash = ChainBuilder::tx_hash("t0");
        let mut store = ChainStore::new();

        let first = store.insert_transaction(TransactionRecord::stub(hash));
        let full = TransactionRecord {
            hash,
            detail: Some(TxDetail {
                from: alloy_primitives::Address::with_last_byte(1),
                to: None,
                nonce: 0,
                input: Default::default(),
                value: U256::from(1u64),
                logs: Vec::new(),
            }),
        };
        let second = store.insert_transaction(full);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_stub());
        assert_eq!(store.transaction_count(), 1);
    }
}
