use std::sync::Arc;

use alloy_primitives::B256;
use anyhow::{Context, Result, anyhow};
use borsh::BorshDeserialize;
use rocksdb::DB;

use crate::core::records::BlockRecord;
use crate::core::resolve::LinkedBlock;
use crate::runtime::mdb::Mdb;
use crate::schemas::{SchemaBlock, SchemaTransaction};

/// Namespace prefix inside the shared DB for the chain store. (Literal;
/// includes the trailing colon.)
pub const MDB_PREFIX: &[u8] = b"chain:";

#[inline]
fn height_key(height: u64) -> [u8; 10] {
    let mut k = [0u8; 10];
    k[0] = b'h';
    k[1] = b'/';
    k[2..].copy_from_slice(&height.to_be_bytes());
    k
}

#[inline]
fn block_key(hash: &B256) -> [u8; 34] {
    let mut k = [0u8; 34];
    k[0] = b'b';
    k[1] = b'/';
    k[2..].copy_from_slice(hash.as_slice());
    k
}

#[inline]
fn tx_key(hash: &B256) -> [u8; 34] {
    let mut k = [0u8; 34];
    k[0] = b't';
    k[1] = b'/';
    k[2..].copy_from_slice(hash.as_slice());
    k
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub blocks: usize,
    pub transactions: usize,
    pub uncles: usize,
}

/// Durable block/transaction store. The scanner consults it for existence
/// checks (by height and by hash) and hands it the terminal block's subgraph
/// for one cascading write.
#[derive(Clone)]
pub struct BlockStore {
    mdb: Mdb,
}

impl BlockStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self { mdb: Mdb::from_db(db, MDB_PREFIX) }
    }

    pub fn has_block_at_height(&self, height: u64) -> Result<bool> {
        Ok(self.mdb.get(&height_key(height)).context("read height index")?.is_some())
    }

    pub fn block_hash_at_height(&self, height: u64) -> Result<Option<B256>> {
        let Some(raw) = self.mdb.get(&height_key(height)).context("read height index")? else {
            return Ok(None);
        };
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("height index entry for {height} is not a 32-byte hash"))?;
        Ok(Some(B256::from(bytes)))
    }

    pub fn block_at_height(&self, height: u64) -> Result<Option<BlockRecord>> {
        match self.block_hash_at_height(height)? {
            Some(hash) => self.block_by_hash(&hash),
            None => Ok(None),
        }
    }

    pub fn block_by_hash(&self, hash: &B256) -> Result<Option<BlockRecord>> {
        let Some(raw) = self.mdb.get(&block_key(hash)).context("read block row")? else {
            return Ok(None);
        };
        let row = SchemaBlock::try_from_slice(&raw).context("borsh decode block row")?;
        Ok(Some(row.into()))
    }

    pub fn has_transaction(&self, hash: &B256) -> Result<bool> {
        Ok(self.mdb.get(&tx_key(hash)).context("read transaction row")?.is_some())
    }

    /// Hash of the block a persisted transaction belongs to.
    pub fn transaction_owner(&self, hash: &B256) -> Result<Option<B256>> {
        let Some(raw) = self.mdb.get(&tx_key(hash)).context("read transaction row")? else {
            return Ok(None);
        };
        let row = SchemaTransaction::try_from_slice(&raw).context("borsh decode transaction row")?;
        Ok(Some(B256::from(row.block_hash)))
    }

    /// Single cascading write of the terminal block's subgraph: the parent
    /// chain, each chain block's transactions, and its resolved uncles.
    /// Uncle rows carry no height index entry; the canonical block at a
    /// height owns that slot.
    pub fn persist_graph(&self, terminal: &LinkedBlock) -> Result<PersistStats> {
        let mut stats = PersistStats::default();
        self.mdb
            .bulk_write(|wb| {
                let mut cursor = Some(terminal);
                while let Some(node) = cursor {
                    let record = node.record.as_ref();
                    let row = borsh::to_vec(&SchemaBlock::from(record)).expect("borsh encode block row");
                    wb.put(&block_key(&record.hash), &row);
                    wb.put(&height_key(record.number), record.hash.as_slice());
                    stats.blocks += 1;

                    for tx in &node.transactions {
                        let row = SchemaTransaction { hash: tx.hash.0, block_hash: record.hash.0 };
                        let row = borsh::to_vec(&row).expect("borsh encode transaction row");
                        wb.put(&tx_key(&tx.hash), &row);
                        stats.transactions += 1;
                    }

                    for uncle in &node.uncles {
                        let row = borsh::to_vec(&SchemaBlock::from(uncle.as_ref()))
                            .expect("borsh encode uncle row");
                        wb.put(&block_key(&uncle.hash), &row);
                        stats.uncles += 1;
                    }

                    cursor = node.parent.as_deref();
                }
            })
            .context("persist graph batch")?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::TransactionRecord;
    use crate::core::resolve::LinkedBlock;
    use crate::test_utils::{ChainBuilder, scratch_store};

    #[test]
    fn persist_walks_the_parent_chain() {
        let (_dir, store) = scratch_store();
        let chain = ChainBuilder::starting_at(100).add_blocks(2).build();

        let tx_hash = ChainBuilder::tx_hash("t0");
        let base = Arc::new(LinkedBlock {
            record: Arc::new(chain[0].clone()),
            parent: None,
            uncles: Vec::new(),
            transactions: Vec::new(),
        });
        let mid = Arc::new(LinkedBlock {
            record: Arc::new(chain[1].clone()),
            parent: Some(base),
            uncles: Vec::new(),
            transactions: vec![Arc::new(TransactionRecord::stub(tx_hash))],
        });
        let terminal = LinkedBlock {
            record: Arc::new(chain[2].clone()),
            parent: Some(mid),
            uncles: Vec::new(),
            transactions: Vec::new(),
        };

        let stats = store.persist_graph(&terminal).unwrap();
        assert_eq!(stats, PersistStats { blocks: 3, transactions: 1, uncles: 0 });

        for record in &chain {
            assert!(store.has_block_at_height(record.number).unwrap());
            assert_eq!(store.block_hash_at_height(record.number).unwrap(), Some(record.hash));
            assert_eq!(store.block_by_hash(&record.hash).unwrap().as_ref(), Some(record));
        }
        assert!(store.has_transaction(&tx_hash).unwrap());
        assert_eq!(store.transaction_owner(&tx_hash).unwrap(), Some(chain[1].hash));
        assert!(!store.has_block_at_height(99).unwrap());
    }

    #[test]
    fn uncles_get_rows_but_no_height_slot() {
        let (_dir, store) = scratch_store();
        let builder = ChainBuilder::starting_at(200);
        let uncle_hash = builder.tip_hash();
        let chain = builder.add_block_with(Vec::new(), vec![uncle_hash]).build();

        let terminal = LinkedBlock {
            record: Arc::new(chain[1].clone()),
            parent: None,
            uncles: vec![Arc::new(chain[0].clone())],
            transactions: Vec::new(),
        };

        let stats = store.persist_graph(&terminal).unwrap();
        assert_eq!(stats.uncles, 1);
        assert!(store.block_by_hash(&uncle_hash).unwrap().is_some());
        // The uncle's height slot stays free for the canonical block.
        assert!(!store.has_block_at_height(200).unwrap());
    }
}
