use alloy_primitives::{Address, B256, Bloom, Bytes, U256};

/// Canonical block data as fetched from the node (or reloaded from the
/// durable store). Identity is `hash`; `number` and `hash` are each expected
/// unique within a scanned range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    /// Transaction hashes in inclusion order.
    pub transaction_hashes: Vec<B256>,
    pub uncle_hashes: Vec<B256>,
    pub difficulty: u64,
    pub extra_data: Bytes,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub logs_bloom: Bloom,
    pub miner: Address,
    pub mix_hash: B256,
    pub nonce: u64,
    pub receipts_root: B256,
    pub sha3_uncles: B256,
    pub size: u64,
    pub state_root: B256,
    pub timestamp: u64,
    pub transactions_root: B256,
}

impl BlockRecord {
    /// Relationship view of this block, recorded at fetch time so linking can
    /// happen after every endpoint has been fetched.
    pub fn association(&self) -> BlockAssociation {
        BlockAssociation {
            block_hash: self.hash,
            parent_hash: self.parent_hash,
            uncle_hashes: self.uncle_hashes.clone(),
            transaction_hashes: self.transaction_hashes.clone(),
        }
    }
}

/// A transaction is identified by hash alone; `detail` stays `None` when the
/// record was reused from the durable store instead of fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: B256,
    pub detail: Option<TxDetail>,
}

impl TransactionRecord {
    pub fn stub(hash: B256) -> Self {
        Self { hash, detail: None }
    }

    pub fn is_stub(&self) -> bool {
        self.detail.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDetail {
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub input: Bytes,
    pub value: U256,
    pub logs: Vec<EventLog>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    pub index: u64,
    pub data: Bytes,
}

/// Ephemeral record of a block's relationships by hash. Exists only during a
/// scan: the referenced endpoints may not have been fetched yet when the
/// relationship is observed, so linking is deferred to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAssociation {
    pub block_hash: B256,
    pub parent_hash: B256,
    pub uncle_hashes: Vec<B256>,
    /// Inclusion order, preserved through resolution.
    pub transaction_hashes: Vec<B256>,
}
