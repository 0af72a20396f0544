use alloy_primitives::{Address, B256, Bloom, Bytes};
use borsh::{BorshDeserialize, BorshSerialize};

use crate::core::records::BlockRecord;

/// Borsh row for a persisted block. Mirrors `BlockRecord` with raw byte
/// arrays so the stored encoding stays independent of the primitive crate.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct SchemaBlock {
    pub number: u64,
    pub hash: [u8; 32],
    pub parent_hash: [u8; 32],
    pub transaction_hashes: Vec<[u8; 32]>,
    pub uncle_hashes: Vec<[u8; 32]>,
    pub difficulty: u64,
    pub extra_data: Vec<u8>,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub logs_bloom: [u8; 256],
    pub miner: [u8; 20],
    pub mix_hash: [u8; 32],
    pub nonce: u64,
    pub receipts_root: [u8; 32],
    pub sha3_uncles: [u8; 32],
    pub size: u64,
    pub state_root: [u8; 32],
    pub timestamp: u64,
    pub transactions_root: [u8; 32],
}

impl From<&BlockRecord> for SchemaBlock {
    fn from(record: &BlockRecord) -> Self {
        Self {
            number: record.number,
            hash: record.hash.0,
            parent_hash: record.parent_hash.0,
            transaction_hashes: record.transaction_hashes.iter().map(|h| h.0).collect(),
            uncle_hashes: record.uncle_hashes.iter().map(|h| h.0).collect(),
            difficulty: record.difficulty,
            extra_data: record.extra_data.to_vec(),
            gas_limit: record.gas_limit,
            gas_used: record.gas_used,
            logs_bloom: record.logs_bloom.0.0,
            miner: record.miner.0.0,
            mix_hash: record.mix_hash.0,
            nonce: record.nonce,
            receipts_root: record.receipts_root.0,
            sha3_uncles: record.sha3_uncles.0,
            size: record.size,
            state_root: record.state_root.0,
            timestamp: record.timestamp,
            transactions_root: record.transactions_root.0,
        }
    }
}

impl From<SchemaBlock> for BlockRecord {
    fn from(row: SchemaBlock) -> Self {
        Self {
            number: row.number,
            hash: B256::from(row.hash),
            parent_hash: B256::from(row.parent_hash),
            transaction_hashes: row.transaction_hashes.into_iter().map(B256::from).collect(),
            uncle_hashes: row.uncle_hashes.into_iter().map(B256::from).collect(),
            difficulty: row.difficulty,
            extra_data: Bytes::from(row.extra_data),
            gas_limit: row.gas_limit,
            gas_used: row.gas_used,
            logs_bloom: Bloom::from(row.logs_bloom),
            miner: Address::from(row.miner),
            mix_hash: B256::from(row.mix_hash),
            nonce: row.nonce,
            receipts_root: B256::from(row.receipts_root),
            sha3_uncles: B256::from(row.sha3_uncles),
            size: row.size,
            state_root: B256::from(row.state_root),
            timestamp: row.timestamp,
            transactions_root: B256::from(row.transactions_root),
        }
    }
}

/// Borsh row for a persisted transaction: identity plus the owning block
/// reference. Transaction detail is served by the read path, not stored.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct SchemaTransaction {
    pub hash: [u8; 32],
    pub block_hash: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ChainBuilder;

    #[test]
    fn block_row_round_trips() {
        let chain = ChainBuilder::starting_at(100)
            .add_block_with(vec![ChainBuilder::tx_hash("t0")], Vec::new())
            .build();
        let record = chain[1].clone();

        let encoded = borsh::to_vec(&SchemaBlock::from(&record)).unwrap();
        let decoded: BlockRecord = SchemaBlock::try_from_slice(&encoded).unwrap().into();

        assert_eq!(decoded, record);
    }

    #[test]
    fn transaction_row_round_trips() {
        let row = SchemaTransaction {
            hash: ChainBuilder::tx_hash("t0").0,
            block_hash: ChainBuilder::tx_hash("owner").0,
        };
        let encoded = borsh::to_vec(&row).unwrap();
        let decoded = SchemaTransaction::try_from_slice(&encoded).unwrap();
        assert_eq!(decoded.hash, row.hash);
        assert_eq!(decoded.block_hash, row.block_hash);
    }
}
