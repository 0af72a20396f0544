use alloy_primitives::{Address, B256, Bloom, Bytes, keccak256};

use crate::core::records::BlockRecord;

/// Builder for deterministic Ethereum-shaped test chains. Hashes are derived
/// from (height, salt), so fixtures are stable across runs and a salted
/// builder yields a disjoint set of hashes.
pub struct ChainBuilder {
    base_height: u64,
    blocks: Vec<BlockRecord>,
    salt: u64,
}

impl ChainBuilder {
    /// Chain rooted at `base_height` (must be > 0). The root's parent hash
    /// points one height below the chain, so the lower range boundary is
    /// exercised by default.
    pub fn starting_at(base_height: u64) -> Self {
        assert!(base_height > 0, "base height must be positive");
        let mut builder = Self { base_height, blocks: Vec::new(), salt: 0 };
        let root = builder.make_block(base_height, Vec::new(), Vec::new());
        builder.blocks.push(root);
        builder
    }

    /// Change the salt to generate a different hash universe. Call before
    /// adding blocks beyond the root.
    pub fn with_salt(mut self, salt: u64) -> Self {
        self.salt = salt;
        let root = self.make_block(self.base_height, Vec::new(), Vec::new());
        self.blocks = vec![root];
        self
    }

    /// Append `count` empty blocks to the chain.
    pub fn add_blocks(mut self, count: u64) -> Self {
        for _ in 0..count {
            let next = self.next_height();
            let block = self.make_block(next, Vec::new(), Vec::new());
            self.blocks.push(block);
        }
        self
    }

    /// Append one block carrying the given transaction and uncle hashes.
    pub fn add_block_with(mut self, tx_hashes: Vec<B256>, uncle_hashes: Vec<B256>) -> Self {
        let next = self.next_height();
        let block = self.make_block(next, tx_hashes, uncle_hashes);
        self.blocks.push(block);
        self
    }

    pub fn build(self) -> Vec<BlockRecord> {
        self.blocks
    }

    pub fn height(&self) -> u64 {
        self.base_height + self.blocks.len() as u64 - 1
    }

    pub fn tip_hash(&self) -> B256 {
        self.blocks.last().expect("chain should not be empty").hash
    }

    pub fn hash_at(&self, height: u64) -> B256 {
        self.block_hash(height)
    }

    /// Deterministic transaction hash for a fixture label.
    pub fn tx_hash(label: &str) -> B256 {
        keccak256(format!("tx-{label}"))
    }

    fn next_height(&self) -> u64 {
        self.base_height + self.blocks.len() as u64
    }

    fn block_hash(&self, height: u64) -> B256 {
        keccak256(format!("block-{}-{}", height, self.salt))
    }

    fn make_block(&self, number: u64, tx_hashes: Vec<B256>, uncle_hashes: Vec<B256>) -> BlockRecord {
        let gas_used = 21_000 * tx_hashes.len() as u64;
        BlockRecord {
            number,
            hash: self.block_hash(number),
            parent_hash: self.block_hash(number - 1),
            transaction_hashes: tx_hashes,
            uncle_hashes,
            difficulty: 1_000_000 + number,
            extra_data: Bytes::from(number.to_be_bytes().to_vec()),
            gas_limit: 30_000_000,
            gas_used,
            logs_bloom: Bloom::ZERO,
            miner: Address::with_last_byte((number % 251) as u8),
            mix_hash: keccak256(format!("mix-{}-{}", number, self.salt)),
            nonce: number,
            receipts_root: keccak256(format!("receipts-{}-{}", number, self.salt)),
            sha3_uncles: keccak256(format!("uncles-{}-{}", number, self.salt)),
            size: 1_024 + number,
            state_root: keccak256(format!("state-{}-{}", number, self.salt)),
            timestamp: 1_600_000_000 + number * 12,
            transactions_root: keccak256(format!("txroot-{}-{}", number, self.salt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_linked_and_deterministic() {
        let chain = ChainBuilder::starting_at(100).add_blocks(5).build();
        assert_eq!(chain.len(), 6);
        for i in 1..chain.len() {
            assert_eq!(chain[i].parent_hash, chain[i - 1].hash);
            assert_eq!(chain[i].number, chain[i - 1].number + 1);
        }

        let again = ChainBuilder::starting_at(100).add_blocks(5).build();
        assert_eq!(chain, again);
    }

    #[test]
    fn salt_changes_the_hash_universe() {
        let plain = ChainBuilder::starting_at(100).add_blocks(2).build();
        let salted = ChainBuilder::starting_at(100).with_salt(1).add_blocks(2).build();
        for (a, b) in plain.iter().zip(&salted) {
            assert_ne!(a.hash, b.hash);
        }
    }
}
