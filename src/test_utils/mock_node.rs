use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::{Result, anyhow};

use crate::core::records::{BlockRecord, EventLog};
use crate::eth_rpc::{EthNode, ReceiptInfo, TxInfo};

/// Mock Ethereum node: serves a fixed chain, counts calls, and can inject
/// latency or per-height failures to exercise the scan pipeline.
pub struct MockEthNode {
    blocks: HashMap<u64, BlockRecord>,
    transactions: HashMap<B256, (TxInfo, ReceiptInfo)>,
    tip: u64,
    chain_id: u64,
    latency: Option<Duration>,
    fail_heights: HashSet<u64>,
    block_calls: AtomicU64,
    tx_calls: AtomicU64,
    calls_per_height: Mutex<HashMap<u64, u64>>,
    calls_per_tx: Mutex<HashMap<B256, u64>>,
}

impl MockEthNode {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            transactions: HashMap::new(),
            tip: 0,
            chain_id: 1337,
            latency: None,
            fail_heights: HashSet::new(),
            block_calls: AtomicU64::new(0),
            tx_calls: AtomicU64::new(0),
            calls_per_height: Mutex::new(HashMap::new()),
            calls_per_tx: Mutex::new(HashMap::new()),
        }
    }

    /// Load a chain; the tip becomes the highest height present. Referenced
    /// transaction hashes get default detail unless registered explicitly.
    pub fn set_chain(&mut self, blocks: Vec<BlockRecord>) {
        for block in blocks {
            self.add_block(block);
        }
    }

    pub fn add_block(&mut self, block: BlockRecord) {
        for (i, &hash) in block.transaction_hashes.iter().enumerate() {
            if !self.transactions.contains_key(&hash) {
                self.register_default_transaction(hash, block.number, i as u64);
            }
        }
        if block.number > self.tip {
            self.tip = block.number;
        }
        self.blocks.insert(block.number, block);
    }

    pub fn add_transaction(&mut self, info: TxInfo, receipt: ReceiptInfo) {
        self.transactions.insert(info.hash, (info, receipt));
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make block fetches for `height` fail with an injected error.
    pub fn fail_at_height(&mut self, height: u64) {
        self.fail_heights.insert(height);
    }

    pub fn set_tip(&mut self, tip: u64) {
        self.tip = tip;
    }

    pub fn tip(&self) -> u64 {
        self.tip
    }

    pub fn block_fetches(&self, height: u64) -> u64 {
        self.calls_per_height.lock().unwrap().get(&height).copied().unwrap_or(0)
    }

    pub fn transaction_fetches(&self, hash: &B256) -> u64 {
        self.calls_per_tx.lock().unwrap().get(hash).copied().unwrap_or(0)
    }

    pub fn total_block_fetches(&self) -> u64 {
        self.block_calls.load(Ordering::Relaxed)
    }

    pub fn total_transaction_fetches(&self) -> u64 {
        self.tx_calls.load(Ordering::Relaxed)
    }

    fn register_default_transaction(&mut self, hash: B256, block_number: u64, index: u64) {
        let info = TxInfo {
            hash,
            from: Address::with_last_byte(0xaa),
            to: Some(Address::with_last_byte(0xbb)),
            nonce: index,
            input: Bytes::new(),
            value: U256::from(1_000u64),
        };
        let receipt = ReceiptInfo {
            block_number,
            logs: vec![EventLog { index: 0, data: Bytes::from(hash.to_vec()) }],
        };
        self.transactions.insert(hash, (info, receipt));
    }

    fn pause(&self) {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
    }
}

impl Default for MockEthNode {
    fn default() -> Self {
        Self::new()
    }
}

impl EthNode for MockEthNode {
    fn block_number(&self) -> Result<u64> {
        Ok(self.tip)
    }

    fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn block_by_number(&self, number: u64) -> Result<BlockRecord> {
        self.pause();
        self.block_calls.fetch_add(1, Ordering::Relaxed);
        *self.calls_per_height.lock().unwrap().entry(number).or_insert(0) += 1;

        if self.fail_heights.contains(&number) {
            return Err(anyhow!("injected failure at height {number}"));
        }
        self.blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow!("no block at height {number}"))
    }

    fn transaction_by_hash(&self, hash: B256) -> Result<TxInfo> {
        self.pause();
        self.tx_calls.fetch_add(1, Ordering::Relaxed);
        *self.calls_per_tx.lock().unwrap().entry(hash).or_insert(0) += 1;

        self.transactions
            .get(&hash)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| anyhow!("unknown transaction {hash}"))
    }

    fn transaction_receipt(&self, hash: B256) -> Result<ReceiptInfo> {
        self.transactions
            .get(&hash)
            .map(|(_, receipt)| receipt.clone())
            .ok_or_else(|| anyhow!("no receipt for {hash}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ChainBuilder;

    #[test]
    fn serves_chain_by_height() {
        let mut node = MockEthNode::new();
        let chain = ChainBuilder::starting_at(100).add_blocks(4).build();
        node.set_chain(chain.clone());

        assert_eq!(node.tip(), 104);
        for block in &chain {
            assert_eq!(node.block_by_number(block.number).unwrap().hash, block.hash);
        }
        assert!(node.block_by_number(99).is_err());
        assert_eq!(node.total_block_fetches(), 6);
    }

    #[test]
    fn referenced_transactions_get_default_detail() {
        let mut node = MockEthNode::new();
        let t0 = ChainBuilder::tx_hash("t0");
        let chain = ChainBuilder::starting_at(100).add_block_with(vec![t0], Vec::new()).build();
        node.set_chain(chain);

        let info = node.transaction_by_hash(t0).unwrap();
        assert_eq!(info.hash, t0);
        let receipt = node.transaction_receipt(t0).unwrap();
        assert_eq!(receipt.block_number, 101);
        assert_eq!(node.transaction_fetches(&t0), 1);
    }

    #[test]
    fn injected_failure_only_hits_its_height() {
        let mut node = MockEthNode::new();
        node.set_chain(ChainBuilder::starting_at(100).add_blocks(2).build());
        node.fail_at_height(101);

        assert!(node.block_by_number(100).is_ok());
        assert!(node.block_by_number(101).is_err());
        assert!(node.block_by_number(102).is_ok());
    }
}
