// Ethereum JSON-RPC 2.0 client over plain HTTP.
// Works against geth, erigon and hosted endpoints; optional basic auth for
// nodes behind a reverse proxy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bloom, Bytes, U256};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::records::{BlockRecord, EventLog};

/// Capability contract the scan pipeline and the read path need from a node.
/// All calls are synchronous request/response; a connection or protocol
/// failure is reported as an error, never a panic.
pub trait EthNode: Send + Sync {
    /// Current chain height.
    fn block_number(&self) -> Result<u64>;
    fn chain_id(&self) -> Result<u64>;
    /// Block detail: header fields plus ordered transaction and uncle hash
    /// lists. Transaction detail is fetched separately per hash.
    fn block_by_number(&self, number: u64) -> Result<BlockRecord>;
    fn transaction_by_hash(&self, hash: B256) -> Result<TxInfo>;
    fn transaction_receipt(&self, hash: B256) -> Result<ReceiptInfo>;
}

/// Transaction detail as returned by the node; the sender is taken from the
/// node's transaction object.
#[derive(Debug, Clone)]
pub struct TxInfo {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub input: Bytes,
    pub value: U256,
}

#[derive(Debug, Clone)]
pub struct ReceiptInfo {
    pub block_number: u64,
    pub logs: Vec<EventLog>,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: u32,
    method: String,
    params: Vec<Value>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcErrorDetail>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcErrorDetail {
    code: i32,
    message: String,
}

pub struct HttpEthClient {
    url: String,
    auth: Option<String>,
    client: reqwest::blocking::Client,
    request_id: AtomicU32,
}

impl HttpEthClient {
    pub fn new(url: &str, auth: Option<(String, String)>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to create HTTP client")?;

        let auth_header = auth.map(|(user, pass)| {
            let credentials = format!("{}:{}", user, pass);
            format!("Basic {}", base64_encode(credentials.as_bytes()))
        });

        Ok(Self { url: url.to_string(), auth: auth_header, client, request_id: AtomicU32::new(1) })
    }

    fn rpc_call<T: serde::de::DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request =
            JsonRpcRequest { jsonrpc: "2.0".to_string(), id, method: method.to_string(), params };

        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(ref auth) = self.auth {
            req = req.header("Authorization", auth);
        }

        let response = req.send().with_context(|| format!("{method}: HTTP request failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("{method}: HTTP {status}: {body}");
        }

        let parsed: JsonRpcResponse<T> =
            response.json().with_context(|| format!("{method}: malformed JSON-RPC response"))?;

        if let Some(error) = parsed.error {
            bail!("{method}: node error {}: {}", error.code, error.message);
        }

        parsed.result.ok_or_else(|| anyhow!("{method}: missing result field in response"))
    }
}

impl EthNode for HttpEthClient {
    fn block_number(&self) -> Result<u64> {
        let raw: String = self.rpc_call("eth_blockNumber", vec![])?;
        parse_quantity(&raw)
    }

    fn chain_id(&self) -> Result<u64> {
        let raw: String = self.rpc_call("eth_chainId", vec![])?;
        parse_quantity(&raw)
    }

    fn block_by_number(&self, number: u64) -> Result<BlockRecord> {
        // Hash-only transaction list: detail is fetched per hash so the
        // existence check can short-circuit each one.
        let raw: Option<RawBlock> = self
            .rpc_call("eth_getBlockByNumber", vec![json!(to_quantity(number)), json!(false)])?;
        raw.ok_or_else(|| anyhow!("eth_getBlockByNumber: no block at height {number}"))?
            .into_record()
    }

    fn transaction_by_hash(&self, hash: B256) -> Result<TxInfo> {
        let raw: Option<RawTransaction> =
            self.rpc_call("eth_getTransactionByHash", vec![json!(hash.to_string())])?;
        raw.ok_or_else(|| anyhow!("eth_getTransactionByHash: unknown transaction {hash}"))?
            .into_info()
    }

    fn transaction_receipt(&self, hash: B256) -> Result<ReceiptInfo> {
        let raw: Option<RawReceipt> =
            self.rpc_call("eth_getTransactionReceipt", vec![json!(hash.to_string())])?;
        raw.ok_or_else(|| anyhow!("eth_getTransactionReceipt: no receipt for {hash}"))?
            .into_info()
    }
}

/// Wire shape of eth_getBlockByNumber with full_transactions = false.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number: String,
    hash: String,
    parent_hash: String,
    difficulty: String,
    extra_data: String,
    gas_limit: String,
    gas_used: String,
    logs_bloom: String,
    miner: String,
    mix_hash: String,
    nonce: String,
    receipts_root: String,
    sha3_uncles: String,
    size: String,
    state_root: String,
    timestamp: String,
    transactions_root: String,
    transactions: Vec<String>,
    uncles: Vec<String>,
}

impl RawBlock {
    fn into_record(self) -> Result<BlockRecord> {
        Ok(BlockRecord {
            number: parse_quantity(&self.number)?,
            hash: parse_b256(&self.hash)?,
            parent_hash: parse_b256(&self.parent_hash)?,
            transaction_hashes: self
                .transactions
                .iter()
                .map(|t| parse_b256(t))
                .collect::<Result<_>>()?,
            uncle_hashes: self.uncles.iter().map(|u| parse_b256(u)).collect::<Result<_>>()?,
            difficulty: parse_quantity(&self.difficulty)?,
            extra_data: parse_bytes(&self.extra_data)?,
            gas_limit: parse_quantity(&self.gas_limit)?,
            gas_used: parse_quantity(&self.gas_used)?,
            logs_bloom: parse_bloom(&self.logs_bloom)?,
            miner: parse_address(&self.miner)?,
            mix_hash: parse_b256(&self.mix_hash)?,
            // Block nonce is 8-byte DATA on the wire, but the hex digits
            // parse the same way a quantity does.
            nonce: parse_quantity(&self.nonce)?,
            receipts_root: parse_b256(&self.receipts_root)?,
            sha3_uncles: parse_b256(&self.sha3_uncles)?,
            size: parse_quantity(&self.size)?,
            state_root: parse_b256(&self.state_root)?,
            timestamp: parse_quantity(&self.timestamp)?,
            transactions_root: parse_b256(&self.transactions_root)?,
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    nonce: String,
    input: String,
    value: String,
}

impl RawTransaction {
    fn into_info(self) -> Result<TxInfo> {
        Ok(TxInfo {
            hash: parse_b256(&self.hash)?,
            from: parse_address(&self.from)?,
            to: self.to.as_deref().map(parse_address).transpose()?,
            nonce: parse_quantity(&self.nonce)?,
            input: parse_bytes(&self.input)?,
            value: parse_u256(&self.value)?,
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    block_number: String,
    logs: Vec<RawLog>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    log_index: String,
    data: String,
}

impl RawReceipt {
    fn into_info(self) -> Result<ReceiptInfo> {
        Ok(ReceiptInfo {
            block_number: parse_quantity(&self.block_number)?,
            logs: self
                .logs
                .into_iter()
                .map(|l| {
                    Ok(EventLog { index: parse_quantity(&l.log_index)?, data: parse_bytes(&l.data)? })
                })
                .collect::<Result<_>>()?,
        })
    }
}

#[inline]
fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

pub fn parse_quantity(raw: &str) -> Result<u64> {
    u64::from_str_radix(strip_0x(raw), 16).with_context(|| format!("invalid hex quantity: {raw}"))
}

pub fn parse_u256(raw: &str) -> Result<U256> {
    U256::from_str_radix(strip_0x(raw), 16).with_context(|| format!("invalid hex quantity: {raw}"))
}

pub fn parse_b256(raw: &str) -> Result<B256> {
    raw.parse::<B256>().map_err(|e| anyhow!("invalid 32-byte hash {raw}: {e}"))
}

pub fn parse_address(raw: &str) -> Result<Address> {
    raw.parse::<Address>().map_err(|e| anyhow!("invalid address {raw}: {e}"))
}

fn parse_bloom(raw: &str) -> Result<Bloom> {
    raw.parse::<Bloom>().map_err(|e| anyhow!("invalid logs bloom {raw}: {e}"))
}

fn parse_bytes(raw: &str) -> Result<Bytes> {
    let data = hex::decode(strip_0x(raw)).with_context(|| format!("invalid hex data: {raw}"))?;
    Ok(Bytes::from(data))
}

pub fn to_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn base64_encode(input: &[u8]) -> String {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut encoder =
            base64::write::EncoderWriter::new(&mut buf, &base64::engine::general_purpose::STANDARD);
        encoder.write_all(input).unwrap();
    }
    String::from_utf8(buf).unwrap()
}
