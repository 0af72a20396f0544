use std::net::SocketAddr;

use alloy_primitives::B256;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task;
use tower_http::cors::CorsLayer;

use crate::cache::{self, ReadCache};
use crate::config::{get_eth_node, get_read_cache};
use crate::eth_rpc::EthNode;

/// Wire entities for the read path; field names are the public API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeaderEntity {
    pub block_number: u64,
    pub block_hash: String,
    pub block_time: u64,
    pub parent_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntity {
    #[serde(flatten)]
    pub header: BlockHeaderEntity,
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntity {
    pub index: u64,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEntity {
    pub tx_hash: String,
    pub from: String,
    /// Empty string for contract creation.
    pub to: String,
    pub nonce: u64,
    pub data: String,
    pub value: String,
    pub logs: Vec<EventLogEntity>,
}

#[derive(Deserialize)]
struct BlockListQuery {
    limit: Option<String>,
}

fn reason(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "reason": msg }))).into_response()
}

pub fn router() -> Router {
    Router::new()
        .route("/blocks", get(block_list_handler))
        .route("/blocks/{id}", get(block_by_id_handler))
        .route("/transaction/{tx_hash}", get(transaction_handler))
        .layer(CorsLayer::permissive())
}

pub async fn run_api(addr: SocketAddr) -> anyhow::Result<()> {
    let app = router();
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn block_list_handler(Query(q): Query<BlockListQuery>) -> Response {
    let limit = match q.limit.as_deref().unwrap_or("10").parse::<u64>() {
        Ok(n) => n,
        Err(_) => return reason(StatusCode::BAD_REQUEST, "invalid limit parameter"),
    };

    match task::spawn_blocking(move || fetch_header_list(limit)).await {
        Ok(Ok(list)) => Json(list).into_response(),
        Ok(Err(msg)) => reason(StatusCode::INTERNAL_SERVER_ERROR, msg),
        Err(e) => {
            eprintln!("[api] block list task failed: {e:?}");
            reason(StatusCode::INTERNAL_SERVER_ERROR, "query latest block number failed")
        }
    }
}

async fn block_by_id_handler(Path(id): Path<String>) -> Response {
    let number = match id.parse::<u64>() {
        Ok(n) => n,
        Err(_) => return reason(StatusCode::BAD_REQUEST, "invalid block id"),
    };

    match task::spawn_blocking(move || fetch_block(number)).await {
        Ok(Ok(entity)) => Json(entity).into_response(),
        Ok(Err(msg)) => reason(StatusCode::INTERNAL_SERVER_ERROR, msg),
        Err(e) => {
            eprintln!("[api] block task failed: {e:?}");
            reason(StatusCode::INTERNAL_SERVER_ERROR, "query block failed")
        }
    }
}

async fn transaction_handler(Path(tx_hash): Path<String>) -> Response {
    let hash = match tx_hash.parse::<B256>() {
        Ok(h) => h,
        Err(_) => return reason(StatusCode::BAD_REQUEST, "invalid transaction hash"),
    };

    match task::spawn_blocking(move || fetch_transaction(hash)).await {
        Ok(Ok(entity)) => Json(entity).into_response(),
        Ok(Err(msg)) => reason(StatusCode::INTERNAL_SERVER_ERROR, msg),
        Err(e) => {
            eprintln!("[api] transaction task failed: {e:?}");
            reason(StatusCode::INTERNAL_SERVER_ERROR, "query transaction failed")
        }
    }
}

/// Walk back from the latest height, serving each header through the cache.
fn fetch_header_list(limit: u64) -> Result<Vec<BlockHeaderEntity>, &'static str> {
    let node = get_eth_node();
    let read_cache = get_read_cache();

    let latest = match node.block_number() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("[api] query latest block number failed: {e:?}");
            return Err("query latest block number failed");
        }
    };

    let mut headers = Vec::new();
    let mut number = latest;
    for _ in 0..limit {
        match fetch_header(node.as_ref(), read_cache, number) {
            Ok(header) => headers.push(header),
            Err(e) => {
                eprintln!("[api] query block header {number} failed: {e:?}");
                return Err("query block header failed");
            }
        }
        if number == 0 {
            break;
        }
        number -= 1;
    }
    Ok(headers)
}

fn fetch_header(
    node: &dyn EthNode,
    read_cache: &ReadCache,
    number: u64,
) -> anyhow::Result<BlockHeaderEntity> {
    let key = cache::header_key(number);
    if let Some(entity) = read_cache.get::<BlockHeaderEntity>(&key) {
        return Ok(entity);
    }

    let block = node.block_by_number(number)?;
    let entity = BlockHeaderEntity {
        block_number: block.number,
        block_hash: block.hash.to_string(),
        block_time: block.timestamp,
        parent_hash: block.parent_hash.to_string(),
    };
    read_cache.put(&key, &entity);
    Ok(entity)
}

fn fetch_block(number: u64) -> Result<BlockEntity, &'static str> {
    let node = get_eth_node();
    let read_cache = get_read_cache();

    let key = cache::block_key(number);
    if let Some(entity) = read_cache.get::<BlockEntity>(&key) {
        return Ok(entity);
    }

    match node.block_by_number(number) {
        Ok(block) => {
            let entity = BlockEntity {
                header: BlockHeaderEntity {
                    block_number: block.number,
                    block_hash: block.hash.to_string(),
                    block_time: block.timestamp,
                    parent_hash: block.parent_hash.to_string(),
                },
                transactions: block.transaction_hashes.iter().map(|h| h.to_string()).collect(),
            };
            read_cache.put(&key, &entity);
            Ok(entity)
        }
        Err(e) => {
            eprintln!("[api] query block {number} failed: {e:?}");
            Err("query block failed")
        }
    }
}

fn fetch_transaction(hash: B256) -> Result<TransactionEntity, &'static str> {
    let node = get_eth_node();
    let read_cache = get_read_cache();

    let key = cache::tx_key(&hash);
    if let Some(entity) = read_cache.get::<TransactionEntity>(&key) {
        return Ok(entity);
    }

    let info = match node.transaction_by_hash(hash) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("[api] query transaction {hash} failed: {e:?}");
            return Err("query transaction failed");
        }
    };
    let receipt = match node.transaction_receipt(hash) {
        Ok(receipt) => receipt,
        Err(e) => {
            eprintln!("[api] query transaction receipt {hash} failed: {e:?}");
            return Err("query transaction failed");
        }
    };

    let entity = TransactionEntity {
        tx_hash: info.hash.to_string(),
        from: info.from.to_string(),
        to: info.to.map(|a| a.to_string()).unwrap_or_default(),
        nonce: info.nonce,
        data: info.input.to_string(),
        value: info.value.to_string(),
        logs: receipt
            .logs
            .into_iter()
            .map(|log| EventLogEntity { index: log.index, data: log.data.to_string() })
            .collect(),
    };
    read_cache.put(&key, &entity);
    Ok(entity)
}
