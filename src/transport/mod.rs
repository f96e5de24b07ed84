//! Collaborator seams: chain access, indexer queries and content storage.
//!
//! The core only talks to these traits. Endpoint pools and their rotation
//! state live entirely behind them.

pub mod graphql;
pub mod ipfs;
pub mod web3;

use crate::abi::ContractInterface;
use crate::config::ContractName;
use crate::errors::{ClientError, Result};
use async_trait::async_trait;
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::Token;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Endpoints of one service with the index of the one currently preferred.
///
/// Failures move the preference to the next endpoint; the index is the only
/// mutable state and is shared by all clones of the owning service.
#[derive(Debug)]
pub struct EndpointPool<T> {
    endpoints: Vec<T>,
    current: AtomicUsize,
}

impl<T> EndpointPool<T> {
    pub fn new(endpoints: Vec<T>) -> Self {
        Self {
            endpoints,
            current: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Preferred endpoint, if any
    pub fn current(&self) -> Option<(usize, &T)> {
        if self.endpoints.is_empty() {
            return None;
        }
        let index = self.current.load(Ordering::Relaxed) % self.endpoints.len();
        Some((index, &self.endpoints[index]))
    }

    /// Every endpoint once, starting from the preferred one
    pub fn attempts(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        let start = self.current.load(Ordering::Relaxed);
        let len = self.endpoints.len();
        (0..len).map(move |offset| {
            let index = (start + offset) % len;
            (index, &self.endpoints[index])
        })
    }

    /// Prefer the endpoint after `failed`, unless another caller already moved on
    pub fn rotate(&self, failed: usize) {
        if self.endpoints.is_empty() {
            return;
        }
        let next = (failed + 1) % self.endpoints.len();
        let _ = self.current.compare_exchange(
            failed,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Remember the endpoint that just answered
    pub fn settle(&self, index: usize) {
        self.current.store(index, Ordering::Relaxed);
    }
}

pub use graphql::HttpGraphQL;
pub use ipfs::HttpIpfs;
pub use web3::JsonRpcWeb3;

/// A call to submit or simulate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

impl TransactionRequest {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        Self {
            to,
            value: U256::zero(),
            data,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// One log entry of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

impl ReceiptLog {
    pub fn to_raw(&self) -> ethabi::RawLog {
        ethabi::RawLog {
            topics: self.topics.clone(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    /// false when the transaction reverted
    pub status: bool,
    pub logs: Vec<ReceiptLog>,
}

/// Fee estimate for a given amount of gas units, in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFeeEstimation {
    pub average: U256,
    pub max: U256,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Web3Service: Send + Sync {
    /// Network the provider is connected to
    fn network_name(&self) -> String;

    /// Account transactions are sent from; `NoSigner` when unset
    fn signer_address(&self) -> Result<Address>;

    /// Deployed address for a contract role on the current network
    fn contract_address(&self, name: ContractName) -> Result<Address>;

    async fn ensure_online(&self) -> Result<()>;

    async fn resolve_name(&self, name: &str) -> Result<Option<Address>>;

    /// Simulated call against the latest block
    async fn call(&self, tx: &TransactionRequest) -> Result<Vec<u8>>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256>;

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256>;

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt>;

    async fn approximate_gas_fee(&self, estimated_units: U256) -> Result<GasFeeEstimation>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphQLService: Send + Sync {
    /// Run a query and return its `data` object
    async fn request(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value>;

    async fn ensure_online(&self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IpfsService: Send + Sync {
    /// Store a string, returning its CID
    async fn add(&self, content: &str) -> Result<String>;

    async fn pin(&self, cid: &str) -> Result<()>;

    async fn fetch_string(&self, cid: &str) -> Result<String>;

    async fn ensure_online(&self) -> Result<()>;
}

/// Simulate `name(args)` on `to` and decode its outputs
pub async fn call_function(
    web3: &dyn Web3Service,
    to: Address,
    interface: &ContractInterface,
    name: &str,
    args: &[Token],
) -> Result<Vec<Token>> {
    let data = interface.encode_function_data(name, args)?;
    let output = web3.call(&TransactionRequest::new(to, data)).await?;
    interface.decode_function_output(name, &output)
}

/// Send a transaction and return its hash without waiting
pub async fn submit(web3: &dyn Web3Service, tx: TransactionRequest) -> Result<H256> {
    debug!("Submitting transaction to {:?} ({} bytes of data)", tx.to, tx.data.len());
    let hash = web3.send_transaction(tx).await?;
    info!("Transaction submitted: {:?}", hash);
    Ok(hash)
}

/// Wait for a receipt; reverted transactions are errors
pub async fn confirm(web3: &dyn Web3Service, tx_hash: H256) -> Result<TransactionReceipt> {
    let receipt = web3.wait_for_receipt(tx_hash).await?;
    if !receipt.status {
        return Err(ClientError::TransactionReverted(format!("{:?}", tx_hash)));
    }
    info!(
        "Transaction {:?} confirmed in block {}",
        tx_hash, receipt.block_number
    );
    Ok(receipt)
}

/// Fee of `tx` as it would be submitted now
pub async fn estimate_fee(web3: &dyn Web3Service, tx: &TransactionRequest) -> Result<GasFeeEstimation> {
    let units = web3.estimate_gas(tx).await?;
    debug!("Estimated {} gas units for a call to {:?}", units, tx.to);
    web3.approximate_gas_fee(units).await
}

/// First log in `receipt` matching `event` of `interface`, decoded
pub fn find_event(
    receipt: &TransactionReceipt,
    interface: &ContractInterface,
    event: &str,
) -> Result<Option<ethabi::Log>> {
    let signature = interface.event_signature(event)?;
    match receipt.logs.iter().find(|log| log.topics.first() == Some(&signature)) {
        Some(log) => Ok(Some(interface.parse_log(event, log.to_raw())?)),
        None => Ok(None),
    }
}
