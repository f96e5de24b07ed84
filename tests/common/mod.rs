// In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dao_client::config::{ContractName, NetworkDeployment};
use dao_client::errors::{ClientError, Result};
use dao_client::transport::{
    GasFeeEstimation, GraphQLService, IpfsService, ReceiptLog, TransactionReceipt, TransactionRequest,
    Web3Service,
};
use dao_client::{Context, Network};
use ethabi::ethereum_types::{Address, H256, U256};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const SIGNER: Address = Address::repeat_byte(0x99);

pub const CID_A: &str = "QmXhJ7MPBFhn6HHQYpLDKWzj1uhxB5vYcH6RjYv9TSFTSa";
pub const CID_B: &str = "QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o";

/// Chain answering simulated calls by selector and confirming transactions
/// with queued receipt logs, one entry per submitted transaction
pub struct FakeChain {
    signer: Option<Address>,
    deployment: NetworkDeployment,
    names: HashMap<String, Address>,
    calls: Mutex<HashMap<[u8; 4], Vec<u8>>>,
    receipts: Mutex<VecDeque<Vec<ReceiptLog>>>,
    sent: Mutex<Vec<TransactionRequest>>,
    simulated: Mutex<Vec<TransactionRequest>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            signer: Some(SIGNER),
            deployment: NetworkDeployment::resolve(Network::Local, &HashMap::new())
                .expect("local deployment"),
            names: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            receipts: Mutex::new(VecDeque::new()),
            sent: Mutex::new(vec![]),
            simulated: Mutex::new(vec![]),
        }
    }

    pub fn without_signer(mut self) -> Self {
        self.signer = None;
        self
    }

    pub fn with_name(mut self, name: &str, address: Address) -> Self {
        self.names.insert(name.to_string(), address);
        self
    }

    /// Answer every simulated call with this selector with `output`
    pub fn on_call(&self, selector: [u8; 4], output: Vec<u8>) {
        self.calls.lock().unwrap().insert(selector, output);
    }

    /// Logs of the next transaction to be confirmed
    pub fn push_receipt(&self, logs: Vec<ReceiptLog>) {
        self.receipts.lock().unwrap().push_back(logs);
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn simulated(&self) -> Vec<TransactionRequest> {
        self.simulated.lock().unwrap().clone()
    }

    pub fn address_of(&self, name: ContractName) -> Address {
        self.deployment.address(name).expect("built-in address")
    }
}

#[async_trait]
impl Web3Service for FakeChain {
    fn network_name(&self) -> String {
        "local".to_string()
    }

    fn signer_address(&self) -> Result<Address> {
        self.signer.ok_or(ClientError::NoSigner)
    }

    fn contract_address(&self, name: ContractName) -> Result<Address> {
        self.deployment.address(name)
    }

    async fn ensure_online(&self) -> Result<()> {
        Ok(())
    }

    async fn resolve_name(&self, name: &str) -> Result<Option<Address>> {
        Ok(self.names.get(name).copied())
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Vec<u8>> {
        self.simulated.lock().unwrap().push(tx.clone());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&tx.data[..4]);
        self.calls
            .lock()
            .unwrap()
            .get(&selector)
            .cloned()
            .ok_or_else(|| ClientError::Transport(format!("unexpected call 0x{}", hex::encode(selector))))
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<U256> {
        Ok(U256::from(100_000))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(tx);
        Ok(H256::from_low_u64_be(sent.len() as u64))
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        let logs = self.receipts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: 1,
            status: true,
            logs,
        })
    }

    async fn approximate_gas_fee(&self, estimated_units: U256) -> Result<GasFeeEstimation> {
        Ok(GasFeeEstimation {
            average: estimated_units,
            max: estimated_units * U256::from(2),
        })
    }
}

/// Indexer returning the same `data` object for every query
pub struct FakeIndexer {
    data: Option<Value>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl FakeIndexer {
    pub fn new(data: Value) -> Self {
        Self {
            data: Some(data),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            data: None,
            requests: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphQLService for FakeIndexer {
    async fn request(&self, query: &str, variables: Value) -> Result<Value> {
        self.requests.lock().unwrap().push((query.to_string(), variables));
        self.data.clone().ok_or(ClientError::NoEndpoints("GraphQL"))
    }

    async fn ensure_online(&self) -> Result<()> {
        Ok(())
    }
}

/// Content store keyed by CID; `add` hands out the configured CIDs in order
pub struct FakeIpfs {
    contents: Mutex<HashMap<String, String>>,
    next_cids: Mutex<VecDeque<String>>,
    pinned: Mutex<Vec<String>>,
}

impl FakeIpfs {
    pub fn new() -> Self {
        Self {
            contents: Mutex::new(HashMap::new()),
            next_cids: Mutex::new(VecDeque::from(vec![CID_A.to_string(), CID_B.to_string()])),
            pinned: Mutex::new(vec![]),
        }
    }

    pub fn with_content(self, cid: &str, content: &str) -> Self {
        self.contents
            .lock()
            .unwrap()
            .insert(cid.to_string(), content.to_string());
        self
    }

    pub fn pinned(&self) -> Vec<String> {
        self.pinned.lock().unwrap().clone()
    }
}

#[async_trait]
impl IpfsService for FakeIpfs {
    async fn add(&self, content: &str) -> Result<String> {
        let cid = self
            .next_cids
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ClientError::NoEndpoints("IPFS"))?;
        self.contents
            .lock()
            .unwrap()
            .insert(cid.clone(), content.to_string());
        Ok(cid)
    }

    async fn pin(&self, cid: &str) -> Result<()> {
        self.pinned.lock().unwrap().push(cid.to_string());
        Ok(())
    }

    async fn fetch_string(&self, cid: &str) -> Result<String> {
        self.contents
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| ClientError::IpfsFetch(format!("{} not found", cid)))
    }

    async fn ensure_online(&self) -> Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub indexer: Arc<FakeIndexer>,
    pub ipfs: Arc<FakeIpfs>,
}

impl Harness {
    pub fn new(chain: FakeChain, indexer: FakeIndexer, ipfs: FakeIpfs) -> Self {
        Self {
            chain: Arc::new(chain),
            indexer: Arc::new(indexer),
            ipfs: Arc::new(ipfs),
        }
    }

    pub fn context(&self) -> Context {
        Context::new(
            Network::Local,
            self.chain.clone(),
            self.indexer.clone(),
            self.ipfs.clone(),
        )
    }
}

/// Log of `event` with the given indexed topics and ABI-encoded data
pub fn event_log(
    emitter: Address,
    interface: &dao_client::abi::ContractInterface,
    event: &str,
    indexed: &[H256],
    data: &[ethabi::Token],
) -> ReceiptLog {
    let mut topics = vec![interface.event_signature(event).expect("known event")];
    topics.extend_from_slice(indexed);
    ReceiptLog {
        address: emitter,
        topics,
        data: ethabi::encode(data),
    }
}

pub fn topic(address: Address) -> H256 {
    H256::from(address)
}

pub fn uint_topic(value: u64) -> H256 {
    H256::from_low_u64_be(value)
}
