//! Chain access over Ethereum JSON-RPC with provider failover.

use super::{
    EndpointPool, GasFeeEstimation, ReceiptLog, TransactionReceipt, TransactionRequest, Web3Service,
};
use crate::abi::ENS;
use crate::address::address_to_string;
use crate::config::{ContractName, Network, NetworkDeployment};
use crate::constants::keccak256;
use crate::errors::{ClientError, Result};
use anyhow::Context as _;
use async_trait::async_trait;
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::Token;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const RPC_TIMEOUT_SECS: u64 = 30;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

/// EIP-137 namehash of an ENS name
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let mut buffer = [0u8; 64];
        buffer[..32].copy_from_slice(&node);
        buffer[32..].copy_from_slice(&keccak256(label.as_bytes()));
        node = keccak256(&buffer);
    }
    node
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ClientError::Transport(format!("invalid hex {}: {}", value, e)))
}

fn parse_quantity(value: &str) -> Result<U256> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ClientError::Transport(format!("invalid quantity {}: {}", value, e)))
}

fn parse_h256(value: &str) -> Result<H256> {
    let bytes = decode_hex(value)?;
    if bytes.len() != 32 {
        return Err(ClientError::Transport(format!("invalid hash {}", value)));
    }
    Ok(H256::from_slice(&bytes))
}

fn parse_rpc_address(value: &str) -> Result<Address> {
    let bytes = decode_hex(value)?;
    if bytes.len() != 20 {
        return Err(ClientError::Transport(format!("invalid address {}", value)));
    }
    Ok(Address::from_slice(&bytes))
}

fn value_str(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| ClientError::Transport(format!("expected a string, got {}", value)))
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<TransactionReceipt> {
        let logs = self
            .logs
            .into_iter()
            .map(|log| {
                Ok(ReceiptLog {
                    address: parse_rpc_address(&log.address)?,
                    topics: log
                        .topics
                        .iter()
                        .map(|topic| parse_h256(topic))
                        .collect::<Result<Vec<_>>>()?,
                    data: decode_hex(&log.data)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TransactionReceipt {
            transaction_hash: parse_h256(&self.transaction_hash)?,
            block_number: parse_quantity(&self.block_number)?.low_u64(),
            status: match self.status.as_deref() {
                Some(status) => !parse_quantity(status)?.is_zero(),
                // pre-Byzantium receipts carry no status
                None => true,
            },
            logs,
        })
    }
}

/// JSON-RPC provider pool acting for an unlocked signer account
pub struct JsonRpcWeb3 {
    network: Network,
    pool: EndpointPool<url::Url>,
    signer: Option<Address>,
    deployment: NetworkDeployment,
    gas_fee_estimation_factor: f64,
    confirmation_timeout: Duration,
    http_client: reqwest::Client,
    request_id: AtomicU64,
}

impl JsonRpcWeb3 {
    pub fn new(
        network: Network,
        providers: Vec<String>,
        signer: Option<Address>,
        deployment: NetworkDeployment,
        gas_fee_estimation_factor: f64,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let providers = providers
            .iter()
            .map(|provider| {
                url::Url::parse(provider)
                    .map_err(|e| ClientError::Config(format!("invalid web3 provider {}: {}", provider, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        if providers.is_empty() {
            return Err(ClientError::NoProvider);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            network,
            pool: EndpointPool::new(providers),
            signer,
            deployment,
            gas_fee_estimation_factor,
            confirmation_timeout,
            http_client,
            request_id: AtomicU64::new(1),
        })
    }

    async fn post(&self, provider: &url::Url, body: &Value) -> anyhow::Result<RpcResponse> {
        let response = self
            .http_client
            .post(provider.clone())
            .json(body)
            .send()
            .await
            .context("Failed to reach web3 provider")?;
        if !response.status().is_success() {
            anyhow::bail!("web3 provider returned HTTP {}", response.status());
        }
        response.json().await.context("Failed to parse JSON-RPC response")
    }

    fn body(&self, method: &str, params: Value) -> Value {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
    }

    fn into_result(method: &str, response: RpcResponse) -> Result<Value> {
        if let Some(error) = response.error {
            return Err(ClientError::Transport(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Read-only request, retried on the next provider when one is unreachable
    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = self.body(method, params);
        for (index, provider) in self.pool.attempts() {
            debug!("{} via {}", method, provider);
            match self.post(provider, &body).await {
                Ok(response) => {
                    self.pool.settle(index);
                    return Self::into_result(method, response);
                }
                Err(e) => {
                    warn!("web3 provider {} failed: {:#}", provider, e);
                    self.pool.rotate(index);
                }
            }
        }
        Err(ClientError::NoEndpoints("web3"))
    }

    fn call_object(&self, tx: &TransactionRequest) -> Value {
        let mut object = json!({
            "to": address_to_string(&tx.to),
            "value": format!("0x{:x}", tx.value),
            "data": hex_data(&tx.data),
        });
        if let Some(signer) = self.signer {
            object["from"] = json!(address_to_string(&signer));
        }
        object
    }

    async fn base_fee(&self) -> Result<U256> {
        let block = self.rpc("eth_getBlockByNumber", json!(["latest", false])).await?;
        match block.get("baseFeePerGas") {
            Some(fee) => parse_quantity(value_str(fee)?),
            None => Ok(U256::zero()),
        }
    }
}

#[async_trait]
impl Web3Service for JsonRpcWeb3 {
    fn network_name(&self) -> String {
        self.network.name().to_string()
    }

    fn signer_address(&self) -> Result<Address> {
        self.signer.ok_or(ClientError::NoSigner)
    }

    fn contract_address(&self, name: ContractName) -> Result<Address> {
        self.deployment.address(name)
    }

    async fn ensure_online(&self) -> Result<()> {
        let body = self.body("eth_chainId", json!([]));
        for (index, provider) in self.pool.attempts() {
            match self.post(provider, &body).await {
                Ok(response) if response.error.is_none() => {
                    self.pool.settle(index);
                    return Ok(());
                }
                Ok(_) => warn!("web3 provider {} rejected eth_chainId", provider),
                Err(e) => warn!("web3 provider {} is offline: {:#}", provider, e),
            }
            self.pool.rotate(index);
        }
        Err(ClientError::NoEndpoints("web3"))
    }

    async fn resolve_name(&self, name: &str) -> Result<Option<Address>> {
        let registry = self.contract_address(ContractName::EnsRegistry)?;
        let node = Token::FixedBytes(namehash(name).to_vec());

        let resolver = super::call_function(self, registry, &ENS, "resolver", &[node.clone()])
            .await?
            .into_iter()
            .next()
            .and_then(Token::into_address)
            .unwrap_or_default();
        if resolver.is_zero() {
            debug!("No resolver for {}", name);
            return Ok(None);
        }

        let address = super::call_function(self, resolver, &ENS, "addr", &[node])
            .await?
            .into_iter()
            .next()
            .and_then(Token::into_address)
            .filter(|address| !address.is_zero());
        Ok(address)
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Vec<u8>> {
        let result = self
            .rpc("eth_call", json!([self.call_object(tx), "latest"]))
            .await?;
        decode_hex(value_str(&result)?)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256> {
        let result = self.rpc("eth_estimateGas", json!([self.call_object(tx)])).await?;
        parse_quantity(value_str(&result)?)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256> {
        self.signer_address()?;
        let body = self.body("eth_sendTransaction", json!([self.call_object(&tx)]));

        // never resubmitted elsewhere: the first provider may have broadcast it
        let (index, provider) = self.pool.current().ok_or(ClientError::NoEndpoints("web3"))?;
        let response = match self.post(provider, &body).await {
            Ok(response) => response,
            Err(e) => {
                self.pool.rotate(index);
                return Err(ClientError::Transport(format!("{:#}", e)));
            }
        };
        let result = Self::into_result("eth_sendTransaction", response)?;
        parse_h256(value_str(&result)?)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        let hash = hex_data(tx_hash.as_bytes());
        let deadline = Instant::now() + self.confirmation_timeout;

        loop {
            let result = self
                .rpc("eth_getTransactionReceipt", json!([hash.clone()]))
                .await?;
            if !result.is_null() {
                let receipt: RpcReceipt = serde_json::from_value(result)
                    .map_err(|e| ClientError::Transport(format!("invalid receipt: {}", e)))?;
                return receipt.into_receipt();
            }
            if Instant::now() >= deadline {
                return Err(ClientError::TransactionNotFound(hash));
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn approximate_gas_fee(&self, estimated_units: U256) -> Result<GasFeeEstimation> {
        let base_fee = self.base_fee().await?;
        let priority_fee = parse_quantity(value_str(
            &self.rpc("eth_maxPriorityFeePerGas", json!([])).await?,
        )?)?;
        let max_fee_per_gas = base_fee * U256::from(2) + priority_fee;
        let estimation = scale_gas_fee(estimated_units, max_fee_per_gas, self.gas_fee_estimation_factor);
        info!(
            "Estimated {} gas units at up to {} wei per unit",
            estimated_units, max_fee_per_gas
        );
        Ok(estimation)
    }
}

/// `max = units * maxFeePerGas`, `average = max * trunc(factor * 1000) / 1000`
pub fn scale_gas_fee(units: U256, max_fee_per_gas: U256, factor: f64) -> GasFeeEstimation {
    let max = units * max_fee_per_gas;
    let permille = (factor * 1000.0).trunc() as u64;
    GasFeeEstimation {
        average: max * U256::from(permille) / U256::from(1000),
        max,
    }
}
