use crate::address::parse_address;
use crate::errors::{ClientError, Result};
use anyhow::Context as _;
use ethabi::ethereum_types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Networks with a known deployment of the DAO framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Goerli,
    Sepolia,
    Polygon,
    Mumbai,
    Base,
    BaseGoerli,
    BaseSepolia,
    Arbitrum,
    ArbitrumGoerli,
    ArbitrumSepolia,
    Local,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Goerli => "goerli",
            Network::Sepolia => "sepolia",
            Network::Polygon => "polygon",
            Network::Mumbai => "mumbai",
            Network::Base => "base",
            Network::BaseGoerli => "baseGoerli",
            Network::BaseSepolia => "baseSepolia",
            Network::Arbitrum => "arbitrum",
            Network::ArbitrumGoerli => "arbitrumGoerli",
            Network::ArbitrumSepolia => "arbitrumSepolia",
            Network::Local => "local",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Goerli => 5,
            Network::Sepolia => 11155111,
            Network::Polygon => 137,
            Network::Mumbai => 80001,
            Network::Base => 8453,
            Network::BaseGoerli => 84531,
            Network::BaseSepolia => 84532,
            Network::Arbitrum => 42161,
            Network::ArbitrumGoerli => 421613,
            Network::ArbitrumSepolia => 421614,
            Network::Local => 31337,
        }
    }

    /// Name of the network as the indexer deployments spell it
    fn indexer_name(&self) -> &'static str {
        match self {
            Network::Base => "baseMainnet",
            other => other.name(),
        }
    }

    pub fn default_graphql_node(&self) -> String {
        format!(
            "https://subgraph.satsuma-prod.com/qHR2wGfc5RLi6/aragon/osx-{}/version/v1.4.0/api",
            self.indexer_name()
        )
    }

    pub fn default_ipfs_node(&self) -> String {
        match self {
            Network::Mainnet | Network::Polygon | Network::Base | Network::Arbitrum => {
                "https://prod.ipfs.aragon.network/api/v0".to_string()
            }
            _ => "https://test.ipfs.aragon.network/api/v0".to_string(),
        }
    }

    /// Built-in contract addresses; only the local development chain ships them
    fn builtin_deployment(&self) -> HashMap<ContractName, &'static str> {
        match self {
            Network::Local => HashMap::from([
                (ContractName::DaoFactory, "0x4ed7c70f96b99c776995fb64377f0d4ab3b0e1c1"),
                (ContractName::PluginSetupProcessor, "0x59b670e9fa9d0a427751af201d676719a970857b"),
                (ContractName::MultisigRepo, "0xd235571a8ed990638699d87c1e7527f576c91ab7"),
                (ContractName::AdminRepo, "0x8755d348e575fc4a68ec5d0b609bc7c070ebea3d"),
                (ContractName::AddresslistVotingRepo, "0x624dc0ecefd94640d316ee3acfd147ed9b764638"),
                (ContractName::TokenVotingRepo, "0x94cd1b4dea480e09a1e0d83f6c92b9a5c6136171"),
                (ContractName::MultisigSetup, "0xc3e53f4d16ae77db1c982e75a937b9f60fe63690"),
                (ContractName::AdminSetup, "0xe6e340d132b5f46d1e472debcd681b2abc16e57e"),
                (ContractName::AddresslistVotingSetup, "0x7a2088a1bfc9d81c55368ae168c2c02570cb814f"),
                (ContractName::TokenVotingSetup, "0x67d269191c92caf3cd7723f116c85e6e9bf55933"),
                (ContractName::EnsRegistry, "0xdc64a140aa3e981100a9beca4e685f962f0cf6c9"),
            ]),
            _ => HashMap::new(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let network = match s {
            "mainnet" | "homestead" => Network::Mainnet,
            "goerli" => Network::Goerli,
            "sepolia" => Network::Sepolia,
            "polygon" | "matic" => Network::Polygon,
            "mumbai" | "maticmum" => Network::Mumbai,
            "base" => Network::Base,
            "baseGoerli" => Network::BaseGoerli,
            "baseSepolia" => Network::BaseSepolia,
            "arbitrum" => Network::Arbitrum,
            "arbitrumGoerli" => Network::ArbitrumGoerli,
            "arbitrumSepolia" => Network::ArbitrumSepolia,
            "local" => Network::Local,
            other => return Err(ClientError::UnsupportedNetwork(other.to_string())),
        };
        Ok(network)
    }
}

/// Contract roles the client needs an address for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractName {
    DaoFactory,
    PluginSetupProcessor,
    MultisigRepo,
    AdminRepo,
    AddresslistVotingRepo,
    TokenVotingRepo,
    MultisigSetup,
    AdminSetup,
    AddresslistVotingSetup,
    TokenVotingSetup,
    EnsRegistry,
}

impl ContractName {
    pub const ALL: [ContractName; 11] = [
        ContractName::DaoFactory,
        ContractName::PluginSetupProcessor,
        ContractName::MultisigRepo,
        ContractName::AdminRepo,
        ContractName::AddresslistVotingRepo,
        ContractName::TokenVotingRepo,
        ContractName::MultisigSetup,
        ContractName::AdminSetup,
        ContractName::AddresslistVotingSetup,
        ContractName::TokenVotingSetup,
        ContractName::EnsRegistry,
    ];

    /// Key used for this role in config files
    pub fn key(&self) -> &'static str {
        match self {
            ContractName::DaoFactory => "daoFactory",
            ContractName::PluginSetupProcessor => "pluginSetupProcessor",
            ContractName::MultisigRepo => "multisigRepo",
            ContractName::AdminRepo => "adminRepo",
            ContractName::AddresslistVotingRepo => "addresslistVotingRepo",
            ContractName::TokenVotingRepo => "tokenVotingRepo",
            ContractName::MultisigSetup => "multisigSetup",
            ContractName::AdminSetup => "adminSetup",
            ContractName::AddresslistVotingSetup => "addresslistVotingSetup",
            ContractName::TokenVotingSetup => "tokenVotingSetup",
            ContractName::EnsRegistry => "ensRegistry",
        }
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ContractName {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        ContractName::ALL
            .into_iter()
            .find(|name| name.key() == s)
            .ok_or_else(|| ClientError::Config(format!("unknown contract role: {}", s)))
    }
}

/// Resolved contract addresses for one network
#[derive(Debug, Clone, Default)]
pub struct NetworkDeployment {
    addresses: HashMap<ContractName, Address>,
}

impl NetworkDeployment {
    /// Built-in addresses for `network`, with `overrides` applied on top
    pub fn resolve(network: Network, overrides: &HashMap<String, String>) -> Result<Self> {
        let mut addresses = HashMap::new();
        for (name, address) in network.builtin_deployment() {
            addresses.insert(name, parse_address(address)?);
        }
        for (key, address) in overrides {
            let name: ContractName = key.parse()?;
            let parsed = parse_address(address)
                .map_err(|_| ClientError::Config(format!("invalid address for {}: {}", key, address)))?;
            addresses.insert(name, parsed);
        }
        Ok(Self { addresses })
    }

    pub fn address(&self, name: ContractName) -> Result<Address> {
        self.addresses
            .get(&name)
            .copied()
            .ok_or_else(|| ClientError::MissingContractAddress(name.to_string()))
    }
}

/// An IPFS API endpoint with optional extra headers (API keys)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpfsEndpoint {
    pub url: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Parameters the client context is built from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    pub network: String,
    pub web3_providers: Vec<String>,
    /// Unlocked account used as `from` of submitted transactions
    pub signer: Option<String>,
    pub graphql_nodes: Vec<String>,
    pub ipfs_nodes: Vec<IpfsEndpoint>,
    pub gas_fee_estimation_factor: f64,
    pub multi_fetch_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    /// Contract addresses keyed by role (`daoFactory`, `pluginSetupProcessor`, ...)
    pub deployment: HashMap<String, String>,
}

impl Default for ContextParams {
    fn default() -> Self {
        let network = Network::Local;
        Self {
            network: network.name().to_string(),
            web3_providers: vec!["http://127.0.0.1:8545".to_string()],
            signer: None,
            graphql_nodes: vec![network.default_graphql_node()],
            ipfs_nodes: vec![IpfsEndpoint {
                url: network.default_ipfs_node(),
                headers: HashMap::new(),
            }],
            gas_fee_estimation_factor: 0.625,
            multi_fetch_timeout_secs: 7,
            confirmation_timeout_secs: 120,
            deployment: HashMap::new(),
        }
    }
}

impl ContextParams {
    /// Defaults for a given network
    pub fn for_network(network: Network) -> Self {
        Self {
            network: network.name().to_string(),
            graphql_nodes: vec![network.default_graphql_node()],
            ipfs_nodes: vec![IpfsEndpoint {
                url: network.default_ipfs_node(),
                headers: HashMap::new(),
            }],
            ..Self::default()
        }
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ClientError::Config("Cannot find config directory".to_string()))?;
        Ok(config_dir.join("dao-client").join("config.toml"))
    }

    /// Load config from the default location, creating it when missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let params = Self::default();
            params.save_to(&path)?;
            return Ok(params);
        }

        Self::from_file(&path)
    }

    /// Load config from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let params: ContextParams =
            toml::from_str(&contents).context("Failed to parse config file")?;
        params.validate()?;
        Ok(params)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    pub fn network(&self) -> Result<Network> {
        self.network.parse()
    }

    pub fn validate(&self) -> Result<()> {
        self.network()?;

        if self.web3_providers.is_empty() {
            return Err(ClientError::NoProvider);
        }
        for url in self.web3_providers.iter().chain(self.graphql_nodes.iter()) {
            url::Url::parse(url)
                .map_err(|e| ClientError::Config(format!("invalid endpoint {}: {}", url, e)))?;
        }
        for node in &self.ipfs_nodes {
            url::Url::parse(&node.url)
                .map_err(|e| ClientError::Config(format!("invalid IPFS endpoint {}: {}", node.url, e)))?;
        }
        for key in self.deployment.keys() {
            key.parse::<ContractName>()?;
        }
        if let Some(signer) = &self.signer {
            parse_address(signer)?;
        }
        if !(self.gas_fee_estimation_factor > 0.0 && self.gas_fee_estimation_factor <= 1.0) {
            return Err(ClientError::Config(format!(
                "gas_fee_estimation_factor must be in (0, 1], got {}",
                self.gas_fee_estimation_factor
            )));
        }
        if self.multi_fetch_timeout_secs == 0 {
            return Err(ClientError::Config(
                "multi_fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_params_default() {
        let params = ContextParams::default();
        assert_eq!(params.network, "local");
        assert_eq!(params.multi_fetch_timeout_secs, 7);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_network_parse() {
        assert_eq!("baseSepolia".parse::<Network>().unwrap(), Network::BaseSepolia);
        assert_eq!("homestead".parse::<Network>().unwrap(), Network::Mainnet);
        let err = "solana".parse::<Network>().unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedNetwork(_)));
    }

    #[test]
    fn test_graphql_node_uses_indexer_names() {
        assert!(Network::Base.default_graphql_node().contains("osx-baseMainnet"));
        assert!(Network::Sepolia.default_graphql_node().contains("osx-sepolia"));
    }

    #[test]
    fn test_local_deployment_is_builtin() {
        let deployment = NetworkDeployment::resolve(Network::Local, &HashMap::new()).unwrap();
        assert!(deployment.address(ContractName::DaoFactory).is_ok());
    }

    #[test]
    fn test_missing_deployment_address() {
        let deployment = NetworkDeployment::resolve(Network::Mainnet, &HashMap::new()).unwrap();
        let err = deployment.address(ContractName::DaoFactory).unwrap_err();
        assert!(matches!(err, ClientError::MissingContractAddress(_)));
    }

    #[test]
    fn test_deployment_override() {
        let overrides = HashMap::from([(
            "daoFactory".to_string(),
            "0x1111111111111111111111111111111111111111".to_string(),
        )]);
        let deployment = NetworkDeployment::resolve(Network::Mainnet, &overrides).unwrap();
        assert_eq!(
            deployment.address(ContractName::DaoFactory).unwrap(),
            Address::repeat_byte(0x11)
        );
    }

    #[test]
    fn test_unknown_deployment_role() {
        let overrides = HashMap::from([(
            "bridge".to_string(),
            "0x1111111111111111111111111111111111111111".to_string(),
        )]);
        assert!(NetworkDeployment::resolve(Network::Mainnet, &overrides).is_err());
    }

    #[test]
    fn test_invalid_gas_factor() {
        let params = ContextParams {
            gas_fee_estimation_factor: 1.5,
            ..ContextParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_params_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut params = ContextParams::for_network(Network::Sepolia);
        params.deployment.insert(
            "pluginSetupProcessor".to_string(),
            "0x2222222222222222222222222222222222222222".to_string(),
        );
        params.save_to(&path).unwrap();

        let loaded = ContextParams::from_file(&path).unwrap();
        assert_eq!(loaded.network, "sepolia");
        assert_eq!(loaded.graphql_nodes, params.graphql_nodes);
        assert_eq!(loaded.deployment, params.deployment);
    }

    #[test]
    fn test_params_deserialization_with_defaults() {
        let toml_str = r#"
            network = "polygon"
            web3_providers = ["https://polygon-rpc.com"]
        "#;

        let params: ContextParams = toml::from_str(toml_str).unwrap();
        assert_eq!(params.network().unwrap(), Network::Polygon);
        assert_eq!(params.gas_fee_estimation_factor, 0.625);
    }
}
