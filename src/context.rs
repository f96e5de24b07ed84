use crate::address::parse_address;
use crate::config::{ContextParams, Network, NetworkDeployment};
use crate::constants::MULTI_FETCH_TIMEOUT;
use crate::errors::Result;
use crate::transport::{
    GraphQLService, HttpGraphQL, HttpIpfs, IpfsService, JsonRpcWeb3, Web3Service,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared collaborators handed to every facade.
///
/// Cloning is cheap; clones share the same services and therefore the same
/// endpoint rotation state.
#[derive(Clone)]
pub struct Context {
    network: Network,
    web3: Arc<dyn Web3Service>,
    graphql: Arc<dyn GraphQLService>,
    ipfs: Arc<dyn IpfsService>,
    multi_fetch_timeout: Duration,
}

impl Context {
    pub fn new(
        network: Network,
        web3: Arc<dyn Web3Service>,
        graphql: Arc<dyn GraphQLService>,
        ipfs: Arc<dyn IpfsService>,
    ) -> Self {
        Self {
            network,
            web3,
            graphql,
            ipfs,
            multi_fetch_timeout: MULTI_FETCH_TIMEOUT,
        }
    }

    pub fn with_multi_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.multi_fetch_timeout = timeout;
        self
    }

    /// Build the HTTP-backed collaborators described by `params`
    pub fn from_params(params: &ContextParams) -> Result<Self> {
        params.validate()?;
        let network = params.network()?;
        let deployment = NetworkDeployment::resolve(network, &params.deployment)?;
        let signer = params.signer.as_deref().map(parse_address).transpose()?;

        let web3 = JsonRpcWeb3::new(
            network,
            params.web3_providers.clone(),
            signer,
            deployment,
            params.gas_fee_estimation_factor,
            Duration::from_secs(params.confirmation_timeout_secs),
        )?;
        let graphql_nodes = if params.graphql_nodes.is_empty() {
            vec![network.default_graphql_node()]
        } else {
            params.graphql_nodes.clone()
        };
        let graphql = HttpGraphQL::new(graphql_nodes)?;
        let ipfs = HttpIpfs::new(params.ipfs_nodes.clone())?;

        info!(
            "Client context ready for {} ({} web3 providers, {} IPFS nodes)",
            network,
            params.web3_providers.len(),
            params.ipfs_nodes.len()
        );

        Ok(Self::new(network, Arc::new(web3), Arc::new(graphql), Arc::new(ipfs))
            .with_multi_fetch_timeout(Duration::from_secs(params.multi_fetch_timeout_secs)))
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn web3(&self) -> &dyn Web3Service {
        self.web3.as_ref()
    }

    pub fn graphql(&self) -> &dyn GraphQLService {
        self.graphql.as_ref()
    }

    pub fn ipfs(&self) -> &dyn IpfsService {
        self.ipfs.as_ref()
    }

    /// Per-record time box of batch metadata fetches
    pub fn multi_fetch_timeout(&self) -> Duration {
        self.multi_fetch_timeout
    }
}
