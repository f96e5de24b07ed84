//! Token-weighted majority voting.

use super::{
    majority_create_args, majority_settings, MajorityProposalOptions, PluginEstimation, PluginFamily,
    PluginMethods,
};
use crate::abi::{ContractInterface, InterfaceParams, ERC20, TOKEN_VOTING};
use crate::actions::plugins::{
    decode_mint_token_action, decode_update_voting_settings_action, mint_token_action,
    update_voting_settings_action, MintTokenParams, TokenVotingInstall,
};
use crate::actions::{DaoAction, PluginInstallItem, RatioScale, VoteValue, VotingSettings};
use crate::adapter::ProposalShape;
use crate::config::ContractName;
use crate::context::Context;
use crate::errors::Result;
use crate::proposal_id::ProposalId;
use crate::subgraph::{ProposalQueries, TOKEN_VOTING_QUERIES};
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::Token;
use serde_json::Value;

/// Ratios are stored with 18 decimals
pub const TOKEN_VOTING_SCALE: RatioScale = RatioScale {
    digits: 18,
    precision: 18,
};

const FUNCTIONS: &[&str] = &["updateVotingSettings"];

pub struct TokenVoting;

impl PluginFamily for TokenVoting {
    const NAME: &'static str = "TokenVoting";
    const REPO: ContractName = ContractName::TokenVotingRepo;
    const QUERIES: ProposalQueries = TOKEN_VOTING_QUERIES;
    const SHAPE: ProposalShape = ProposalShape::Majority {
        scale: TOKEN_VOTING_SCALE,
        weighted: true,
    };
    const EXECUTABLE_FIELD: &'static str = "executable";
    const VOTE_FUNCTION: &'static str = "vote";
    const CAN_VOTE_FUNCTION: &'static str = "canVote";

    type ProposalOptions = MajorityProposalOptions;
    type Ballot = VoteValue;
    type Settings = VotingSettings;

    fn interface() -> &'static ContractInterface {
        &TOKEN_VOTING
    }

    fn create_proposal_args(
        metadata_uri: &str,
        actions: &[DaoAction],
        allow_failure_map: U256,
        start_date: u64,
        end_date: u64,
        options: &MajorityProposalOptions,
    ) -> Vec<Token> {
        majority_create_args(metadata_uri, actions, allow_failure_map, start_date, end_date, options)
    }

    fn vote_args(index: U256, vote: &VoteValue) -> Vec<Token> {
        vec![
            Token::Uint(index),
            Token::Uint(vote.to_u8().into()),
            Token::Bool(false),
        ]
    }

    fn can_vote_args(index: U256, voter: Address, vote: &VoteValue) -> Vec<Token> {
        vec![
            Token::Uint(index),
            Token::Address(voter),
            Token::Uint(vote.to_u8().into()),
        ]
    }

    /// Votes are indexed per proposal and voter
    fn vote_id(proposal_id: &ProposalId, voter: Address, _tx_hash: H256) -> Option<String> {
        Some(format!("{}_{:?}", proposal_id, voter))
    }

    fn parse_settings(entity: Value) -> Result<VotingSettings> {
        majority_settings(entity, TOKEN_VOTING_SCALE)
    }
}

#[derive(Clone)]
pub struct TokenVotingEncoding {
    ctx: Context,
}

impl TokenVotingEncoding {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Install item for DAO creation or installation preparation
    pub fn plugin_install_item(&self, params: &TokenVotingInstall) -> Result<PluginInstallItem> {
        Ok(PluginInstallItem {
            id: self.ctx.web3().contract_address(ContractName::TokenVotingRepo)?,
            data: params.encode(TOKEN_VOTING_SCALE)?,
        })
    }

    pub fn update_plugin_settings_action(
        &self,
        plugin_address: Address,
        settings: &VotingSettings,
    ) -> Result<DaoAction> {
        update_voting_settings_action(&TOKEN_VOTING, plugin_address, settings, TOKEN_VOTING_SCALE)
    }

    pub fn mint_token_action(&self, token_address: Address, params: &MintTokenParams) -> Result<DaoAction> {
        mint_token_action(token_address, params)
    }
}

#[derive(Clone, Default)]
pub struct TokenVotingDecoding;

impl TokenVotingDecoding {
    pub fn new() -> Self {
        Self
    }

    pub fn update_plugin_settings_action(&self, data: &[u8]) -> Result<VotingSettings> {
        decode_update_voting_settings_action(&TOKEN_VOTING, data, TOKEN_VOTING_SCALE)
    }

    pub fn mint_token_action(&self, data: &[u8]) -> Result<MintTokenParams> {
        decode_mint_token_action(data)
    }

    pub fn plugin_install_item(&self, data: &[u8]) -> Result<TokenVotingInstall> {
        TokenVotingInstall::decode(data, TOKEN_VOTING_SCALE)
    }

    pub fn find_interface(&self, data: &[u8]) -> Option<InterfaceParams> {
        TOKEN_VOTING
            .find_interface(data, FUNCTIONS)
            .or_else(|| ERC20.find_interface(data, &["mint"]))
    }
}

/// Client of TokenVoting plugins
#[derive(Clone)]
pub struct TokenVotingClient {
    pub methods: PluginMethods<TokenVoting>,
    pub encoding: TokenVotingEncoding,
    pub decoding: TokenVotingDecoding,
    pub estimation: PluginEstimation<TokenVoting>,
}

impl TokenVotingClient {
    pub fn new(ctx: Context) -> Self {
        Self {
            methods: PluginMethods::new(ctx.clone()),
            encoding: TokenVotingEncoding::new(ctx.clone()),
            decoding: TokenVotingDecoding::new(),
            estimation: PluginEstimation::new(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::plugins::VotingToken;
    use crate::actions::VotingMode;
    use crate::config::Network;
    use crate::errors::ClientError;
    use crate::transport::{MockGraphQLService, MockIpfsService, MockWeb3Service};
    use std::sync::Arc;

    fn client() -> TokenVotingClient {
        let mut web3 = MockWeb3Service::new();
        web3.expect_contract_address()
            .returning(|_| Ok(Address::repeat_byte(0x70)));
        TokenVotingClient::new(Context::new(
            Network::Local,
            Arc::new(web3),
            Arc::new(MockGraphQLService::new()),
            Arc::new(MockIpfsService::new()),
        ))
    }

    fn settings() -> VotingSettings {
        VotingSettings {
            support_threshold: 0.5,
            min_participation: 0.25,
            min_duration: 7200,
            min_proposer_voting_power: Some(U256::from(1)),
            voting_mode: Some(VotingMode::VoteReplacement),
        }
    }

    #[test]
    fn test_settings_action_roundtrip() {
        let client = client();
        let plugin = Address::repeat_byte(0x12);
        let action = client
            .encoding
            .update_plugin_settings_action(plugin, &settings())
            .unwrap();
        assert_eq!(action.to, plugin);
        assert_eq!(client.decoding.update_plugin_settings_action(&action.data).unwrap(), settings());

        let found = client.decoding.find_interface(&action.data).unwrap();
        assert_eq!(found.function_name, "updateVotingSettings");
    }

    #[test]
    fn test_settings_action_validates() {
        let mut short = settings();
        short.min_duration = 60;
        assert!(matches!(
            client().encoding.update_plugin_settings_action(Address::zero(), &short),
            Err(ClientError::InvalidVotingSettings(_))
        ));
    }

    #[test]
    fn test_mint_is_not_a_settings_update() {
        let client = client();
        let mint = client
            .encoding
            .mint_token_action(
                Address::repeat_byte(0x44),
                &MintTokenParams {
                    address: Address::repeat_byte(0x45),
                    amount: U256::from(10),
                },
            )
            .unwrap();
        assert!(matches!(
            client.decoding.update_plugin_settings_action(&mint.data),
            Err(ClientError::UnexpectedAction { .. })
        ));
        assert_eq!(
            client.decoding.find_interface(&mint.data).unwrap().function_name,
            "mint"
        );
    }

    #[test]
    fn test_install_item_uses_repo() {
        let client = client();
        let install = TokenVotingInstall {
            voting_settings: settings(),
            token: VotingToken::New {
                name: "Governance".to_string(),
                symbol: "GOV".to_string(),
                balances: vec![(Address::repeat_byte(1), U256::from(100))],
            },
        };
        let item = client.encoding.plugin_install_item(&install).unwrap();
        assert_eq!(item.id, Address::repeat_byte(0x70));
        assert_eq!(client.decoding.plugin_install_item(&item.data).unwrap(), install);
    }

    #[test]
    fn test_vote_id() {
        let id = ProposalId::new(Address::repeat_byte(0xab), U256::from(1));
        let vote_id = TokenVoting::vote_id(&id, Address::repeat_byte(0xcd), H256::zero()).unwrap();
        assert_eq!(
            vote_id,
            "0xabababababababababababababababababababab_0x1_0xcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcd"
        );
    }
}
