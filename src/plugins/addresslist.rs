//! One-member-one-vote majority voting over an address list.

use super::{
    majority_create_args, majority_settings, MajorityProposalOptions, PluginEstimation, PluginFamily,
    PluginMethods,
};
use crate::abi::{ContractInterface, InterfaceParams, ADDRESSLIST_VOTING};
use crate::actions::plugins::{
    decode_members_action, decode_update_voting_settings_action, members_action,
    update_voting_settings_action, AddresslistVotingInstall,
};
use crate::actions::{DaoAction, PluginInstallItem, RatioScale, VoteValue, VotingSettings};
use crate::adapter::ProposalShape;
use crate::config::ContractName;
use crate::context::Context;
use crate::errors::Result;
use crate::proposal_id::ProposalId;
use crate::subgraph::{ProposalQueries, ADDRESSLIST_VOTING_QUERIES};
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::Token;
use serde_json::Value;

/// Ratios are passed to the contract as percentages
pub const ADDRESSLIST_VOTING_SCALE: RatioScale = RatioScale {
    digits: 2,
    precision: 2,
};

/// The indexer stores ratios with 18 decimals; they are read back to hundredths
pub const ADDRESSLIST_VOTING_INDEXER_SCALE: RatioScale = RatioScale {
    digits: 18,
    precision: 2,
};

const FUNCTIONS: &[&str] = &["updateVotingSettings", "addAddresses", "removeAddresses"];

pub struct AddresslistVoting;

impl PluginFamily for AddresslistVoting {
    const NAME: &'static str = "AddresslistVoting";
    const REPO: ContractName = ContractName::AddresslistVotingRepo;
    const QUERIES: ProposalQueries = ADDRESSLIST_VOTING_QUERIES;
    const SHAPE: ProposalShape = ProposalShape::Majority {
        scale: ADDRESSLIST_VOTING_INDEXER_SCALE,
        weighted: false,
    };
    const EXECUTABLE_FIELD: &'static str = "executable";
    const VOTE_FUNCTION: &'static str = "vote";
    const CAN_VOTE_FUNCTION: &'static str = "canVote";

    type ProposalOptions = MajorityProposalOptions;
    type Ballot = VoteValue;
    type Settings = VotingSettings;

    fn interface() -> &'static ContractInterface {
        &ADDRESSLIST_VOTING
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

    fn vote_id(proposal_id: &ProposalId, voter: Address, _tx_hash: H256) -> Option<String> {
        Some(format!("{}_{:?}", proposal_id, voter))
    }

    fn parse_settings(entity: Value) -> Result<VotingSettings> {
        majority_settings(entity, ADDRESSLIST_VOTING_INDEXER_SCALE)
    }
}

#[derive(Clone)]
pub struct AddresslistVotingEncoding {
    ctx: Context,
}

impl AddresslistVotingEncoding {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn plugin_install_item(&self, params: &AddresslistVotingInstall) -> Result<PluginInstallItem> {
        Ok(PluginInstallItem {
            id: self.ctx.web3().contract_address(ContractName::AddresslistVotingRepo)?,
            data: params.encode(ADDRESSLIST_VOTING_SCALE)?,
        })
    }

    pub fn update_plugin_settings_action(
        &self,
        plugin_address: Address,
        settings: &VotingSettings,
    ) -> Result<DaoAction> {
        update_voting_settings_action(&ADDRESSLIST_VOTING, plugin_address, settings, ADDRESSLIST_VOTING_SCALE)
    }

    pub fn add_members_action(&self, plugin_address: Address, members: &[Address]) -> Result<DaoAction> {
        members_action(&ADDRESSLIST_VOTING, "addAddresses", plugin_address, members)
    }

    pub fn remove_members_action(&self, plugin_address: Address, members: &[Address]) -> Result<DaoAction> {
        members_action(&ADDRESSLIST_VOTING, "removeAddresses", plugin_address, members)
    }
}

#[derive(Clone, Default)]
pub struct AddresslistVotingDecoding;

impl AddresslistVotingDecoding {
    pub fn new() -> Self {
        Self
    }

    pub fn update_plugin_settings_action(&self, data: &[u8]) -> Result<VotingSettings> {
        decode_update_voting_settings_action(&ADDRESSLIST_VOTING, data, ADDRESSLIST_VOTING_SCALE)
    }

    pub fn add_members_action(&self, data: &[u8]) -> Result<Vec<Address>> {
        decode_members_action(&ADDRESSLIST_VOTING, "addAddresses", data)
    }

    pub fn remove_members_action(&self, data: &[u8]) -> Result<Vec<Address>> {
        decode_members_action(&ADDRESSLIST_VOTING, "removeAddresses", data)
    }

    pub fn plugin_install_item(&self, data: &[u8]) -> Result<AddresslistVotingInstall> {
        AddresslistVotingInstall::decode(data, ADDRESSLIST_VOTING_SCALE)
    }

    pub fn find_interface(&self, data: &[u8]) -> Option<InterfaceParams> {
        ADDRESSLIST_VOTING.find_interface(data, FUNCTIONS)
    }
}

/// Client of AddresslistVoting plugins
#[derive(Clone)]
pub struct AddresslistVotingClient {
    pub methods: PluginMethods<AddresslistVoting>,
    pub encoding: AddresslistVotingEncoding,
    pub decoding: AddresslistVotingDecoding,
    pub estimation: PluginEstimation<AddresslistVoting>,
}

impl AddresslistVotingClient {
    pub fn new(ctx: Context) -> Self {
        Self {
            methods: PluginMethods::new(ctx.clone()),
            encoding: AddresslistVotingEncoding::new(ctx.clone()),
            decoding: AddresslistVotingDecoding::new(),
            estimation: PluginEstimation::new(ctx),
        }
    }
}
