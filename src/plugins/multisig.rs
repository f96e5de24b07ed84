//! Multisig plugin: listed members approve until a minimum is reached.

use super::{action_tokens, PluginEstimation, PluginFamily, PluginMethods};
use crate::abi::{ContractInterface, InterfaceParams, MULTISIG};
use crate::actions::plugins::{
    decode_members_action, decode_update_multisig_settings_action, members_action,
    update_multisig_settings_action, MultisigInstall,
};
use crate::actions::{DaoAction, MultisigVotingSettings, PluginInstallItem};
use crate::adapter::ProposalShape;
use crate::config::ContractName;
use crate::context::Context;
use crate::errors::{ClientError, Result};
use crate::proposal_id::ProposalId;
use crate::steps::{StepStream, VoteStep};
use crate::subgraph::{ProposalQueries, SubgraphMultisigSettings, MULTISIG_QUERIES};
use crate::transport::GasFeeEstimation;
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::Token;
use serde_json::Value;

const FUNCTIONS: &[&str] = &["updateMultisigSettings", "addAddresses", "removeAddresses"];

/// Options of multisig proposals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultisigProposalOptions {
    /// Creator approves in the same transaction
    pub approve: bool,
    /// Execute right away when the creator's approval reaches the minimum
    pub try_execution: bool,
}

/// An approval of a multisig proposal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApprovalParams {
    pub try_execution: bool,
}

pub struct Multisig;

impl PluginFamily for Multisig {
    const NAME: &'static str = "Multisig";
    const REPO: ContractName = ContractName::MultisigRepo;
    const QUERIES: ProposalQueries = MULTISIG_QUERIES;
    const SHAPE: ProposalShape = ProposalShape::Approvals;
    const EXECUTABLE_FIELD: &'static str = "approvalReached";
    const VOTE_FUNCTION: &'static str = "approve";
    const CAN_VOTE_FUNCTION: &'static str = "canApprove";

    type ProposalOptions = MultisigProposalOptions;
    type Ballot = ApprovalParams;
    type Settings = MultisigVotingSettings;

    fn interface() -> &'static ContractInterface {
        &MULTISIG
    }

    fn create_proposal_args(
        metadata_uri: &str,
        actions: &[DaoAction],
        allow_failure_map: U256,
        start_date: u64,
        end_date: u64,
        options: &MultisigProposalOptions,
    ) -> Vec<Token> {
        vec![
            Token::Bytes(metadata_uri.as_bytes().to_vec()),
            action_tokens(actions),
            Token::Uint(allow_failure_map),
            Token::Bool(options.approve),
            Token::Bool(options.try_execution),
            Token::Uint(start_date.into()),
            Token::Uint(end_date.into()),
        ]
    }

    fn vote_args(index: U256, ballot: &ApprovalParams) -> Vec<Token> {
        vec![Token::Uint(index), Token::Bool(ballot.try_execution)]
    }

    fn can_vote_args(index: U256, approver: Address, _ballot: &ApprovalParams) -> Vec<Token> {
        vec![Token::Uint(index), Token::Address(approver)]
    }

    /// Approvals are not indexed individually
    fn vote_id(_proposal_id: &ProposalId, _voter: Address, _tx_hash: H256) -> Option<String> {
        None
    }

    fn parse_settings(entity: Value) -> Result<MultisigVotingSettings> {
        let settings: SubgraphMultisigSettings =
            serde_json::from_value(entity).map_err(|e| ClientError::MalformedRecord(e.to_string()))?;
        Ok(MultisigVotingSettings {
            only_listed: settings.only_listed,
            min_approvals: settings.min_approvals,
        })
    }
}

impl PluginMethods<Multisig> {
    pub fn approve_proposal(&self, proposal_id: &str, try_execution: bool) -> Result<StepStream<'_, VoteStep>> {
        self.vote_proposal(proposal_id, ApprovalParams { try_execution })
    }

    pub async fn can_approve(&self, proposal_id: &str, approver: &str) -> Result<bool> {
        self.can_vote(proposal_id, approver, &ApprovalParams::default()).await
    }
}

impl PluginEstimation<Multisig> {
    pub async fn approve_proposal(&self, proposal_id: &str, try_execution: bool) -> Result<GasFeeEstimation> {
        self.vote_proposal(proposal_id, &ApprovalParams { try_execution }).await
    }
}

#[derive(Clone)]
pub struct MultisigEncoding {
    ctx: Context,
}

impl MultisigEncoding {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Minimum approvals must lie between one and the member count
    pub fn plugin_install_item(&self, params: &MultisigInstall) -> Result<PluginInstallItem> {
        Ok(PluginInstallItem {
            id: self.ctx.web3().contract_address(ContractName::MultisigRepo)?,
            data: params.encode()?,
        })
    }

    pub fn add_addresses_action(&self, plugin_address: Address, members: &[Address]) -> Result<DaoAction> {
        members_action(&MULTISIG, "addAddresses", plugin_address, members)
    }

    pub fn remove_addresses_action(&self, plugin_address: Address, members: &[Address]) -> Result<DaoAction> {
        members_action(&MULTISIG, "removeAddresses", plugin_address, members)
    }

    pub fn update_multisig_voting_settings(
        &self,
        plugin_address: Address,
        settings: &MultisigVotingSettings,
    ) -> Result<DaoAction> {
        update_multisig_settings_action(&MULTISIG, plugin_address, settings)
    }
}

#[derive(Clone, Default)]
pub struct MultisigDecoding;

impl MultisigDecoding {
    pub fn new() -> Self {
        Self
    }

    pub fn add_addresses_action(&self, data: &[u8]) -> Result<Vec<Address>> {
        decode_members_action(&MULTISIG, "addAddresses", data)
    }

    pub fn remove_addresses_action(&self, data: &[u8]) -> Result<Vec<Address>> {
        decode_members_action(&MULTISIG, "removeAddresses", data)
    }

    pub fn update_multisig_voting_settings(&self, data: &[u8]) -> Result<MultisigVotingSettings> {
        decode_update_multisig_settings_action(&MULTISIG, data)
    }

    pub fn plugin_install_item(&self, data: &[u8]) -> Result<MultisigInstall> {
        MultisigInstall::decode(data)
    }

    pub fn find_interface(&self, data: &[u8]) -> Option<InterfaceParams> {
        MULTISIG.find_interface(data, FUNCTIONS)
    }
}

/// Client of Multisig plugins
#[derive(Clone)]
pub struct MultisigClient {
    pub methods: PluginMethods<Multisig>,
    pub encoding: MultisigEncoding,
    pub decoding: MultisigDecoding,
    pub estimation: PluginEstimation<Multisig>,
}

impl MultisigClient {
    pub fn new(ctx: Context) -> Self {
        Self {
            methods: PluginMethods::new(ctx.clone()),
            encoding: MultisigEncoding::new(ctx.clone()),
            decoding: MultisigDecoding::new(),
            estimation: PluginEstimation::new(ctx),
        }
    }
}
