//! Governance plugin clients.
//!
//! The three families share one engine, [`PluginMethods`], configured by a
//! [`PluginFamily`] record: contract interface, indexer documents, ratio
//! scale and the argument layout of their proposal and voting calls.

pub mod addresslist;
pub mod multisig;
pub mod token_voting;

pub use addresslist::{AddresslistVoting, AddresslistVotingClient};
pub use multisig::{Multisig, MultisigClient};
pub use token_voting::{TokenVoting, TokenVotingClient};

use crate::abi::{log_param, ContractInterface};
use crate::actions::{
    bool_array_to_bitmap, DaoAction, RatioScale, VersionTag, VoteValue, VotingMode, VotingSettings,
};
use crate::adapter::{
    parse_big, parse_record_address, to_detail, to_summary, ProposalDetail, ProposalShape, ProposalSummary,
};
use crate::address::{address_to_string, parse_address, resolve_address_or_ens};
use crate::config::ContractName;
use crate::context::Context;
use crate::errors::{ClientError, Result};
use crate::installation::{prepare_installation, PrepareInstallationParams};
use crate::metadata::{pin_json, resolve_metadata, ProposalMetadata};
use crate::proposal_id::{decode_proposal_id, ProposalId};
use crate::status::{ProposalStatus, StatusFilter};
use crate::steps::{self, ExecuteStep, PrepareInstallationStep, ProposalCreationStep, StepStream, VoteStep};
use crate::subgraph::{ProposalQueries, SortDirection, SubgraphMembers, SubgraphProposal, SubgraphVotingSettings};
use crate::transport::{
    call_function, confirm, estimate_fee, find_event, submit, GasFeeEstimation, TransactionRequest,
};
use async_stream::try_stream;
use chrono::{DateTime, Utc};
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::Token;
use futures::future::join_all;
use serde_json::{json, Value};
use std::marker::PhantomData;
use tracing::{debug, info};

/// Length of `ipfs://` plus a CIDv0, used to size calldata when estimating
/// a proposal whose metadata is not pinned yet
const PLACEHOLDER_METADATA_URI: &str = "ipfs://QmXhJ7MPBFhn6HHQYpLDKWzj1uhxB5vYcH6RjYv9TSFTSa";

/// Per-family configuration of the plugin engine
pub trait PluginFamily: Send + Sync + 'static {
    /// Human name used in error messages
    const NAME: &'static str;
    const REPO: ContractName;
    const QUERIES: ProposalQueries;
    const SHAPE: ProposalShape;
    /// Indexer field of the "threshold reached" flag
    const EXECUTABLE_FIELD: &'static str;
    /// `vote` or `approve`
    const VOTE_FUNCTION: &'static str;
    /// `canVote` or `canApprove`
    const CAN_VOTE_FUNCTION: &'static str;

    /// Family-specific choices made when creating a proposal
    type ProposalOptions: Send + Sync;
    /// What a member submits when voting or approving
    type Ballot: Send + Sync;
    type Settings: Send;

    fn interface() -> &'static ContractInterface;

    /// Arguments of `createProposal`
    fn create_proposal_args(
        metadata_uri: &str,
        actions: &[DaoAction],
        allow_failure_map: U256,
        start_date: u64,
        end_date: u64,
        options: &Self::ProposalOptions,
    ) -> Vec<Token>;

    fn vote_args(index: U256, ballot: &Self::Ballot) -> Vec<Token>;

    fn can_vote_args(index: U256, voter: Address, ballot: &Self::Ballot) -> Vec<Token>;

    /// Identifier reported once a vote is confirmed
    fn vote_id(proposal_id: &ProposalId, voter: Address, tx_hash: H256) -> Option<String>;

    fn parse_settings(entity: Value) -> Result<Self::Settings>;
}

/// Proposal metadata, either already pinned or to be pinned on creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalMetadataInput {
    Uri(String),
    Content(ProposalMetadata),
}

#[derive(Debug, Clone)]
pub struct CreateProposalParams<O> {
    pub plugin_address: String,
    pub metadata: ProposalMetadataInput,
    pub actions: Vec<DaoAction>,
    /// Empty, or one flag per action
    pub fail_safe_actions: Vec<bool>,
    /// Unset dates let the plugin pick "now" and the minimum duration
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub options: O,
}

/// Options of majority-voting proposals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MajorityProposalOptions {
    /// Vote cast by the creator in the same transaction
    pub creator_vote: Option<VoteValue>,
    pub execute_on_pass: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProposalSortBy {
    #[default]
    CreatedAt,
    StartDate,
    EndDate,
}

impl ProposalSortBy {
    fn field(&self) -> &'static str {
        match self {
            ProposalSortBy::CreatedAt => "createdAt",
            ProposalSortBy::StartDate => "startDate",
            ProposalSortBy::EndDate => "endDate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalQueryParams {
    pub dao_address_or_ens: Option<String>,
    pub status: Option<ProposalStatus>,
    pub limit: u32,
    pub skip: u32,
    pub direction: SortDirection,
    pub sort_by: ProposalSortBy,
}

impl Default for ProposalQueryParams {
    fn default() -> Self {
        Self {
            dao_address_or_ens: None,
            status: None,
            limit: 10,
            skip: 0,
            direction: SortDirection::Asc,
            sort_by: ProposalSortBy::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMember {
    pub address: Address,
    /// Set by families with weighted membership
    pub voting_power: Option<U256>,
}

fn timestamp(date: Option<DateTime<Utc>>) -> u64 {
    date.map_or(0, |date| date.timestamp().max(0) as u64)
}

pub(crate) fn action_tokens(actions: &[DaoAction]) -> Token {
    Token::Array(actions.iter().map(DaoAction::to_token).collect())
}

/// `createProposal` arguments of the majority-voting families
pub(crate) fn majority_create_args(
    metadata_uri: &str,
    actions: &[DaoAction],
    allow_failure_map: U256,
    start_date: u64,
    end_date: u64,
    options: &MajorityProposalOptions,
) -> Vec<Token> {
    vec![
        Token::Bytes(metadata_uri.as_bytes().to_vec()),
        action_tokens(actions),
        Token::Uint(allow_failure_map),
        Token::Uint(start_date.into()),
        Token::Uint(end_date.into()),
        Token::Uint(options.creator_vote.map_or(0u8, VoteValue::to_u8).into()),
        Token::Bool(options.execute_on_pass),
    ]
}

/// Voting settings entity of the majority-voting families
pub(crate) fn majority_settings(entity: Value, scale: RatioScale) -> Result<VotingSettings> {
    let settings: SubgraphVotingSettings = serde_json::from_value(entity)
        .map_err(|e| ClientError::MalformedRecord(e.to_string()))?;
    Ok(VotingSettings {
        support_threshold: scale.decode(parse_big("supportThreshold", &settings.support_threshold)?)?,
        min_participation: scale.decode(parse_big("minParticipation", &settings.min_participation)?)?,
        min_duration: settings
            .min_duration
            .parse()
            .map_err(|_| ClientError::MalformedRecord(format!("minDuration: {:?}", settings.min_duration)))?,
        min_proposer_voting_power: Some(parse_big(
            "minProposerVotingPower",
            &settings.min_proposer_voting_power,
        )?),
        voting_mode: Some(VotingMode::from_indexer(&settings.voting_mode)?),
    })
}

/// Proposal lifecycle and indexer reads of one plugin family
pub struct PluginMethods<F: PluginFamily> {
    ctx: Context,
    _family: PhantomData<F>,
}

impl<F: PluginFamily> Clone for PluginMethods<F> {
    fn clone(&self) -> Self {
        Self::new(self.ctx.clone())
    }
}

/// Validated form of [`CreateProposalParams`]
struct ProposalDraft {
    plugin: Address,
    allow_failure_map: U256,
    start_date: u64,
    end_date: u64,
}

fn draft<O>(params: &CreateProposalParams<O>) -> Result<ProposalDraft> {
    let plugin = parse_address(&params.plugin_address)?;
    if !params.fail_safe_actions.is_empty() && params.fail_safe_actions.len() != params.actions.len() {
        return Err(ClientError::SizeMismatch {
            field1: "failSafeActions",
            field2: "actions",
        });
    }
    Ok(ProposalDraft {
        plugin,
        allow_failure_map: bool_array_to_bitmap(&params.fail_safe_actions)?,
        start_date: timestamp(params.start_date),
        end_date: timestamp(params.end_date),
    })
}

fn create_proposal_request<F: PluginFamily>(
    draft: &ProposalDraft,
    metadata_uri: &str,
    params: &CreateProposalParams<F::ProposalOptions>,
) -> Result<TransactionRequest> {
    let args = F::create_proposal_args(
        metadata_uri,
        &params.actions,
        draft.allow_failure_map,
        draft.start_date,
        draft.end_date,
        &params.options,
    );
    let data = F::interface().encode_function_data("createProposal", &args)?;
    Ok(TransactionRequest::new(draft.plugin, data))
}

impl<F: PluginFamily> PluginMethods<F> {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            _family: PhantomData,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn pin_metadata(&self, metadata: &ProposalMetadata) -> Result<String> {
        pin_json(self.ctx.ipfs(), metadata).await
    }

    /// Create a proposal, pinning its metadata first when given as content.
    ///
    /// Address, size and signer checks fail here, before any stream exists.
    pub fn create_proposal(
        &self,
        params: CreateProposalParams<F::ProposalOptions>,
    ) -> Result<StepStream<'_, ProposalCreationStep>> {
        let draft = draft(&params)?;
        self.ctx.web3().signer_address()?;

        Ok(steps::boxed(try_stream! {
            let web3 = self.ctx.web3();
            let metadata_uri = match &params.metadata {
                ProposalMetadataInput::Uri(uri) => uri.clone(),
                ProposalMetadataInput::Content(metadata) => self.pin_metadata(metadata).await?,
            };

            let request = create_proposal_request::<F>(&draft, &metadata_uri, &params)?;
            let tx_hash = submit(web3, request).await?;
            yield ProposalCreationStep::Creating { tx_hash };

            let receipt = confirm(web3, tx_hash).await?;
            let log = find_event(&receipt, F::interface(), "ProposalCreated")?
                .ok_or_else(|| ClientError::ProposalCreation("ProposalCreated event not found".to_string()))?;
            let index = log_param(&log, "proposalId")?
                .into_uint()
                .ok_or_else(|| ClientError::ProposalCreation("proposalId is not a number".to_string()))?;

            let proposal_id = ProposalId::new(draft.plugin, index);
            info!("{} proposal {} created", F::NAME, proposal_id);
            yield ProposalCreationStep::Done { proposal_id };
        }))
    }

    /// Cast a vote, or approve for families that count approvals
    pub fn vote_proposal(&self, proposal_id: &str, ballot: F::Ballot) -> Result<StepStream<'_, VoteStep>> {
        let id = decode_proposal_id(proposal_id)?;
        let voter = self.ctx.web3().signer_address()?;

        Ok(steps::boxed(try_stream! {
            let web3 = self.ctx.web3();
            let data = F::interface().encode_function_data(F::VOTE_FUNCTION, &F::vote_args(id.index, &ballot))?;
            let tx_hash = submit(web3, TransactionRequest::new(id.plugin_address, data)).await?;
            yield VoteStep::Voting { tx_hash };

            confirm(web3, tx_hash).await?;
            yield VoteStep::Done { vote_id: F::vote_id(&id, voter, tx_hash) };
        }))
    }

    pub fn execute_proposal(&self, proposal_id: &str) -> Result<StepStream<'_, ExecuteStep>> {
        let id = decode_proposal_id(proposal_id)?;
        self.ctx.web3().signer_address()?;

        Ok(steps::boxed(try_stream! {
            let web3 = self.ctx.web3();
            let data = F::interface().encode_function_data("execute", &[Token::Uint(id.index)])?;
            let tx_hash = submit(web3, TransactionRequest::new(id.plugin_address, data)).await?;
            yield ExecuteStep::Executing { tx_hash };

            confirm(web3, tx_hash).await?;
            yield ExecuteStep::Done;
        }))
    }

    /// Prepare an installation of this family's plugin on a DAO
    pub fn prepare_installation(
        &self,
        dao_address_or_ens: &str,
        install_data: Vec<u8>,
        version: Option<VersionTag>,
    ) -> Result<StepStream<'_, PrepareInstallationStep>> {
        let plugin_repo = self.ctx.web3().contract_address(F::REPO)?;
        prepare_installation(
            &self.ctx,
            PrepareInstallationParams {
                dao_address_or_ens: dao_address_or_ens.to_string(),
                plugin_repo,
                version,
                install_data,
            },
        )
    }

    async fn check(&self, function: &str, plugin: Address, args: &[Token]) -> Result<bool> {
        let output = call_function(self.ctx.web3(), plugin, F::interface(), function, args).await?;
        output
            .into_iter()
            .next()
            .and_then(Token::into_bool)
            .ok_or(ClientError::Abi(ethabi::Error::InvalidData))
    }

    pub async fn can_vote(&self, proposal_id: &str, voter: &str, ballot: &F::Ballot) -> Result<bool> {
        let id = decode_proposal_id(proposal_id)?;
        let voter = parse_address(voter)?;
        self.check(F::CAN_VOTE_FUNCTION, id.plugin_address, &F::can_vote_args(id.index, voter, ballot))
            .await
    }

    pub async fn can_execute(&self, proposal_id: &str) -> Result<bool> {
        let id = decode_proposal_id(proposal_id)?;
        self.check("canExecute", id.plugin_address, &[Token::Uint(id.index)]).await
    }

    async fn query(&self, model: &str, document: &str, variables: Value) -> Result<Value> {
        debug!("Querying {} with {}", model, variables);
        self.ctx
            .graphql()
            .request(document, variables)
            .await
            .map_err(|e| ClientError::graphql(model, e))
    }

    /// Single proposal, `None` when the indexer does not know it
    pub async fn get_proposal(&self, proposal_id: &str) -> Result<Option<ProposalDetail>> {
        let id = decode_proposal_id(proposal_id)?;
        let model = format!("{} proposal", F::NAME);
        let data = self
            .query(&model, F::QUERIES.single, json!({ "proposalId": id.to_string() }))
            .await?;

        let record = match data.get(F::QUERIES.single_field) {
            Some(record) if !record.is_null() => record.clone(),
            _ => return Ok(None),
        };
        let record: SubgraphProposal =
            serde_json::from_value(record).map_err(|e| ClientError::graphql(&model, e))?;

        let metadata: ProposalMetadata =
            resolve_metadata(self.ctx.ipfs(), record.metadata.as_deref(), None).await;
        to_detail(&record, metadata, F::SHAPE, Utc::now()).map(Some)
    }

    /// Proposals matching `params`; metadata of each one degrades on its own
    pub async fn get_proposals(&self, params: &ProposalQueryParams) -> Result<Vec<ProposalSummary>> {
        let now = Utc::now();
        let mut filter = match params.status {
            Some(status) => StatusFilter::for_status(status, now).to_where(F::EXECUTABLE_FIELD),
            None => serde_json::Map::new(),
        };
        if let Some(dao) = &params.dao_address_or_ens {
            let dao = resolve_address_or_ens(dao, self.ctx.web3()).await?;
            filter.insert("dao".to_string(), json!(address_to_string(&dao)));
        }

        let model = format!("{} proposals", F::NAME);
        let data = self
            .query(
                &model,
                F::QUERIES.list,
                json!({
                    "where": filter,
                    "limit": params.limit,
                    "skip": params.skip,
                    "direction": params.direction,
                    "sortBy": params.sort_by.field(),
                }),
            )
            .await?;
        let records: Vec<SubgraphProposal> = match data.get(F::QUERIES.list_field) {
            Some(records) if !records.is_null() => {
                serde_json::from_value(records.clone()).map_err(|e| ClientError::graphql(&model, e))?
            }
            _ => vec![],
        };

        let timeout = self.ctx.multi_fetch_timeout();
        let metadata: Vec<ProposalMetadata> = join_all(
            records
                .iter()
                .map(|record| resolve_metadata(self.ctx.ipfs(), record.metadata.as_deref(), Some(timeout))),
        )
        .await;

        records
            .iter()
            .zip(metadata.iter())
            .map(|(record, metadata)| to_summary(record, metadata, F::SHAPE, now))
            .collect()
    }

    /// Current settings of a plugin, `None` when it is not indexed
    pub async fn get_settings(&self, plugin_address: &str) -> Result<Option<F::Settings>> {
        let plugin = parse_address(plugin_address)?;
        let model = format!("{} settings", F::NAME);
        let data = self
            .query(&model, F::QUERIES.settings, json!({ "address": address_to_string(&plugin) }))
            .await?;
        match data.get(F::QUERIES.plugin_field) {
            Some(entity) if !entity.is_null() => F::parse_settings(entity.clone()).map(Some),
            _ => Ok(None),
        }
    }

    /// Members of a plugin, `None` when it is not indexed
    pub async fn get_members(&self, plugin_address: &str) -> Result<Option<Vec<PluginMember>>> {
        let plugin = parse_address(plugin_address)?;
        let model = format!("{} members", F::NAME);
        let data = self
            .query(&model, F::QUERIES.members, json!({ "address": address_to_string(&plugin) }))
            .await?;
        let entity = match data.get(F::QUERIES.plugin_field) {
            Some(entity) if !entity.is_null() => entity.clone(),
            _ => return Ok(None),
        };
        let entity: SubgraphMembers =
            serde_json::from_value(entity).map_err(|e| ClientError::graphql(&model, e))?;

        entity
            .members
            .iter()
            .map(|member| {
                Ok(PluginMember {
                    address: parse_record_address("member", &member.address)?,
                    voting_power: member
                        .voting_power
                        .as_deref()
                        .map(|power| parse_big("votingPower", power))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// Gas cost of the family's write methods
pub struct PluginEstimation<F: PluginFamily> {
    ctx: Context,
    _family: PhantomData<F>,
}

impl<F: PluginFamily> Clone for PluginEstimation<F> {
    fn clone(&self) -> Self {
        Self::new(self.ctx.clone())
    }
}

impl<F: PluginFamily> PluginEstimation<F> {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            _family: PhantomData,
        }
    }

    /// Content metadata is not pinned; a CID-sized URI stands in for it
    pub async fn create_proposal(
        &self,
        params: &CreateProposalParams<F::ProposalOptions>,
    ) -> Result<GasFeeEstimation> {
        let draft = draft(params)?;
        let metadata_uri = match &params.metadata {
            ProposalMetadataInput::Uri(uri) => uri.as_str(),
            ProposalMetadataInput::Content(_) => PLACEHOLDER_METADATA_URI,
        };
        let request = create_proposal_request::<F>(&draft, metadata_uri, params)?;
        estimate_fee(self.ctx.web3(), &request).await
    }

    pub async fn vote_proposal(&self, proposal_id: &str, ballot: &F::Ballot) -> Result<GasFeeEstimation> {
        let id = decode_proposal_id(proposal_id)?;
        let data = F::interface().encode_function_data(F::VOTE_FUNCTION, &F::vote_args(id.index, ballot))?;
        estimate_fee(self.ctx.web3(), &TransactionRequest::new(id.plugin_address, data)).await
    }

    pub async fn execute_proposal(&self, proposal_id: &str) -> Result<GasFeeEstimation> {
        let id = decode_proposal_id(proposal_id)?;
        let data = F::interface().encode_function_data("execute", &[Token::Uint(id.index)])?;
        estimate_fee(self.ctx.web3(), &TransactionRequest::new(id.plugin_address, data)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::metadata::MetadataFallback;
    use crate::transport::{
        MockGraphQLService, MockIpfsService, MockWeb3Service, ReceiptLog, TransactionReceipt,
    };
    use futures::StreamExt;
    use std::sync::Arc;

    const PLUGIN: &str = "0x1234567890123456789012345678901234567890";

    fn context(web3: MockWeb3Service, graphql: MockGraphQLService, ipfs: MockIpfsService) -> Context {
        Context::new(Network::Local, Arc::new(web3), Arc::new(graphql), Arc::new(ipfs))
    }

    fn signer() -> MockWeb3Service {
        let mut web3 = MockWeb3Service::new();
        web3.expect_signer_address()
            .returning(|| Ok(Address::repeat_byte(0x99)));
        web3
    }

    fn params(actions: usize, flags: Vec<bool>) -> CreateProposalParams<MajorityProposalOptions> {
        CreateProposalParams {
            plugin_address: PLUGIN.to_string(),
            metadata: ProposalMetadataInput::Uri("ipfs://QmXhJ7MPBFhn6HHQYpLDKWzj1uhxB5vYcH6RjYv9TSFTSa".to_string()),
            actions: (0..actions)
                .map(|i| DaoAction::call(Address::repeat_byte(i as u8), vec![]))
                .collect(),
            fail_safe_actions: flags,
            start_date: None,
            end_date: None,
            options: MajorityProposalOptions::default(),
        }
    }

    fn proposal_created_receipt(index: u64) -> TransactionReceipt {
        let interface = TokenVoting::interface();
        let event = interface.event_signature("ProposalCreated").unwrap();
        let mut index_topic = [0u8; 32];
        U256::from(index).to_big_endian(&mut index_topic);
        TransactionReceipt {
            transaction_hash: H256::repeat_byte(1),
            block_number: 5,
            status: true,
            logs: vec![ReceiptLog {
                address: Address::repeat_byte(0x12),
                topics: vec![
                    event,
                    H256::from(index_topic),
                    H256::from(Address::repeat_byte(0x99)),
                ],
                data: ethabi::encode(&[
                    Token::Uint(U256::from(100u64)),
                    Token::Uint(U256::from(200u64)),
                    Token::Bytes(vec![]),
                    Token::Array(vec![]),
                    Token::Uint(U256::zero()),
                ]),
            }],
        }
    }

    #[test]
    fn test_size_mismatch_fails_before_any_io() {
        let methods = PluginMethods::<TokenVoting>::new(context(
            MockWeb3Service::new(),
            MockGraphQLService::new(),
            MockIpfsService::new(),
        ));
        let result = methods.create_proposal(params(2, vec![true]));
        assert!(matches!(result, Err(ClientError::SizeMismatch { .. })));
    }

    #[test]
    fn test_create_proposal_needs_signer() {
        let mut web3 = MockWeb3Service::new();
        web3.expect_signer_address()
            .returning(|| Err(ClientError::NoSigner));
        let methods =
            PluginMethods::<TokenVoting>::new(context(web3, MockGraphQLService::new(), MockIpfsService::new()));
        assert!(matches!(
            methods.create_proposal(params(1, vec![])),
            Err(ClientError::NoSigner)
        ));
    }

    #[tokio::test]
    async fn test_create_proposal_steps() {
        let mut web3 = signer();
        web3.expect_send_transaction().returning(|tx| {
            assert_eq!(
                &tx.data[..4],
                &TokenVoting::interface().function_selector("createProposal").unwrap()
            );
            Ok(H256::repeat_byte(1))
        });
        web3.expect_wait_for_receipt()
            .returning(|_| Ok(proposal_created_receipt(3)));
        let methods =
            PluginMethods::<TokenVoting>::new(context(web3, MockGraphQLService::new(), MockIpfsService::new()));

        let steps: Vec<_> = methods
            .create_proposal(params(2, vec![true, false]))
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            steps[0].as_ref().unwrap(),
            &ProposalCreationStep::Creating {
                tx_hash: H256::repeat_byte(1)
            }
        );
        match steps[1].as_ref().unwrap() {
            ProposalCreationStep::Done { proposal_id } => {
                assert_eq!(proposal_id.to_string(), format!("{}_0x3", PLUGIN));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pin_failure_emits_no_checkpoint() {
        let mut ipfs = MockIpfsService::new();
        ipfs.expect_add()
            .returning(|_| Err(ClientError::NoEndpoints("IPFS")));
        let methods = PluginMethods::<TokenVoting>::new(context(signer(), MockGraphQLService::new(), ipfs));

        let mut input = params(1, vec![]);
        input.metadata = ProposalMetadataInput::Content(ProposalMetadata::empty());
        let mut steps = methods.create_proposal(input).unwrap();
        assert!(matches!(steps.next().await, Some(Err(ClientError::IpfsPin(_)))));
    }

    #[tokio::test]
    async fn test_get_proposal_missing_is_none() {
        let mut graphql = MockGraphQLService::new();
        graphql
            .expect_request()
            .returning(|_, _| Ok(json!({ "tokenVotingProposal": null })));
        let methods =
            PluginMethods::<TokenVoting>::new(context(MockWeb3Service::new(), graphql, MockIpfsService::new()));
        let proposal = methods.get_proposal(&format!("{}_0x1", PLUGIN)).await.unwrap();
        assert!(proposal.is_none());
    }

    #[tokio::test]
    async fn test_get_proposal_wraps_indexer_failure() {
        let mut graphql = MockGraphQLService::new();
        graphql
            .expect_request()
            .returning(|_, _| Err(ClientError::NoEndpoints("GraphQL")));
        let methods =
            PluginMethods::<TokenVoting>::new(context(MockWeb3Service::new(), graphql, MockIpfsService::new()));
        let err = methods.get_proposal(&format!("{}_0x1", PLUGIN)).await.unwrap_err();
        assert!(matches!(err, ClientError::GraphQl { .. }));

        assert!(matches!(
            methods.get_proposal("not-an-id").await,
            Err(ClientError::InvalidProposalId)
        ));
    }

    #[tokio::test]
    async fn test_get_settings_token_voting() {
        let mut graphql = MockGraphQLService::new();
        graphql.expect_request().returning(|_, variables| {
            assert_eq!(variables["address"], json!(PLUGIN));
            Ok(json!({
                "tokenVotingPlugin": {
                    "votingMode": "Standard",
                    "supportThreshold": "500000000000000000",
                    "minParticipation": "100000000000000000",
                    "minDuration": "3600",
                    "minProposerVotingPower": "0"
                }
            }))
        });
        let methods =
            PluginMethods::<TokenVoting>::new(context(MockWeb3Service::new(), graphql, MockIpfsService::new()));
        let settings = methods.get_settings(PLUGIN).await.unwrap().unwrap();
        assert_eq!(settings.support_threshold, 0.5);
        assert_eq!(settings.min_participation, 0.1);
        assert_eq!(settings.min_duration, 3600);
        assert_eq!(settings.voting_mode, Some(VotingMode::Standard));
    }

    #[tokio::test]
    async fn test_get_members_with_voting_power() {
        let mut graphql = MockGraphQLService::new();
        graphql.expect_request().returning(|_, _| {
            Ok(json!({
                "tokenVotingPlugin": {
                    "members": [
                        { "address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "votingPower": "42" }
                    ]
                }
            }))
        });
        let methods =
            PluginMethods::<TokenVoting>::new(context(MockWeb3Service::new(), graphql, MockIpfsService::new()));
        let members = methods.get_members(PLUGIN).await.unwrap().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].voting_power, Some(U256::from(42)));

        assert!(matches!(
            methods.get_members("0x123").await,
            Err(ClientError::InvalidAddress)
        ));
    }

    #[tokio::test]
    async fn test_can_execute() {
        let mut web3 = MockWeb3Service::new();
        web3.expect_call()
            .returning(|_| Ok(ethabi::encode(&[Token::Bool(true)])));
        let methods =
            PluginMethods::<TokenVoting>::new(context(web3, MockGraphQLService::new(), MockIpfsService::new()));
        assert!(methods.can_execute(&format!("{}_0x1", PLUGIN)).await.unwrap());
    }
}
