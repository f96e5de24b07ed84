//! Indexer records to client-facing proposals.

use crate::actions::{DaoAction, RatioScale, VoteValue, VotingMode};
use crate::address::parse_address;
use crate::errors::{ClientError, Result};
use crate::metadata::{ProposalMetadata, ProposalMetadataSummary};
use crate::proposal_id::ProposalId;
use crate::status::{compute_status, ProposalStatus};
use crate::subgraph::{SubgraphAction, SubgraphProposal};
use chrono::{DateTime, TimeZone, Utc};
use ethabi::ethereum_types::{Address, U256};

/// How a family's records are tallied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalShape {
    /// Yes/no/abstain votes; `weighted` families sum voter power
    Majority { scale: RatioScale, weighted: bool },
    /// Approvals counted against a minimum
    Approvals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoRef {
    pub address: Address,
    pub ens_domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalTally {
    Majority {
        yes: U256,
        no: U256,
        abstain: U256,
    },
    Approvals {
        approvals: Vec<Address>,
        min_approvals: u32,
    },
}

/// Voting settings in force when the proposal was created
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalSettingsSnapshot {
    pub support_threshold: f64,
    pub min_participation: f64,
    pub min_voting_power: Option<U256>,
    pub voting_mode: Option<VotingMode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalVote {
    pub address: Address,
    pub vote: VoteValue,
    pub vote_replaced: bool,
    /// Voting power; `None` for one-member-one-vote families
    pub weight: Option<U256>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDetail {
    pub id: ProposalId,
    pub dao: DaoRef,
    pub creator_address: Address,
    pub metadata: ProposalMetadata,
    pub creation_date: Option<DateTime<Utc>>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub creation_block_number: Option<u64>,
    pub execution_date: Option<DateTime<Utc>>,
    pub execution_block_number: Option<u64>,
    pub execution_tx_hash: Option<String>,
    pub actions: Vec<DaoAction>,
    pub status: ProposalStatus,
    pub tally: ProposalTally,
    pub settings: Option<ProposalSettingsSnapshot>,
    pub votes: Vec<ProposalVote>,
    /// Total voting power at creation, when the family tracks it
    pub total_voting_weight: Option<U256>,
    /// Sum of voter weights, or the voter count for unweighted families
    pub used_voting_weight: U256,
    pub only_listed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalSummary {
    pub id: ProposalId,
    pub dao: DaoRef,
    pub creator_address: Address,
    pub metadata: ProposalMetadataSummary,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ProposalStatus,
    pub tally: ProposalTally,
    pub total_voting_weight: Option<U256>,
}

fn malformed(field: &str, value: &str) -> ClientError {
    ClientError::MalformedRecord(format!("{}: {:?}", field, value))
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    let secs: i64 = value.parse().map_err(|_| malformed(field, value))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| malformed(field, value))
}

fn parse_optional_timestamp(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(field, v)).transpose()
}

pub(crate) fn parse_big(field: &str, value: &str) -> Result<U256> {
    U256::from_dec_str(value).map_err(|_| malformed(field, value))
}

fn parse_optional_big(field: &str, value: Option<&str>) -> Result<Option<U256>> {
    value.map(|v| parse_big(field, v)).transpose()
}

fn parse_block(field: &str, value: Option<&str>) -> Result<Option<u64>> {
    value
        .map(|v| v.parse::<u64>().map_err(|_| malformed(field, v)))
        .transpose()
}

pub(crate) fn parse_record_address(field: &str, value: &str) -> Result<Address> {
    parse_address(value).map_err(|_| malformed(field, value))
}

fn parse_action(action: &SubgraphAction) -> Result<DaoAction> {
    let data = action.data.strip_prefix("0x").unwrap_or(&action.data);
    Ok(DaoAction {
        to: parse_record_address("action.to", &action.to)?,
        value: parse_big("action.value", &action.value)?,
        data: hex::decode(data).map_err(|_| malformed("action.data", &action.data))?,
    })
}

fn dao_ref(record: &SubgraphProposal) -> Result<DaoRef> {
    Ok(DaoRef {
        address: parse_record_address("dao.id", &record.dao.id)?,
        ens_domain: record.dao.subdomain.clone().unwrap_or_default(),
    })
}

fn tally(record: &SubgraphProposal, shape: ProposalShape) -> Result<ProposalTally> {
    match shape {
        ProposalShape::Majority { .. } => Ok(ProposalTally::Majority {
            yes: parse_optional_big("yes", record.yes.as_deref())?.unwrap_or_default(),
            no: parse_optional_big("no", record.no.as_deref())?.unwrap_or_default(),
            abstain: parse_optional_big("abstain", record.abstain.as_deref())?.unwrap_or_default(),
        }),
        ProposalShape::Approvals => Ok(ProposalTally::Approvals {
            approvals: record
                .approvals
                .iter()
                .map(|approval| parse_record_address("approver", &approval.approver.address))
                .collect::<Result<_>>()?,
            min_approvals: record.min_approvals.unwrap_or_default(),
        }),
    }
}

struct Common {
    id: ProposalId,
    dao: DaoRef,
    creator_address: Address,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    status: ProposalStatus,
    tally: ProposalTally,
    total_voting_weight: Option<U256>,
}

fn common(record: &SubgraphProposal, shape: ProposalShape, now: DateTime<Utc>) -> Result<Common> {
    let id: ProposalId = record.id.parse().map_err(|_| malformed("id", &record.id))?;
    let start_date = parse_timestamp("startDate", &record.start_date)?;
    let end_date = parse_timestamp("endDate", &record.end_date)?;
    Ok(Common {
        id,
        dao: dao_ref(record)?,
        creator_address: parse_record_address("creator", &record.creator)?,
        start_date,
        end_date,
        status: compute_status(now, start_date, end_date, record.executed, record.executable),
        tally: tally(record, shape)?,
        total_voting_weight: parse_optional_big(
            "totalVotingPower",
            record.total_voting_power.as_deref(),
        )?,
    })
}

fn votes(record: &SubgraphProposal, weighted: bool) -> Result<Vec<ProposalVote>> {
    record
        .voters
        .iter()
        .map(|voter| {
            let weight = if weighted {
                Some(
                    parse_optional_big("votingPower", voter.voting_power.as_deref())?
                        .unwrap_or_default(),
                )
            } else {
                None
            };
            Ok(ProposalVote {
                address: parse_record_address("voter", &voter.voter.address)?,
                vote: VoteValue::from_indexer(&voter.vote_option)?,
                vote_replaced: voter.vote_replaced,
                weight,
            })
        })
        .collect()
}

fn settings(record: &SubgraphProposal, scale: RatioScale) -> Result<Option<ProposalSettingsSnapshot>> {
    let (support, participation) = match (&record.support_threshold, &record.min_participation) {
        (Some(support), Some(participation)) => (support, participation),
        _ => return Ok(None),
    };
    Ok(Some(ProposalSettingsSnapshot {
        support_threshold: scale.decode(parse_big("supportThreshold", support)?)?,
        min_participation: scale.decode(parse_big("minParticipation", participation)?)?,
        min_voting_power: parse_optional_big("minVotingPower", record.min_voting_power.as_deref())?,
        voting_mode: record
            .voting_mode
            .as_deref()
            .map(VotingMode::from_indexer)
            .transpose()?,
    }))
}

/// Full proposal from a single-record query.
///
/// Status is recomputed from the dates and flags; the indexer's own view may lag.
pub fn to_detail(
    record: &SubgraphProposal,
    metadata: ProposalMetadata,
    shape: ProposalShape,
    now: DateTime<Utc>,
) -> Result<ProposalDetail> {
    let common = common(record, shape, now)?;

    let (votes, settings) = match shape {
        ProposalShape::Majority { scale, weighted } => (votes(record, weighted)?, settings(record, scale)?),
        ProposalShape::Approvals => (vec![], None),
    };
    let used_voting_weight = match (&common.tally, shape) {
        (ProposalTally::Approvals { approvals, .. }, _) => U256::from(approvals.len()),
        (_, ProposalShape::Majority { weighted: true, .. }) => votes
            .iter()
            .fold(U256::zero(), |sum, vote| sum + vote.weight.unwrap_or_default()),
        _ => U256::from(votes.len()),
    };

    Ok(ProposalDetail {
        id: common.id,
        dao: common.dao,
        creator_address: common.creator_address,
        metadata,
        creation_date: parse_optional_timestamp("createdAt", record.created_at.as_deref())?,
        start_date: common.start_date,
        end_date: common.end_date,
        creation_block_number: parse_block(
            "creationBlockNumber",
            record.creation_block_number.as_deref(),
        )?,
        execution_date: parse_optional_timestamp("executionDate", record.execution_date.as_deref())?,
        execution_block_number: parse_block(
            "executionBlockNumber",
            record.execution_block_number.as_deref(),
        )?,
        execution_tx_hash: record.execution_tx_hash.clone(),
        actions: record.actions.iter().map(parse_action).collect::<Result<_>>()?,
        status: common.status,
        tally: common.tally,
        settings,
        votes,
        total_voting_weight: common.total_voting_weight,
        used_voting_weight,
        only_listed: record.plugin.as_ref().and_then(|plugin| plugin.only_listed),
    })
}

pub fn to_summary(
    record: &SubgraphProposal,
    metadata: &ProposalMetadata,
    shape: ProposalShape,
    now: DateTime<Utc>,
) -> Result<ProposalSummary> {
    let common = common(record, shape, now)?;
    Ok(ProposalSummary {
        id: common.id,
        dao: common.dao,
        creator_address: common.creator_address,
        metadata: ProposalMetadataSummary::from(metadata),
        start_date: common.start_date,
        end_date: common.end_date,
        status: common.status,
        tally: common.tally,
        total_voting_weight: common.total_voting_weight,
    })
}
