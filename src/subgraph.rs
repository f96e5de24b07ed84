//! Indexer records and the GraphQL documents that fetch them.
//!
//! Numbers arrive as decimal strings and addresses as lowercase hex; the
//! adapter turns them into typed values.

use serde::{Deserialize, Deserializer, Serialize};

/// Read an explicit `null` as the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Documents used to read one plugin family's proposals
#[derive(Debug, Clone, Copy)]
pub struct ProposalQueries {
    pub single: &'static str,
    /// Response field holding the single record
    pub single_field: &'static str,
    pub list: &'static str,
    pub list_field: &'static str,
    pub settings: &'static str,
    pub members: &'static str,
    /// Response field of the plugin entity (settings and members)
    pub plugin_field: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubgraphDaoRef {
    pub id: String,
    #[serde(default)]
    pub subdomain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubgraphAction {
    pub to: String,
    pub value: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubgraphAccount {
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphVoter {
    pub voter: SubgraphAccount,
    pub vote_replaced: bool,
    pub vote_option: String,
    pub voting_power: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubgraphApproval {
    pub approver: SubgraphAccount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphPluginRef {
    pub only_listed: Option<bool>,
}

/// Proposal of any plugin family; fields a family does not index stay empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphProposal {
    pub id: String,
    pub dao: SubgraphDaoRef,
    pub creator: String,
    pub metadata: Option<String>,
    pub created_at: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub creation_block_number: Option<String>,
    pub execution_date: Option<String>,
    pub execution_block_number: Option<String>,
    pub execution_tx_hash: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub executed: bool,
    #[serde(alias = "approvalReached", deserialize_with = "null_as_default")]
    pub executable: bool,
    pub actions: Vec<SubgraphAction>,

    pub yes: Option<String>,
    pub no: Option<String>,
    pub abstain: Option<String>,
    pub voting_mode: Option<String>,
    pub support_threshold: Option<String>,
    pub min_participation: Option<String>,
    pub min_voting_power: Option<String>,
    pub total_voting_power: Option<String>,
    pub voters: Vec<SubgraphVoter>,

    pub approvals: Vec<SubgraphApproval>,
    pub min_approvals: Option<u32>,
    pub plugin: Option<SubgraphPluginRef>,
}

/// Settings entity of a majority-voting plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphVotingSettings {
    pub voting_mode: String,
    pub support_threshold: String,
    pub min_participation: String,
    pub min_duration: String,
    pub min_proposer_voting_power: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphMultisigSettings {
    pub only_listed: bool,
    pub min_approvals: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphMember {
    pub address: String,
    pub voting_power: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubgraphMembers {
    #[serde(default)]
    pub members: Vec<SubgraphMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphPluginRepoRef {
    pub subdomain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphPluginPreparation {
    pub plugin_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphInstalledPlugin {
    pub applied_preparation: Option<SubgraphPluginPreparation>,
    pub applied_plugin_repo: Option<SubgraphPluginRepoRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubgraphDao {
    pub id: String,
    pub subdomain: Option<String>,
    pub metadata: Option<String>,
    pub created_at: String,
    pub plugins: Vec<SubgraphInstalledPlugin>,
}

pub const QUERY_DAO: &str = r#"
query Dao($address: ID!) {
  dao(id: $address) {
    id
    subdomain
    metadata
    createdAt
    plugins {
      appliedPreparation { pluginAddress }
      appliedPluginRepo { subdomain }
    }
  }
}
"#;

pub const QUERY_DAOS: &str = r#"
query Daos($limit: Int!, $skip: Int!, $direction: OrderDirection!, $sortBy: Dao_orderBy!) {
  daos(first: $limit, skip: $skip, orderDirection: $direction, orderBy: $sortBy) {
    id
    subdomain
    metadata
    createdAt
    plugins {
      appliedPreparation { pluginAddress }
      appliedPluginRepo { subdomain }
    }
  }
}
"#;

pub const TOKEN_VOTING_QUERIES: ProposalQueries = ProposalQueries {
    single: r#"
query TokenVotingProposal($proposalId: ID!) {
  tokenVotingProposal(id: $proposalId) {
    id
    dao { id subdomain }
    creator
    metadata
    createdAt
    creationBlockNumber
    executionDate
    executionBlockNumber
    executionTxHash
    actions { to value data }
    yes
    no
    abstain
    votingMode
    supportThreshold
    minParticipation
    minVotingPower
    totalVotingPower
    startDate
    endDate
    executed
    executable
    voters { voter { address } voteReplaced voteOption votingPower }
  }
}
"#,
    single_field: "tokenVotingProposal",
    list: r#"
query TokenVotingProposals($where: TokenVotingProposal_filter!, $limit: Int!, $skip: Int!, $direction: OrderDirection!, $sortBy: TokenVotingProposal_orderBy!) {
  tokenVotingProposals(where: $where, first: $limit, skip: $skip, orderDirection: $direction, orderBy: $sortBy) {
    id
    dao { id subdomain }
    creator
    metadata
    yes
    no
    abstain
    totalVotingPower
    startDate
    endDate
    executed
    executable
  }
}
"#,
    list_field: "tokenVotingProposals",
    settings: r#"
query TokenVotingSettings($address: ID!) {
  tokenVotingPlugin(id: $address) {
    votingMode
    supportThreshold
    minParticipation
    minDuration
    minProposerVotingPower
  }
}
"#,
    members: r#"
query TokenVotingMembers($address: ID!) {
  tokenVotingPlugin(id: $address) {
    members { address votingPower }
  }
}
"#,
    plugin_field: "tokenVotingPlugin",
};

pub const ADDRESSLIST_VOTING_QUERIES: ProposalQueries = ProposalQueries {
    single: r#"
query AddresslistVotingProposal($proposalId: ID!) {
  addresslistVotingProposal(id: $proposalId) {
    id
    dao { id subdomain }
    creator
    metadata
    createdAt
    creationBlockNumber
    executionDate
    executionBlockNumber
    executionTxHash
    actions { to value data }
    yes
    no
    abstain
    votingMode
    supportThreshold
    minParticipation
    totalVotingPower
    startDate
    endDate
    executed
    executable
    voters { voter { address } voteReplaced voteOption }
  }
}
"#,
    single_field: "addresslistVotingProposal",
    list: r#"
query AddresslistVotingProposals($where: AddresslistVotingProposal_filter!, $limit: Int!, $skip: Int!, $direction: OrderDirection!, $sortBy: AddresslistVotingProposal_orderBy!) {
  addresslistVotingProposals(where: $where, first: $limit, skip: $skip, orderDirection: $direction, orderBy: $sortBy) {
    id
    dao { id subdomain }
    creator
    metadata
    yes
    no
    abstain
    totalVotingPower
    startDate
    endDate
    executed
    executable
  }
}
"#,
    list_field: "addresslistVotingProposals",
    settings: r#"
query AddresslistVotingSettings($address: ID!) {
  addresslistVotingPlugin(id: $address) {
    votingMode
    supportThreshold
    minParticipation
    minDuration
    minProposerVotingPower
  }
}
"#,
    members: r#"
query AddresslistVotingMembers($address: ID!) {
  addresslistVotingPlugin(id: $address) {
    members { address }
  }
}
"#,
    plugin_field: "addresslistVotingPlugin",
};

pub const MULTISIG_QUERIES: ProposalQueries = ProposalQueries {
    single: r#"
query MultisigProposal($proposalId: ID!) {
  multisigProposal(id: $proposalId) {
    id
    dao { id subdomain }
    creator
    metadata
    createdAt
    startDate
    endDate
    actions { to value data }
    executionDate
    executionBlockNumber
    creationBlockNumber
    plugin { onlyListed }
    minApprovals
    executionTxHash
    executed
    approvalReached
    approvals(first: 1000) { approver { address } }
  }
}
"#,
    single_field: "multisigProposal",
    list: r#"
query MultisigProposals($where: MultisigProposal_filter!, $limit: Int!, $skip: Int!, $direction: OrderDirection!, $sortBy: MultisigProposal_orderBy!) {
  multisigProposals(where: $where, first: $limit, skip: $skip, orderDirection: $direction, orderBy: $sortBy) {
    id
    dao { id subdomain }
    creator
    metadata
    executed
    approvalReached
    startDate
    endDate
    minApprovals
    approvals(first: 1000) { approver { address } }
  }
}
"#,
    list_field: "multisigProposals",
    settings: r#"
query MultisigSettings($address: ID!) {
  multisigPlugin(id: $address) {
    onlyListed
    minApprovals
  }
}
"#,
    members: r#"
query MultisigMembers($address: ID!) {
  multisigPlugin(id: $address) {
    members { address }
  }
}
"#,
    plugin_field: "multisigPlugin",
};
