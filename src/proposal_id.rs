use crate::address::{address_to_string, parse_address};
use crate::constants::PROPOSAL_ID_REGEX;
use crate::errors::{ClientError, Result};
use ethabi::ethereum_types::{Address, U256};
use std::fmt;
use std::str::FromStr;

/// Composite proposal identifier: `0x{plugin}_0x{index}`.
///
/// The same string keys the proposal on the plugin contract and in the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProposalId {
    pub plugin_address: Address,
    pub index: U256,
}

impl ProposalId {
    pub fn new(plugin_address: Address, index: U256) -> Self {
        Self {
            plugin_address,
            index,
        }
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_0x{:x}", address_to_string(&self.plugin_address), self.index)
    }
}

impl FromStr for ProposalId {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self> {
        if !PROPOSAL_ID_REGEX.is_match(value) {
            return Err(ClientError::InvalidProposalId);
        }
        let (address, index) = value
            .rsplit_once('_')
            .ok_or(ClientError::InvalidProposalId)?;

        // the pattern already fixed the length, so only the case rules are left
        let plugin_address =
            parse_address(&address.to_ascii_lowercase()).map_err(|_| ClientError::InvalidProposalId)?;
        let index = U256::from_str_radix(&index[2..], 16).map_err(|_| ClientError::InvalidProposalId)?;

        Ok(Self {
            plugin_address,
            index,
        })
    }
}

/// Encode a plugin address and on-chain index
pub fn encode_proposal_id(plugin_address: &Address, index: U256) -> String {
    ProposalId::new(*plugin_address, index).to_string()
}

pub fn decode_proposal_id(value: &str) -> Result<ProposalId> {
    value.parse()
}
