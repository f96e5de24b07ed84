//! Address validation, normalization and ENS resolution.

use crate::constants::{keccak256, ADDRESS_REGEX, ENS_REGEX};
use crate::errors::{ClientError, Result};
use crate::transport::Web3Service;
use ethabi::ethereum_types::Address;
use tracing::debug;

/// True iff `value` is a 20-byte hex address. Mixed-case input must carry
/// a valid EIP-55 checksum.
pub fn is_address(value: &str) -> bool {
    if !ADDRESS_REGEX.is_match(value) {
        return false;
    }
    let body = &value[2..];
    let all_lower = body.chars().all(|c| !c.is_ascii_uppercase());
    let all_upper = body.chars().all(|c| !c.is_ascii_lowercase());
    if all_lower || all_upper {
        return true;
    }
    match parse_unchecked(value) {
        Some(address) => to_checksum(&address) == value,
        None => false,
    }
}

fn parse_unchecked(value: &str) -> Option<Address> {
    let bytes = hex::decode(value.strip_prefix("0x")?).ok()?;
    (bytes.len() == 20).then(|| Address::from_slice(&bytes))
}

/// Parse a hex address, failing with `InvalidAddress`
pub fn parse_address(value: &str) -> Result<Address> {
    if !is_address(value) {
        return Err(ClientError::InvalidAddress);
    }
    parse_unchecked(value).ok_or(ClientError::InvalidAddress)
}

/// Lowercase `0x`-prefixed form, as the indexer stores addresses
pub fn address_to_string(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// EIP-55 mixed-case checksum encoding
pub fn to_checksum(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn is_ens_name(value: &str) -> bool {
    ENS_REGEX.is_match(value)
}

/// Resolve an address or ENS name.
///
/// Valid addresses are returned unchanged without touching the network.
/// ENS-style names go through the web3 collaborator; anything else, and names
/// that resolve to nothing, fail with `InvalidAddressOrEns`.
pub async fn resolve_address_or_ens(value: &str, web3: &dyn Web3Service) -> Result<Address> {
    if is_address(value) {
        return parse_address(value);
    }
    if !is_ens_name(value) {
        return Err(ClientError::InvalidAddressOrEns);
    }

    debug!("Resolving ENS name {}", value);
    match web3.resolve_name(value).await? {
        Some(address) if !address.is_zero() => Ok(address),
        _ => Err(ClientError::InvalidAddressOrEns),
    }
}
