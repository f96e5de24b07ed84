//! Shared constants: permission registry, validation patterns, timeouts.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use tiny_keccak::{Hasher, Keccak};

/// Timeout applied to each fetch of a batch read (one per listed record)
pub const MULTI_FETCH_TIMEOUT: Duration = Duration::from_secs(7);

/// Smallest accepted voting duration, in seconds
pub const MIN_VOTING_DURATION: u64 = 60 * 60;

/// Well-known permission names understood by the DAO framework
pub const PERMISSIONS: &[&str] = &[
    "UPGRADE_PERMISSION",
    "UPGRADE_PLUGIN_PERMISSION",
    "SET_METADATA_PERMISSION",
    "EXECUTE_PERMISSION",
    "WITHDRAW_PERMISSION",
    "SET_SIGNATURE_VALIDATOR_PERMISSION",
    "SET_TRUSTED_FORWARDER_PERMISSION",
    "ROOT_PERMISSION",
    "CREATE_VERSION_PERMISSION",
    "REGISTER_PERMISSION",
    "REGISTER_DAO_PERMISSION",
    "REGISTER_ENS_SUBDOMAIN_PERMISSION",
    "MINT_PERMISSION",
    "MERKLE_MINT_PERMISSION",
    "MODIFY_ALLOWLIST_PERMISSION",
    "SET_CONFIGURATION_PERMISSION",
];

pub const ROOT_PERMISSION: &str = "ROOT_PERMISSION";
pub const EXECUTE_PERMISSION: &str = "EXECUTE_PERMISSION";
pub const UPGRADE_PLUGIN_PERMISSION: &str = "UPGRADE_PLUGIN_PERMISSION";

/// Permission hash -> permission name
static PERMISSION_NAMES: Lazy<HashMap<[u8; 32], &'static str>> = Lazy::new(|| {
    PERMISSIONS
        .iter()
        .map(|name| (keccak256(name.as_bytes()), *name))
        .collect()
});

// Patterns below are literals; they are all compiled by `test_patterns_compile`,
// so the `expect`s cannot fire at runtime.

pub static ADDRESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));

pub static ENS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-z0-9-]+\.)*[a-z0-9-]+\.eth$").expect("valid regex"));

pub static SUBDOMAIN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9\-]+$").expect("valid regex"));

pub static PROPOSAL_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[A-Fa-f0-9]{40}_0x[A-Fa-f0-9]{1,}$").expect("valid regex"));

pub static HEX_STRING_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0x)?[0-9a-fA-F]*$").expect("valid regex"));

pub static IPFS_CID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((Qm[1-9A-HJ-NP-Za-km-z]{44,})|(b[A-Za-z2-7]{58,}|B[A-Z2-7]{58,})|(z[1-9A-HJ-NP-Za-km-z]{48,})|(F[0-9A-F]{50,}))$",
    )
    .expect("valid regex")
});

pub static IPFS_URI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^ipfs://((Qm[1-9A-HJ-NP-Za-km-z]{44,})|(b[A-Za-z2-7]{58,}|B[A-Z2-7]{58,})|(z[1-9A-HJ-NP-Za-km-z]{48,})|(F[0-9A-F]{50,}))$",
    )
    .expect("valid regex")
});

/// Keccak-256 digest of arbitrary bytes
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(bytes);
    hasher.finalize(&mut output);
    output
}

/// On-chain identifier of a permission name
pub fn permission_id(name: &str) -> [u8; 32] {
    keccak256(name.as_bytes())
}

/// Reverse lookup of a permission identifier; empty when unknown
pub fn permission_name(id: &[u8]) -> String {
    <[u8; 32]>::try_from(id)
        .ok()
        .and_then(|id| PERMISSION_NAMES.get(&id))
        .map(|name| name.to_string())
        .unwrap_or_default()
}
