//! Encoding of DAO and plugin operations into executable actions, and back.

pub mod dao;
pub mod plugins;

use crate::abi::Tokens;
use crate::constants::MIN_VOTING_DURATION;
use crate::errors::{ClientError, Result};
use ethabi::ethereum_types::{Address, U256};
use ethabi::Token;
use serde::{Deserialize, Serialize};

pub use dao::{DaoDecoding, DaoEncoding};

/// One contract call executed by the DAO: `{to, value, data}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoAction {
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

impl DaoAction {
    pub fn call(to: Address, data: Vec<u8>) -> Self {
        Self {
            to,
            value: U256::zero(),
            data,
        }
    }

    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.to),
            Token::Uint(self.value),
            Token::Bytes(self.data.clone()),
        ])
    }

    pub fn from_tokens(mut tokens: Tokens) -> Result<Self> {
        Ok(Self {
            to: tokens.address()?,
            value: tokens.uint()?,
            data: tokens.bytes()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VotingMode {
    Standard,
    EarlyExecution,
    VoteReplacement,
}

impl VotingMode {
    pub fn to_u8(self) -> u8 {
        match self {
            VotingMode::Standard => 0,
            VotingMode::EarlyExecution => 1,
            VotingMode::VoteReplacement => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(VotingMode::Standard),
            1 => Ok(VotingMode::EarlyExecution),
            2 => Ok(VotingMode::VoteReplacement),
            other => Err(ClientError::InvalidVotingMode(other.to_string())),
        }
    }

    /// Parse the indexer's enum spelling
    pub fn from_indexer(value: &str) -> Result<Self> {
        match value {
            "Standard" => Ok(VotingMode::Standard),
            "EarlyExecution" => Ok(VotingMode::EarlyExecution),
            "VoteReplacement" => Ok(VotingMode::VoteReplacement),
            other => Err(ClientError::InvalidVotingMode(other.to_string())),
        }
    }
}

/// Ballot option of majority-voting plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteValue {
    Abstain,
    Yes,
    No,
}

impl VoteValue {
    pub fn to_u8(self) -> u8 {
        match self {
            VoteValue::Abstain => 1,
            VoteValue::Yes => 2,
            VoteValue::No => 3,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(VoteValue::Abstain),
            2 => Ok(VoteValue::Yes),
            3 => Ok(VoteValue::No),
            other => Err(ClientError::InvalidVoteOption(other.to_string())),
        }
    }

    pub fn from_indexer(value: &str) -> Result<Self> {
        match value {
            "Abstain" => Ok(VoteValue::Abstain),
            "Yes" => Ok(VoteValue::Yes),
            "No" => Ok(VoteValue::No),
            other => Err(ClientError::InvalidVoteOption(other.to_string())),
        }
    }
}

/// Fixed-point representation of ratios for one plugin family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioScale {
    /// Decimal digits of the on-chain denominator (`10^digits`)
    pub digits: u32,
    /// Decimal digits kept when converting back to a float
    pub precision: u32,
}

impl RatioScale {
    pub fn encode(&self, value: f64) -> Result<U256> {
        encode_ratio(value, self.digits)
    }

    pub fn decode(&self, raw: U256) -> Result<f64> {
        decode_ratio(raw, self.digits, self.precision)
    }
}

/// Scale a ratio in `[0, 1]` by `10^digits`, rounding half away from zero
pub fn encode_ratio(value: f64, digits: u32) -> Result<U256> {
    if digits == 0 {
        return Err(ClientError::InvalidPrecision);
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ClientError::InvalidRatio(value));
    }
    // f64 carries ~15 significant digits; the rest of the scale is exact zeros
    let exact = digits.min(15);
    let scaled = (value * 10f64.powi(exact as i32)).round() as u64;
    Ok(U256::from(scaled) * U256::exp10((digits - exact) as usize))
}

/// Inverse of [`encode_ratio`], rounded to `precision` decimal digits.
/// Values above 1 are rejected.
pub fn decode_ratio(raw: U256, digits: u32, precision: u32) -> Result<f64> {
    if digits == 0 || precision == 0 {
        return Err(ClientError::InvalidPrecision);
    }
    if raw.bits() > 128 {
        return Err(ClientError::InvalidAmount(raw.to_string()));
    }
    let value = raw.low_u128() as f64 / 10f64.powi(digits as i32);
    let factor = 10f64.powi(precision.min(18) as i32);
    let rounded = (value * factor).round() / factor;
    if rounded > 1.0 {
        return Err(ClientError::InvalidRatio(rounded));
    }
    Ok(rounded)
}

/// Narrow an ABI integer to a Rust integer type, rejecting out-of-range values
pub(crate) fn narrow_uint<T: TryFrom<u64>>(value: U256) -> Result<T> {
    if value > U256::from(u64::MAX) {
        return Err(ClientError::Abi(ethabi::Error::InvalidData));
    }
    T::try_from(value.low_u64()).map_err(|_| ClientError::Abi(ethabi::Error::InvalidData))
}

/// Pack per-action "allow failure" flags into a uint256 bitmap
pub fn bool_array_to_bitmap(flags: &[bool]) -> Result<U256> {
    if flags.len() > 256 {
        return Err(ClientError::BitmapOverflow(flags.len()));
    }
    Ok(flags
        .iter()
        .enumerate()
        .filter(|(_, allowed)| **allowed)
        .fold(U256::zero(), |bitmap, (i, _)| bitmap | (U256::one() << i)))
}

/// All 256 flags of a bitmap
pub fn bitmap_to_bool_array(bitmap: U256) -> Vec<bool> {
    (0..256).map(|i| bitmap.bit(i)).collect()
}

/// Majority-voting configuration of TokenVoting and AddressList plugins
#[derive(Debug, Clone, PartialEq)]
pub struct VotingSettings {
    pub support_threshold: f64,
    pub min_participation: f64,
    /// Seconds
    pub min_duration: u64,
    pub min_proposer_voting_power: Option<U256>,
    pub voting_mode: Option<VotingMode>,
}

impl VotingSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("supportThreshold", self.support_threshold),
            ("minParticipation", self.min_participation),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ClientError::InvalidVotingSettings(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.min_duration < MIN_VOTING_DURATION {
            return Err(ClientError::InvalidVotingSettings(format!(
                "minDuration must be at least {} seconds, got {}",
                MIN_VOTING_DURATION, self.min_duration
            )));
        }
        Ok(())
    }

    pub fn to_token(&self, scale: RatioScale) -> Result<Token> {
        self.validate()?;
        Ok(Token::Tuple(vec![
            Token::Uint(U256::from(
                self.voting_mode.unwrap_or(VotingMode::Standard).to_u8(),
            )),
            Token::Uint(scale.encode(self.support_threshold)?),
            Token::Uint(scale.encode(self.min_participation)?),
            Token::Uint(U256::from(self.min_duration)),
            Token::Uint(self.min_proposer_voting_power.unwrap_or_default()),
        ]))
    }

    pub fn from_tokens(mut tokens: Tokens, scale: RatioScale) -> Result<Self> {
        let mode = tokens.uint()?;
        let mode = narrow_uint::<u8>(mode).map_err(|_| ClientError::InvalidVotingMode(mode.to_string()))?;
        Ok(Self {
            voting_mode: Some(VotingMode::from_u8(mode)?),
            support_threshold: scale.decode(tokens.uint()?)?,
            min_participation: scale.decode(tokens.uint()?)?,
            min_duration: tokens.uint()?.low_u64(),
            min_proposer_voting_power: Some(tokens.uint()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigVotingSettings {
    pub only_listed: bool,
    pub min_approvals: u16,
}

impl MultisigVotingSettings {
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Bool(self.only_listed),
            Token::Uint(U256::from(self.min_approvals)),
        ])
    }

    pub fn from_tokens(mut tokens: Tokens) -> Result<Self> {
        let only_listed = tokens.boolean()?;
        Ok(Self {
            only_listed,
            min_approvals: narrow_uint(tokens.uint()?)?,
        })
    }
}

/// Release and build of a plugin version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag {
    pub release: u8,
    pub build: u16,
}

impl VersionTag {
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint(U256::from(self.release)),
            Token::Uint(U256::from(self.build)),
        ])
    }

    pub fn from_tokens(mut tokens: Tokens) -> Result<Self> {
        Ok(Self {
            release: narrow_uint(tokens.uint()?)?,
            build: narrow_uint(tokens.uint()?)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOperation {
    Grant,
    Revoke,
    GrantWithCondition,
}

impl PermissionOperation {
    fn to_u8(self) -> u8 {
        match self {
            PermissionOperation::Grant => 0,
            PermissionOperation::Revoke => 1,
            PermissionOperation::GrantWithCondition => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PermissionOperation::Grant),
            1 => Ok(PermissionOperation::Revoke),
            2 => Ok(PermissionOperation::GrantWithCondition),
            _ => Err(ClientError::Abi(ethabi::Error::InvalidData)),
        }
    }
}

/// Permission change requested by a plugin setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiTargetPermission {
    pub operation: PermissionOperation,
    pub where_: Address,
    pub who: Address,
    pub condition: Address,
    pub permission_id: [u8; 32],
}

impl MultiTargetPermission {
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint(U256::from(self.operation.to_u8())),
            Token::Address(self.where_),
            Token::Address(self.who),
            Token::Address(self.condition),
            Token::FixedBytes(self.permission_id.to_vec()),
        ])
    }

    pub fn from_tokens(mut tokens: Tokens) -> Result<Self> {
        let operation = PermissionOperation::from_u8(narrow_uint(tokens.uint()?)?)?;
        let where_ = tokens.address()?;
        let who = tokens.address()?;
        let condition = tokens.address()?;
        let permission_id = <[u8; 32]>::try_from(tokens.fixed_bytes()?.as_slice())
            .map_err(|_| ClientError::Abi(ethabi::Error::InvalidData))?;
        Ok(Self {
            operation,
            where_,
            who,
            condition,
            permission_id,
        })
    }
}

/// A plugin to install at DAO creation: setup repo plus encoded setup data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInstallItem {
    pub id: Address,
    pub data: Vec<u8>,
}

/// Tokens of a plugin setup reference: `((release, build), repo)`
pub(crate) fn setup_ref_token(repo: Address, version: VersionTag) -> Token {
    Token::Tuple(vec![version.to_token(), Token::Address(repo)])
}
