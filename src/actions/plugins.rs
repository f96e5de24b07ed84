//! Plugin-level actions and plugin installation data.

use super::{DaoAction, MultisigVotingSettings, RatioScale, VotingSettings};
use crate::abi::{ContractInterface, Tokens, ERC20};
use crate::errors::{ClientError, Result};
use ethabi::ethereum_types::{Address, U256};
use ethabi::{ParamType, Token};

fn settings_param() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(8),
        ParamType::Uint(64),
        ParamType::Uint(64),
        ParamType::Uint(64),
        ParamType::Uint(256),
    ])
}

fn multisig_settings_param() -> ParamType {
    ParamType::Tuple(vec![ParamType::Bool, ParamType::Uint(16)])
}

fn decode_params(types: &[ParamType], data: &[u8]) -> Result<Tokens> {
    Ok(Tokens::new(ethabi::decode(types, data)?))
}

fn address_array(addresses: &[Address]) -> Token {
    Token::Array(addresses.iter().copied().map(Token::Address).collect())
}

/// `updateVotingSettings` on a majority-voting plugin
pub fn update_voting_settings_action(
    interface: &ContractInterface,
    plugin: Address,
    settings: &VotingSettings,
    scale: RatioScale,
) -> Result<DaoAction> {
    let data = interface.encode_function_data("updateVotingSettings", &[settings.to_token(scale)?])?;
    Ok(DaoAction::call(plugin, data))
}

pub fn decode_update_voting_settings_action(
    interface: &ContractInterface,
    data: &[u8],
    scale: RatioScale,
) -> Result<VotingSettings> {
    let mut tokens = Tokens::new(interface.decode_function_data("updateVotingSettings", data)?);
    VotingSettings::from_tokens(tokens.tuple()?, scale)
}

/// `addAddresses` / `removeAddresses` on a member-list plugin
pub fn members_action(
    interface: &ContractInterface,
    function: &str,
    plugin: Address,
    members: &[Address],
) -> Result<DaoAction> {
    let data = interface.encode_function_data(function, &[address_array(members)])?;
    Ok(DaoAction::call(plugin, data))
}

pub fn decode_members_action(
    interface: &ContractInterface,
    function: &str,
    data: &[u8],
) -> Result<Vec<Address>> {
    Tokens::new(interface.decode_function_data(function, data)?).addresses()
}

pub fn update_multisig_settings_action(
    interface: &ContractInterface,
    plugin: Address,
    settings: &MultisigVotingSettings,
) -> Result<DaoAction> {
    let data = interface.encode_function_data("updateMultisigSettings", &[settings.to_token()])?;
    Ok(DaoAction::call(plugin, data))
}

pub fn decode_update_multisig_settings_action(
    interface: &ContractInterface,
    data: &[u8],
) -> Result<MultisigVotingSettings> {
    let mut tokens = Tokens::new(interface.decode_function_data("updateMultisigSettings", data)?);
    MultisigVotingSettings::from_tokens(tokens.tuple()?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintTokenParams {
    pub address: Address,
    pub amount: U256,
}

/// `mint(address, amount)` on a mintable governance token
pub fn mint_token_action(token: Address, params: &MintTokenParams) -> Result<DaoAction> {
    let data = ERC20.encode_function_data(
        "mint",
        &[Token::Address(params.address), Token::Uint(params.amount)],
    )?;
    Ok(DaoAction::call(token, data))
}

pub fn decode_mint_token_action(data: &[u8]) -> Result<MintTokenParams> {
    let mut tokens = Tokens::new(ERC20.decode_function_data("mint", data)?);
    Ok(MintTokenParams {
        address: tokens.address()?,
        amount: tokens.uint()?,
    })
}

/// Governance token of a TokenVoting installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VotingToken {
    /// Reuse a deployed ERC-20 (wrapped by the setup when not governance-ready)
    Existing(Address),
    /// Deploy a new token and mint initial balances
    New {
        name: String,
        symbol: String,
        balances: Vec<(Address, U256)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenVotingInstall {
    pub voting_settings: VotingSettings,
    pub token: VotingToken,
}

impl TokenVotingInstall {
    /// `(settings, (token, name, symbol), (receivers, amounts))`
    pub fn encode(&self, scale: RatioScale) -> Result<Vec<u8>> {
        let (token, name, symbol, balances) = match &self.token {
            VotingToken::Existing(address) => (*address, String::new(), String::new(), &[][..]),
            VotingToken::New {
                name,
                symbol,
                balances,
            } => (Address::zero(), name.clone(), symbol.clone(), balances.as_slice()),
        };
        let receivers = balances.iter().map(|(address, _)| Token::Address(*address)).collect();
        let amounts = balances.iter().map(|(_, amount)| Token::Uint(*amount)).collect();

        Ok(ethabi::encode(&[
            self.voting_settings.to_token(scale)?,
            Token::Tuple(vec![Token::Address(token), Token::String(name), Token::String(symbol)]),
            Token::Tuple(vec![Token::Array(receivers), Token::Array(amounts)]),
        ]))
    }

    pub fn decode(data: &[u8], scale: RatioScale) -> Result<Self> {
        let mut tokens = decode_params(
            &[
                settings_param(),
                ParamType::Tuple(vec![ParamType::Address, ParamType::String, ParamType::String]),
                ParamType::Tuple(vec![
                    ParamType::Array(Box::new(ParamType::Address)),
                    ParamType::Array(Box::new(ParamType::Uint(256))),
                ]),
            ],
            data,
        )?;
        let voting_settings = VotingSettings::from_tokens(tokens.tuple()?, scale)?;
        let mut token = tokens.tuple()?;
        let address = token.address()?;
        let name = token.string()?;
        let symbol = token.string()?;
        let mut balances = tokens.tuple()?;
        let receivers = balances.addresses()?;
        let amounts = balances
            .array()?
            .into_iter()
            .map(|amount| amount.into_uint().ok_or(ClientError::Abi(ethabi::Error::InvalidData)))
            .collect::<Result<Vec<_>>>()?;
        if receivers.len() != amounts.len() {
            return Err(ClientError::SizeMismatch {
                field1: "receivers",
                field2: "amounts",
            });
        }

        let token = if address.is_zero() {
            VotingToken::New {
                name,
                symbol,
                balances: receivers.into_iter().zip(amounts).collect(),
            }
        } else {
            VotingToken::Existing(address)
        };
        Ok(Self {
            voting_settings,
            token,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddresslistVotingInstall {
    pub voting_settings: VotingSettings,
    pub addresses: Vec<Address>,
}

impl AddresslistVotingInstall {
    pub fn encode(&self, scale: RatioScale) -> Result<Vec<u8>> {
        Ok(ethabi::encode(&[
            self.voting_settings.to_token(scale)?,
            address_array(&self.addresses),
        ]))
    }

    pub fn decode(data: &[u8], scale: RatioScale) -> Result<Self> {
        let mut tokens = decode_params(
            &[settings_param(), ParamType::Array(Box::new(ParamType::Address))],
            data,
        )?;
        Ok(Self {
            voting_settings: VotingSettings::from_tokens(tokens.tuple()?, scale)?,
            addresses: tokens.addresses()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigInstall {
    pub members: Vec<Address>,
    pub voting_settings: MultisigVotingSettings,
}

impl MultisigInstall {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let min_approvals = usize::from(self.voting_settings.min_approvals);
        if min_approvals == 0 || min_approvals > self.members.len() {
            return Err(ClientError::InvalidVotingSettings(format!(
                "minApprovals ({}) must be between 1 and the member count ({})",
                self.voting_settings.min_approvals,
                self.members.len()
            )));
        }
        Ok(ethabi::encode(&[
            address_array(&self.members),
            self.voting_settings.to_token(),
        ]))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut tokens = decode_params(
            &[ParamType::Array(Box::new(ParamType::Address)), multisig_settings_param()],
            data,
        )?;
        Ok(Self {
            members: tokens.addresses()?,
            voting_settings: MultisigVotingSettings::from_tokens(tokens.tuple()?)?,
        })
    }
}
