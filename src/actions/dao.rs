//! DAO-level actions: permissions, withdrawals, metadata, upgrades and
//! plugin setup application.

use super::{setup_ref_token, DaoAction, MultiTargetPermission, VersionTag};
use crate::abi::{ContractInterface, InterfaceParams, Tokens, DAO, ERC20, PLUGIN_SETUP_PROCESSOR};
use crate::config::ContractName;
use crate::constants::{keccak256, permission_id, permission_name, ROOT_PERMISSION, UPGRADE_PLUGIN_PERMISSION};
use crate::context::Context;
use crate::errors::{ClientError, Result};
use crate::metadata::{fetch_json, pin_json, DaoMetadata};
use ethabi::ethereum_types::{Address, U256};
use ethabi::Token;
use tracing::debug;

/// DAO functions recognized by [`DaoDecoding::find_interface`]
const DAO_FUNCTIONS: &[&str] = &[
    "grant",
    "grantWithCondition",
    "revoke",
    "setMetadata",
    "setDaoURI",
    "registerStandardCallback",
    "setSignatureValidator",
    "upgradeTo",
    "upgradeToAndCall",
];

const PROCESSOR_FUNCTIONS: &[&str] = &["applyInstallation", "applyUninstallation", "applyUpdate"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionParams {
    pub where_: Address,
    pub who: Address,
    /// Permission name, hashed on encoding
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionWithConditionParams {
    pub where_: Address,
    pub who: Address,
    pub permission: String,
    pub condition: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPermissionParams {
    pub where_: Address,
    pub who: Address,
    /// Known permission name, or empty when the hash is not in the registry
    pub permission: String,
    pub permission_id: [u8; 32],
    pub condition: Option<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Native,
    Erc20,
    Erc721,
    Erc1155,
}

impl TokenType {
    fn label(&self) -> &'static str {
        match self {
            TokenType::Native => "native",
            TokenType::Erc20 => "erc20",
            TokenType::Erc721 => "erc721",
            TokenType::Erc1155 => "erc1155",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawParams {
    pub token_type: TokenType,
    /// Required for every token type but the native one
    pub token_address: Option<Address>,
    pub recipient: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterStandardCallbackParams {
    pub interface_id: [u8; 4],
    pub callback_selector: [u8; 4],
    pub magic_number: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeToAndCallParams {
    pub implementation: Address,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyInstallationParams {
    pub plugin_repo: Address,
    pub version_tag: VersionTag,
    pub plugin_address: Address,
    pub permissions: Vec<MultiTargetPermission>,
    pub helpers: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedApplyInstallationParams {
    pub plugin_repo: Address,
    pub version_tag: VersionTag,
    pub plugin_address: Address,
    pub permissions: Vec<MultiTargetPermission>,
    pub helpers_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyUninstallationParams {
    pub plugin_repo: Address,
    pub version_tag: VersionTag,
    pub plugin_address: Address,
    pub permissions: Vec<MultiTargetPermission>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyUpdateParams {
    pub plugin_address: Address,
    pub plugin_repo: Address,
    pub version_tag: VersionTag,
    pub init_data: Vec<u8>,
    pub permissions: Vec<MultiTargetPermission>,
    pub helpers: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedApplyUpdateParams {
    pub plugin_address: Address,
    pub plugin_repo: Address,
    pub version_tag: VersionTag,
    pub init_data: Vec<u8>,
    pub permissions: Vec<MultiTargetPermission>,
    pub helpers_hash: [u8; 32],
}

/// `keccak256(abi.encode(helpers))`, as the setup processor verifies it
pub fn hash_helpers(helpers: &[Address]) -> [u8; 32] {
    let tokens = helpers.iter().copied().map(Token::Address).collect();
    keccak256(&ethabi::encode(&[Token::Array(tokens)]))
}

fn permission_tokens(permissions: &[MultiTargetPermission]) -> Token {
    Token::Array(permissions.iter().map(MultiTargetPermission::to_token).collect())
}

fn decode_permissions(tokens: &mut Tokens) -> Result<Vec<MultiTargetPermission>> {
    tokens
        .tuples()?
        .into_iter()
        .map(MultiTargetPermission::from_tokens)
        .collect()
}

fn bytes32(tokens: &mut Tokens) -> Result<[u8; 32]> {
    <[u8; 32]>::try_from(tokens.fixed_bytes()?.as_slice())
        .map_err(|_| ClientError::Abi(ethabi::Error::InvalidData))
}

fn bytes4(tokens: &mut Tokens) -> Result<[u8; 4]> {
    <[u8; 4]>::try_from(tokens.fixed_bytes()?.as_slice())
        .map_err(|_| ClientError::Abi(ethabi::Error::InvalidData))
}

/// `grant`/`revoke` of a raw permission id on `dao`
fn permission_action(
    dao: Address,
    function: &str,
    where_: Address,
    who: Address,
    permission_id: [u8; 32],
) -> Result<DaoAction> {
    let data = DAO.encode_function_data(
        function,
        &[
            Token::Address(where_),
            Token::Address(who),
            Token::FixedBytes(permission_id.to_vec()),
        ],
    )?;
    Ok(DaoAction::call(dao, data))
}

/// Wrap `call` between a grant and the matching revoke of `permission`
fn bracket(
    dao: Address,
    where_: Address,
    who: Address,
    permission: &str,
    call: Vec<DaoAction>,
) -> Result<Vec<DaoAction>> {
    let id = permission_id(permission);
    let mut actions = Vec::with_capacity(call.len() + 2);
    actions.push(permission_action(dao, "grant", where_, who, id)?);
    actions.extend(call);
    actions.push(permission_action(dao, "revoke", where_, who, id)?);
    Ok(actions)
}

/// Encoders of DAO-level actions
#[derive(Clone)]
pub struct DaoEncoding {
    ctx: Context,
}

impl DaoEncoding {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn grant_action(&self, dao: Address, params: &PermissionParams) -> Result<DaoAction> {
        permission_action(dao, "grant", params.where_, params.who, permission_id(&params.permission))
    }

    pub fn revoke_action(&self, dao: Address, params: &PermissionParams) -> Result<DaoAction> {
        permission_action(dao, "revoke", params.where_, params.who, permission_id(&params.permission))
    }

    pub fn grant_with_condition_action(
        &self,
        dao: Address,
        params: &PermissionWithConditionParams,
    ) -> Result<DaoAction> {
        let data = DAO.encode_function_data(
            "grantWithCondition",
            &[
                Token::Address(params.where_),
                Token::Address(params.who),
                Token::FixedBytes(permission_id(&params.permission).to_vec()),
                Token::Address(params.condition),
            ],
        )?;
        Ok(DaoAction::call(dao, data))
    }

    /// Transfer assets out of the DAO.
    ///
    /// Native withdrawals carry the amount as value and no calldata; ERC-20
    /// withdrawals call `transfer` on the token.
    pub fn withdraw_action(&self, params: &WithdrawParams) -> Result<DaoAction> {
        match params.token_type {
            TokenType::Native => Ok(DaoAction {
                to: params.recipient,
                value: params.amount,
                data: vec![],
            }),
            TokenType::Erc20 => {
                let token = params.token_address.ok_or(ClientError::InvalidAddress)?;
                let data = ERC20.encode_function_data(
                    "transfer",
                    &[Token::Address(params.recipient), Token::Uint(params.amount)],
                )?;
                Ok(DaoAction::call(token, data))
            }
            other => Err(ClientError::UnsupportedTokenType(other.label().to_string())),
        }
    }

    /// Pin `metadata` and point the DAO at it
    pub async fn update_dao_metadata_action(
        &self,
        dao: Address,
        metadata: &DaoMetadata,
    ) -> Result<DaoAction> {
        let uri = pin_json(self.ctx.ipfs(), metadata).await?;
        self.update_dao_metadata_raw_action(dao, &uri)
    }

    pub fn update_dao_metadata_raw_action(&self, dao: Address, uri: &str) -> Result<DaoAction> {
        let data = DAO.encode_function_data("setMetadata", &[Token::Bytes(uri.as_bytes().to_vec())])?;
        Ok(DaoAction::call(dao, data))
    }

    pub fn set_dao_uri_action(&self, dao: Address, uri: &str) -> Result<DaoAction> {
        let data = DAO.encode_function_data("setDaoURI", &[Token::String(uri.to_string())])?;
        Ok(DaoAction::call(dao, data))
    }

    pub fn register_standard_callback_action(
        &self,
        dao: Address,
        params: &RegisterStandardCallbackParams,
    ) -> Result<DaoAction> {
        let data = DAO.encode_function_data(
            "registerStandardCallback",
            &[
                Token::FixedBytes(params.interface_id.to_vec()),
                Token::FixedBytes(params.callback_selector.to_vec()),
                Token::FixedBytes(params.magic_number.to_vec()),
            ],
        )?;
        Ok(DaoAction::call(dao, data))
    }

    pub fn set_signature_validator_action(&self, dao: Address, validator: Address) -> Result<DaoAction> {
        let data = DAO.encode_function_data("setSignatureValidator", &[Token::Address(validator)])?;
        Ok(DaoAction::call(dao, data))
    }

    pub fn upgrade_to_action(&self, dao: Address, implementation: Address) -> Result<DaoAction> {
        let data = DAO.encode_function_data("upgradeTo", &[Token::Address(implementation)])?;
        Ok(DaoAction::call(dao, data))
    }

    pub fn upgrade_to_and_call_action(
        &self,
        dao: Address,
        params: &UpgradeToAndCallParams,
    ) -> Result<DaoAction> {
        let data = DAO.encode_function_data(
            "upgradeToAndCall",
            &[
                Token::Address(params.implementation),
                Token::Bytes(params.data.clone()),
            ],
        )?;
        Ok(DaoAction::call(dao, data))
    }

    fn processor(&self) -> Result<Address> {
        self.ctx.web3().contract_address(ContractName::PluginSetupProcessor)
    }

    /// Grant ROOT to the setup processor, apply the installation, revoke ROOT
    pub fn apply_installation_action(
        &self,
        dao: Address,
        params: &ApplyInstallationParams,
    ) -> Result<Vec<DaoAction>> {
        let processor = self.processor()?;
        let data = PLUGIN_SETUP_PROCESSOR.encode_function_data(
            "applyInstallation",
            &[
                Token::Address(dao),
                Token::Tuple(vec![
                    setup_ref_token(params.plugin_repo, params.version_tag),
                    Token::Address(params.plugin_address),
                    permission_tokens(&params.permissions),
                    Token::FixedBytes(hash_helpers(&params.helpers).to_vec()),
                ]),
            ],
        )?;
        debug!("Applying installation of {:?} on {:?}", params.plugin_address, dao);
        bracket(dao, dao, processor, ROOT_PERMISSION, vec![DaoAction::call(processor, data)])
    }

    pub fn apply_uninstallation_action(
        &self,
        dao: Address,
        params: &ApplyUninstallationParams,
    ) -> Result<Vec<DaoAction>> {
        let processor = self.processor()?;
        let data = PLUGIN_SETUP_PROCESSOR.encode_function_data(
            "applyUninstallation",
            &[
                Token::Address(dao),
                Token::Tuple(vec![
                    setup_ref_token(params.plugin_repo, params.version_tag),
                    Token::Address(params.plugin_address),
                    permission_tokens(&params.permissions),
                ]),
            ],
        )?;
        bracket(dao, dao, processor, ROOT_PERMISSION, vec![DaoAction::call(processor, data)])
    }

    /// Five actions: the update call nested in a ROOT bracket on the DAO,
    /// itself nested in an UPGRADE_PLUGIN bracket on the plugin
    pub fn apply_update_action(&self, dao: Address, params: &ApplyUpdateParams) -> Result<Vec<DaoAction>> {
        let processor = self.processor()?;
        let data = PLUGIN_SETUP_PROCESSOR.encode_function_data(
            "applyUpdate",
            &[
                Token::Address(dao),
                Token::Tuple(vec![
                    Token::Address(params.plugin_address),
                    setup_ref_token(params.plugin_repo, params.version_tag),
                    Token::Bytes(params.init_data.clone()),
                    permission_tokens(&params.permissions),
                    Token::FixedBytes(hash_helpers(&params.helpers).to_vec()),
                ]),
            ],
        )?;
        let root = bracket(dao, dao, processor, ROOT_PERMISSION, vec![DaoAction::call(processor, data)])?;
        bracket(dao, params.plugin_address, processor, UPGRADE_PLUGIN_PERMISSION, root)
    }
}

/// Decoders of DAO-level actions; each rejects calldata of any other function
#[derive(Clone)]
pub struct DaoDecoding {
    ctx: Context,
}

impl DaoDecoding {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    fn decode(interface: &ContractInterface, function: &str, data: &[u8]) -> Result<Tokens> {
        interface.decode_function_data(function, data).map(Tokens::new)
    }

    fn permission(function: &str, data: &[u8]) -> Result<DecodedPermissionParams> {
        let mut tokens = Self::decode(&DAO, function, data)?;
        let where_ = tokens.address()?;
        let who = tokens.address()?;
        let permission_id = bytes32(&mut tokens)?;
        let condition = if function == "grantWithCondition" {
            Some(tokens.address()?)
        } else {
            None
        };
        Ok(DecodedPermissionParams {
            where_,
            who,
            permission: permission_name(&permission_id),
            permission_id,
            condition,
        })
    }

    pub fn grant_action(&self, data: &[u8]) -> Result<DecodedPermissionParams> {
        Self::permission("grant", data)
    }

    pub fn revoke_action(&self, data: &[u8]) -> Result<DecodedPermissionParams> {
        Self::permission("revoke", data)
    }

    pub fn grant_with_condition_action(&self, data: &[u8]) -> Result<DecodedPermissionParams> {
        Self::permission("grantWithCondition", data)
    }

    /// Inverse of [`DaoEncoding::withdraw_action`]; needs the whole action
    /// since native withdrawals carry no calldata
    pub fn withdraw_action(&self, action: &DaoAction) -> Result<WithdrawParams> {
        if action.data.is_empty() {
            return Ok(WithdrawParams {
                token_type: TokenType::Native,
                token_address: None,
                recipient: action.to,
                amount: action.value,
            });
        }
        let mut tokens = Self::decode(&ERC20, "transfer", &action.data)?;
        Ok(WithdrawParams {
            token_type: TokenType::Erc20,
            token_address: Some(action.to),
            recipient: tokens.address()?,
            amount: tokens.uint()?,
        })
    }

    /// Metadata URI carried by a `setMetadata` call
    pub fn update_dao_metadata_raw_action(&self, data: &[u8]) -> Result<String> {
        let bytes = Self::decode(&DAO, "setMetadata", data)?.bytes()?;
        String::from_utf8(bytes).map_err(|e| ClientError::InvalidMetadata(e.to_string()))
    }

    /// Fetch the document a `setMetadata` call points at
    pub async fn update_dao_metadata_action(&self, data: &[u8]) -> Result<DaoMetadata> {
        let uri = self.update_dao_metadata_raw_action(data)?;
        fetch_json(self.ctx.ipfs(), &uri).await
    }

    pub fn set_dao_uri_action(&self, data: &[u8]) -> Result<String> {
        Self::decode(&DAO, "setDaoURI", data)?.string()
    }

    pub fn register_standard_callback_action(&self, data: &[u8]) -> Result<RegisterStandardCallbackParams> {
        let mut tokens = Self::decode(&DAO, "registerStandardCallback", data)?;
        Ok(RegisterStandardCallbackParams {
            interface_id: bytes4(&mut tokens)?,
            callback_selector: bytes4(&mut tokens)?,
            magic_number: bytes4(&mut tokens)?,
        })
    }

    pub fn set_signature_validator_action(&self, data: &[u8]) -> Result<Address> {
        Self::decode(&DAO, "setSignatureValidator", data)?.address()
    }

    pub fn upgrade_to_action(&self, data: &[u8]) -> Result<Address> {
        Self::decode(&DAO, "upgradeTo", data)?.address()
    }

    pub fn upgrade_to_and_call_action(&self, data: &[u8]) -> Result<UpgradeToAndCallParams> {
        let mut tokens = Self::decode(&DAO, "upgradeToAndCall", data)?;
        Ok(UpgradeToAndCallParams {
            implementation: tokens.address()?,
            data: tokens.bytes()?,
        })
    }

    /// Decode the processor call in the middle of an installation bracket
    pub fn apply_installation_action(&self, data: &[u8]) -> Result<DecodedApplyInstallationParams> {
        let mut tokens = Self::decode(&PLUGIN_SETUP_PROCESSOR, "applyInstallation", data)?;
        let _dao = tokens.address()?;
        let mut params = tokens.tuple()?;
        let mut setup_ref = params.tuple()?;
        let version_tag = VersionTag::from_tokens(setup_ref.tuple()?)?;
        Ok(DecodedApplyInstallationParams {
            version_tag,
            plugin_repo: setup_ref.address()?,
            plugin_address: params.address()?,
            permissions: decode_permissions(&mut params)?,
            helpers_hash: bytes32(&mut params)?,
        })
    }

    pub fn apply_uninstallation_action(&self, data: &[u8]) -> Result<ApplyUninstallationParams> {
        let mut tokens = Self::decode(&PLUGIN_SETUP_PROCESSOR, "applyUninstallation", data)?;
        let _dao = tokens.address()?;
        let mut params = tokens.tuple()?;
        let mut setup_ref = params.tuple()?;
        let version_tag = VersionTag::from_tokens(setup_ref.tuple()?)?;
        Ok(ApplyUninstallationParams {
            version_tag,
            plugin_repo: setup_ref.address()?,
            plugin_address: params.address()?,
            permissions: decode_permissions(&mut params)?,
        })
    }

    pub fn apply_update_action(&self, data: &[u8]) -> Result<DecodedApplyUpdateParams> {
        let mut tokens = Self::decode(&PLUGIN_SETUP_PROCESSOR, "applyUpdate", data)?;
        let _dao = tokens.address()?;
        let mut params = tokens.tuple()?;
        let plugin_address = params.address()?;
        let mut setup_ref = params.tuple()?;
        let version_tag = VersionTag::from_tokens(setup_ref.tuple()?)?;
        Ok(DecodedApplyUpdateParams {
            plugin_address,
            version_tag,
            plugin_repo: setup_ref.address()?,
            init_data: params.bytes()?,
            permissions: decode_permissions(&mut params)?,
            helpers_hash: bytes32(&mut params)?,
        })
    }

    /// Identify a DAO, setup processor or ERC-20 transfer call
    pub fn find_interface(&self, data: &[u8]) -> Option<InterfaceParams> {
        DAO.find_interface(data, DAO_FUNCTIONS)
            .or_else(|| PLUGIN_SETUP_PROCESSOR.find_interface(data, PROCESSOR_FUNCTIONS))
            .or_else(|| ERC20.find_interface(data, &["transfer"]))
    }
}
