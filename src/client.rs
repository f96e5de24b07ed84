//! DAO-level client: creation, deposits, allowances, permissions and the
//! indexed DAO views.

use crate::abi::{log_param, Tokens, DAO, DAO_FACTORY, DAO_REGISTRY, ERC20};
use crate::actions::dao::{DaoDecoding, DaoEncoding};
use crate::actions::{setup_ref_token, PermissionOperation, PluginInstallItem, VersionTag};
use crate::adapter::{parse_record_address, parse_timestamp};
use crate::address::{address_to_string, resolve_address_or_ens};
use crate::config::ContractName;
use crate::constants::{permission_id, EXECUTE_PERMISSION, SUBDOMAIN_REGEX};
use crate::context::Context;
use crate::errors::{ClientError, Result};
use crate::installation::{latest_version, prepare_installation, simulate_installation, PrepareInstallationParams};
use crate::metadata::{pin_json, resolve_metadata, DaoMetadata};
use crate::steps::{self, AllowanceStep, DaoCreationStep, DepositStep, PrepareInstallationStep, StepStream};
use crate::subgraph::{SortDirection, SubgraphDao, QUERY_DAO, QUERY_DAOS};
use crate::transport::{
    call_function, confirm, estimate_fee, find_event, submit, GasFeeEstimation, TransactionRequest, Web3Service,
};
use async_stream::try_stream;
use chrono::{DateTime, Utc};
use ethabi::ethereum_types::{Address, U256};
use ethabi::Token;
use futures::future::join_all;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDaoParams {
    /// Pinned DAO metadata, see [`DaoMethods::pin_metadata`]
    pub metadata_uri: String,
    pub dao_uri: Option<String>,
    /// Registered as `{subdomain}.dao.eth`
    pub ens_subdomain: String,
    pub trusted_forwarder: Option<Address>,
    pub plugins: Vec<PluginInstallItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositParams {
    pub dao_address_or_ens: String,
    pub amount: U256,
    /// ERC-20 token to deposit; the native token when unset
    pub token_address: Option<Address>,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureAllowanceParams {
    pub dao_address_or_ens: String,
    pub token_address: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasPermissionParams {
    pub dao_address_or_ens: String,
    pub where_: Address,
    pub who: Address,
    /// Permission name, hashed before the call
    pub permission: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DaoSortBy {
    #[default]
    CreatedAt,
    Subdomain,
}

impl DaoSortBy {
    fn field(&self) -> &'static str {
        match self {
            DaoSortBy::CreatedAt => "createdAt",
            DaoSortBy::Subdomain => "subdomain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoQueryParams {
    pub limit: u32,
    pub skip: u32,
    pub direction: SortDirection,
    pub sort_by: DaoSortBy,
}

impl Default for DaoQueryParams {
    fn default() -> Self {
        Self {
            limit: 10,
            skip: 0,
            direction: SortDirection::Asc,
            sort_by: DaoSortBy::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPluginListItem {
    pub instance_address: Address,
    /// ENS name of the plugin repo, empty when the indexer does not know it
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoDetails {
    pub address: Address,
    pub ens_domain: String,
    pub metadata: DaoMetadata,
    pub creation_date: DateTime<Utc>,
    pub plugins: Vec<InstalledPluginListItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoListItem {
    pub address: Address,
    pub ens_domain: String,
    pub metadata: DaoMetadata,
    pub plugins: Vec<InstalledPluginListItem>,
}

fn installed_plugins(record: &SubgraphDao) -> Result<Vec<InstalledPluginListItem>> {
    record
        .plugins
        .iter()
        .filter_map(|plugin| {
            let preparation = plugin.applied_preparation.as_ref()?;
            let id = plugin
                .applied_plugin_repo
                .as_ref()
                .map(|repo| format!("{}.plugin.dao.eth", repo.subdomain))
                .unwrap_or_default();
            Some(
                parse_record_address("plugin", &preparation.plugin_address)
                    .map(|instance_address| InstalledPluginListItem { instance_address, id }),
            )
        })
        .collect()
}

fn to_dao_details(record: &SubgraphDao, metadata: DaoMetadata) -> Result<DaoDetails> {
    Ok(DaoDetails {
        address: parse_record_address("dao", &record.id)?,
        ens_domain: record.subdomain.clone().unwrap_or_default(),
        metadata,
        creation_date: parse_timestamp("createdAt", &record.created_at)?,
        plugins: installed_plugins(record)?,
    })
}

fn to_dao_list_item(record: &SubgraphDao, metadata: DaoMetadata) -> Result<DaoListItem> {
    Ok(DaoListItem {
        address: parse_record_address("dao", &record.id)?,
        ens_domain: record.subdomain.clone().unwrap_or_default(),
        metadata,
        plugins: installed_plugins(record)?,
    })
}

fn validate_create_params(params: &CreateDaoParams) -> Result<()> {
    if !SUBDOMAIN_REGEX.is_match(&params.ens_subdomain) {
        return Err(ClientError::InvalidSubdomain(params.ens_subdomain.clone()));
    }
    Ok(())
}

/// Latest version of every plugin repo, in install order
async fn plugin_versions(web3: &dyn Web3Service, plugins: &[PluginInstallItem]) -> Result<Vec<VersionTag>> {
    let mut versions = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        versions.push(latest_version(web3, plugin.id).await?);
    }
    Ok(versions)
}

/// Fail unless some plugin would be granted EXECUTE_PERMISSION on a fresh DAO
async fn ensure_execute_granted(
    web3: &dyn Web3Service,
    dao_base: Address,
    plugins: &[PluginInstallItem],
    versions: &[VersionTag],
) -> Result<()> {
    let execute = permission_id(EXECUTE_PERMISSION);
    for (plugin, version) in plugins.iter().zip(versions) {
        let permissions = simulate_installation(web3, dao_base, plugin, *version).await?;
        if permissions
            .iter()
            .any(|p| p.permission_id == execute && p.operation != PermissionOperation::Revoke)
        {
            return Ok(());
        }
    }
    Err(ClientError::MissingExecPermission)
}

fn create_dao_request(factory: Address, params: &CreateDaoParams, versions: &[VersionTag]) -> Result<TransactionRequest> {
    let dao_settings = Token::Tuple(vec![
        Token::Address(params.trusted_forwarder.unwrap_or_else(Address::zero)),
        Token::String(params.dao_uri.clone().unwrap_or_default()),
        Token::String(params.ens_subdomain.clone()),
        Token::Bytes(params.metadata_uri.as_bytes().to_vec()),
    ]);
    let plugin_settings = Token::Array(
        params
            .plugins
            .iter()
            .zip(versions)
            .map(|(plugin, version)| {
                Token::Tuple(vec![setup_ref_token(plugin.id, *version), Token::Bytes(plugin.data.clone())])
            })
            .collect(),
    );
    let data = DAO_FACTORY.encode_function_data("createDao", &[dao_settings, plugin_settings])?;
    Ok(TransactionRequest::new(factory, data))
}

fn approve_request(token: Address, spender: Address, amount: U256) -> Result<TransactionRequest> {
    let data = ERC20.encode_function_data("approve", &[Token::Address(spender), Token::Uint(amount)])?;
    Ok(TransactionRequest::new(token, data))
}

fn deposit_request(dao: Address, params: &DepositParams) -> Result<TransactionRequest> {
    let data = DAO.encode_function_data(
        "deposit",
        &[
            Token::Address(params.token_address.unwrap_or_else(Address::zero)),
            Token::Uint(params.amount),
            Token::String(params.reference.clone()),
        ],
    )?;
    let request = TransactionRequest::new(dao, data);
    Ok(match params.token_address {
        Some(_) => request,
        None => request.with_value(params.amount),
    })
}

fn validate_amount(amount: U256) -> Result<()> {
    if amount.is_zero() {
        return Err(ClientError::InvalidAmount("the amount must be greater than zero".to_string()));
    }
    Ok(())
}

fn check_approved(approved: U256, requested: U256) -> Result<()> {
    if approved < requested {
        return Err(ClientError::EnsureAllowance(format!(
            "approved {:x}, requested {:x}",
            approved, requested
        )));
    }
    Ok(())
}

fn check_deposited(expected: U256, deposited: U256) -> Result<()> {
    if deposited != expected {
        return Err(ClientError::Deposit(format!(
            "deposited amount mismatch, expected {:x}, received {:x}",
            expected, deposited
        )));
    }
    Ok(())
}

/// Write operations and indexer reads of DAOs
#[derive(Clone)]
pub struct DaoMethods {
    ctx: Context,
}

impl DaoMethods {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Create a DAO with its initial plugins.
    ///
    /// Each plugin installation is simulated against the DAO base first; the
    /// stream fails with `MissingExecPermission` without sending anything
    /// when none of them would be granted EXECUTE_PERMISSION.
    pub fn create_dao(&self, params: CreateDaoParams) -> Result<StepStream<'_, DaoCreationStep>> {
        validate_create_params(&params)?;
        self.ctx.web3().signer_address()?;
        let factory = self.ctx.web3().contract_address(ContractName::DaoFactory)?;

        Ok(steps::boxed(try_stream! {
            let web3 = self.ctx.web3();
            let versions = plugin_versions(web3, &params.plugins).await?;

            let mut dao_base = Tokens::new(call_function(web3, factory, &DAO_FACTORY, "daoBase", &[]).await?);
            let dao_base = dao_base.address()?;
            ensure_execute_granted(web3, dao_base, &params.plugins, &versions).await?;

            let tx_hash = submit(web3, create_dao_request(factory, &params, &versions)?).await?;
            yield DaoCreationStep::Creating { tx_hash };

            let receipt = confirm(web3, tx_hash).await?;
            let log = find_event(&receipt, &DAO_REGISTRY, "DAORegistered")?
                .ok_or_else(|| ClientError::DaoCreation("DAORegistered event not found".to_string()))?;
            let address = log_param(&log, "dao")?
                .into_address()
                .ok_or_else(|| ClientError::DaoCreation("dao is not an address".to_string()))?;

            info!("DAO {} created at {}", params.ens_subdomain, address_to_string(&address));
            yield DaoCreationStep::Done { address };
        }))
    }

    /// Serialize and pin DAO metadata, returning `ipfs://{cid}`
    pub async fn pin_metadata(&self, metadata: &DaoMetadata) -> Result<String> {
        pin_json(self.ctx.ipfs(), metadata).await
    }

    /// Allowance of the signer towards `spender`, updated only when it does
    /// not cover `amount`
    fn allowance_steps(
        &self,
        owner: Address,
        spender: Address,
        token: Address,
        amount: U256,
    ) -> StepStream<'_, AllowanceStep> {
        steps::boxed(try_stream! {
            let web3 = self.ctx.web3();
            let mut current = Tokens::new(
                call_function(
                    web3,
                    token,
                    &ERC20,
                    "allowance",
                    &[Token::Address(owner), Token::Address(spender)],
                )
                .await?,
            );
            let allowance = current.uint()?;
            yield AllowanceStep::CheckedAllowance { allowance };

            if allowance >= amount {
                debug!("Allowance of {:x} already covers {:x}", allowance, amount);
                yield AllowanceStep::Done { allowance };
            } else {
                let tx_hash = submit(web3, approve_request(token, spender, amount)?).await?;
                yield AllowanceStep::UpdatingAllowance { tx_hash };

                let receipt = confirm(web3, tx_hash).await?;
                let log = find_event(&receipt, &ERC20, "Approval")?
                    .ok_or_else(|| ClientError::EnsureAllowance("Approval event not found".to_string()))?;
                let value = log_param(&log, "value")?
                    .into_uint()
                    .ok_or_else(|| ClientError::EnsureAllowance("value is not a number".to_string()))?;
                check_approved(value, amount)?;
                yield AllowanceStep::Done { allowance: amount };
            }
        })
    }

    /// Make sure the DAO may pull `amount` of the token from the signer
    pub fn ensure_allowance(&self, params: EnsureAllowanceParams) -> Result<StepStream<'_, AllowanceStep>> {
        let owner = self.ctx.web3().signer_address()?;

        Ok(steps::boxed(try_stream! {
            let spender = resolve_address_or_ens(&params.dao_address_or_ens, self.ctx.web3()).await?;
            let mut inner = self.allowance_steps(owner, spender, params.token_address, params.amount);
            while let Some(step) = inner.next().await {
                yield step?;
            }
        }))
    }

    /// Deposit native or ERC-20 tokens into a DAO, raising the allowance
    /// first when an ERC-20 deposit needs it
    pub fn deposit(&self, params: DepositParams) -> Result<StepStream<'_, DepositStep>> {
        validate_amount(params.amount)?;
        let owner = self.ctx.web3().signer_address()?;

        Ok(steps::boxed(try_stream! {
            let web3 = self.ctx.web3();
            let dao = resolve_address_or_ens(&params.dao_address_or_ens, web3).await?;

            if let Some(token) = params.token_address {
                let mut updated = false;
                let mut allowance_steps = self.allowance_steps(owner, dao, token, params.amount);
                while let Some(step) = allowance_steps.next().await {
                    match step? {
                        AllowanceStep::CheckedAllowance { allowance } => {
                            yield DepositStep::CheckedAllowance { allowance };
                        }
                        AllowanceStep::UpdatingAllowance { tx_hash } => {
                            updated = true;
                            yield DepositStep::UpdatingAllowance { tx_hash };
                        }
                        AllowanceStep::Done { allowance } => {
                            if updated {
                                yield DepositStep::UpdatedAllowance { allowance };
                            }
                        }
                    }
                }
            }

            let tx_hash = submit(web3, deposit_request(dao, &params)?).await?;
            yield DepositStep::Depositing { tx_hash };

            let receipt = confirm(web3, tx_hash).await?;
            let log = find_event(&receipt, &DAO, "Deposited")?
                .ok_or_else(|| ClientError::Deposit("Deposited event not found".to_string()))?;
            let deposited = log_param(&log, "amount")?
                .into_uint()
                .ok_or_else(|| ClientError::Deposit("amount is not a number".to_string()))?;
            check_deposited(params.amount, deposited)?;

            info!("Deposited {:x} into {}", deposited, address_to_string(&dao));
            yield DepositStep::Done { amount: deposited };
        }))
    }

    /// Prepare the installation of any plugin repo on an existing DAO
    pub fn prepare_installation(
        &self,
        params: PrepareInstallationParams,
    ) -> Result<StepStream<'_, PrepareInstallationStep>> {
        prepare_installation(&self.ctx, params)
    }

    pub async fn has_permission(&self, params: &HasPermissionParams) -> Result<bool> {
        let dao = resolve_address_or_ens(&params.dao_address_or_ens, self.ctx.web3()).await?;
        let mut output = Tokens::new(
            call_function(
                self.ctx.web3(),
                dao,
                &DAO,
                "hasPermission",
                &[
                    Token::Address(params.where_),
                    Token::Address(params.who),
                    Token::FixedBytes(permission_id(&params.permission).to_vec()),
                    Token::Bytes(params.data.clone()),
                ],
            )
            .await?,
        );
        output.boolean()
    }

    async fn query(&self, document: &str, variables: Value) -> Result<Value> {
        debug!("Querying DAO data with {}", variables);
        self.ctx
            .graphql()
            .request(document, variables)
            .await
            .map_err(|e| ClientError::graphql("DAO", e))
    }

    /// Indexed DAO, `None` when the indexer does not know it
    pub async fn get_dao(&self, dao_address_or_ens: &str) -> Result<Option<DaoDetails>> {
        let address = resolve_address_or_ens(dao_address_or_ens, self.ctx.web3()).await?;
        let data = self
            .query(QUERY_DAO, json!({ "address": address_to_string(&address) }))
            .await?;
        let record: SubgraphDao = match data.get("dao") {
            Some(record) if !record.is_null() => {
                serde_json::from_value(record.clone()).map_err(|e| ClientError::graphql("DAO", e))?
            }
            _ => return Ok(None),
        };

        let metadata: DaoMetadata = resolve_metadata(self.ctx.ipfs(), record.metadata.as_deref(), None).await;
        to_dao_details(&record, metadata).map(Some)
    }

    /// Indexed DAOs; the metadata of each one degrades on its own
    pub async fn get_daos(&self, params: &DaoQueryParams) -> Result<Vec<DaoListItem>> {
        let data = self
            .query(
                QUERY_DAOS,
                json!({
                    "limit": params.limit,
                    "skip": params.skip,
                    "direction": params.direction,
                    "sortBy": params.sort_by.field(),
                }),
            )
            .await?;
        let records: Vec<SubgraphDao> = match data.get("daos") {
            Some(records) if !records.is_null() => {
                serde_json::from_value(records.clone()).map_err(|e| ClientError::graphql("DAO", e))?
            }
            _ => vec![],
        };

        let timeout = self.ctx.multi_fetch_timeout();
        let metadata: Vec<DaoMetadata> = join_all(
            records
                .iter()
                .map(|record| resolve_metadata(self.ctx.ipfs(), record.metadata.as_deref(), Some(timeout))),
        )
        .await;

        records
            .iter()
            .zip(metadata)
            .map(|(record, metadata)| to_dao_list_item(record, metadata))
            .collect()
    }
}

/// Gas cost of the DAO write methods
#[derive(Clone)]
pub struct DaoEstimation {
    ctx: Context,
}

impl DaoEstimation {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn create_dao(&self, params: &CreateDaoParams) -> Result<GasFeeEstimation> {
        validate_create_params(params)?;
        let web3 = self.ctx.web3();
        let factory = web3.contract_address(ContractName::DaoFactory)?;
        let versions = plugin_versions(web3, &params.plugins).await?;
        estimate_fee(web3, &create_dao_request(factory, params, &versions)?).await
    }

    pub async fn deposit(&self, params: &DepositParams) -> Result<GasFeeEstimation> {
        validate_amount(params.amount)?;
        let dao = resolve_address_or_ens(&params.dao_address_or_ens, self.ctx.web3()).await?;
        estimate_fee(self.ctx.web3(), &deposit_request(dao, params)?).await
    }

    pub async fn update_allowance(&self, params: &EnsureAllowanceParams) -> Result<GasFeeEstimation> {
        let spender = resolve_address_or_ens(&params.dao_address_or_ens, self.ctx.web3()).await?;
        estimate_fee(
            self.ctx.web3(),
            &approve_request(params.token_address, spender, params.amount)?,
        )
        .await
    }
}

/// Entry point for DAO-level operations
#[derive(Clone)]
pub struct Client {
    pub methods: DaoMethods,
    pub encoding: DaoEncoding,
    pub decoding: DaoDecoding,
    pub estimation: DaoEstimation,
}

impl Client {
    pub fn new(ctx: Context) -> Self {
        Self {
            methods: DaoMethods::new(ctx.clone()),
            encoding: DaoEncoding::new(ctx.clone()),
            decoding: DaoDecoding::new(ctx.clone()),
            estimation: DaoEstimation::new(ctx),
        }
    }
}
