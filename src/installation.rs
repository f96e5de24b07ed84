//! Plugin installation preparation through the setup processor.

use crate::abi::{log_param, Tokens, PLUGIN_REPO, PLUGIN_SETUP_PROCESSOR};
use crate::actions::{setup_ref_token, MultiTargetPermission, PluginInstallItem, VersionTag};
use crate::address::resolve_address_or_ens;
use crate::config::ContractName;
use crate::context::Context;
use crate::errors::{ClientError, Result};
use crate::steps::{self, PrepareInstallationStep, PreparedInstallation, StepStream};
use crate::transport::{call_function, confirm, find_event, submit, TransactionRequest, Web3Service};
use async_stream::try_stream;
use ethabi::ethereum_types::Address;
use ethabi::Token;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareInstallationParams {
    pub dao_address_or_ens: String,
    pub plugin_repo: Address,
    /// Latest version of the repo when unset
    pub version: Option<VersionTag>,
    /// ABI-encoded installation parameters of the plugin setup
    pub install_data: Vec<u8>,
}

/// Latest build of the latest release published in `repo`
pub async fn latest_version(web3: &dyn Web3Service, repo: Address) -> Result<VersionTag> {
    let mut release = Tokens::new(call_function(web3, repo, &PLUGIN_REPO, "latestRelease", &[]).await?);
    let release = release.uint()?;
    let mut version = Tokens::new(
        call_function(web3, repo, &PLUGIN_REPO, "getLatestVersion", &[Token::Uint(release)]).await?,
    );
    let mut version = version.tuple()?;
    VersionTag::from_tokens(version.tuple()?)
}

fn prepare_args(dao: Address, repo: Address, version: VersionTag, data: &[u8]) -> Vec<Token> {
    vec![
        Token::Address(dao),
        Token::Tuple(vec![setup_ref_token(repo, version), Token::Bytes(data.to_vec())]),
    ]
}

/// `(helpers, permissions)` tuple of prepared setup data
fn prepared_setup_data(mut tokens: Tokens) -> Result<(Vec<Address>, Vec<MultiTargetPermission>)> {
    let helpers = tokens.addresses()?;
    let permissions = tokens
        .tuples()?
        .into_iter()
        .map(MultiTargetPermission::from_tokens)
        .collect::<Result<_>>()?;
    Ok((helpers, permissions))
}

/// Simulate `prepareInstallation` for `dao` without sending anything and
/// return the permissions the plugin would request
pub async fn simulate_installation(
    web3: &dyn Web3Service,
    dao: Address,
    item: &PluginInstallItem,
    version: VersionTag,
) -> Result<Vec<MultiTargetPermission>> {
    let processor = web3.contract_address(ContractName::PluginSetupProcessor)?;
    let mut output = Tokens::new(
        call_function(
            web3,
            processor,
            &PLUGIN_SETUP_PROCESSOR,
            "prepareInstallation",
            &prepare_args(dao, item.id, version, &item.data),
        )
        .await?,
    );
    let plugin = output.address()?;
    let (_, permissions) = prepared_setup_data(output.tuple()?)?;
    debug!(
        "Installation of {:?} from repo {:?} requests {} permissions",
        plugin,
        item.id,
        permissions.len()
    );
    Ok(permissions)
}

/// Submit `prepareInstallation` and report the prepared setup from its event
pub fn prepare_installation(
    ctx: &Context,
    params: PrepareInstallationParams,
) -> Result<StepStream<'_, PrepareInstallationStep>> {
    ctx.web3().signer_address()?;
    let processor = ctx.web3().contract_address(ContractName::PluginSetupProcessor)?;

    Ok(steps::boxed(try_stream! {
        let web3 = ctx.web3();
        let dao = resolve_address_or_ens(&params.dao_address_or_ens, web3).await?;
        let version = match params.version {
            Some(version) => version,
            None => latest_version(web3, params.plugin_repo).await?,
        };

        let data = PLUGIN_SETUP_PROCESSOR.encode_function_data(
            "prepareInstallation",
            &prepare_args(dao, params.plugin_repo, version, &params.install_data),
        )?;
        let tx_hash = submit(web3, TransactionRequest::new(processor, data)).await?;
        yield PrepareInstallationStep::Preparing { tx_hash };

        let receipt = confirm(web3, tx_hash).await?;
        let log = find_event(&receipt, &PLUGIN_SETUP_PROCESSOR, "InstallationPrepared")?
            .ok_or_else(|| {
                ClientError::PluginInstallationPreparation("InstallationPrepared event not found".to_string())
            })?;

        let plugin_address = log_param(&log, "plugin")?
            .into_address()
            .ok_or_else(|| ClientError::PluginInstallationPreparation("plugin is not an address".to_string()))?;
        let plugin_repo = log_param(&log, "pluginSetupRepo")?
            .into_address()
            .ok_or_else(|| ClientError::PluginInstallationPreparation("repo is not an address".to_string()))?;
        let version_tag = log_param(&log, "versionTag")?
            .into_tuple()
            .map(Tokens::new)
            .ok_or_else(|| ClientError::PluginInstallationPreparation("malformed version tag".to_string()))
            .and_then(VersionTag::from_tokens)?;
        let setup_data = log_param(&log, "preparedSetupData")?
            .into_tuple()
            .map(Tokens::new)
            .ok_or_else(|| ClientError::PluginInstallationPreparation("malformed setup data".to_string()))?;
        let (helpers, permissions) = prepared_setup_data(setup_data)?;

        yield PrepareInstallationStep::Done(PreparedInstallation {
            plugin_address,
            plugin_repo,
            version_tag,
            permissions,
            helpers,
        });
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::PermissionOperation;
    use crate::constants::permission_id;
    use crate::transport::MockWeb3Service;

    fn permission() -> MultiTargetPermission {
        MultiTargetPermission {
            operation: PermissionOperation::Grant,
            where_: Address::repeat_byte(0xda),
            who: Address::repeat_byte(0x11),
            condition: Address::zero(),
            permission_id: permission_id("EXECUTE_PERMISSION"),
        }
    }

    #[tokio::test]
    async fn test_simulate_installation_reads_permissions() {
        let repo = Address::repeat_byte(0x33);
        let mut web3 = MockWeb3Service::new();
        web3.expect_contract_address()
            .returning(|_| Ok(Address::repeat_byte(0x50)));
        web3.expect_call().returning(|tx| {
            assert_eq!(tx.to, Address::repeat_byte(0x50));
            Ok(ethabi::encode(&[
                Token::Address(Address::repeat_byte(0x11)),
                Token::Tuple(vec![
                    Token::Array(vec![]),
                    Token::Array(vec![permission().to_token()]),
                ]),
            ]))
        });

        let item = PluginInstallItem {
            id: repo,
            data: vec![1, 2, 3],
        };
        let version = VersionTag { release: 1, build: 2 };
        let permissions = simulate_installation(&web3, Address::repeat_byte(0xda), &item, version)
            .await
            .unwrap();
        assert_eq!(permissions, vec![permission()]);
    }

    #[tokio::test]
    async fn test_latest_version_reads_latest_release() {
        let mut web3 = MockWeb3Service::new();
        web3.expect_call().returning(|tx| {
            let selector = &tx.data[..4];
            if selector == PLUGIN_REPO.function_selector("latestRelease").unwrap() {
                Ok(ethabi::encode(&[Token::Uint(ethabi::ethereum_types::U256::one())]))
            } else {
                let args = PLUGIN_REPO.decode_function_data("getLatestVersion", &tx.data).unwrap();
                assert_eq!(args, vec![Token::Uint(ethabi::ethereum_types::U256::one())]);
                Ok(ethabi::encode(&[Token::Tuple(vec![
                    VersionTag { release: 1, build: 2 }.to_token(),
                    Token::Address(Address::repeat_byte(0x44)),
                    Token::Bytes(vec![]),
                ])]))
            }
        });

        let version = latest_version(&web3, Address::repeat_byte(0x33)).await.unwrap();
        assert_eq!(version, VersionTag { release: 1, build: 2 });
    }
}
