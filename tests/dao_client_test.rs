mod common;

use common::{event_log, topic, FakeChain, FakeIndexer, FakeIpfs, Harness, CID_A, SIGNER};
use dao_client::abi::{DAO, DAO_FACTORY, DAO_REGISTRY, ERC20, PLUGIN_REPO, PLUGIN_SETUP_PROCESSOR};
use dao_client::actions::{MultiTargetPermission, PermissionOperation, PluginInstallItem, VersionTag};
use dao_client::client::{CreateDaoParams, DaoQueryParams, DepositParams, EnsureAllowanceParams};
use dao_client::config::ContractName;
use dao_client::constants::permission_id;
use dao_client::metadata::{DaoMetadata, MetadataFallback};
use dao_client::steps::{AllowanceStep, DaoCreationStep, DepositStep};
use dao_client::{run_to_completion, Client, ClientError};
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::Token;
use futures::StreamExt;
use serde_json::json;

const DAO_ADDRESS: Address = Address::repeat_byte(0xda);
const TOKEN: Address = Address::repeat_byte(0xee);
const PLUGIN_REPO_ADDRESS: Address = Address::repeat_byte(0x33);

fn install_chain(permission: &str) -> FakeChain {
    let chain = FakeChain::new();
    chain.on_call(
        PLUGIN_REPO.function_selector("latestRelease").unwrap(),
        ethabi::encode(&[Token::Uint(U256::one())]),
    );
    chain.on_call(
        PLUGIN_REPO.function_selector("getLatestVersion").unwrap(),
        ethabi::encode(&[Token::Tuple(vec![
            VersionTag { release: 1, build: 2 }.to_token(),
            Token::Address(Address::repeat_byte(0x44)),
            Token::Bytes(vec![]),
        ])]),
    );
    chain.on_call(
        DAO_FACTORY.function_selector("daoBase").unwrap(),
        ethabi::encode(&[Token::Address(Address::repeat_byte(0xba))]),
    );
    let requested = MultiTargetPermission {
        operation: PermissionOperation::Grant,
        where_: Address::repeat_byte(0xba),
        who: Address::repeat_byte(0x11),
        condition: Address::zero(),
        permission_id: permission_id(permission),
    };
    chain.on_call(
        PLUGIN_SETUP_PROCESSOR.function_selector("prepareInstallation").unwrap(),
        ethabi::encode(&[
            Token::Address(Address::repeat_byte(0x11)),
            Token::Tuple(vec![Token::Array(vec![]), Token::Array(vec![requested.to_token()])]),
        ]),
    );
    chain
}

fn create_params() -> CreateDaoParams {
    CreateDaoParams {
        metadata_uri: format!("ipfs://{}", CID_A),
        dao_uri: None,
        ens_subdomain: "builders".to_string(),
        trusted_forwarder: None,
        plugins: vec![PluginInstallItem {
            id: PLUGIN_REPO_ADDRESS,
            data: vec![0xab],
        }],
    }
}

#[tokio::test]
async fn test_create_dao_reports_registered_address() {
    let chain = install_chain("EXECUTE_PERMISSION");
    chain.push_receipt(vec![event_log(
        Address::repeat_byte(0x01),
        &DAO_REGISTRY,
        "DAORegistered",
        &[topic(DAO_ADDRESS), topic(SIGNER)],
        &[Token::String("builders".to_string())],
    )]);
    let harness = Harness::new(chain, FakeIndexer::new(json!({})), FakeIpfs::new());
    let client = Client::new(harness.context());

    let steps: Vec<_> = client
        .methods
        .create_dao(create_params())
        .unwrap()
        .map(|step| step.unwrap())
        .collect()
        .await;
    assert_eq!(
        steps,
        vec![
            DaoCreationStep::Creating {
                tx_hash: H256::from_low_u64_be(1)
            },
            DaoCreationStep::Done { address: DAO_ADDRESS },
        ]
    );

    let sent = harness.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, harness.chain.address_of(ContractName::DaoFactory));
    let args = DAO_FACTORY.decode_function_data("createDao", &sent[0].data).unwrap();
    let settings = args[0].clone().into_tuple().unwrap();
    assert_eq!(settings[2], Token::String("builders".to_string()));
    assert_eq!(
        settings[3],
        Token::Bytes(format!("ipfs://{}", CID_A).into_bytes())
    );
}

#[tokio::test]
async fn test_create_dao_without_execute_permission_sends_nothing() {
    let harness = Harness::new(
        install_chain("UPGRADE_PLUGIN_PERMISSION"),
        FakeIndexer::new(json!({})),
        FakeIpfs::new(),
    );
    let client = Client::new(harness.context());

    let mut steps = client.methods.create_dao(create_params()).unwrap();
    assert!(matches!(
        steps.next().await,
        Some(Err(ClientError::MissingExecPermission))
    ));
    assert!(harness.chain.sent().is_empty());
}

#[tokio::test]
async fn test_create_dao_missing_event_is_a_creation_error() {
    let harness = Harness::new(
        install_chain("EXECUTE_PERMISSION"),
        FakeIndexer::new(json!({})),
        FakeIpfs::new(),
    );
    let client = Client::new(harness.context());

    let result = run_to_completion(client.methods.create_dao(create_params()).unwrap()).await;
    assert!(matches!(result, Err(ClientError::DaoCreation(_))));
    assert_eq!(harness.chain.sent().len(), 1);
}

fn deposit_params(amount: u64) -> DepositParams {
    DepositParams {
        dao_address_or_ens: "builders.dao.eth".to_string(),
        amount: U256::from(amount),
        token_address: Some(TOKEN),
        reference: String::new(),
    }
}

fn deposited_log(amount: u64) -> Vec<dao_client::transport::ReceiptLog> {
    vec![event_log(
        DAO_ADDRESS,
        &DAO,
        "Deposited",
        &[topic(SIGNER), topic(TOKEN)],
        &[Token::Uint(U256::from(amount)), Token::String(String::new())],
    )]
}

#[tokio::test]
async fn test_deposit_skips_sufficient_allowance() {
    let chain = FakeChain::new().with_name("builders.dao.eth", DAO_ADDRESS);
    chain.on_call(
        ERC20.function_selector("allowance").unwrap(),
        ethabi::encode(&[Token::Uint(U256::from(100))]),
    );
    chain.push_receipt(deposited_log(10));
    let harness = Harness::new(chain, FakeIndexer::new(json!({})), FakeIpfs::new());
    let client = Client::new(harness.context());

    let steps: Vec<_> = client
        .methods
        .deposit(deposit_params(10))
        .unwrap()
        .map(|step| step.unwrap())
        .collect()
        .await;
    assert_eq!(
        steps,
        vec![
            DepositStep::CheckedAllowance {
                allowance: U256::from(100)
            },
            DepositStep::Depositing {
                tx_hash: H256::from_low_u64_be(1)
            },
            DepositStep::Done { amount: U256::from(10) },
        ]
    );
    let sent = harness.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, DAO_ADDRESS);
}

#[tokio::test]
async fn test_deposit_updates_short_allowance() {
    let chain = FakeChain::new().with_name("builders.dao.eth", DAO_ADDRESS);
    chain.on_call(
        ERC20.function_selector("allowance").unwrap(),
        ethabi::encode(&[Token::Uint(U256::from(3))]),
    );
    chain.push_receipt(vec![event_log(
        TOKEN,
        &ERC20,
        "Approval",
        &[topic(SIGNER), topic(DAO_ADDRESS)],
        &[Token::Uint(U256::from(10))],
    )]);
    chain.push_receipt(deposited_log(10));
    let harness = Harness::new(chain, FakeIndexer::new(json!({})), FakeIpfs::new());
    let client = Client::new(harness.context());

    let steps: Vec<_> = client
        .methods
        .deposit(deposit_params(10))
        .unwrap()
        .map(|step| step.unwrap())
        .collect()
        .await;
    assert_eq!(
        steps,
        vec![
            DepositStep::CheckedAllowance {
                allowance: U256::from(3)
            },
            DepositStep::UpdatingAllowance {
                tx_hash: H256::from_low_u64_be(1)
            },
            DepositStep::UpdatedAllowance {
                allowance: U256::from(10)
            },
            DepositStep::Depositing {
                tx_hash: H256::from_low_u64_be(2)
            },
            DepositStep::Done { amount: U256::from(10) },
        ]
    );

    let sent = harness.chain.sent();
    assert_eq!(sent[0].to, TOKEN);
    let approve = ERC20.decode_function_data("approve", &sent[0].data).unwrap();
    assert_eq!(approve, vec![Token::Address(DAO_ADDRESS), Token::Uint(U256::from(10))]);
}

#[tokio::test]
async fn test_deposit_amount_mismatch_fails() {
    let chain = FakeChain::new();
    chain.push_receipt(deposited_log(9));
    let harness = Harness::new(chain, FakeIndexer::new(json!({})), FakeIpfs::new());
    let client = Client::new(harness.context());

    let params = DepositParams {
        dao_address_or_ens: format!("{:?}", DAO_ADDRESS),
        amount: U256::from(10),
        token_address: None,
        reference: String::new(),
    };
    let result = run_to_completion(client.methods.deposit(params).unwrap()).await;
    assert!(matches!(result, Err(ClientError::Deposit(_))));
    assert_eq!(harness.chain.sent()[0].value, U256::from(10));
}

#[tokio::test]
async fn test_deposit_unknown_ens_name() {
    let harness = Harness::new(FakeChain::new(), FakeIndexer::new(json!({})), FakeIpfs::new());
    let client = Client::new(harness.context());

    let mut steps = client.methods.deposit(deposit_params(10)).unwrap();
    assert!(matches!(
        steps.next().await,
        Some(Err(ClientError::InvalidAddressOrEns))
    ));
}

#[tokio::test]
async fn test_ensure_allowance_terminal_value() {
    let chain = FakeChain::new();
    chain.on_call(
        ERC20.function_selector("allowance").unwrap(),
        ethabi::encode(&[Token::Uint(U256::zero())]),
    );
    chain.push_receipt(vec![event_log(
        TOKEN,
        &ERC20,
        "Approval",
        &[topic(SIGNER), topic(DAO_ADDRESS)],
        &[Token::Uint(U256::from(5))],
    )]);
    let harness = Harness::new(chain, FakeIndexer::new(json!({})), FakeIpfs::new());
    let client = Client::new(harness.context());

    let done = run_to_completion(
        client
            .methods
            .ensure_allowance(EnsureAllowanceParams {
                dao_address_or_ens: format!("{:?}", DAO_ADDRESS),
                token_address: TOKEN,
                amount: U256::from(5),
            })
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(done, AllowanceStep::Done { allowance: U256::from(5) });
}

#[test]
fn test_writes_need_a_signer() {
    let harness = Harness::new(
        FakeChain::new().without_signer(),
        FakeIndexer::new(json!({})),
        FakeIpfs::new(),
    );
    let client = Client::new(harness.context());
    assert!(matches!(
        client.methods.create_dao(create_params()),
        Err(ClientError::NoSigner)
    ));
    assert!(matches!(
        client.methods.deposit(deposit_params(1)),
        Err(ClientError::NoSigner)
    ));
}

#[tokio::test]
async fn test_pin_metadata_then_read_dao() {
    let metadata = DaoMetadata {
        name: "Builders".to_string(),
        description: "We build".to_string(),
        avatar: None,
        links: vec![],
    };
    let dao_id = format!("{:?}", DAO_ADDRESS);
    let indexer = FakeIndexer::new(json!({
        "daos": [
            { "id": dao_id, "subdomain": "builders", "metadata": format!("ipfs://{}", CID_A), "createdAt": "1", "plugins": [] },
            { "id": dao_id, "subdomain": "lost", "metadata": "ipfs://QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o", "createdAt": "2", "plugins": [] }
        ]
    }));
    let harness = Harness::new(FakeChain::new(), indexer, FakeIpfs::new());
    let client = Client::new(harness.context());

    let uri = client.methods.pin_metadata(&metadata).await.unwrap();
    assert_eq!(uri, format!("ipfs://{}", CID_A));
    assert_eq!(harness.ipfs.pinned(), vec![CID_A.to_string()]);

    let daos = client.methods.get_daos(&DaoQueryParams::default()).await.unwrap();
    assert_eq!(daos.len(), 2);
    assert_eq!(daos[0].metadata, metadata);
    assert_eq!(daos[1].metadata, DaoMetadata::unavailable());

    let (_, variables) = &harness.indexer.requests()[0];
    assert_eq!(variables["limit"], json!(10));
    assert_eq!(variables["direction"], json!("asc"));
    assert_eq!(variables["sortBy"], json!("createdAt"));
}

#[tokio::test]
async fn test_estimation_uses_submitted_calldata() {
    let harness = Harness::new(
        install_chain("EXECUTE_PERMISSION"),
        FakeIndexer::new(json!({})),
        FakeIpfs::new(),
    );
    let client = Client::new(harness.context());

    let fee = client.estimation.create_dao(&create_params()).await.unwrap();
    assert_eq!(fee.average, U256::from(100_000));
    assert_eq!(fee.max, U256::from(200_000));
    assert!(harness.chain.sent().is_empty());
}
