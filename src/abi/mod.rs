//! Contract interfaces over the bundled, versioned JSON ABIs.
//!
//! Each interface encodes and decodes calls for one contract role. Decoding
//! always checks the selector against the function the caller expects.

use crate::errors::{ClientError, Result};
use ethabi::ethereum_types::{Address, H256, U256};
use ethabi::{Contract, Function, Log, RawLog, Token};
use once_cell::sync::Lazy;

// The JSON is compiled in; `test_bundled_interfaces_load` parses every file,
// so the `expect` cannot fire at runtime.
macro_rules! bundled_interface {
    ($name:ident, $label:literal, $file:literal) => {
        pub static $name: Lazy<ContractInterface> = Lazy::new(|| {
            ContractInterface::from_json($label, include_str!(concat!("json/", $file)))
                .expect("bundled ABI is valid")
        });
    };
}

bundled_interface!(DAO, "DAO", "dao.json");
bundled_interface!(PLUGIN_SETUP_PROCESSOR, "PluginSetupProcessor", "plugin_setup_processor.json");
bundled_interface!(DAO_FACTORY, "DAOFactory", "dao_factory.json");
bundled_interface!(DAO_REGISTRY, "DAORegistry", "dao_registry.json");
bundled_interface!(PLUGIN_REPO, "PluginRepo", "plugin_repo.json");
bundled_interface!(ERC20, "ERC20", "erc20.json");
bundled_interface!(TOKEN_VOTING, "TokenVoting", "token_voting.json");
bundled_interface!(ADDRESSLIST_VOTING, "AddresslistVoting", "addresslist_voting.json");
bundled_interface!(MULTISIG, "Multisig", "multisig.json");
bundled_interface!(ENS, "ENS", "ens.json");

/// Identification of a known function from its calldata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceParams {
    /// Canonical signature, e.g. `grant(address,address,bytes32)`
    pub id: String,
    pub function_name: String,
    /// `0x`-prefixed selector
    pub hash: String,
}

pub struct ContractInterface {
    label: &'static str,
    contract: Contract,
}

impl ContractInterface {
    pub fn from_json(label: &'static str, json: &str) -> Result<Self> {
        let contract = Contract::load(json.as_bytes())?;
        Ok(Self { label, contract })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn function(&self, name: &str) -> Result<&Function> {
        Ok(self.contract.function(name)?)
    }

    pub fn function_selector(&self, name: &str) -> Result<[u8; 4]> {
        Ok(self.function(name)?.short_signature())
    }

    /// Selector followed by the ABI-encoded arguments
    pub fn encode_function_data(&self, name: &str, args: &[Token]) -> Result<Vec<u8>> {
        Ok(self.function(name)?.encode_input(args)?)
    }

    /// Decode calldata produced for `name`, rejecting any other selector
    pub fn decode_function_data(&self, name: &str, data: &[u8]) -> Result<Vec<Token>> {
        let function = self.function(name)?;
        if data.len() < 4 || data[..4] != function.short_signature() {
            return Err(ClientError::UnexpectedAction {
                expected: name.to_string(),
            });
        }
        Ok(function.decode_input(&data[4..])?)
    }

    pub fn decode_function_output(&self, name: &str, data: &[u8]) -> Result<Vec<Token>> {
        Ok(self.function(name)?.decode_output(data)?)
    }

    pub fn event_signature(&self, name: &str) -> Result<H256> {
        Ok(self.contract.event(name)?.signature())
    }

    pub fn parse_log(&self, name: &str, log: RawLog) -> Result<Log> {
        Ok(self.contract.event(name)?.parse_log(log)?)
    }

    /// Function of this interface whose selector prefixes `data`
    pub fn find_function(&self, data: &[u8]) -> Option<&Function> {
        if data.len() < 4 {
            return None;
        }
        self.contract
            .functions()
            .find(|function| data[..4] == function.short_signature())
    }

    /// Look up `data` among the functions in `names`
    pub fn find_interface(&self, data: &[u8], names: &[&str]) -> Option<InterfaceParams> {
        let function = self.find_function(data)?;
        if !names.contains(&function.name.as_str()) {
            return None;
        }
        Some(InterfaceParams {
            id: canonical_signature(function),
            function_name: function.name.clone(),
            hash: format!("0x{}", hex::encode(function.short_signature())),
        })
    }
}

/// `name(type1,type2,...)` without return types
pub fn canonical_signature(function: &Function) -> String {
    let params: Vec<String> = function
        .inputs
        .iter()
        .map(|param| param.kind.to_string())
        .collect();
    format!("{}({})", function.name, params.join(","))
}

/// Ordered reader over decoded tokens.
///
/// Decoders pull fields in the same order the contract declares them; a
/// missing or mistyped field is reported as invalid ABI data.
pub struct Tokens(std::vec::IntoIter<Token>);

impl Tokens {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self(tokens.into_iter())
    }

    fn next_token(&mut self) -> Result<Token> {
        self.0.next().ok_or(ClientError::Abi(ethabi::Error::InvalidData))
    }

    fn convert<T>(&mut self, f: impl FnOnce(Token) -> Option<T>) -> Result<T> {
        f(self.next_token()?).ok_or(ClientError::Abi(ethabi::Error::InvalidData))
    }

    pub fn address(&mut self) -> Result<Address> {
        self.convert(Token::into_address)
    }

    pub fn uint(&mut self) -> Result<U256> {
        self.convert(Token::into_uint)
    }

    pub fn boolean(&mut self) -> Result<bool> {
        self.convert(Token::into_bool)
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        self.convert(Token::into_bytes)
    }

    pub fn fixed_bytes(&mut self) -> Result<Vec<u8>> {
        self.convert(Token::into_fixed_bytes)
    }

    pub fn string(&mut self) -> Result<String> {
        self.convert(Token::into_string)
    }

    pub fn array(&mut self) -> Result<Vec<Token>> {
        self.convert(Token::into_array)
    }

    pub fn tuple(&mut self) -> Result<Tokens> {
        self.convert(Token::into_tuple).map(Tokens::new)
    }

    pub fn addresses(&mut self) -> Result<Vec<Address>> {
        self.array()?
            .into_iter()
            .map(|token| token.into_address().ok_or(ClientError::Abi(ethabi::Error::InvalidData)))
            .collect()
    }

    /// Each element of an array of tuples
    pub fn tuples(&mut self) -> Result<Vec<Tokens>> {
        self.array()?
            .into_iter()
            .map(|token| {
                token
                    .into_tuple()
                    .map(Tokens::new)
                    .ok_or(ClientError::Abi(ethabi::Error::InvalidData))
            })
            .collect()
    }
}

/// Named parameter of a decoded log
pub fn log_param(log: &Log, name: &str) -> Result<Token> {
    log.params
        .iter()
        .find(|param| param.name == name)
        .map(|param| param.value.clone())
        .ok_or_else(|| ClientError::Abi(ethabi::Error::InvalidName(name.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_interfaces() -> Vec<&'static ContractInterface> {
        vec![
            &*DAO,
            &*PLUGIN_SETUP_PROCESSOR,
            &*DAO_FACTORY,
            &*DAO_REGISTRY,
            &*PLUGIN_REPO,
            &*ERC20,
            &*TOKEN_VOTING,
            &*ADDRESSLIST_VOTING,
            &*MULTISIG,
            &*ENS,
        ]
    }

    #[test]
    fn test_bundled_interfaces_load() {
        for interface in all_interfaces() {
            assert!(!interface.label().is_empty());
        }
    }

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(ERC20.function_selector("transfer").unwrap()), "a9059cbb");
        assert_eq!(hex::encode(ERC20.function_selector("approve").unwrap()), "095ea7b3");
        assert_eq!(hex::encode(ERC20.function_selector("mint").unwrap()), "40c10f19");
        assert_eq!(hex::encode(DAO.function_selector("upgradeTo").unwrap()), "3659cfe6");
        assert_eq!(
            hex::encode(DAO.function_selector("upgradeToAndCall").unwrap()),
            "4f1ef286"
        );
    }

    #[test]
    fn test_canonical_signature_with_tuples() {
        let function = PLUGIN_SETUP_PROCESSOR.function("applyInstallation").unwrap();
        assert_eq!(
            canonical_signature(function),
            "applyInstallation(address,(((uint8,uint16),address),address,(uint8,address,address,address,bytes32)[],bytes32))"
        );
    }

    #[test]
    fn test_decode_rejects_other_selector() {
        let data = DAO
            .encode_function_data("setDaoURI", &[Token::String("https://dao".into())])
            .unwrap();
        let err = DAO.decode_function_data("setMetadata", &data).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedAction { .. }));

        let err = DAO.decode_function_data("setMetadata", &[0x01]).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedAction { .. }));
    }

    #[test]
    fn test_find_interface() {
        let data = DAO
            .encode_function_data("setDaoURI", &[Token::String("https://dao".into())])
            .unwrap();
        let found = DAO.find_interface(&data, &["setDaoURI", "grant"]).unwrap();
        assert_eq!(found.id, "setDaoURI(string)");
        assert_eq!(found.function_name, "setDaoURI");
        assert_eq!(found.hash, format!("0x{}", hex::encode(&data[..4])));

        assert!(DAO.find_interface(&data, &["grant"]).is_none());
        assert!(DAO.find_interface(&[0xde, 0xad, 0xbe, 0xef], &["grant"]).is_none());
    }

    #[test]
    fn test_tokens_reader() {
        let mut tokens = Tokens::new(vec![
            Token::Address(Address::repeat_byte(1)),
            Token::Tuple(vec![Token::Bool(true), Token::Uint(U256::from(3))]),
        ]);
        assert_eq!(tokens.address().unwrap(), Address::repeat_byte(1));
        let mut inner = tokens.tuple().unwrap();
        assert!(inner.boolean().unwrap());
        assert_eq!(inner.uint().unwrap(), U256::from(3));
        assert!(tokens.address().is_err());
    }
}
