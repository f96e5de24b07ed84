use std::time::Duration;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid address")]
    InvalidAddress,

    #[error("Invalid address or ENS")]
    InvalidAddressOrEns,

    #[error("Invalid proposal ID")]
    InvalidProposalId,

    #[error("Invalid subdomain: {0}. Only lowercase letters, digits and '-' are allowed")]
    InvalidSubdomain(String),

    #[error("Size mismatch: {field1} and {field2} should have the same length")]
    SizeMismatch {
        field1: &'static str,
        field2: &'static str,
    },

    #[error("The array is too big: {0} entries, at most 256 are allowed")]
    BitmapOverflow(usize),

    #[error("Invalid precision: must be a positive integer")]
    InvalidPrecision,

    #[error("Invalid ratio {0}: must be between 0 and 1")]
    InvalidRatio(f64),

    #[error("Invalid voting settings: {0}")]
    InvalidVotingSettings(String),

    #[error("Invalid voting mode: {0}")]
    InvalidVotingMode(String),

    #[error("Invalid vote option: {0}")]
    InvalidVoteOption(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("The received action is different from the expected one ({expected})")]
    UnexpectedAction { expected: String },

    #[error("Unsupported token type: {0}")]
    UnsupportedTokenType(String),

    #[error("Invalid CID: {0}")]
    InvalidCid(String),

    #[error("Could not pin the metadata on IPFS: {0}")]
    IpfsPin(String),

    #[error("Could not fetch the content from IPFS: {0}")]
    IpfsFetch(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Cannot fetch the {model} data from GraphQL: {reason}")]
    GraphQl { model: String, reason: String },

    #[error("Malformed indexer record: {0}")]
    MalformedRecord(String),

    #[error("A signer is needed")]
    NoSigner,

    #[error("A web3 provider is needed")]
    NoProvider,

    #[error("No {0} endpoints available")]
    NoEndpoints(&'static str),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("No address configured for {0} on this network")]
    MissingContractAddress(String),

    #[error("No plugin requests EXECUTE_PERMISSION on the DAO")]
    MissingExecPermission,

    #[error("Failed to create DAO: {0}")]
    DaoCreation(String),

    #[error("Failed to create proposal: {0}")]
    ProposalCreation(String),

    #[error("Failed to prepare plugin installation: {0}")]
    PluginInstallationPreparation(String),

    #[error("Failed to update the token allowance: {0}")]
    EnsureAllowance(String),

    #[error("Failed to deposit: {0}")]
    Deposit(String),

    #[error("Transaction {0} reverted")]
    TransactionReverted(String),

    #[error("Transaction {0} was not confirmed in time")]
    TransactionNotFound(String),

    #[error("Step sequence violated: {0}")]
    StepProtocol(String),

    #[error("Time out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("ABI error: {0}")]
    Abi(#[from] ethabi::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of failures, used by callers to decide
/// between fixing input, retrying later, or investigating an ABI mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    Precondition,
    Transport,
    DecodeMismatch,
    OffChainContent,
    OnChainConfirmation,
    Defect,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        use ClientError::*;
        match self {
            InvalidAddress
            | InvalidAddressOrEns
            | InvalidProposalId
            | InvalidSubdomain(_)
            | SizeMismatch { .. }
            | BitmapOverflow(_)
            | InvalidPrecision
            | InvalidRatio(_)
            | InvalidVotingSettings(_)
            | InvalidVotingMode(_)
            | InvalidAmount(_)
            | UnsupportedTokenType(_)
            | Config(_) => ErrorKind::InputValidation,
            NoSigner
            | NoProvider
            | UnsupportedNetwork(_)
            | MissingContractAddress(_)
            | MissingExecPermission => ErrorKind::Precondition,
            NoEndpoints(_) | GraphQl { .. } | Timeout(_) | Transport(_) | Other(_) => {
                ErrorKind::Transport
            }
            UnexpectedAction { .. } | Abi(_) => ErrorKind::DecodeMismatch,
            InvalidCid(_) | IpfsPin(_) | IpfsFetch(_) | InvalidMetadata(_) => {
                ErrorKind::OffChainContent
            }
            DaoCreation(_)
            | ProposalCreation(_)
            | PluginInstallationPreparation(_)
            | EnsureAllowance(_)
            | Deposit(_)
            | TransactionReverted(_)
            | TransactionNotFound(_) => ErrorKind::OnChainConfirmation,
            InvalidVoteOption(_) | MalformedRecord(_) | StepProtocol(_) => ErrorKind::Defect,
        }
    }

    /// Wrap an indexer failure for the given model name.
    pub fn graphql(model: impl Into<String>, reason: impl ToString) -> Self {
        ClientError::GraphQl {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_error_message() {
        let err = ClientError::graphql("TokenVoting proposal", "connection refused");
        assert_eq!(
            err.to_string(),
            "Cannot fetch the TokenVoting proposal data from GraphQL: connection refused"
        );
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_size_mismatch_error() {
        let err = ClientError::SizeMismatch {
            field1: "actions",
            field2: "failSafeActions",
        };
        assert!(err.to_string().contains("actions"));
        assert!(err.to_string().contains("failSafeActions"));
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }

    #[test]
    fn test_unexpected_action_is_decode_mismatch() {
        let err = ClientError::UnexpectedAction {
            expected: "grant".to_string(),
        };
        assert!(err
            .to_string()
            .starts_with("The received action is different from the expected one"));
        assert_eq!(err.kind(), ErrorKind::DecodeMismatch);
    }

    #[test]
    fn test_no_endpoints_error() {
        let err = ClientError::NoEndpoints("IPFS");
        assert_eq!(err.to_string(), "No IPFS endpoints available");
    }

    #[test]
    fn test_missing_exec_permission_is_precondition() {
        assert_eq!(
            ClientError::MissingExecPermission.kind(),
            ErrorKind::Precondition
        );
    }
}
