//! Multi-transaction operations as ordered checkpoint streams.
//!
//! Each write operation returns a stream that yields one checkpoint after a
//! transaction is submitted (carrying its hash) and one once the receipt is
//! confirmed (carrying the extracted result). Every stream ends with exactly
//! one terminal checkpoint. Input validation happens before the stream is
//! built, so invalid input never produces a checkpoint.

use crate::actions::VersionTag;
use crate::actions::MultiTargetPermission;
use crate::errors::{ClientError, Result};
use crate::proposal_id::ProposalId;
use ethabi::ethereum_types::{Address, H256, U256};
use futures::{Stream, StreamExt};
use std::pin::Pin;

pub type StepStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Box a checkpoint stream, fixing its error type
pub(crate) fn boxed<'a, T, S>(stream: S) -> StepStream<'a, T>
where
    S: Stream<Item = Result<T>> + Send + 'a,
{
    Box::pin(stream)
}

pub trait Checkpoint {
    fn is_terminal(&self) -> bool;
}

/// Drive a stream to its terminal checkpoint
pub async fn run_to_completion<T: Checkpoint>(mut stream: StepStream<'_, T>) -> Result<T> {
    let mut terminal = None;
    while let Some(step) = stream.next().await {
        let step = step?;
        if terminal.is_some() {
            return Err(ClientError::StepProtocol(
                "checkpoint emitted after the terminal one".to_string(),
            ));
        }
        if step.is_terminal() {
            terminal = Some(step);
        }
    }
    terminal.ok_or_else(|| ClientError::StepProtocol("stream ended without a terminal checkpoint".to_string()))
}

macro_rules! terminal_on_done {
    ($($step:ident),+ $(,)?) => {
        $(
            impl Checkpoint for $step {
                fn is_terminal(&self) -> bool {
                    matches!(self, $step::Done { .. })
                }
            }
        )+
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaoCreationStep {
    Creating { tx_hash: H256 },
    Done { address: Address },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalCreationStep {
    Creating { tx_hash: H256 },
    Done { proposal_id: ProposalId },
}

/// Voting and multisig approval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteStep {
    Voting { tx_hash: H256 },
    /// `vote_id` is set by families that index individual votes
    Done { vote_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteStep {
    Executing { tx_hash: H256 },
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceStep {
    CheckedAllowance { allowance: U256 },
    UpdatingAllowance { tx_hash: H256 },
    Done { allowance: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositStep {
    CheckedAllowance { allowance: U256 },
    UpdatingAllowance { tx_hash: H256 },
    UpdatedAllowance { allowance: U256 },
    Depositing { tx_hash: H256 },
    Done { amount: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInstallation {
    pub plugin_address: Address,
    pub plugin_repo: Address,
    pub version_tag: VersionTag,
    pub permissions: Vec<MultiTargetPermission>,
    pub helpers: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareInstallationStep {
    Preparing { tx_hash: H256 },
    Done(PreparedInstallation),
}

terminal_on_done!(
    DaoCreationStep,
    ProposalCreationStep,
    VoteStep,
    AllowanceStep,
    DepositStep,
);

impl Checkpoint for ExecuteStep {
    fn is_terminal(&self) -> bool {
        matches!(self, ExecuteStep::Done)
    }
}

impl Checkpoint for PrepareInstallationStep {
    fn is_terminal(&self) -> bool {
        matches!(self, PrepareInstallationStep::Done(_))
    }
}
