// Client library for DAO governance
// Creates DAOs, installs plugins, encodes actions and drives proposals

pub mod abi;
pub mod actions;
pub mod adapter;
pub mod address;
pub mod client;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod installation;
pub mod metadata;
pub mod plugins;
pub mod proposal_id;
pub mod status;
pub mod steps;
pub mod subgraph;
pub mod transport;

pub use client::Client;
pub use config::{ContextParams, Network};
pub use context::Context;
pub use errors::{ClientError, ErrorKind, Result};
pub use plugins::{AddresslistVotingClient, MultisigClient, TokenVotingClient};
pub use proposal_id::ProposalId;
pub use status::ProposalStatus;
pub use steps::{run_to_completion, StepStream};
