//! Client-side minting from a Metaplex candy machine guarded by a candy guard.
//!
//! The crate reads the machine and guard accounts, decides which guard groups
//! a wallet may mint under, builds and sends the mint transactions, and
//! reports what was minted.

pub mod builder;
pub mod chain;
pub mod config;
pub mod constants;
pub mod eligibility;
pub mod error;
pub mod flow;
pub mod instructions;
pub mod machine;
pub mod merkle;
pub mod metadata;
pub mod notify;
pub mod pdas;
pub mod settings;
pub mod state;
pub mod submit;
pub mod validate;

pub use chain::{ChainClient, RpcChain};
pub use config::{MintConfig, RawConfig};
pub use eligibility::GuardEligibility;
pub use error::{MintError, Result};
pub use flow::{MintFlow, MintPhase, MintReport, MintSession, PreparedMint};
pub use machine::{LoadedMachine, WalletContext};
pub use settings::Settings;
