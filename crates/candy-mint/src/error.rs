use solana_client::client_error::ClientError;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

pub type Result<T, E = MintError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MintError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] Box<ClientError>),

    #[error("Account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("Failed to decode {what} {address}: {reason}")]
    Decode {
        what: &'static str,
        address: Pubkey,
        reason: String,
    },

    #[error("No eligible guard group for this wallet")]
    NoEligibleGroup,

    #[error("Group '{label}' is not eligible: {reason}")]
    NotEligible { label: String, reason: String },

    #[error("Allow list proof transaction {0} was not confirmed")]
    ProofNotConfirmed(String),

    #[error("Failed to compile transaction: {0}")]
    Compile(String),

    #[error("Transaction is {size} bytes, above the {limit} byte limit. Configure a lookup table.")]
    TransactionTooLarge { size: usize, limit: usize },

    #[error("Failed to sign transaction: {0}")]
    Signing(String),

    #[error("None of the {failed} mint transactions were confirmed")]
    NothingConfirmed { failed: usize },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Notification failed: {0}")]
    Notify(String),
}

impl From<ClientError> for MintError {
    fn from(err: ClientError) -> Self {
        MintError::Rpc(Box::new(err))
    }
}

impl MintError {
    pub fn decode(what: &'static str, address: Pubkey, reason: impl ToString) -> Self {
        MintError::Decode {
            what,
            address,
            reason: reason.to_string(),
        }
    }

    /// Network and chain failures that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MintError::Rpc(_) | MintError::NothingConfirmed { .. } | MintError::ProofNotConfirmed(_)
        )
    }
}
