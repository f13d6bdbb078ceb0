use std::str::FromStr;

use mpl_token_metadata::accounts::Metadata;
use solana_account_decoder::UiAccountData;
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use tracing::{debug, warn};

use crate::constants::{SPL_TOKEN_ID, SYSVAR_CLOCK_ID, TOKEN_2022_ID};
use crate::error::{MintError, Result};
use crate::state::{decode_clock, decode_metadata, verified_collection};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenHolding {
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub amount: u64,
    pub decimals: u8,
    pub token_program: Pubkey,
}

impl TokenHolding {
    pub fn is_nft_like(&self) -> bool {
        self.amount == 1 && self.decimals == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedNft {
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub collection: Option<Pubkey>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureState {
    Pending,
    Confirmed,
    Failed(String),
}

/// Everything the minting flow reads from or sends to the cluster.
pub trait ChainClient: Sync {
    fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    fn get_multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        addresses.iter().map(|a| self.get_account_data(a)).collect()
    }

    fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    fn get_chain_time(&self) -> Result<i64> {
        let data = self
            .get_account_data(&SYSVAR_CLOCK_ID)?
            .ok_or(MintError::AccountNotFound(SYSVAR_CLOCK_ID))?;
        Ok(decode_clock(&SYSVAR_CLOCK_ID, &data)?.unix_timestamp)
    }

    /// Latest blockhash and the last block height it is valid for.
    fn get_latest_blockhash(&self) -> Result<(Hash, u64)>;

    fn get_block_height(&self) -> Result<u64>;

    fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>>;

    /// Compute units consumed by a dry run, `None` when the simulation failed.
    fn simulate_units(&self, tx: &VersionedTransaction) -> Result<Option<u64>>;

    fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature>;

    fn get_signature_states(&self, signatures: &[Signature]) -> Result<Vec<SignatureState>>;
}

/// NFTs held by the wallet, with the verified collection from their metadata.
pub fn fetch_owned_nfts<C: ChainClient + ?Sized>(
    chain: &C,
    holdings: &[TokenHolding],
) -> Result<Vec<OwnedNft>> {
    let candidates: Vec<&TokenHolding> = holdings.iter().filter(|h| h.is_nft_like()).collect();
    let mut nfts = Vec::with_capacity(candidates.len());

    for chunk in candidates.chunks(100) {
        let pdas: Vec<Pubkey> = chunk.iter().map(|h| Metadata::find_pda(&h.mint).0).collect();
        let accounts = chain.get_multiple_account_data(&pdas)?;
        for ((holding, pda), data) in chunk.iter().zip(&pdas).zip(accounts) {
            let Some(data) = data else { continue };
            match decode_metadata(pda, &data) {
                Ok(md) => nfts.push(OwnedNft {
                    mint: holding.mint,
                    token_account: holding.token_account,
                    collection: verified_collection(&md),
                }),
                Err(e) => debug!("skipping {}: {}", holding.mint, e),
            }
        }
    }
    Ok(nfts)
}

// ---------------------------------------------------------------------------
// RPC implementation
// ---------------------------------------------------------------------------

pub struct RpcChain {
    rpc: RpcClient,
    commitment: CommitmentConfig,
    confirm_commitment: CommitmentConfig,
}

impl RpcChain {
    pub fn new(rpc_url: &str) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
            commitment,
            confirm_commitment: CommitmentConfig::finalized(),
        }
    }

    fn parse_holding(keyed: &solana_client::rpc_response::RpcKeyedAccount, program: &Pubkey) -> Option<TokenHolding> {
        let UiAccountData::Json(parsed) = &keyed.account.data else {
            return None;
        };
        let info = &parsed.parsed["info"];
        let amount = info["tokenAmount"]["amount"].as_str()?.parse().ok()?;
        let decimals = info["tokenAmount"]["decimals"].as_u64()? as u8;
        Some(TokenHolding {
            mint: Pubkey::from_str(info["mint"].as_str()?).ok()?,
            token_account: Pubkey::from_str(&keyed.pubkey).ok()?,
            amount,
            decimals,
            token_program: *program,
        })
    }
}

impl ChainClient for RpcChain {
    fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)?;
        Ok(response.value.map(|a| a.data))
    }

    fn get_multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(100) {
            let accounts = self.rpc.get_multiple_accounts(chunk)?;
            out.extend(accounts.into_iter().map(|a| a.map(|a| a.data)));
        }
        Ok(out)
    }

    fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self
            .rpc
            .get_balance_with_commitment(address, self.commitment)?
            .value)
    }

    fn get_latest_blockhash(&self) -> Result<(Hash, u64)> {
        Ok(self
            .rpc
            .get_latest_blockhash_with_commitment(self.commitment)?)
    }

    fn get_block_height(&self) -> Result<u64> {
        Ok(self.rpc.get_block_height_with_commitment(self.commitment)?)
    }

    fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>> {
        let mut holdings = Vec::new();
        for program in [SPL_TOKEN_ID, TOKEN_2022_ID] {
            let accounts = self
                .rpc
                .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(program))?;
            holdings.extend(
                accounts
                    .iter()
                    .filter_map(|keyed| Self::parse_holding(keyed, &program)),
            );
        }
        Ok(holdings)
    }

    fn simulate_units(&self, tx: &VersionedTransaction) -> Result<Option<u64>> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let result = self.rpc.simulate_transaction_with_config(tx, config)?.value;
        if let Some(err) = result.err {
            warn!("simulation failed: {}", err);
            if let Some(logs) = result.logs {
                for line in logs.iter().rev().take(5) {
                    debug!("  {}", line);
                }
            }
            return Ok(None);
        }
        Ok(result.units_consumed)
    }

    fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(1),
            ..Default::default()
        };
        Ok(self.rpc.send_transaction_with_config(tx, config)?)
    }

    fn get_signature_states(&self, signatures: &[Signature]) -> Result<Vec<SignatureState>> {
        let mut out = Vec::with_capacity(signatures.len());
        for chunk in signatures.chunks(256) {
            let statuses = self.rpc.get_signature_statuses(chunk)?.value;
            out.extend(statuses.into_iter().map(|status| match status {
                None => SignatureState::Pending,
                Some(s) => match &s.err {
                    Some(err) => SignatureState::Failed(err.to_string()),
                    None if s.satisfies_commitment(self.confirm_commitment) => {
                        SignatureState::Confirmed
                    }
                    None => SignatureState::Pending,
                },
            }));
        }
        Ok(out)
    }
}
