use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::chain::{fetch_owned_nfts, ChainClient, OwnedNft, TokenHolding};
use crate::error::{MintError, Result};
use crate::state::{CandyGuardAccount, CandyMachine, GuardGroup};

/// A candy machine together with the candy guard that wraps it.
#[derive(Clone, Debug)]
pub struct LoadedMachine {
    pub address: Pubkey,
    pub machine: CandyMachine,
    pub guard_address: Pubkey,
    pub guard: CandyGuardAccount,
}

impl LoadedMachine {
    pub fn fetch<C: ChainClient + ?Sized>(chain: &C, address: &Pubkey) -> Result<Self> {
        let data = chain
            .get_account_data(address)?
            .ok_or(MintError::AccountNotFound(*address))?;
        let machine = CandyMachine::decode(address, &data)?;

        let guard_address = machine.mint_authority;
        let data = chain
            .get_account_data(&guard_address)?
            .ok_or(MintError::AccountNotFound(guard_address))?;
        let guard = CandyGuardAccount::decode(&guard_address, &data)?;

        info!(
            "loaded candy machine {} ({}/{} redeemed, {} groups)",
            address,
            machine.items_redeemed,
            machine.data.items_available,
            guard.groups.len()
        );
        Ok(Self {
            address: *address,
            machine,
            guard_address,
            guard,
        })
    }

    pub fn groups(&self) -> Vec<GuardGroup> {
        self.guard.effective_groups()
    }

    pub fn group(&self, label: &str) -> Option<GuardGroup> {
        self.guard.effective_group(label)
    }
}

/// Wallet state the guard evaluator reads. Failed lookups are kept as errors so
/// only the guards that need them are affected.
#[derive(Clone, Debug)]
pub struct WalletContext {
    pub wallet: Pubkey,
    pub now: i64,
    pub sol_balance: std::result::Result<u64, String>,
    pub tokens: std::result::Result<Vec<TokenHolding>, String>,
    pub nfts: std::result::Result<Vec<OwnedNft>, String>,
}

impl WalletContext {
    pub fn fetch<C: ChainClient + ?Sized>(chain: &C, wallet: &Pubkey) -> Self {
        let now = chain.get_chain_time().unwrap_or_else(|e| {
            warn!("chain time unavailable, using local clock: {}", e);
            local_unix_time()
        });
        let sol_balance = chain.get_balance(wallet).map_err(|e| e.to_string());
        let tokens = chain.get_token_holdings(wallet).map_err(|e| e.to_string());
        let nfts = match &tokens {
            Ok(holdings) => fetch_owned_nfts(chain, holdings).map_err(|e| e.to_string()),
            Err(e) => Err(e.clone()),
        };
        Self {
            wallet: *wallet,
            now,
            sol_balance,
            tokens,
            nfts,
        }
    }

    pub fn token_balance(&self, mint: &Pubkey) -> std::result::Result<u64, String> {
        self.tokens
            .as_ref()
            .map(|t| t.iter().filter(|h| h.mint == *mint).map(|h| h.amount).sum())
            .map_err(|e| e.clone())
    }

    pub fn nfts_in_collection(&self, collection: &Pubkey) -> std::result::Result<Vec<&OwnedNft>, String> {
        self.nfts
            .as_ref()
            .map(|n| n.iter().filter(|nft| nft.collection == Some(*collection)).collect())
            .map_err(|e| e.clone())
    }
}

pub fn local_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
