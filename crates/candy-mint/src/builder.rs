//! Mint transaction assembly.

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, AddressLookupTableAccount, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::config::MintConfig;
use crate::constants::{DEFAULT_COMPUTE_UNIT_LIMIT, MAX_COMPUTE_UNIT_LIMIT, PACKET_DATA_SIZE};
use crate::error::{MintError, Result};
use crate::instructions::{compute_unit_limit, compute_unit_price, mint_v2, tip, MintArgs};
use crate::machine::LoadedMachine;
use crate::state::lookup_table_addresses;

/// Units consumed plus a 20% margin, rounded up and clamped to the
/// transaction maximum. Missing or zero consumption uses the default ceiling.
pub fn estimate_compute_units(simulated: Option<u64>) -> u32 {
    match simulated {
        Some(units) if units > 0 => {
            let padded = (units.saturating_mul(12)).div_ceil(10);
            padded.min(u64::from(MAX_COMPUTE_UNIT_LIMIT)) as u32
        }
        _ => DEFAULT_COMPUTE_UNIT_LIMIT,
    }
}

pub struct UnsignedMint {
    pub nft_mint: Keypair,
    pub message: VersionedMessage,
}

impl UnsignedMint {
    pub fn mint_address(&self) -> Pubkey {
        self.nft_mint.pubkey()
    }

    pub fn sign(&self, payer: &dyn Signer) -> Result<VersionedTransaction> {
        let signers: Vec<&dyn Signer> = vec![payer, &self.nft_mint];
        VersionedTransaction::try_new(self.message.clone(), &signers)
            .map_err(|e| MintError::Signing(e.to_string()))
    }
}

/// One transaction per requested copy, all on the same blockhash.
pub struct MintBatch {
    pub label: String,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    pub compute_units: u32,
    pub mints: Vec<UnsignedMint>,
}

pub fn load_lookup_tables<C: ChainClient + ?Sized>(
    chain: &C,
    config: &MintConfig,
) -> Result<Vec<AddressLookupTableAccount>> {
    let Some(key) = config.lookup_table else {
        return Ok(Vec::new());
    };
    let data = chain
        .get_account_data(&key)?
        .ok_or(MintError::AccountNotFound(key))?;
    let addresses = lookup_table_addresses(&key, &data)?;
    info!("lookup table {} with {} addresses", key, addresses.len());
    Ok(vec![AddressLookupTableAccount { key, addresses }])
}

pub fn compile(
    payer: &Pubkey,
    instructions: &[Instruction],
    lookup_tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> Result<VersionedMessage> {
    let message = v0::Message::try_compile(payer, instructions, lookup_tables, blockhash)
        .map_err(|e| MintError::Compile(e.to_string()))?;
    Ok(VersionedMessage::V0(message))
}

/// Wire size once signed: short-vec signature count, signatures, message.
pub fn signed_size(message: &VersionedMessage) -> usize {
    let signatures = message.header().num_required_signatures as usize;
    1 + signatures * 64 + message.serialize().len()
}

fn check_size(message: &VersionedMessage) -> Result<()> {
    let size = signed_size(message);
    if size > PACKET_DATA_SIZE {
        return Err(MintError::TransactionTooLarge {
            size,
            limit: PACKET_DATA_SIZE,
        });
    }
    Ok(())
}

/// A transaction with placeholder signatures, for simulation.
pub fn unsigned_transaction(message: VersionedMessage) -> VersionedTransaction {
    let count = message.header().num_required_signatures as usize;
    VersionedTransaction {
        signatures: vec![Signature::default(); count],
        message,
    }
}

pub struct MintBuilder<'a, C: ChainClient + ?Sized> {
    chain: &'a C,
    config: &'a MintConfig,
    machine: &'a LoadedMachine,
    payer: Pubkey,
    lookup_tables: Vec<AddressLookupTableAccount>,
}

impl<'a, C: ChainClient + ?Sized> MintBuilder<'a, C> {
    pub fn new(
        chain: &'a C,
        config: &'a MintConfig,
        machine: &'a LoadedMachine,
        payer: Pubkey,
    ) -> Result<Self> {
        let lookup_tables = load_lookup_tables(chain, config)?;
        Ok(Self {
            chain,
            config,
            machine,
            payer,
            lookup_tables,
        })
    }

    /// [price, limit, tip?, mint]
    pub fn instructions(&self, args: &MintArgs, nft_mint: &Pubkey, units: u32) -> Result<Vec<Instruction>> {
        let mut ixs = vec![
            compute_unit_price(self.config.micro_lamports),
            compute_unit_limit(units),
        ];
        if self.config.tip {
            ixs.push(tip(&self.payer));
        }
        ixs.push(mint_v2(self.machine, args, &self.payer, nft_mint)?);
        Ok(ixs)
    }

    fn simulate_units(&self, args: &MintArgs, blockhash: Hash) -> Result<u32> {
        let sample_mint = Keypair::new();
        let ixs = self.instructions(args, &sample_mint.pubkey(), MAX_COMPUTE_UNIT_LIMIT)?;
        let message = compile(&self.payer, &ixs, &self.lookup_tables, blockhash)?;
        let simulated = match self.chain.simulate_units(&unsigned_transaction(message)) {
            Ok(units) => units,
            Err(e) => {
                warn!("compute unit simulation failed: {}", e);
                None
            }
        };
        let units = estimate_compute_units(simulated);
        match simulated {
            Some(raw) if raw > 0 => info!("simulated {} CU, requesting {}", raw, units),
            _ => warn!("no simulated CU, using default {}", units),
        }
        Ok(units)
    }

    pub fn build(&self, label: &str, args: &MintArgs, quantity: u64) -> Result<MintBatch> {
        if quantity == 0 {
            return Err(MintError::Config("quantity must be at least 1".into()));
        }
        let (blockhash, last_valid_block_height) = self.chain.get_latest_blockhash()?;
        let compute_units = self.simulate_units(args, blockhash)?;

        let mut mints = Vec::with_capacity(quantity as usize);
        for _ in 0..quantity {
            let nft_mint = Keypair::new();
            let ixs = self.instructions(args, &nft_mint.pubkey(), compute_units)?;
            let message = compile(&self.payer, &ixs, &self.lookup_tables, blockhash)?;
            check_size(&message)?;
            mints.push(UnsignedMint { nft_mint, message });
        }
        info!(
            "built {} mint transaction(s) for group {} ({} CU each)",
            mints.len(),
            label,
            compute_units
        );

        Ok(MintBatch {
            label: label.to_string(),
            blockhash,
            last_valid_block_height,
            compute_units,
            mints,
        })
    }
}
