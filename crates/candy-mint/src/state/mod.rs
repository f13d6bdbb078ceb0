pub mod candy_guard;
pub mod candy_machine;
pub mod metadata;

pub use candy_guard::*;
pub use candy_machine::{CandyMachine, CandyMachineData};
pub use metadata::{decode_metadata, verified_collection};

use borsh::BorshDeserialize;
use solana_address_lookup_table_interface::state::AddressLookupTable;
use solana_sdk::{clock::Clock, pubkey::Pubkey};

use crate::error::{MintError, Result};

/// Anchor account discriminator in front of every guard-owned account.
const DISCRIMINATOR_LEN: usize = 8;

#[derive(BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct MintCounter {
    pub count: u16,
}

#[derive(BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct AllocationTracker {
    pub count: u32,
}

fn decode_guard_account<T: BorshDeserialize>(data: &[u8]) -> Option<T> {
    let mut body = data.get(DISCRIMINATOR_LEN..)?;
    T::deserialize(&mut body).ok()
}

pub fn read_mint_counter(data: &[u8]) -> Option<u16> {
    decode_guard_account::<MintCounter>(data).map(|c| c.count)
}

pub fn read_allocation_count(data: &[u8]) -> Option<u32> {
    decode_guard_account::<AllocationTracker>(data).map(|c| c.count)
}

pub fn lookup_table_addresses(address: &Pubkey, data: &[u8]) -> Result<Vec<Pubkey>> {
    let table = AddressLookupTable::deserialize(data)
        .map_err(|e| MintError::decode("lookup table", *address, e))?;
    Ok(table.addresses.to_vec())
}

pub fn decode_clock(address: &Pubkey, data: &[u8]) -> Result<Clock> {
    bincode::deserialize(data).map_err(|e| MintError::decode("clock", *address, e))
}
