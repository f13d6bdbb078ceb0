use std::time::Duration;

use solana_sdk::{pubkey, pubkey::Pubkey};

// ---------------------------------------------------------------------------
// Program IDs
// ---------------------------------------------------------------------------

pub const CANDY_MACHINE_PROGRAM_ID: Pubkey =
    pubkey!("CndyV3LdqHUfDLmE5naZjVN8rBZz4tqhdefbAnjHG3JR");
pub const CANDY_GUARD_PROGRAM_ID: Pubkey = pubkey!("Guard1JwRhJkVH6XZhzoYxeBVQe872VH6QggF4BWmS9g");
pub const TOKEN_METADATA_PROGRAM_ID: Pubkey = mpl_token_metadata::ID;
pub const SPL_TOKEN_ID: Pubkey = spl_token::ID;
pub const TOKEN_2022_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");
pub const ATA_PROGRAM_ID: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");
pub const SYSVAR_INSTRUCTIONS_ID: Pubkey = pubkey!("Sysvar1nstructions1111111111111111111111111");
pub const SYSVAR_SLOT_HASHES_ID: Pubkey = pubkey!("SysvarS1otHashes111111111111111111111111111");
pub const SYSVAR_CLOCK_ID: Pubkey = pubkey!("SysvarC1ock11111111111111111111111111111111");

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Label of the guard set stored outside of any group.
pub const DEFAULT_GROUP_LABEL: &str = "default";
pub const MAX_LABEL_LENGTH: usize = 6;

// ---------------------------------------------------------------------------
// Transaction assembly
// ---------------------------------------------------------------------------

pub const DEFAULT_MICRO_LAMPORTS: u64 = 1001;
/// Compute-unit limit used when simulation does not report consumption.
pub const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 800_000;
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;
pub const TIP_LAMPORTS: u64 = 5_000_000;
pub const TIP_DESTINATION: Pubkey = pubkey!("BeeryDvghgcKPTUw3N3bdFDFFWhTWdWHnsLuVebgsGSD");
pub const PACKET_DATA_SIZE: usize = 1232;
pub const DEFAULT_MAX_MINT_AMOUNT: u64 = 10;

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIRM_ATTEMPTS: u32 = 45;
pub const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(1);
