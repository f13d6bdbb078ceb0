use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{MintError, Result};

pub const ACCOUNT_VERSION_V2: u8 = 1;
pub const TOKEN_STANDARD_PROGRAMMABLE: u8 = 4;

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct Creator {
    pub address: Pubkey,
    pub verified: bool,
    pub percentage_share: u8,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct ConfigLineSettings {
    pub prefix_name: String,
    pub name_length: u32,
    pub prefix_uri: String,
    pub uri_length: u32,
    pub is_sequential: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct HiddenSettings {
    pub name: String,
    pub uri: String,
    pub hash: [u8; 32],
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct CandyMachineData {
    pub items_available: u64,
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    pub max_supply: u64,
    pub is_mutable: bool,
    pub creators: Vec<Creator>,
    pub config_line_settings: Option<ConfigLineSettings>,
    pub hidden_settings: Option<HiddenSettings>,
}

/// Fixed part of a candy machine account. Config lines follow and are not read.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct CandyMachine {
    pub version: u8,
    pub token_standard: u8,
    pub features: [u8; 6],
    pub authority: Pubkey,
    /// The candy guard wrapping this machine.
    pub mint_authority: Pubkey,
    pub collection_mint: Pubkey,
    pub items_redeemed: u64,
    pub data: CandyMachineData,
}

pub fn account_discriminator() -> [u8; 8] {
    let hash = solana_sdk::hash::hash(b"account:CandyMachine");
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.to_bytes()[..8]);
    out
}

impl CandyMachine {
    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self> {
        if data.len() < 8 || data[..8] != account_discriminator() {
            return Err(MintError::decode(
                "candy machine",
                *address,
                "not a candy machine account",
            ));
        }
        CandyMachine::deserialize(&mut &data[8..])
            .map_err(|e| MintError::decode("candy machine", *address, e))
    }

    pub fn to_account_data(&self) -> std::io::Result<Vec<u8>> {
        let mut out = account_discriminator().to_vec();
        out.extend(borsh::to_vec(self)?);
        Ok(out)
    }

    pub fn items_remaining(&self) -> u64 {
        self.data.items_available.saturating_sub(self.items_redeemed)
    }

    pub fn is_sold_out(&self) -> bool {
        self.items_redeemed >= self.data.items_available
    }

    pub fn is_v2(&self) -> bool {
        self.version == ACCOUNT_VERSION_V2
    }

    pub fn is_programmable(&self) -> bool {
        self.token_standard == TOKEN_STANDARD_PROGRAMMABLE
    }
}

#[cfg(test)]
pub(crate) fn sample_machine(items_available: u64, items_redeemed: u64) -> CandyMachine {
    CandyMachine {
        version: ACCOUNT_VERSION_V2,
        token_standard: TOKEN_STANDARD_PROGRAMMABLE,
        features: [0; 6],
        authority: Pubkey::new_unique(),
        mint_authority: Pubkey::new_unique(),
        collection_mint: Pubkey::new_unique(),
        items_redeemed,
        data: CandyMachineData {
            items_available,
            symbol: "CNDY".into(),
            seller_fee_basis_points: 500,
            max_supply: 0,
            is_mutable: true,
            creators: vec![Creator {
                address: Pubkey::new_unique(),
                verified: true,
                percentage_share: 100,
            }],
            config_line_settings: Some(ConfigLineSettings {
                prefix_name: "Candy #".into(),
                name_length: 4,
                prefix_uri: "https://arweave.net/".into(),
                uri_length: 43,
                is_sequential: false,
            }),
            hidden_settings: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ignores_trailing_config_lines() {
        let cm = sample_machine(100, 40);
        let mut data = cm.to_account_data().unwrap();
        data.extend_from_slice(&[0xAB; 512]);
        let decoded = CandyMachine::decode(&Pubkey::new_unique(), &data).unwrap();
        assert_eq!(decoded, cm);
        assert_eq!(decoded.items_remaining(), 60);
        assert!(!decoded.is_sold_out());
        assert!(decoded.is_v2());
    }

    #[test]
    fn sold_out_when_redeemed_reaches_available() {
        assert!(sample_machine(10, 10).is_sold_out());
        assert_eq!(sample_machine(10, 12).items_remaining(), 0);
    }

    #[test]
    fn short_account_is_a_decode_error() {
        let err = CandyMachine::decode(&Pubkey::new_unique(), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, MintError::Decode { .. }));
    }
}
