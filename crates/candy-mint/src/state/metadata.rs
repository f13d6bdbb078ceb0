use mpl_token_metadata::accounts::Metadata;
use solana_sdk::pubkey::Pubkey;

use crate::error::{MintError, Result};

fn trim_padding(s: &str) -> String {
    s.trim_end_matches('\0').to_string()
}

/// Decodes a token metadata account and strips the null padding the program
/// writes after `name`, `symbol` and `uri`.
pub fn decode_metadata(address: &Pubkey, data: &[u8]) -> Result<Metadata> {
    let mut md = Metadata::safe_deserialize(data)
        .map_err(|e| MintError::decode("metadata", *address, e))?;
    md.name = trim_padding(&md.name);
    md.symbol = trim_padding(&md.symbol);
    md.uri = trim_padding(&md.uri);
    Ok(md)
}

pub fn verified_collection(md: &Metadata) -> Option<Pubkey> {
    md.collection
        .as_ref()
        .filter(|c| c.verified)
        .map(|c| c.key)
}
