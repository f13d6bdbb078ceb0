//! Off-chain NFT metadata, fetched best-effort after a mint confirms.

use mpl_token_metadata::accounts::Metadata;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tracing::warn;

use crate::chain::ChainClient;
use crate::error::{MintError, Result};
use crate::state::decode_metadata;
use crate::submit::ConfirmedMint;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub trait_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

pub trait MetadataFetcher: Sync {
    fn fetch(&self, uri: &str) -> Result<JsonMetadata>;
}

pub struct UreqFetcher;

impl MetadataFetcher for UreqFetcher {
    fn fetch(&self, uri: &str) -> Result<JsonMetadata> {
        let body: String = ureq::get(uri)
            .call()
            .map_err(|e| MintError::Metadata(format!("failed to fetch {}: {}", uri, e)))?
            .into_body()
            .read_to_string()
            .map_err(|e| MintError::Metadata(format!("failed to read {}: {}", uri, e)))?;
        serde_json::from_str(&body)
            .map_err(|e| MintError::Metadata(format!("invalid metadata json at {}: {}", uri, e)))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MintedAsset {
    pub mint: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_chain_metadata: Option<JsonMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_error: Option<String>,
}

impl MintedAsset {
    fn bare(mint: &Pubkey, signature: &Signature) -> Self {
        Self {
            mint: mint.to_string(),
            signature: signature.to_string(),
            name: None,
            uri: None,
            off_chain_metadata: None,
            metadata_error: None,
        }
    }

    pub fn display_name(&self) -> String {
        self.off_chain_metadata
            .as_ref()
            .map(|m| m.name.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.mint.clone())
    }
}

fn load_one<C, F>(chain: &C, fetcher: &F, minted: &ConfirmedMint) -> MintedAsset
where
    C: ChainClient + ?Sized,
    F: MetadataFetcher + ?Sized,
{
    let mut asset = MintedAsset::bare(&minted.mint, &minted.signature);
    let (pda, _) = Metadata::find_pda(&minted.mint);

    let on_chain = chain
        .get_account_data(&pda)
        .and_then(|data| data.ok_or(MintError::AccountNotFound(pda)))
        .and_then(|data| decode_metadata(&pda, &data));
    let md = match on_chain {
        Ok(md) => md,
        Err(e) => {
            warn!("metadata for {} unavailable: {}", minted.mint, e);
            asset.metadata_error = Some(e.to_string());
            return asset;
        }
    };
    asset.name = Some(md.name.clone());
    asset.uri = Some(md.uri.clone());

    match fetcher.fetch(&md.uri) {
        Ok(json) => asset.off_chain_metadata = Some(json),
        Err(e) => {
            warn!("off-chain metadata for {} unavailable: {}", minted.mint, e);
            asset.metadata_error = Some(e.to_string());
        }
    }
    asset
}

/// Never fails; lookup errors are recorded on each asset.
pub fn load_minted_assets<C, F>(chain: &C, fetcher: &F, minted: &[ConfirmedMint]) -> Vec<MintedAsset>
where
    C: ChainClient + ?Sized,
    F: MetadataFetcher + ?Sized,
{
    minted
        .par_iter()
        .map(|m| load_one(chain, fetcher, m))
        .collect()
}
