//! Load-time configuration checks. These produce warnings and never block minting.

use serde::Serialize;
use solana_sdk::{program_pack::Pack, pubkey::Pubkey};
use spl_token::state::Account as TokenAccount;

use crate::chain::ChainClient;
use crate::config::MintConfig;
use crate::machine::LoadedMachine;
use crate::settings::AllowLists;
use crate::state::lookup_table_addresses;

fn token_account_mint(data: &[u8]) -> Option<Pubkey> {
    TokenAccount::unpack(data).ok().map(|account| account.mint)
}

pub fn validate_machine<C: ChainClient + ?Sized>(
    chain: &C,
    machine: &LoadedMachine,
    allow_lists: &AllowLists,
    config: &MintConfig,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if !machine.machine.is_v2() {
        warnings.push(format!(
            "Candy machine {} is not account version V2; minting may fail",
            machine.address
        ));
    }

    for group in machine.groups() {
        if let Some(p) = &group.guards.freeze_token_payment {
            match chain.get_account_data(&p.destination_ata) {
                Ok(Some(data)) if token_account_mint(&data) == Some(p.mint) => {}
                Ok(Some(_)) => warnings.push(format!(
                    "Group {}: freezeTokenPayment destination {} is not a token account for {}",
                    group.label, p.destination_ata, p.mint
                )),
                Ok(None) => warnings.push(format!(
                    "Group {}: freezeTokenPayment destination {} does not exist",
                    group.label, p.destination_ata
                )),
                Err(e) => warnings.push(format!(
                    "Group {}: could not check freezeTokenPayment destination: {}",
                    group.label, e
                )),
            }
        }
        if group.guards.allow_list.is_some() && allow_lists.get(&group.label).is_none() {
            warnings.push(format!(
                "Group {} has an allow list guard but no list in settings",
                group.label
            ));
        }
    }

    if let Some(lut) = &config.lookup_table {
        match chain.get_account_data(lut) {
            Ok(Some(data)) => {
                if let Err(e) = lookup_table_addresses(lut, &data) {
                    warnings.push(format!("Lookup table {} is unusable: {}", lut, e));
                }
            }
            _ => warnings.push(format!("Lookup table {} not found", lut)),
        }
    }

    warnings
}

/// A settings allow list next to the root its group stores on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllowListRoot {
    pub label: String,
    pub root: String,
    /// `None` when the group is missing or has no allow list guard.
    pub on_chain: Option<String>,
    pub matches: bool,
}

pub fn allow_list_roots(machine: &LoadedMachine, allow_lists: &AllowLists) -> Vec<AllowListRoot> {
    allow_lists
        .labels()
        .filter_map(|label| {
            let root = allow_lists.root(label)?;
            let on_chain = machine
                .group(label)
                .and_then(|g| g.guards.allow_list)
                .map(|a| a.merkle_root);
            Some(AllowListRoot {
                label: label.to_string(),
                root: hex::encode(root),
                on_chain: on_chain.map(hex::encode),
                matches: on_chain == Some(root),
            })
        })
        .collect()
}
