use mpl_token_metadata::{
    accounts::{MasterEdition, Metadata, MetadataDelegateRecord, TokenRecord},
    types::MetadataDelegateRole,
};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction,
};

use crate::chain::OwnedNft;
use crate::constants::*;
use crate::error::{MintError, Result};
use crate::machine::LoadedMachine;
use crate::pdas::*;
use crate::state::{GuardGroup, GuardSet, GuardType};

/// Anchor instruction discriminator: first 8 bytes of SHA-256("global:<name>")
fn sighash(name: &str) -> Vec<u8> {
    let hash = solana_sdk::hash::hash(format!("global:{}", name).as_bytes());
    hash.to_bytes()[..8].to_vec()
}

// ---------------------------------------------------------------------------
// Compute budget / tip
// ---------------------------------------------------------------------------

pub fn compute_unit_price(micro_lamports: u64) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_price(micro_lamports)
}

pub fn compute_unit_limit(units: u32) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_limit(units)
}

pub fn tip(payer: &Pubkey) -> Instruction {
    system_instruction::transfer(payer, &TIP_DESTINATION, TIP_LAMPORTS)
}

// ---------------------------------------------------------------------------
// Mint args
// ---------------------------------------------------------------------------

/// Guard accounts and data for one mint, resolved for a specific group and wallet.
#[derive(Clone, Debug)]
pub struct MintArgs {
    pub label: Option<String>,
    pub guards: GuardSet,
    /// NFT consumed or shown by nftBurn / nftPayment / nftGate.
    pub nft: Option<OwnedNft>,
}

impl MintArgs {
    pub fn resolve(group: &GuardGroup, guards: GuardSet, owned_nfts: &[OwnedNft]) -> Result<Self> {
        let required = guards
            .nft_burn
            .as_ref()
            .map(|g| g.required_collection)
            .or_else(|| guards.nft_payment.as_ref().map(|g| g.required_collection))
            .or_else(|| guards.nft_gate.as_ref().map(|g| g.required_collection));

        let nft = match required {
            None => None,
            Some(collection) => Some(
                owned_nfts
                    .iter()
                    .find(|n| n.collection == Some(collection))
                    .cloned()
                    .ok_or_else(|| MintError::NotEligible {
                        label: group.label.clone(),
                        reason: format!("no NFT from collection {}", collection),
                    })?,
            ),
        };

        if guards.third_party_signer.is_some() || guards.gatekeeper.is_some() {
            return Err(MintError::NotEligible {
                label: group.label.clone(),
                reason: "guard requires a backend signer".into(),
            });
        }

        Ok(Self {
            label: group.instruction_label(),
            guards,
            nft,
        })
    }
}

/// Accounts each enabled guard reads during mint, in guard order.
pub fn guard_remaining_accounts(
    args: &MintArgs,
    machine: &LoadedMachine,
    payer: &Pubkey,
    nft_mint: &Pubkey,
) -> Vec<AccountMeta> {
    let g = &args.guards;
    let guard = &machine.guard_address;
    let cm = &machine.address;
    let nft_ata = get_ata(payer, nft_mint);
    let mut accounts = Vec::new();

    if let Some(p) = &g.sol_payment {
        accounts.push(AccountMeta::new(p.destination, false));
    }
    if let Some(p) = &g.token_payment {
        accounts.push(AccountMeta::new(get_ata(payer, &p.mint), false));
        accounts.push(AccountMeta::new(p.destination_ata, false));
    }
    if let Some(p) = &g.token_gate {
        accounts.push(AccountMeta::new_readonly(get_ata(payer, &p.mint), false));
    }
    if let Some(p) = &g.allow_list {
        accounts.push(AccountMeta::new_readonly(
            allow_list_proof_pda(&p.merkle_root, payer, guard, cm),
            false,
        ));
    }
    if let Some(p) = &g.mint_limit {
        accounts.push(AccountMeta::new(mint_counter_pda(p.id, payer, guard, cm), false));
    }
    if let (Some(p), Some(nft)) = (&g.nft_payment, &args.nft) {
        accounts.push(AccountMeta::new(nft.token_account, false));
        accounts.push(AccountMeta::new(Metadata::find_pda(&nft.mint).0, false));
        accounts.push(AccountMeta::new_readonly(nft.mint, false));
        accounts.push(AccountMeta::new_readonly(p.destination, false));
        accounts.push(AccountMeta::new(get_ata(&p.destination, &nft.mint), false));
        accounts.push(AccountMeta::new_readonly(ATA_PROGRAM_ID, false));
    }
    if let (Some(_), Some(nft)) = (&g.nft_gate, &args.nft) {
        accounts.push(AccountMeta::new_readonly(nft.token_account, false));
        accounts.push(AccountMeta::new_readonly(Metadata::find_pda(&nft.mint).0, false));
    }
    if let (Some(p), Some(nft)) = (&g.nft_burn, &args.nft) {
        accounts.push(AccountMeta::new(nft.token_account, false));
        accounts.push(AccountMeta::new(Metadata::find_pda(&nft.mint).0, false));
        accounts.push(AccountMeta::new(MasterEdition::find_pda(&nft.mint).0, false));
        accounts.push(AccountMeta::new(nft.mint, false));
        accounts.push(AccountMeta::new(Metadata::find_pda(&p.required_collection).0, false));
    }
    if let Some(p) = &g.token_burn {
        accounts.push(AccountMeta::new(get_ata(payer, &p.mint), false));
        accounts.push(AccountMeta::new(p.mint, false));
    }
    if let Some(p) = &g.freeze_sol_payment {
        accounts.push(AccountMeta::new(freeze_escrow_pda(&p.destination, guard, cm), false));
        accounts.push(AccountMeta::new_readonly(nft_ata, false));
    }
    if let Some(p) = &g.freeze_token_payment {
        let escrow = freeze_escrow_pda(&p.destination_ata, guard, cm);
        accounts.push(AccountMeta::new(escrow, false));
        accounts.push(AccountMeta::new_readonly(nft_ata, false));
        accounts.push(AccountMeta::new(get_ata(payer, &p.mint), false));
        accounts.push(AccountMeta::new(get_ata(&escrow, &p.mint), false));
    }
    if let Some(p) = &g.allocation {
        accounts.push(AccountMeta::new(allocation_tracker_pda(p.id, guard, cm), false));
    }
    if let Some(p) = &g.token2022_payment {
        accounts.push(AccountMeta::new(
            get_ata_for_program(payer, &p.mint, &TOKEN_2022_ID),
            false,
        ));
        accounts.push(AccountMeta::new(p.destination_ata, false));
        accounts.push(AccountMeta::new_readonly(p.mint, false));
        accounts.push(AccountMeta::new_readonly(TOKEN_2022_ID, false));
    }
    accounts
}

// ---------------------------------------------------------------------------
// Candy guard instructions
// ---------------------------------------------------------------------------

pub fn mint_v2(
    machine: &LoadedMachine,
    args: &MintArgs,
    payer: &Pubkey,
    nft_mint: &Pubkey,
) -> Result<Instruction> {
    let cm = &machine.machine;
    let cm_authority = candy_machine_authority_pda(&machine.address);
    let nft_ata = get_ata(payer, nft_mint);
    // Optional accounts are filled with the guard program ID.
    let none = CANDY_GUARD_PROGRAM_ID;

    let token_record = if cm.is_programmable() {
        AccountMeta::new(TokenRecord::find_pda(nft_mint, &nft_ata).0, false)
    } else {
        AccountMeta::new_readonly(none, false)
    };

    let mut accounts = vec![
        AccountMeta::new_readonly(machine.guard_address, false),
        AccountMeta::new_readonly(CANDY_MACHINE_PROGRAM_ID, false),
        AccountMeta::new(machine.address, false),
        AccountMeta::new(cm_authority, false),
        AccountMeta::new(*payer, true),
        AccountMeta::new(*payer, true), // minter
        AccountMeta::new(*nft_mint, true),
        AccountMeta::new_readonly(*payer, true), // nft mint authority
        AccountMeta::new(Metadata::find_pda(nft_mint).0, false),
        AccountMeta::new(MasterEdition::find_pda(nft_mint).0, false),
        AccountMeta::new(nft_ata, false),
        token_record,
        AccountMeta::new_readonly(
            MetadataDelegateRecord::find_pda(
                &cm.collection_mint,
                MetadataDelegateRole::Collection,
                &cm.authority,
                &cm_authority,
            )
            .0,
            false,
        ),
        AccountMeta::new_readonly(cm.collection_mint, false),
        AccountMeta::new(Metadata::find_pda(&cm.collection_mint).0, false),
        AccountMeta::new_readonly(MasterEdition::find_pda(&cm.collection_mint).0, false),
        AccountMeta::new_readonly(cm.authority, false),
        AccountMeta::new_readonly(TOKEN_METADATA_PROGRAM_ID, false),
        AccountMeta::new_readonly(SPL_TOKEN_ID, false),
        AccountMeta::new_readonly(ATA_PROGRAM_ID, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(SYSVAR_INSTRUCTIONS_ID, false),
        AccountMeta::new_readonly(SYSVAR_SLOT_HASHES_ID, false),
        AccountMeta::new_readonly(none, false), // authorization rules program
        AccountMeta::new_readonly(none, false), // authorization rules
    ];
    accounts.extend(guard_remaining_accounts(args, machine, payer, nft_mint));

    let mut data = sighash("mint_v2");
    let mint_args: Vec<u8> = Vec::new();
    data.extend(
        borsh::to_vec(&(mint_args, args.label.clone()))
            .map_err(|e| MintError::Compile(e.to_string()))?,
    );

    Ok(Instruction::new_with_bytes(
        CANDY_GUARD_PROGRAM_ID,
        &data,
        accounts,
    ))
}

/// Route instruction that creates the allow-list proof PDA for `payer`.
pub fn route_allow_list_proof(
    machine: &LoadedMachine,
    label: Option<String>,
    merkle_root: &[u8; 32],
    proof: &[[u8; 32]],
    payer: &Pubkey,
) -> Result<Instruction> {
    let proof_pda = allow_list_proof_pda(merkle_root, payer, &machine.guard_address, &machine.address);
    let accounts = vec![
        AccountMeta::new_readonly(machine.guard_address, false),
        AccountMeta::new(machine.address, false),
        AccountMeta::new(*payer, true),
        AccountMeta::new(proof_pda, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(*payer, false), // minter
    ];

    let encode = |e: std::io::Error| MintError::Compile(e.to_string());
    let route_data = borsh::to_vec(&proof.to_vec()).map_err(encode)?;
    let mut data = sighash("route");
    data.push(GuardType::AllowList as u8);
    data.extend(borsh::to_vec(&route_data).map_err(encode)?);
    data.extend(borsh::to_vec(&label).map_err(encode)?);

    Ok(Instruction::new_with_bytes(
        CANDY_GUARD_PROGRAM_ID,
        &data,
        accounts,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::candy_machine::sample_machine;
    use crate::state::*;

    fn loaded() -> LoadedMachine {
        let machine = sample_machine(10, 0);
        LoadedMachine {
            address: Pubkey::new_unique(),
            guard_address: machine.mint_authority,
            machine,
            guard: CandyGuardAccount {
                base: Pubkey::new_unique(),
                bump: 1,
                authority: Pubkey::new_unique(),
                default: GuardSet::default(),
                groups: vec![],
            },
        }
    }

    fn args(label: &str, guards: GuardSet) -> MintArgs {
        let group = GuardGroup {
            label: label.into(),
            guards: guards.clone(),
        };
        MintArgs::resolve(&group, guards, &[]).unwrap()
    }

    #[test]
    fn mint_v2_layout() {
        let m = loaded();
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ix = mint_v2(&m, &args("default", GuardSet::default()), &payer, &mint).unwrap();

        assert_eq!(ix.program_id, CANDY_GUARD_PROGRAM_ID);
        assert_eq!(ix.accounts.len(), 25);
        assert_eq!(&ix.data[..8], &sighash("mint_v2")[..]);
        // empty mint args + None label
        assert_eq!(&ix.data[8..], &[0, 0, 0, 0, 0]);
        assert!(ix.accounts[6].is_signer && ix.accounts[6].pubkey == mint);
    }

    #[test]
    fn label_is_encoded_for_groups() {
        let m = loaded();
        let ix = mint_v2(&m, &args("WL", GuardSet::default()), &Pubkey::new_unique(), &Pubkey::new_unique()).unwrap();
        assert_eq!(&ix.data[8..], &[0, 0, 0, 0, 1, 2, 0, 0, 0, b'W', b'L']);
    }

    #[test]
    fn remaining_accounts_follow_guard_order() {
        let m = loaded();
        let payer = Pubkey::new_unique();
        let dest = Pubkey::new_unique();
        let burn_mint = Pubkey::new_unique();
        let guards = GuardSet {
            sol_payment: Some(SolPayment {
                lamports: 1,
                destination: dest,
            }),
            mint_limit: Some(MintLimit { id: 4, limit: 1 }),
            token_burn: Some(TokenBurn {
                amount: 1,
                mint: burn_mint,
            }),
            ..Default::default()
        };
        let accounts = guard_remaining_accounts(&args("WL", guards), &m, &payer, &Pubkey::new_unique());
        let keys: Vec<Pubkey> = accounts.iter().map(|a| a.pubkey).collect();
        assert_eq!(
            keys,
            vec![
                dest,
                mint_counter_pda(4, &payer, &m.guard_address, &m.address),
                get_ata(&payer, &burn_mint),
                burn_mint,
            ]
        );
    }

    #[test]
    fn nft_guards_need_a_matching_nft() {
        let guards = GuardSet {
            nft_burn: Some(NftBurn {
                required_collection: Pubkey::new_unique(),
            }),
            ..Default::default()
        };
        let group = GuardGroup {
            label: "burn".into(),
            guards: guards.clone(),
        };
        assert!(matches!(
            MintArgs::resolve(&group, guards, &[]),
            Err(MintError::NotEligible { .. })
        ));
    }

    #[test]
    fn route_encodes_allow_list_proof() {
        let m = loaded();
        let payer = Pubkey::new_unique();
        let proof = vec![[1u8; 32], [2u8; 32]];
        let ix = route_allow_list_proof(&m, Some("WL".into()), &[9; 32], &proof, &payer).unwrap();

        assert_eq!(ix.data[8], 8);
        // u32 byte length of the proof vector, then its own u32 element count.
        assert_eq!(&ix.data[9..13], &(4u32 + 64).to_le_bytes());
        assert_eq!(&ix.data[13..17], &2u32.to_le_bytes());
        assert_eq!(ix.accounts[3].pubkey, allow_list_proof_pda(&[9; 32], &payer, &m.guard_address, &m.address));
    }

    #[test]
    fn compute_budget_instructions_target_budget_program() {
        let price = compute_unit_price(1001);
        let limit = compute_unit_limit(180_000);
        assert_eq!(price.program_id, limit.program_id);
        assert_eq!(limit.data[0], 2);
        assert_eq!(&limit.data[1..5], &180_000u32.to_le_bytes());
    }
}
