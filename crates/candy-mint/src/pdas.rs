use solana_sdk::pubkey::Pubkey;

use crate::constants::{ATA_PROGRAM_ID, CANDY_GUARD_PROGRAM_ID, CANDY_MACHINE_PROGRAM_ID, SPL_TOKEN_ID};

pub fn get_ata(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_ata_for_program(wallet, mint, &SPL_TOKEN_ID)
}

pub fn get_ata_for_program(wallet: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[wallet.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    )
    .0
}

// ---------------------------------------------------------------------------
// Candy machine / guard
// ---------------------------------------------------------------------------

pub fn candy_machine_authority_pda(candy_machine: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"candy_machine", candy_machine.as_ref()],
        &CANDY_MACHINE_PROGRAM_ID,
    )
    .0
}

pub fn mint_counter_pda(
    id: u8,
    user: &Pubkey,
    candy_guard: &Pubkey,
    candy_machine: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"mint_limit",
            &[id],
            user.as_ref(),
            candy_guard.as_ref(),
            candy_machine.as_ref(),
        ],
        &CANDY_GUARD_PROGRAM_ID,
    )
    .0
}

pub fn allocation_tracker_pda(id: u8, candy_guard: &Pubkey, candy_machine: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"allocation",
            &[id],
            candy_guard.as_ref(),
            candy_machine.as_ref(),
        ],
        &CANDY_GUARD_PROGRAM_ID,
    )
    .0
}

pub fn allow_list_proof_pda(
    merkle_root: &[u8; 32],
    user: &Pubkey,
    candy_guard: &Pubkey,
    candy_machine: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"allow_list",
            merkle_root.as_ref(),
            user.as_ref(),
            candy_guard.as_ref(),
            candy_machine.as_ref(),
        ],
        &CANDY_GUARD_PROGRAM_ID,
    )
    .0
}

pub fn freeze_escrow_pda(
    destination: &Pubkey,
    candy_guard: &Pubkey,
    candy_machine: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"freeze_escrow",
            destination.as_ref(),
            candy_guard.as_ref(),
            candy_machine.as_ref(),
        ],
        &CANDY_GUARD_PROGRAM_ID,
    )
    .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_counter_depends_on_id_and_user() {
        let (guard, cm) = (Pubkey::new_unique(), Pubkey::new_unique());
        let user = Pubkey::new_unique();
        let a = mint_counter_pda(1, &user, &guard, &cm);
        assert_eq!(a, mint_counter_pda(1, &user, &guard, &cm));
        assert_ne!(a, mint_counter_pda(2, &user, &guard, &cm));
        assert_ne!(a, mint_counter_pda(1, &Pubkey::new_unique(), &guard, &cm));
    }

    #[test]
    fn ata_matches_associated_token_program() {
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        assert_eq!(
            get_ata(&wallet, &mint),
            spl_associated_token_account::get_associated_token_address(&wallet, &mint)
        );
    }
}
