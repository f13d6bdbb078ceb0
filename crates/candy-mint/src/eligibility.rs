//! Guard evaluation: which groups the wallet may mint under right now.

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::chain::ChainClient;
use crate::config::{MintConfig, SplTokenBurn};
use crate::constants::DEFAULT_GROUP_LABEL;
use crate::machine::{LoadedMachine, WalletContext};
use crate::pdas::{allocation_tracker_pda, mint_counter_pda};
use crate::settings::AllowLists;
use crate::state::{read_allocation_count, read_mint_counter, GuardGroup, GuardSet};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuardEligibility {
    pub label: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub max_amount: u64,
    pub minting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading_text: Option<String>,
}

impl GuardEligibility {
    pub fn start_minting(&mut self, text: impl Into<String>) {
        self.minting = true;
        self.loading_text = Some(text.into());
    }

    pub fn finish_minting(&mut self) {
        self.minting = false;
        self.loading_text = None;
    }
}

/// Group guards with the configured secondary-token burn applied.
pub fn effective_guards(guards: &GuardSet, burn: Option<&SplTokenBurn>) -> GuardSet {
    let mut guards = guards.clone();
    if let (Some(token_burn), Some(burn)) = (guards.token_burn.as_mut(), burn) {
        token_burn.mint = burn.mint;
        token_burn.amount = burn.amount;
    }
    guards
}

struct Check {
    reasons: Vec<String>,
    max_amount: u64,
}

impl Check {
    fn deny(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    fn cap(&mut self, amount: u64) {
        self.max_amount = self.max_amount.min(amount);
    }

    /// Requires `balance >= per_mint` and caps by how many mints it covers.
    fn afford(&mut self, balance: Result<u64, String>, per_mint: u64, reason: &str) {
        match balance {
            Err(e) => self.deny(format!("{} (lookup failed: {})", reason, e)),
            Ok(_) if per_mint == 0 => {}
            Ok(b) if b < per_mint => self.deny(reason),
            Ok(b) => self.cap(b / per_mint),
        }
    }
}

pub fn evaluate_group<C: ChainClient + ?Sized>(
    chain: &C,
    machine: &LoadedMachine,
    wallet: &WalletContext,
    allow_lists: &AllowLists,
    config: &MintConfig,
    group: &GuardGroup,
) -> GuardEligibility {
    let guards = effective_guards(&group.guards, config.spl_token_burn.as_ref());
    let mut check = Check {
        reasons: Vec::new(),
        max_amount: machine.machine.items_remaining().min(config.quantity_cap()),
    };

    if machine.machine.is_sold_out() {
        check.deny("Sold out");
    }

    if let Some(g) = &guards.start_date {
        if wallet.now < g.date {
            check.deny("Mint has not started yet");
        }
    }
    if let Some(g) = &guards.end_date {
        if wallet.now > g.date {
            check.deny("Mint has ended");
        }
    }

    if let Some(g) = &guards.address_gate {
        if wallet.wallet != g.address {
            check.deny("Wallet is not allowed to mint from this group");
        }
    }

    if let Some(g) = &guards.allow_list {
        let wallet_str = wallet.wallet.to_string();
        match allow_lists.tree(&group.label) {
            None => check.deny("No allow list configured for this group"),
            Some(tree) if !tree.contains(&wallet_str) => {
                check.deny("Wallet is not on the allow list")
            }
            Some(tree) if tree.root() != g.merkle_root => {
                check.deny("Allow list does not match the on-chain merkle root")
            }
            Some(_) => {}
        }
    }

    if let Some(g) = &guards.mint_limit {
        let pda = mint_counter_pda(g.id, &wallet.wallet, &machine.guard_address, &machine.address);
        match chain.get_account_data(&pda) {
            Err(e) => check.deny(format!("Could not read mint counter: {}", e)),
            Ok(data) => {
                let count = data.as_deref().and_then(read_mint_counter).unwrap_or(0);
                if count >= g.limit {
                    check.deny("Mint limit reached");
                } else {
                    check.cap(u64::from(g.limit - count));
                }
            }
        }
    }

    if let Some(g) = &guards.allocation {
        let pda = allocation_tracker_pda(g.id, &machine.guard_address, &machine.address);
        match chain.get_account_data(&pda) {
            Err(e) => check.deny(format!("Could not read allocation tracker: {}", e)),
            Ok(data) => {
                let count = data.as_deref().and_then(read_allocation_count).unwrap_or(0);
                if count >= g.limit {
                    check.deny("Allocation limit reached");
                } else {
                    check.cap(u64::from(g.limit - count));
                }
            }
        }
    }

    if let Some(g) = &guards.redeemed_amount {
        if machine.machine.items_redeemed >= g.maximum {
            check.deny("Maximum redeemed amount reached");
        } else {
            check.cap(g.maximum - machine.machine.items_redeemed);
        }
    }

    let sol_price = guards
        .sol_payment
        .as_ref()
        .map_or(0, |g| g.lamports)
        .saturating_add(guards.freeze_sol_payment.as_ref().map_or(0, |g| g.lamports));
    if sol_price > 0 {
        check.afford(wallet.sol_balance.clone(), sol_price, "Not enough SOL");
    }

    let token_costs: [(Option<(&Pubkey, u64)>, &str); 4] = [
        (
            guards.token_payment.as_ref().map(|g| (&g.mint, g.amount)),
            "Not enough tokens for payment",
        ),
        (
            guards.freeze_token_payment.as_ref().map(|g| (&g.mint, g.amount)),
            "Not enough tokens for payment",
        ),
        (
            guards.token2022_payment.as_ref().map(|g| (&g.mint, g.amount)),
            "Not enough tokens for payment",
        ),
        (
            guards.token_burn.as_ref().map(|g| (&g.mint, g.amount)),
            "Not enough tokens to burn",
        ),
    ];
    for (cost, reason) in token_costs {
        if let Some((mint, amount)) = cost {
            check.afford(wallet.token_balance(mint), amount, reason);
        }
    }

    if let Some(g) = &guards.token_gate {
        match wallet.token_balance(&g.mint) {
            Err(e) => check.deny(format!("Could not read token balance: {}", e)),
            Ok(b) if b < g.amount => check.deny("Missing required token"),
            Ok(_) => {}
        }
    }

    let nft_collections = [
        guards.nft_gate.as_ref().map(|g| (&g.required_collection, false)),
        guards.nft_burn.as_ref().map(|g| (&g.required_collection, true)),
        guards.nft_payment.as_ref().map(|g| (&g.required_collection, true)),
    ];
    for (collection, consumed) in nft_collections.into_iter().flatten() {
        match wallet.nfts_in_collection(collection) {
            Err(e) => check.deny(format!("Could not read wallet NFTs: {}", e)),
            Ok(nfts) if nfts.is_empty() => check.deny("No NFT from the required collection"),
            Ok(nfts) if consumed => check.cap(nfts.len() as u64),
            Ok(_) => {}
        }
    }

    if guards.gatekeeper.is_some() {
        check.deny("Gatekeeper guard is not supported");
    }
    if guards.third_party_signer.is_some() {
        check.deny("Third party signer guard is not supported");
    }

    if check.reasons.is_empty() && check.max_amount == 0 {
        check.deny("Nothing left to mint");
    }

    let allowed = check.reasons.is_empty();
    debug!(
        "group {}: allowed={} max={} reasons={:?}",
        group.label, allowed, check.max_amount, check.reasons
    );
    GuardEligibility {
        label: group.label.clone(),
        allowed,
        reason: check.reasons.into_iter().next(),
        max_amount: if allowed { check.max_amount } else { 0 },
        minting: false,
        loading_text: None,
    }
}

pub fn evaluate_groups<C: ChainClient + ?Sized>(
    chain: &C,
    machine: &LoadedMachine,
    wallet: &WalletContext,
    allow_lists: &AllowLists,
    config: &MintConfig,
) -> Vec<GuardEligibility> {
    machine
        .groups()
        .iter()
        .map(|group| evaluate_group(chain, machine, wallet, allow_lists, config, group))
        .collect()
}

/// Groups shown to the user: first occurrence of each label, without the
/// default set when real groups exist.
pub fn visible_groups(list: &[GuardEligibility]) -> Vec<&GuardEligibility> {
    let mut seen: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    for g in list {
        if !seen.contains(&g.label.as_str()) {
            seen.push(&g.label);
            out.push(g);
        }
    }
    if out.len() > 1 {
        out.retain(|g| g.label != DEFAULT_GROUP_LABEL);
    }
    out
}

pub fn choose_group(list: &[GuardEligibility]) -> Option<&GuardEligibility> {
    visible_groups(list).into_iter().find(|g| g.allowed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use solana_sdk::{hash::Hash, signature::Signature, transaction::VersionedTransaction};

    use super::*;
    use crate::chain::{OwnedNft, SignatureState, TokenHolding};
    use crate::error::{MintError, Result};
    use crate::state::candy_machine::sample_machine;
    use crate::state::*;

    #[derive(Default)]
    struct StubChain {
        accounts: HashMap<Pubkey, Vec<u8>>,
        broken: Vec<Pubkey>,
    }

    impl ChainClient for StubChain {
        fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
            if self.broken.contains(address) {
                return Err(MintError::Config("rpc down".into()));
            }
            Ok(self.accounts.get(address).cloned())
        }
        fn get_balance(&self, _: &Pubkey) -> Result<u64> {
            Ok(0)
        }
        fn get_latest_blockhash(&self) -> Result<(Hash, u64)> {
            Ok((Hash::default(), 0))
        }
        fn get_block_height(&self) -> Result<u64> {
            Ok(0)
        }
        fn get_token_holdings(&self, _: &Pubkey) -> Result<Vec<TokenHolding>> {
            Ok(vec![])
        }
        fn simulate_units(&self, _: &VersionedTransaction) -> Result<Option<u64>> {
            Ok(None)
        }
        fn send_transaction(&self, _: &VersionedTransaction) -> Result<Signature> {
            Ok(Signature::default())
        }
        fn get_signature_states(&self, s: &[Signature]) -> Result<Vec<SignatureState>> {
            Ok(vec![SignatureState::Pending; s.len()])
        }
    }

    const NOW: i64 = 1_700_000_000;

    fn machine(groups: Vec<GuardGroup>) -> LoadedMachine {
        let machine = sample_machine(100, 10);
        let guard_address = machine.mint_authority;
        LoadedMachine {
            address: Pubkey::new_unique(),
            machine,
            guard_address,
            guard: CandyGuardAccount {
                base: Pubkey::new_unique(),
                bump: 255,
                authority: Pubkey::new_unique(),
                default: GuardSet::default(),
                groups,
            },
        }
    }

    fn wallet(sol: u64) -> WalletContext {
        WalletContext {
            wallet: Pubkey::new_unique(),
            now: NOW,
            sol_balance: Ok(sol),
            tokens: Ok(vec![]),
            nfts: Ok(vec![]),
        }
    }

    fn group(label: &str, guards: GuardSet) -> GuardGroup {
        GuardGroup {
            label: label.into(),
            guards,
        }
    }

    fn multi_config() -> MintConfig {
        let mut config = MintConfig::new(Pubkey::new_unique());
        config.multi_mint = true;
        config.max_mint_amount = 10;
        config
    }

    fn eval_one(chain: &StubChain, m: &LoadedMachine, w: &WalletContext, lists: &AllowLists) -> GuardEligibility {
        let g = m.group(&m.guard.groups[0].label).unwrap();
        evaluate_group(chain, m, w, lists, &multi_config(), &g)
    }

    #[test]
    fn expired_end_date_is_not_allowed() {
        let m = machine(vec![group(
            "late",
            GuardSet {
                end_date: Some(EndDate { date: NOW - 1 }),
                ..Default::default()
            },
        )]);
        let e = eval_one(&StubChain::default(), &m, &wallet(0), &AllowLists::new());
        assert!(!e.allowed);
        assert!(e.reason.unwrap().contains("ended"));
        assert_eq!(e.max_amount, 0);
    }

    #[test]
    fn start_date_in_future_is_not_allowed() {
        let m = machine(vec![group(
            "early",
            GuardSet {
                start_date: Some(StartDate { date: NOW + 60 }),
                ..Default::default()
            },
        )]);
        let e = eval_one(&StubChain::default(), &m, &wallet(0), &AllowLists::new());
        assert_eq!(e.reason.as_deref(), Some("Mint has not started yet"));
    }

    #[test]
    fn mint_limit_reached() {
        let m = machine(vec![group(
            "WL",
            GuardSet {
                mint_limit: Some(MintLimit { id: 1, limit: 2 }),
                ..Default::default()
            },
        )]);
        let w = wallet(0);
        let pda = mint_counter_pda(1, &w.wallet, &m.guard_address, &m.address);
        let mut counter = vec![0u8; 10];
        counter[8..10].copy_from_slice(&2u16.to_le_bytes());
        let mut chain = StubChain::default();
        chain.accounts.insert(pda, counter);

        let e = eval_one(&chain, &m, &w, &AllowLists::new());
        assert!(!e.allowed);
        assert_eq!(e.reason.as_deref(), Some("Mint limit reached"));
    }

    #[test]
    fn missing_mint_counter_counts_as_zero() {
        let m = machine(vec![group(
            "WL",
            GuardSet {
                mint_limit: Some(MintLimit { id: 1, limit: 3 }),
                ..Default::default()
            },
        )]);
        let e = eval_one(&StubChain::default(), &m, &wallet(0), &AllowLists::new());
        assert!(e.allowed);
        assert_eq!(e.max_amount, 3);
    }

    #[test]
    fn counter_lookup_failure_only_blocks_that_group() {
        let limited = group(
            "WL",
            GuardSet {
                mint_limit: Some(MintLimit { id: 1, limit: 3 }),
                ..Default::default()
            },
        );
        let m = machine(vec![limited, group("public", GuardSet::default())]);
        let w = wallet(0);
        let mut chain = StubChain::default();
        chain
            .broken
            .push(mint_counter_pda(1, &w.wallet, &m.guard_address, &m.address));

        let list = evaluate_groups(&chain, &m, &w, &AllowLists::new(), &multi_config());
        assert_eq!(list.len(), 3);
        assert!(!list[1].allowed);
        assert!(list[1].reason.as_ref().unwrap().contains("mint counter"));
        assert!(list[2].allowed);
        assert_eq!(choose_group(&list).unwrap().label, "public");
    }

    #[test]
    fn allow_list_membership_and_root() {
        let w = wallet(0);
        let members = vec![w.wallet.to_string(), Pubkey::new_unique().to_string()];
        let lists = AllowLists::new().with("WL", members.clone());
        let root = lists.root("WL").unwrap();
        let m = machine(vec![group(
            "WL",
            GuardSet {
                allow_list: Some(AllowList { merkle_root: root }),
                ..Default::default()
            },
        )]);

        assert!(eval_one(&StubChain::default(), &m, &w, &lists).allowed);

        let outsider = wallet(0);
        let e = eval_one(&StubChain::default(), &m, &outsider, &lists);
        assert_eq!(e.reason.as_deref(), Some("Wallet is not on the allow list"));

        let e = eval_one(&StubChain::default(), &m, &w, &AllowLists::new());
        assert_eq!(e.reason.as_deref(), Some("No allow list configured for this group"));

        let stale = AllowLists::new().with("WL", vec![w.wallet.to_string()]);
        let e = eval_one(&StubChain::default(), &m, &w, &stale);
        assert!(e.reason.unwrap().contains("merkle root"));
    }

    #[test]
    fn sol_payment_caps_max_amount() {
        let m = machine(vec![group(
            "public",
            GuardSet {
                sol_payment: Some(SolPayment {
                    lamports: 100,
                    destination: Pubkey::new_unique(),
                }),
                ..Default::default()
            },
        )]);
        let e = eval_one(&StubChain::default(), &m, &wallet(350), &AllowLists::new());
        assert!(e.allowed);
        assert_eq!(e.max_amount, 3);

        let e = eval_one(&StubChain::default(), &m, &wallet(50), &AllowLists::new());
        assert_eq!(e.reason.as_deref(), Some("Not enough SOL"));
    }

    #[test]
    fn huge_sol_prices_do_not_overflow() {
        let m = machine(vec![group(
            "public",
            GuardSet {
                sol_payment: Some(SolPayment {
                    lamports: u64::MAX,
                    destination: Pubkey::new_unique(),
                }),
                freeze_sol_payment: Some(FreezeSolPayment {
                    lamports: 1,
                    destination: Pubkey::new_unique(),
                }),
                ..Default::default()
            },
        )]);
        let e = eval_one(&StubChain::default(), &m, &wallet(5_000_000_000), &AllowLists::new());
        assert!(!e.allowed);
        assert_eq!(e.reason.as_deref(), Some("Not enough SOL"));
    }

    #[test]
    fn token_burn_override_changes_required_mint() {
        let guard_mint = Pubkey::new_unique();
        let burn_mint = Pubkey::new_unique();
        let m = machine(vec![group(
            "burn",
            GuardSet {
                token_burn: Some(TokenBurn {
                    amount: 1,
                    mint: guard_mint,
                }),
                ..Default::default()
            },
        )]);
        let mut w = wallet(0);
        w.tokens = Ok(vec![TokenHolding {
            mint: burn_mint,
            token_account: Pubkey::new_unique(),
            amount: 4,
            decimals: 0,
            token_program: crate::constants::SPL_TOKEN_ID,
        }]);

        let g = m.group("burn").unwrap();
        let mut config = multi_config();
        let e = evaluate_group(&StubChain::default(), &m, &w, &AllowLists::new(), &config, &g);
        assert_eq!(e.reason.as_deref(), Some("Not enough tokens to burn"));

        config.spl_token_burn = Some(SplTokenBurn {
            mint: burn_mint,
            amount: 2,
        });
        let e = evaluate_group(&StubChain::default(), &m, &w, &AllowLists::new(), &config, &g);
        assert!(e.allowed);
        assert_eq!(e.max_amount, 2);
    }

    #[test]
    fn nft_gate_requires_collection() {
        let collection = Pubkey::new_unique();
        let m = machine(vec![group(
            "holders",
            GuardSet {
                nft_gate: Some(NftGate {
                    required_collection: collection,
                }),
                ..Default::default()
            },
        )]);
        let mut w = wallet(0);
        assert!(!eval_one(&StubChain::default(), &m, &w, &AllowLists::new()).allowed);

        w.nfts = Ok(vec![OwnedNft {
            mint: Pubkey::new_unique(),
            token_account: Pubkey::new_unique(),
            collection: Some(collection),
        }]);
        assert!(eval_one(&StubChain::default(), &m, &w, &AllowLists::new()).allowed);
    }

    #[test]
    fn unsupported_guards_block() {
        let m = machine(vec![group(
            "gk",
            GuardSet {
                gatekeeper: Some(Gatekeeper {
                    gatekeeper_network: Pubkey::new_unique(),
                    expire_on_use: false,
                }),
                ..Default::default()
            },
        )]);
        let e = eval_one(&StubChain::default(), &m, &wallet(0), &AllowLists::new());
        assert!(!e.allowed);
    }

    #[test]
    fn sold_out_blocks_every_group() {
        let mut m = machine(vec![group("public", GuardSet::default())]);
        m.machine.items_redeemed = m.machine.data.items_available;
        let list = evaluate_groups(&StubChain::default(), &m, &wallet(0), &AllowLists::new(), &multi_config());
        assert!(list.iter().all(|e| !e.allowed && e.reason.as_deref() == Some("Sold out")));
        assert!(choose_group(&list).is_none());
    }

    #[test]
    fn single_mint_caps_to_one() {
        let m = machine(vec![group("public", GuardSet::default())]);
        let g = m.group("public").unwrap();
        let config = MintConfig::new(Pubkey::new_unique());
        let e = evaluate_group(&StubChain::default(), &m, &wallet(0), &AllowLists::new(), &config, &g);
        assert_eq!(e.max_amount, 1);
    }

    #[test]
    fn default_used_only_without_groups() {
        let m = machine(vec![]);
        let list = evaluate_groups(&StubChain::default(), &m, &wallet(0), &AllowLists::new(), &multi_config());
        assert_eq!(choose_group(&list).unwrap().label, "default");

        let m = machine(vec![group("public", GuardSet::default())]);
        let list = evaluate_groups(&StubChain::default(), &m, &wallet(0), &AllowLists::new(), &multi_config());
        assert_eq!(visible_groups(&list).len(), 1);
        assert_eq!(choose_group(&list).unwrap().label, "public");
    }

    #[test]
    fn duplicate_labels_keep_first() {
        let mk = |label: &str, allowed| GuardEligibility {
            label: label.into(),
            allowed,
            reason: None,
            max_amount: 1,
            minting: false,
            loading_text: None,
        };
        let list = vec![mk("default", true), mk("WL", false), mk("WL", true), mk("pub", true)];
        assert_eq!(visible_groups(&list).len(), 2);
        assert_eq!(choose_group(&list).unwrap().label, "pub");
    }

    #[test]
    fn evaluation_is_repeatable() {
        let m = machine(vec![
            group(
                "WL",
                GuardSet {
                    mint_limit: Some(MintLimit { id: 0, limit: 1 }),
                    ..Default::default()
                },
            ),
            group("public", GuardSet::default()),
        ]);
        let w = wallet(1_000);
        let lists = AllowLists::new();
        let chain = StubChain::default();
        let first = evaluate_groups(&chain, &m, &w, &lists, &multi_config());
        let second = evaluate_groups(&chain, &m, &w, &lists, &multi_config());
        assert_eq!(first, second);
    }
}
