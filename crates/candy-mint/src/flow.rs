//! The mint lifecycle: a pure phase machine plus the orchestration that drives it.

use serde::Serialize;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::VersionedTransaction,
};
use tracing::{debug, info, warn};

use crate::builder::{compile, MintBatch, MintBuilder};
use crate::chain::{ChainClient, SignatureState};
use crate::config::MintConfig;
use crate::eligibility::{choose_group, effective_guards, evaluate_groups, visible_groups, GuardEligibility};
use crate::error::{MintError, Result};
use crate::instructions::{compute_unit_price, route_allow_list_proof, MintArgs};
use crate::machine::{LoadedMachine, WalletContext};
use crate::merkle::Node;
use crate::metadata::{load_minted_assets, MetadataFetcher, MintedAsset};
use crate::notify::{notify_best_effort, Notifier};
use crate::pdas::allow_list_proof_pda;
use crate::settings::AllowLists;
use crate::state::GuardGroup;
use crate::submit::{confirm_sent, poll_confirmations, send_all, FailedMint};

// ---------------------------------------------------------------------------
// Phase machine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MintPhase {
    Idle,
    CheckingEligibility,
    BuildingProof,
    SubmittingProof,
    ConfirmingProof,
    BuildingTransactions,
    AwaitingSignature,
    Submitting,
    Confirming,
    LoadingMetadata,
    Done,
    Failed,
}

impl MintPhase {
    /// Status line shown while the phase is active.
    pub fn describe(&self) -> &'static str {
        match self {
            MintPhase::Idle => "Ready",
            MintPhase::CheckingEligibility => "Checking eligibility...",
            MintPhase::BuildingProof => "Building allow list proof...",
            MintPhase::SubmittingProof => "Sending allow list proof...",
            MintPhase::ConfirmingProof => "Confirming allow list proof...",
            MintPhase::BuildingTransactions => "Building transactions...",
            MintPhase::AwaitingSignature => "Waiting for approval",
            MintPhase::Submitting => "Sending transactions...",
            MintPhase::Confirming => "Confirming transactions...",
            MintPhase::LoadingMetadata => "Fetching your NFTs...",
            MintPhase::Done => "Mint complete",
            MintPhase::Failed => "Mint failed",
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self, MintPhase::Idle | MintPhase::Done | MintPhase::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MintEvent {
    Start,
    Eligible { proof_needed: bool },
    ProofBuilt,
    ProofSent,
    ProofConfirmed,
    TransactionsBuilt,
    Signed,
    Sent,
    Confirmed { count: usize },
    MetadataLoaded,
    Fail(String),
    Reset,
}

/// What the driver should do after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    CheckEligibility,
    BuildProof,
    SendProof,
    AwaitProof,
    BuildTransactions,
    RequestSignature,
    SendTransactions,
    PollConfirmations,
    FetchMetadata,
    Finish,
    ReportError(String),
    RefreshEligibility,
}

/// Pure transition function. Events that make no sense for the current
/// phase leave it unchanged with `Effect::None`.
pub fn transition(phase: MintPhase, event: &MintEvent) -> (MintPhase, Effect) {
    use MintEvent as E;
    use MintPhase as P;

    match (phase, event) {
        (P::Idle, E::Start) => (P::CheckingEligibility, Effect::CheckEligibility),
        (P::CheckingEligibility, E::Eligible { proof_needed: true }) => {
            (P::BuildingProof, Effect::BuildProof)
        }
        (P::CheckingEligibility, E::Eligible { proof_needed: false }) => {
            (P::BuildingTransactions, Effect::BuildTransactions)
        }
        (P::BuildingProof, E::ProofBuilt) => (P::SubmittingProof, Effect::SendProof),
        (P::SubmittingProof, E::ProofSent) => (P::ConfirmingProof, Effect::AwaitProof),
        (P::ConfirmingProof, E::ProofConfirmed) => (P::BuildingTransactions, Effect::BuildTransactions),
        (P::BuildingTransactions, E::TransactionsBuilt) => {
            (P::AwaitingSignature, Effect::RequestSignature)
        }
        (P::AwaitingSignature, E::Signed) => (P::Submitting, Effect::SendTransactions),
        (P::Submitting, E::Sent) => (P::Confirming, Effect::PollConfirmations),
        (P::Confirming, E::Confirmed { count }) if *count > 0 => {
            (P::LoadingMetadata, Effect::FetchMetadata)
        }
        (P::Confirming, E::Confirmed { .. }) => (
            P::Failed,
            Effect::ReportError("no mint transaction was confirmed".into()),
        ),
        (P::LoadingMetadata, E::MetadataLoaded) => (P::Done, Effect::Finish),
        (P::Done | P::Failed, E::Reset) => (P::Idle, Effect::RefreshEligibility),
        (p, E::Fail(reason)) if p.is_busy() => (P::Failed, Effect::ReportError(reason.clone())),
        (p, _) => (p, Effect::None),
    }
}

/// Holds the current phase and every phase entered so far.
#[derive(Clone, Debug)]
pub struct MintFlow {
    phase: MintPhase,
    history: Vec<MintPhase>,
}

impl Default for MintFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl MintFlow {
    pub fn new() -> Self {
        Self {
            phase: MintPhase::Idle,
            history: vec![MintPhase::Idle],
        }
    }

    pub fn phase(&self) -> MintPhase {
        self.phase
    }

    pub fn history(&self) -> &[MintPhase] {
        &self.history
    }

    pub fn apply(&mut self, event: MintEvent) -> Effect {
        let (next, effect) = transition(self.phase, &event);
        if next == self.phase {
            if effect == Effect::None {
                debug!("ignored {:?} in {:?}", event, self.phase);
            }
        } else {
            debug!("{:?} -> {:?} on {:?}", self.phase, next, event);
            self.history.push(next);
            self.phase = next;
        }
        if let Effect::ReportError(reason) = &effect {
            warn!("mint failed: {}", reason);
        }
        effect
    }

    fn fail(&mut self, err: &MintError) {
        self.apply(MintEvent::Fail(err.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Transactions built for one group and held until the user approves them.
pub struct PreparedMint {
    pub eligibility: GuardEligibility,
    pub batch: MintBatch,
    pub proof_signature: Option<Signature>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MintReport {
    #[serde(serialize_with = "crate::flow::as_string")]
    pub candy_machine: Pubkey,
    #[serde(serialize_with = "crate::flow::as_string")]
    pub wallet: Pubkey,
    pub label: String,
    pub minted: Vec<MintedAsset>,
    #[serde(skip)]
    pub failed: Vec<FailedMint>,
}

fn as_string<S: serde::Serializer>(key: &Pubkey, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&key.to_string())
}

/// Borrowed view of everything a mint needs from the loaded session.
pub struct MintSession<'a, C: ChainClient + ?Sized> {
    pub chain: &'a C,
    pub config: &'a MintConfig,
    pub machine: &'a LoadedMachine,
    pub allow_lists: &'a AllowLists,
}

impl<'a, C: ChainClient + ?Sized> MintSession<'a, C> {
    pub fn new(
        chain: &'a C,
        config: &'a MintConfig,
        machine: &'a LoadedMachine,
        allow_lists: &'a AllowLists,
    ) -> Self {
        Self {
            chain,
            config,
            machine,
            allow_lists,
        }
    }

    pub fn evaluate(&self, wallet: &WalletContext) -> Vec<GuardEligibility> {
        evaluate_groups(self.chain, self.machine, wallet, self.allow_lists, self.config)
    }

    fn select(&self, wallet: &WalletContext, label: Option<&str>, quantity: u64) -> Result<GuardEligibility> {
        let list = self.evaluate(wallet);
        let chosen = match label {
            Some(label) => visible_groups(&list)
                .into_iter()
                .find(|g| g.label == label)
                .ok_or_else(|| MintError::NotEligible {
                    label: label.to_string(),
                    reason: "no such group".into(),
                })?,
            None => choose_group(&list).ok_or(MintError::NoEligibleGroup)?,
        };
        if !chosen.allowed {
            return Err(MintError::NotEligible {
                label: chosen.label.clone(),
                reason: chosen.reason.clone().unwrap_or_default(),
            });
        }
        if quantity > chosen.max_amount {
            return Err(MintError::NotEligible {
                label: chosen.label.clone(),
                reason: format!("can mint at most {} right now", chosen.max_amount),
            });
        }
        Ok(chosen.clone())
    }

    /// Merkle proof for `payer`, or `None` when the group has no allow list
    /// or the proof account already exists.
    fn pending_proof(&self, group: &GuardGroup, args: &MintArgs, payer: &Pubkey) -> Result<Option<Vec<Node>>> {
        let Some(allow_list) = &args.guards.allow_list else {
            return Ok(None);
        };
        let not_listed = || MintError::NotEligible {
            label: group.label.clone(),
            reason: "Wallet is not on the allow list".into(),
        };
        let tree = self.allow_lists.tree(&group.label).ok_or_else(not_listed)?;
        let proof = tree.proof(&payer.to_string()).ok_or_else(not_listed)?;

        let pda = allow_list_proof_pda(
            &allow_list.merkle_root,
            payer,
            &self.machine.guard_address,
            &self.machine.address,
        );
        if self.chain.get_account_data(&pda)?.is_some() {
            debug!("allow list proof {} already exists", pda);
            return Ok(None);
        }
        Ok(Some(proof))
    }

    /// Signed route transaction creating the allow-list proof account.
    fn proof_transaction(
        &self,
        group: &GuardGroup,
        merkle_root: &Node,
        proof: &[Node],
        payer: &dyn Signer,
    ) -> Result<(VersionedTransaction, u64)> {
        let payer_key = payer.pubkey();
        let (blockhash, last_valid) = self.chain.get_latest_blockhash()?;
        let ixs = [
            compute_unit_price(self.config.micro_lamports),
            route_allow_list_proof(
                self.machine,
                group.instruction_label(),
                merkle_root,
                proof,
                &payer_key,
            )?,
        ];
        let message = compile(&payer_key, &ixs, &[], blockhash)?;
        let signers: Vec<&dyn Signer> = vec![payer];
        let tx = VersionedTransaction::try_new(message, &signers)
            .map_err(|e| MintError::Signing(e.to_string()))?;
        Ok((tx, last_valid))
    }

    fn confirm_proof(&self, flow: &mut MintFlow, tx: VersionedTransaction, last_valid: u64) -> Result<Signature> {
        flow.apply(MintEvent::ProofBuilt);
        let signature = self.chain.send_transaction(&tx)?;
        info!("allow list proof sent: {}", signature);
        flow.apply(MintEvent::ProofSent);

        let states = poll_confirmations(self.chain, &[signature], last_valid, &self.config.confirm);
        match states.first() {
            Some(SignatureState::Confirmed) => {
                flow.apply(MintEvent::ProofConfirmed);
                Ok(signature)
            }
            Some(SignatureState::Failed(reason)) => {
                Err(MintError::ProofNotConfirmed(format!("{} ({})", signature, reason)))
            }
            _ => Err(MintError::ProofNotConfirmed(signature.to_string())),
        }
    }

    fn prepare_inner(
        &self,
        flow: &mut MintFlow,
        payer: &dyn Signer,
        wallet: &WalletContext,
        label: Option<&str>,
        quantity: u64,
    ) -> Result<PreparedMint> {
        let eligibility = self.select(wallet, label, quantity)?;
        let group = self
            .machine
            .group(&eligibility.label)
            .ok_or(MintError::NoEligibleGroup)?;
        let guards = effective_guards(&group.guards, self.config.spl_token_burn.as_ref());
        let owned = wallet.nfts.as_deref().unwrap_or(&[]);
        let args = MintArgs::resolve(&group, guards, owned)?;

        info!(
            "minting {} from group {} with guards [{}]",
            quantity,
            group.label,
            args.guards.enabled().join(", ")
        );

        let proof = self.pending_proof(&group, &args, &payer.pubkey())?;
        flow.apply(MintEvent::Eligible {
            proof_needed: proof.is_some(),
        });
        let proof_signature = match (proof, &args.guards.allow_list) {
            (Some(proof), Some(allow_list)) => {
                let (tx, last_valid) = self.proof_transaction(&group, &allow_list.merkle_root, &proof, payer)?;
                Some(self.confirm_proof(flow, tx, last_valid)?)
            }
            _ => None,
        };

        let builder = MintBuilder::new(self.chain, self.config, self.machine, payer.pubkey())?;
        let batch = builder.build(&eligibility.label, &args, quantity)?;
        flow.apply(MintEvent::TransactionsBuilt);

        Ok(PreparedMint {
            eligibility,
            batch,
            proof_signature,
        })
    }

    /// Runs eligibility, the allow-list proof when needed, and transaction
    /// building. Leaves `flow` in `AwaitingSignature` on success.
    pub fn prepare(
        &self,
        flow: &mut MintFlow,
        payer: &dyn Signer,
        wallet: &WalletContext,
        label: Option<&str>,
        quantity: u64,
    ) -> Result<PreparedMint> {
        flow.apply(MintEvent::Start);
        self.prepare_inner(flow, payer, wallet, label, quantity)
            .inspect_err(|e| flow.fail(e))
    }

    fn submit_inner<F: MetadataFetcher + ?Sized>(
        &self,
        flow: &mut MintFlow,
        prepared: PreparedMint,
        payer: &dyn Signer,
        fetcher: &F,
    ) -> Result<MintReport> {
        let signed = prepared
            .batch
            .mints
            .iter()
            .map(|m| Ok((m.mint_address(), m.sign(payer)?)))
            .collect::<Result<Vec<_>>>()?;
        flow.apply(MintEvent::Signed);

        let sent = send_all(self.chain, &signed);
        flow.apply(MintEvent::Sent);

        let outcome = confirm_sent(
            self.chain,
            sent,
            prepared.batch.last_valid_block_height,
            &self.config.confirm,
        );
        flow.apply(MintEvent::Confirmed {
            count: outcome.confirmed.len(),
        });
        if outcome.confirmed.is_empty() {
            return Err(MintError::NothingConfirmed {
                failed: outcome.failed.len(),
            });
        }

        let minted = load_minted_assets(self.chain, fetcher, &outcome.confirmed);
        flow.apply(MintEvent::MetadataLoaded);

        Ok(MintReport {
            candy_machine: self.machine.address,
            wallet: payer.pubkey(),
            label: prepared.eligibility.label,
            minted,
            failed: outcome.failed,
        })
    }

    /// Signs and sends an approved batch. Succeeds when at least one mint
    /// confirms; the notifier is told about the result without affecting it.
    pub fn submit<F: MetadataFetcher + ?Sized>(
        &self,
        flow: &mut MintFlow,
        prepared: PreparedMint,
        payer: &dyn Signer,
        fetcher: &F,
        notifier: Option<&dyn Notifier>,
    ) -> Result<MintReport> {
        match self.submit_inner(flow, prepared, payer, fetcher) {
            Ok(report) => {
                info!(
                    "minted {} NFT(s) from group {} ({} failed)",
                    report.minted.len(),
                    report.label,
                    report.failed.len()
                );
                notify_best_effort(notifier, &report);
                Ok(report)
            }
            Err(e) => {
                if flow.phase() != MintPhase::Failed {
                    flow.fail(&e);
                }
                Err(e)
            }
        }
    }

    /// Drops a prepared batch the user declined.
    pub fn cancel(&self, flow: &mut MintFlow, prepared: PreparedMint) {
        info!(
            "discarded {} unsigned transaction(s) for group {}",
            prepared.batch.mints.len(),
            prepared.eligibility.label
        );
        flow.apply(MintEvent::Fail("cancelled".into()));
    }
}
