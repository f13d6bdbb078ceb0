//! Parallel broadcast and bounded confirmation polling.

use rayon::prelude::*;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, SignatureState};
use crate::config::ConfirmPolicy;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedMint {
    pub mint: Pubkey,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedMint {
    pub mint: Pubkey,
    pub signature: Option<Signature>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub confirmed: Vec<ConfirmedMint>,
    pub failed: Vec<FailedMint>,
}

/// Sends every transaction concurrently. Each entry is `(mint, result)`.
pub fn send_all<C: ChainClient + ?Sized>(
    chain: &C,
    transactions: &[(Pubkey, VersionedTransaction)],
) -> Vec<(Pubkey, Result<Signature, String>)> {
    transactions
        .par_iter()
        .map(|(mint, tx)| {
            let result = chain.send_transaction(tx).map_err(|e| e.to_string());
            match &result {
                Ok(sig) => debug!("sent {} for mint {}", sig, mint),
                Err(e) => warn!("send failed for mint {}: {}", mint, e),
            }
            (*mint, result)
        })
        .collect()
}

/// Polls until every signature settles, the attempts run out, or the chain
/// passes `last_valid_block_height`. Unsettled signatures come back `Pending`.
pub fn poll_confirmations<C: ChainClient + ?Sized>(
    chain: &C,
    signatures: &[Signature],
    last_valid_block_height: u64,
    policy: &ConfirmPolicy,
) -> Vec<SignatureState> {
    let mut states = vec![SignatureState::Pending; signatures.len()];

    for attempt in 0..policy.attempts {
        let pending: Vec<usize> = (0..signatures.len())
            .filter(|i| states[*i] == SignatureState::Pending)
            .collect();
        if pending.is_empty() {
            break;
        }

        let batch: Vec<Signature> = pending.iter().map(|i| signatures[*i]).collect();
        match chain.get_signature_states(&batch) {
            Ok(found) => {
                for (i, state) in pending.iter().zip(found) {
                    states[*i] = state;
                }
            }
            Err(e) => warn!("signature status lookup failed: {}", e),
        }
        if states.iter().all(|s| *s != SignatureState::Pending) {
            break;
        }

        match chain.get_block_height() {
            Ok(height) if height > last_valid_block_height => {
                warn!(
                    "blockhash expired at height {} (valid until {})",
                    height, last_valid_block_height
                );
                break;
            }
            Ok(_) => {}
            Err(e) => debug!("block height lookup failed: {}", e),
        }

        if attempt + 1 < policy.attempts && !policy.interval.is_zero() {
            std::thread::sleep(policy.interval);
        }
    }
    states
}

/// Polls the sent signatures and sorts every mint into confirmed or failed.
pub fn confirm_sent<C: ChainClient + ?Sized>(
    chain: &C,
    sent: Vec<(Pubkey, Result<Signature, String>)>,
    last_valid_block_height: u64,
    policy: &ConfirmPolicy,
) -> SubmitOutcome {
    let total = sent.len();
    let mut outcome = SubmitOutcome::default();
    let mut in_flight = Vec::new();

    for (mint, result) in sent {
        match result {
            Ok(signature) => in_flight.push((mint, signature)),
            Err(reason) => outcome.failed.push(FailedMint {
                mint,
                signature: None,
                reason,
            }),
        }
    }

    let signatures: Vec<Signature> = in_flight.iter().map(|(_, s)| *s).collect();
    let states = poll_confirmations(chain, &signatures, last_valid_block_height, policy);

    for ((mint, signature), state) in in_flight.into_iter().zip(states) {
        match state {
            SignatureState::Confirmed => outcome.confirmed.push(ConfirmedMint { mint, signature }),
            SignatureState::Failed(reason) => outcome.failed.push(FailedMint {
                mint,
                signature: Some(signature),
                reason,
            }),
            SignatureState::Pending => outcome.failed.push(FailedMint {
                mint,
                signature: Some(signature),
                reason: "not confirmed in time".into(),
            }),
        }
    }

    info!("{} of {} transaction(s) confirmed", outcome.confirmed.len(), total);
    outcome
}

pub fn send_and_confirm<C: ChainClient + ?Sized>(
    chain: &C,
    transactions: &[(Pubkey, VersionedTransaction)],
    last_valid_block_height: u64,
    policy: &ConfirmPolicy,
) -> SubmitOutcome {
    let sent = send_all(chain, transactions);
    confirm_sent(chain, sent, last_valid_block_height, policy)
}
