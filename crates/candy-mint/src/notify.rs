use serde::Serialize;
use tracing::{info, warn};

use crate::error::{MintError, Result};
use crate::flow::MintReport;

pub trait Notifier {
    fn notify(&self, report: &MintReport) -> Result<()>;
}

#[derive(Serialize)]
struct MintedItem<'a> {
    mint: &'a str,
    signature: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    candy_machine: String,
    wallet: String,
    group: &'a str,
    minted: Vec<MintedItem<'a>>,
    failed: usize,
}

pub fn payload(report: &MintReport) -> serde_json::Value {
    let body = WebhookPayload {
        event: "mint",
        candy_machine: report.candy_machine.to_string(),
        wallet: report.wallet.to_string(),
        group: &report.label,
        minted: report
            .minted
            .iter()
            .map(|a| MintedItem {
                mint: &a.mint,
                signature: &a.signature,
                name: Some(a.display_name()),
                image: a.off_chain_metadata.as_ref().and_then(|m| m.image.as_deref()),
            })
            .collect(),
        failed: report.failed.len(),
    };
    serde_json::to_value(body).unwrap_or_default()
}

/// POSTs the mint report as JSON.
pub struct WebhookNotifier {
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, report: &MintReport) -> Result<()> {
        let body = payload(report).to_string();
        ureq::post(self.url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(|e| MintError::Notify(e.to_string()))?;
        info!("webhook notified ({} minted)", report.minted.len());
        Ok(())
    }
}

/// Failures are logged and otherwise ignored.
pub fn notify_best_effort(notifier: Option<&dyn Notifier>, report: &MintReport) {
    if let Some(n) = notifier {
        if let Err(e) = n.notify(report) {
            warn!("{}", e);
        }
    }
}
