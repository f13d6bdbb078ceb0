use std::io;
use std::time::Instant;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::prelude::*;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use tracing::{info, warn};

use candy_mint::eligibility::{visible_groups, GuardEligibility};
use candy_mint::flow::{Effect, MintEvent};
use candy_mint::metadata::UreqFetcher;
use candy_mint::notify::{Notifier, WebhookNotifier};
use candy_mint::state::GuardSet;
use candy_mint::validate::validate_machine;
use candy_mint::{
    LoadedMachine, MintConfig, MintError, MintFlow, MintReport, MintSession, PreparedMint,
    RpcChain, Settings, WalletContext,
};

use crate::ui;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Form,
    Confirm,
    Result,
}

/// Work queued by a key handler and run after the next redraw, so the
/// loading text is on screen while the blocking call runs.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Prepare(u64),
    Submit,
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    pub chain: RpcChain,
    pub keypair: Keypair,
    pub config: MintConfig,
    pub settings: Settings,
    pub should_quit: bool,
    pub screen: Screen,
    pub message_log: Vec<String>,
    pub verbose: bool,

    // Chain state
    pub machine: Option<LoadedMachine>,
    pub wallet: Option<WalletContext>,
    pub groups: Vec<GuardEligibility>,
    pub warnings: Vec<String>,
    pub last_refresh: Option<Instant>,

    // Dashboard cursor
    pub group_cursor: usize,

    // Quantity form
    pub input_buf: String,

    // Mint in flight
    pub flow: MintFlow,
    pub job: Option<Job>,
    pub pending: Option<PreparedMint>,

    // Result screen state
    pub last_report: Option<MintReport>,
}

impl App {
    pub fn new(
        rpc_url: &str,
        keypair: Keypair,
        config: MintConfig,
        settings: Settings,
        verbose: bool,
    ) -> Self {
        let mut app = Self {
            chain: RpcChain::new(rpc_url),
            keypair,
            config,
            settings,
            should_quit: false,
            screen: Screen::Dashboard,
            message_log: Vec::new(),
            verbose,
            machine: None,
            wallet: None,
            groups: Vec::new(),
            warnings: Vec::new(),
            last_refresh: None,
            group_cursor: 0,
            input_buf: String::new(),
            flow: MintFlow::new(),
            job: None,
            pending: None,
            last_report: None,
        };
        app.push_log(format!("Wallet: {}", app.keypair.pubkey()));
        app.push_log(format!("Candy machine: {}", app.config.candy_machine));
        app.refresh();
        app
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if self.verbose {
            eprintln!("[INFO] {}", msg);
        }
        info!("{}", msg);
        self.message_log.push(msg);
        if self.message_log.len() > 100 {
            self.message_log.remove(0);
        }
    }

    pub fn run(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while !self.should_quit {
            terminal.draw(|frame| ui::draw(frame, self))?;

            if let Some(job) = self.job.take() {
                self.run_job(job);
                continue;
            }

            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    && key.code == KeyCode::Char('c')
                {
                    self.should_quit = true;
                    continue;
                }
                match self.screen {
                    Screen::Dashboard => self.handle_dashboard(key.code),
                    Screen::Form => self.handle_form(key.code),
                    Screen::Confirm => self.handle_confirm(key.code),
                    Screen::Result => self.handle_result(key.code),
                }
            }
        }
        Ok(())
    }

    fn run_job(&mut self, job: Job) {
        let result = match job {
            Job::Prepare(quantity) => self.prepare_mint(quantity),
            Job::Submit => self.submit_pending().map(|_| ()),
        };
        for g in &mut self.groups {
            g.finish_minting();
        }
        if let Err(e) = result {
            self.push_log(e);
        }
    }

    // -----------------------------------------------------------------------
    // Dashboard handler
    // -----------------------------------------------------------------------

    fn handle_dashboard(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Enter | KeyCode::Char('m') => self.enter_mint(),
            KeyCode::Up | KeyCode::Char('k') => {
                self.group_cursor = self.group_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.group_cursor + 1 < self.groups.len() {
                    self.group_cursor += 1;
                }
            }
            _ => {}
        }
    }

    pub fn selected_group(&self) -> Option<&GuardEligibility> {
        self.groups.get(self.group_cursor)
    }

    /// Effective guards of a group, for countdowns and prices.
    pub fn group_guards(&self, label: &str) -> Option<GuardSet> {
        self.machine
            .as_ref()
            .and_then(|m| m.group(label))
            .map(|g| g.guards)
    }

    pub fn select_group(&mut self, label: &str) -> bool {
        match self.groups.iter().position(|g| g.label == label) {
            Some(i) => {
                self.group_cursor = i;
                true
            }
            None => false,
        }
    }

    fn enter_mint(&mut self) {
        let Some(group) = self.selected_group() else {
            self.push_log("No guard group to mint from.");
            return;
        };
        if !group.allowed {
            let msg = format!(
                "Cannot mint from {}: {}",
                group.label,
                group.reason.clone().unwrap_or_default()
            );
            self.push_log(msg);
            return;
        }
        if self.config.multi_mint && group.max_amount > 1 {
            self.input_buf = "1".into();
            self.screen = Screen::Form;
        } else {
            self.queue(Job::Prepare(1));
        }
    }

    fn queue(&mut self, job: Job) {
        let text = match job {
            Job::Prepare(_) => "Preparing mint...",
            Job::Submit => "Minting...",
        };
        let cursor = self.group_cursor;
        if let Some(g) = self.groups.get_mut(cursor) {
            g.start_minting(text);
        }
        self.job = Some(job);
    }

    // -----------------------------------------------------------------------
    // Form handler
    // -----------------------------------------------------------------------

    fn handle_form(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => {
                self.screen = Screen::Dashboard;
                self.input_buf.clear();
            }
            KeyCode::Enter => {
                let max = self.selected_group().map_or(0, |g| g.max_amount);
                match parse_quantity(&self.input_buf, max) {
                    Some(quantity) => {
                        self.screen = Screen::Dashboard;
                        self.queue(Job::Prepare(quantity));
                    }
                    None => self.push_log(format!("Enter a quantity between 1 and {}", max)),
                }
            }
            KeyCode::Up | KeyCode::Char('+') => {
                let max = self.selected_group().map_or(0, |g| g.max_amount);
                let next = parse_quantity(&self.input_buf, max).map_or(1, |q| (q + 1).min(max));
                self.input_buf = next.to_string();
            }
            KeyCode::Down | KeyCode::Char('-') => {
                let max = self.selected_group().map_or(0, |g| g.max_amount);
                let next = parse_quantity(&self.input_buf, max).map_or(1, |q| q.saturating_sub(1).max(1));
                self.input_buf = next.to_string();
            }
            KeyCode::Backspace => {
                self.input_buf.pop();
            }
            KeyCode::Char(c) if c.is_ascii_digit() => {
                self.input_buf.push(c);
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Confirm handler
    // -----------------------------------------------------------------------

    fn handle_confirm(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.screen = Screen::Dashboard;
                self.queue(Job::Submit);
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                if let Some(prepared) = self.pending.take() {
                    if let Some(machine) = &self.machine {
                        let session = MintSession::new(
                            &self.chain,
                            &self.config,
                            machine,
                            &self.settings.allow_lists,
                        );
                        session.cancel(&mut self.flow, prepared);
                    }
                }
                self.screen = Screen::Dashboard;
                self.push_log("Mint cancelled.");
                self.settle();
            }
            _ => {}
        }
    }

    fn handle_result(&mut self, _key: KeyCode) {
        self.screen = Screen::Dashboard;
    }

    // -----------------------------------------------------------------------
    // Mint
    // -----------------------------------------------------------------------

    /// Checks eligibility, sends the allow-list proof if needed, and builds
    /// the mint transactions. On success the confirm screen is shown.
    pub fn prepare_mint(&mut self, quantity: u64) -> Result<(), String> {
        let label = self
            .selected_group()
            .map(|g| g.label.clone())
            .ok_or("No guard group selected")?;
        let (Some(machine), Some(wallet)) = (&self.machine, &self.wallet) else {
            return Err("Candy machine not loaded. Press [r] to refresh.".into());
        };

        let session = MintSession::new(&self.chain, &self.config, machine, &self.settings.allow_lists);
        let result = session.prepare(&mut self.flow, &self.keypair, wallet, Some(&label), quantity);

        match result {
            Ok(prepared) => {
                if let Some(sig) = &prepared.proof_signature {
                    self.push_log(format!("Allow list proof confirmed: {}", sig));
                }
                self.push_log(format!(
                    "Built {} transaction(s) for {} ({} CU each)",
                    prepared.batch.mints.len(),
                    label,
                    prepared.batch.compute_units
                ));
                self.pending = Some(prepared);
                self.screen = Screen::Confirm;
                Ok(())
            }
            Err(e) => {
                self.settle();
                Err(failure_message(&e))
            }
        }
    }

    /// Signs and sends the prepared batch, then loads the minted NFTs.
    pub fn submit_pending(&mut self) -> Result<MintReport, String> {
        let prepared = self.pending.take().ok_or("Nothing to send")?;
        let Some(machine) = &self.machine else {
            return Err("Candy machine not loaded".into());
        };
        let webhook = self.config.webhook_url.as_deref().map(WebhookNotifier::new);
        let notifier = webhook.as_ref().map(|w| w as &dyn Notifier);

        let session = MintSession::new(&self.chain, &self.config, machine, &self.settings.allow_lists);
        let result = session.submit(&mut self.flow, prepared, &self.keypair, &UreqFetcher, notifier);

        let outcome = match result {
            Ok(report) => {
                for asset in &report.minted {
                    self.push_log(format!("Minted {} ({})", asset.display_name(), asset.mint));
                }
                if !report.failed.is_empty() {
                    self.push_log(format!("{} transaction(s) did not confirm", report.failed.len()));
                }
                self.last_report = Some(report.clone());
                self.screen = Screen::Result;
                Ok(report)
            }
            Err(e) => Err(failure_message(&e)),
        };
        self.settle();
        outcome
    }

    /// Returns the flow to idle and reloads eligibility after any attempt.
    fn settle(&mut self) {
        if self.flow.apply(MintEvent::Reset) == Effect::RefreshEligibility {
            self.refresh();
        }
        self.flow = MintFlow::new();
    }

    // -----------------------------------------------------------------------
    // RPC: Refresh state
    // -----------------------------------------------------------------------

    pub fn refresh(&mut self) {
        self.push_log("Refreshing...");
        match LoadedMachine::fetch(&self.chain, &self.config.candy_machine) {
            Ok(machine) => {
                if self.machine.is_none() {
                    self.warnings = validate_machine(
                        &self.chain,
                        &machine,
                        &self.settings.allow_lists,
                        &self.config,
                    );
                    for w in self.warnings.clone() {
                        warn!("{}", w);
                        self.push_log(format!("Warning: {}", w));
                    }
                }
                self.machine = Some(machine);
            }
            Err(e) => self.push_log(format!("Failed to load candy machine: {}", e)),
        }
        self.refresh_eligibility();
        self.last_refresh = Some(Instant::now());
        self.push_log("Refresh complete.");
    }

    fn refresh_eligibility(&mut self) {
        let Some(machine) = &self.machine else {
            self.groups.clear();
            return;
        };
        let wallet = WalletContext::fetch(&self.chain, &self.keypair.pubkey());
        let session = MintSession::new(&self.chain, &self.config, machine, &self.settings.allow_lists);
        let all = session.evaluate(&wallet);
        self.groups = visible_groups(&all).into_iter().cloned().collect();
        self.wallet = Some(wallet);
        if self.group_cursor >= self.groups.len() {
            self.group_cursor = self.groups.len().saturating_sub(1);
        }
    }

    pub fn now(&self) -> i64 {
        self.wallet
            .as_ref()
            .map_or_else(candy_mint::machine::local_unix_time, |w| w.now)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Failures worth trying again are marked so the user knows to retry.
pub fn failure_message(err: &MintError) -> String {
    if err.is_transient() {
        format!("Mint failed: {} (retry)", err)
    } else {
        format!("Mint failed: {}", err)
    }
}

pub fn parse_quantity(s: &str, max: u64) -> Option<u64> {
    let q: u64 = s.trim().parse().ok()?;
    (1..=max).contains(&q).then_some(q)
}

pub fn short_pubkey(pubkey: &Pubkey) -> String {
    let s = pubkey.to_string();
    if s.len() > 12 {
        format!("{}..{}", &s[..4], &s[s.len() - 4..])
    } else {
        s
    }
}

pub fn lamports_to_sol(lamports: u64) -> String {
    let sol = lamports as f64 / 1_000_000_000.0;
    if sol == 0.0 {
        "0".to_string()
    } else if sol < 0.001 {
        format!("{:.9}", sol)
    } else {
        format!("{:.4}", sol)
    }
}

/// Mint price in SOL, with a marker when tokens are also charged.
pub fn price_label(guards: &GuardSet) -> String {
    let lamports = guards
        .sol_payment
        .as_ref()
        .map_or(0, |g| g.lamports)
        .saturating_add(guards.freeze_sol_payment.as_ref().map_or(0, |g| g.lamports));
    let tokens = guards.token_payment.is_some()
        || guards.freeze_token_payment.is_some()
        || guards.token2022_payment.is_some()
        || guards.token_burn.is_some();
    match (lamports, tokens) {
        (0, false) => "Free".into(),
        (0, true) => "Tokens".into(),
        (l, false) => format!("{} SOL", lamports_to_sol(l)),
        (l, true) => format!("{} SOL + tokens", lamports_to_sol(l)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candy_mint::state::{SolPayment, TokenBurn};

    #[test]
    fn quantity_must_be_in_range() {
        assert_eq!(parse_quantity("3", 5), Some(3));
        assert_eq!(parse_quantity("0", 5), None);
        assert_eq!(parse_quantity("6", 5), None);
        assert_eq!(parse_quantity("abc", 5), None);
    }

    #[test]
    fn transient_failures_suggest_retry() {
        let unconfirmed = MintError::NothingConfirmed { failed: 2 };
        assert_eq!(
            failure_message(&unconfirmed),
            "Mint failed: None of the 2 mint transactions were confirmed (retry)"
        );
        let config = MintError::NoEligibleGroup;
        assert!(!failure_message(&config).ends_with("(retry)"));
        assert!(failure_message(&config).starts_with("Mint failed: "));
    }

    #[test]
    fn price_label_combines_sol_and_tokens() {
        let mut guards = GuardSet::default();
        assert_eq!(price_label(&guards), "Free");
        guards.sol_payment = Some(SolPayment {
            lamports: 1_500_000_000,
            destination: Pubkey::new_unique(),
        });
        assert_eq!(price_label(&guards), "1.5000 SOL");
        guards.token_burn = Some(TokenBurn {
            amount: 1,
            mint: Pubkey::new_unique(),
        });
        assert_eq!(price_label(&guards), "1.5000 SOL + tokens");
    }
}
