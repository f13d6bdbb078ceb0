mod app;
mod ui;

use std::fs::OpenOptions;
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use serde::Serialize;
use solana_sdk::signature::{read_keypair_file, Keypair, Signer};
use tracing_subscriber::EnvFilter;

use candy_mint::eligibility::{choose_group, GuardEligibility};
use candy_mint::validate::{allow_list_roots, AllowListRoot};
use candy_mint::{MintConfig, MintReport, RawConfig, Settings};

const LOG_FILE: &str = "candy-mint.log";

#[derive(Parser)]
#[command(name = "candy-mint")]
#[command(about = "Mint NFTs from a Metaplex candy machine")]
struct Cli {
    /// Path to the keypair JSON file
    keypair: String,

    /// Solana cluster (localnet, devnet, mainnet-beta, or a custom RPC URL)
    #[arg(long, env = "RPC_URL", default_value = "mainnet-beta")]
    cluster: String,

    /// Candy machine address
    #[arg(long, env = "CANDY_MACHINE_ID")]
    candy_machine: Option<String>,

    /// Priority fee in micro-lamports per compute unit
    #[arg(long, env = "MICRO_LAMPORTS")]
    micro_lamports: Option<u64>,

    /// Address lookup table used to compress mint transactions
    #[arg(long, env = "LOOKUP_TABLE")]
    lookup_table: Option<String>,

    /// Mint burned by tokenBurn guards instead of the on-chain one
    #[arg(long, env = "SPL_TOKEN_MINT", requires = "spl_token_amount")]
    spl_token_mint: Option<String>,

    /// Amount burned with --spl-token-mint, in base units
    #[arg(long, env = "SPL_TOKEN_AMOUNT", requires = "spl_token_mint")]
    spl_token_amount: Option<String>,

    /// Allow minting more than one NFT per action
    #[arg(long, env = "MULTI_MINT")]
    multi_mint: bool,

    /// Upper bound on the quantity per action when multi-mint is on
    #[arg(long, env = "MAX_MINT_AMOUNT")]
    max_mint_amount: Option<u64>,

    /// Add a tip transfer to every mint transaction
    #[arg(long, env = "TIP")]
    tip: bool,

    /// Status polls before a transaction counts as unconfirmed
    #[arg(long, env = "CONFIRM_ATTEMPTS")]
    confirm_attempts: Option<u32>,

    /// URL that receives a JSON report after each successful mint
    #[arg(long, env = "WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Settings file with allow lists and group texts
    #[arg(long, env = "MINT_SETTINGS")]
    settings: Option<PathBuf>,

    /// Log filter for candy-mint.log (e.g. "info", "candy_mint=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print progress/debug info to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand)]
enum Action {
    /// Read-only eligibility dump
    Status,
    /// Merkle roots of the settings allow lists, checked against the guard groups
    Roots,
    /// Mint without the interactive UI
    Mint {
        /// Number of NFTs to mint
        #[arg(long, default_value = "1")]
        quantity: u64,
        /// Guard group label (defaults to the first eligible group)
        #[arg(long)]
        group: Option<String>,
    },
}

impl Cli {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            candy_machine: self.candy_machine.clone(),
            micro_lamports: self.micro_lamports,
            lookup_table: self.lookup_table.clone(),
            spl_token_mint: self.spl_token_mint.clone(),
            spl_token_amount: self.spl_token_amount.clone(),
            multi_mint: self.multi_mint,
            max_mint_amount: self.max_mint_amount,
            tip: self.tip,
            confirm_attempts: self.confirm_attempts,
            webhook_url: self.webhook_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON output types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(tag = "type")]
enum CliOutput {
    #[serde(rename = "success")]
    Success {
        action: String,
        signatures: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    #[serde(rename = "noop")]
    Noop { action: String, message: String },
    #[serde(rename = "error")]
    Error { action: String, error: String },
    #[serde(rename = "status")]
    Status(MachineStatus),
    #[serde(rename = "roots")]
    Roots { roots: Vec<AllowListRoot> },
}

#[derive(Serialize)]
struct MachineStatus {
    wallet: String,
    candy_machine: String,
    loaded: bool,
    items_available: u64,
    items_redeemed: u64,
    items_remaining: u64,
    groups: Vec<GuardEligibility>,
    warnings: Vec<String>,
}

fn print_output(output: &CliOutput) {
    match serde_json::to_string(output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

fn cluster_to_url(cluster: &str) -> &str {
    match cluster {
        "localnet" | "localhost" => "http://127.0.0.1:8899",
        "devnet" => "https://api.devnet.solana.com",
        "mainnet-beta" | "mainnet" => "https://api.mainnet-beta.solana.com",
        url => url,
    }
}

/// Logs go to a file so they never draw over the terminal UI.
fn setup_logging(level: Option<&str>) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .with_context(|| format!("cannot open {}", LOG_FILE))?;

    let filter = match level {
        Some(l) => EnvFilter::try_new(l).map_err(|_| {
            anyhow!(
                "Invalid log level: {:?}. Valid levels are: trace, debug, info, warn, error.",
                l
            )
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref())?;

    let rpc_url = cluster_to_url(&cli.cluster).to_string();
    let keypair = read_keypair_file(&cli.keypair)
        .map_err(|e| anyhow!("Failed to read keypair from {}: {}", cli.keypair, e))?;
    let config = cli.raw_config().into_config()?;
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    tracing::info!(
        "candy-mint starting: cluster {} machine {}",
        rpc_url,
        config.candy_machine
    );

    match cli.action {
        Some(action) => {
            run_oneshot(&rpc_url, keypair, config, settings, cli.verbose, action);
            Ok(())
        }
        None => run_interactive(&rpc_url, keypair, config, settings).map_err(Into::into),
    }
}

fn run_interactive(
    rpc_url: &str,
    keypair: Keypair,
    config: MintConfig,
    settings: Settings,
) -> io::Result<()> {
    // Panic hook: always restore terminal.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = app::App::new(rpc_url, keypair, config, settings, false);
    let result = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    result
}

fn run_oneshot(
    rpc_url: &str,
    keypair: Keypair,
    config: MintConfig,
    settings: Settings,
    verbose: bool,
    action: Action,
) {
    let mut app = app::App::new(rpc_url, keypair, config, settings, verbose);

    match action {
        Action::Status => print_output(&build_status_output(&app)),
        Action::Roots => match &app.machine {
            Some(machine) => print_output(&CliOutput::Roots {
                roots: allow_list_roots(machine, &app.settings.allow_lists),
            }),
            None => {
                print_output(&CliOutput::Error {
                    action: "roots".into(),
                    error: "Candy machine could not be loaded".into(),
                });
                std::process::exit(1);
            }
        },
        Action::Mint { quantity, group } => match run_mint(&mut app, quantity, group) {
            Ok(output) => print_output(&output),
            Err(error) => {
                print_output(&CliOutput::Error {
                    action: "mint".into(),
                    error,
                });
                std::process::exit(1);
            }
        },
    }
}

fn build_status_output(app: &app::App) -> CliOutput {
    let (loaded, available, redeemed, remaining) = match &app.machine {
        Some(m) => (
            true,
            m.machine.data.items_available,
            m.machine.items_redeemed,
            m.machine.items_remaining(),
        ),
        None => (false, 0, 0, 0),
    };
    CliOutput::Status(MachineStatus {
        wallet: app.keypair.pubkey().to_string(),
        candy_machine: app.config.candy_machine.to_string(),
        loaded,
        items_available: available,
        items_redeemed: redeemed,
        items_remaining: remaining,
        groups: app.groups.clone(),
        warnings: app.warnings.clone(),
    })
}

fn run_mint(app: &mut app::App, quantity: u64, group: Option<String>) -> Result<CliOutput, String> {
    if app.machine.is_none() {
        return Err("Candy machine could not be loaded".into());
    }

    let label = match group {
        Some(label) => {
            if !app.select_group(&label) {
                return Err(format!("Guard group {} not found", label));
            }
            label
        }
        None => match choose_group(&app.groups) {
            Some(g) => {
                let label = g.label.clone();
                app.select_group(&label);
                label
            }
            None => {
                let reason = app
                    .groups
                    .iter()
                    .find_map(|g| g.reason.clone())
                    .unwrap_or_else(|| "No eligible guard group".into());
                return Ok(CliOutput::Noop {
                    action: "mint".into(),
                    message: reason,
                });
            }
        },
    };

    if let Some(g) = app.selected_group().filter(|g| !g.allowed) {
        return Ok(CliOutput::Noop {
            action: "mint".into(),
            message: format!(
                "Group {} is not eligible: {}",
                label,
                g.reason.clone().unwrap_or_default()
            ),
        });
    }

    app.prepare_mint(quantity)?;
    let report = app.submit_pending()?;
    Ok(mint_output(&report))
}

fn mint_output(report: &MintReport) -> CliOutput {
    CliOutput::Success {
        action: "mint".into(),
        signatures: report.minted.iter().map(|a| a.signature.clone()).collect(),
        details: serde_json::to_value(report).ok(),
    }
}
