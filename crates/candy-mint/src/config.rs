use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use crate::constants::{
    CONFIRM_POLL_INTERVAL, DEFAULT_CONFIRM_ATTEMPTS, DEFAULT_MAX_MINT_AMOUNT,
    DEFAULT_MICRO_LAMPORTS,
};
use crate::error::{MintError, Result};

/// Secondary token burned with every mint, replacing the guard's own
/// token-burn arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplTokenBurn {
    pub mint: Pubkey,
    pub amount: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONFIRM_ATTEMPTS,
            interval: CONFIRM_POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintConfig {
    pub candy_machine: Pubkey,
    pub micro_lamports: u64,
    pub lookup_table: Option<Pubkey>,
    pub spl_token_burn: Option<SplTokenBurn>,
    pub multi_mint: bool,
    pub max_mint_amount: u64,
    pub tip: bool,
    pub confirm: ConfirmPolicy,
    pub webhook_url: Option<String>,
}

impl MintConfig {
    pub fn new(candy_machine: Pubkey) -> Self {
        Self {
            candy_machine,
            micro_lamports: DEFAULT_MICRO_LAMPORTS,
            lookup_table: None,
            spl_token_burn: None,
            multi_mint: false,
            max_mint_amount: DEFAULT_MAX_MINT_AMOUNT,
            tip: false,
            confirm: ConfirmPolicy::default(),
            webhook_url: None,
        }
    }

    /// Quantity ceiling per mint action.
    pub fn quantity_cap(&self) -> u64 {
        if self.multi_mint {
            self.max_mint_amount
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.multi_mint && self.max_mint_amount == 0 {
            return Err(MintError::Config("max mint amount must be at least 1".into()));
        }
        if let Some(burn) = &self.spl_token_burn {
            if burn.amount == 0 {
                return Err(MintError::Config("SPL token burn amount must be > 0".into()));
            }
        }
        if self.confirm.attempts == 0 {
            return Err(MintError::Config("confirm attempts must be > 0".into()));
        }
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(MintError::Config(format!("webhook url '{}' is not http(s)", url)));
            }
        }
        Ok(())
    }
}

/// String-valued settings as they arrive from flags or the environment.
#[derive(Clone, Debug, Default)]
pub struct RawConfig {
    pub candy_machine: Option<String>,
    pub micro_lamports: Option<u64>,
    pub lookup_table: Option<String>,
    pub spl_token_mint: Option<String>,
    pub spl_token_amount: Option<String>,
    pub multi_mint: bool,
    pub max_mint_amount: Option<u64>,
    pub tip: bool,
    pub confirm_attempts: Option<u32>,
    pub webhook_url: Option<String>,
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|_| MintError::Config(format!("invalid {}: {}", field, value)))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl RawConfig {
    pub fn into_config(self) -> Result<MintConfig> {
        let cm = non_empty(&self.candy_machine)
            .ok_or_else(|| MintError::Config("candy machine id is required".into()))?;
        let mut config = MintConfig::new(parse_pubkey("candy machine id", cm)?);

        if let Some(v) = self.micro_lamports {
            config.micro_lamports = v;
        }
        config.lookup_table = non_empty(&self.lookup_table)
            .map(|v| parse_pubkey("lookup table", v))
            .transpose()?;

        config.spl_token_burn = match (
            non_empty(&self.spl_token_mint),
            non_empty(&self.spl_token_amount),
        ) {
            (None, None) => None,
            (Some(mint), Some(amount)) => Some(SplTokenBurn {
                mint: parse_pubkey("SPL token mint", mint)?,
                amount: amount.parse().map_err(|_| {
                    MintError::Config(format!("invalid SPL token amount: {}", amount))
                })?,
            }),
            _ => {
                return Err(MintError::Config(
                    "SPL token mint and amount must be set together".into(),
                ))
            }
        };

        config.multi_mint = self.multi_mint;
        if let Some(v) = self.max_mint_amount {
            config.max_mint_amount = v;
        }
        config.tip = self.tip;
        if let Some(v) = self.confirm_attempts {
            config.confirm.attempts = v;
        }
        config.webhook_url = non_empty(&self.webhook_url).map(str::to_string);

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            candy_machine: Some(Pubkey::new_unique().to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let config = raw().into_config().unwrap();
        assert_eq!(config.micro_lamports, DEFAULT_MICRO_LAMPORTS);
        assert!(!config.tip);
        assert_eq!(config.quantity_cap(), 1);
        assert_eq!(config.confirm.attempts, DEFAULT_CONFIRM_ATTEMPTS);
    }

    #[test]
    fn missing_candy_machine() {
        let err = RawConfig::default().into_config().unwrap_err();
        assert!(matches!(err, MintError::Config(_)));
    }

    #[test]
    fn spl_burn_requires_both_fields() {
        let mut r = raw();
        r.spl_token_mint = Some(Pubkey::new_unique().to_string());
        assert!(matches!(r.into_config(), Err(MintError::Config(_))));
    }

    #[test]
    fn spl_burn_rejects_bad_values() {
        let mut r = raw();
        r.spl_token_mint = Some("not-a-key".into());
        r.spl_token_amount = Some("5".into());
        assert!(r.into_config().is_err());

        let mut r = raw();
        r.spl_token_mint = Some(Pubkey::new_unique().to_string());
        r.spl_token_amount = Some("0".into());
        assert!(r.into_config().is_err());

        let mut r = raw();
        r.spl_token_mint = Some(Pubkey::new_unique().to_string());
        r.spl_token_amount = Some("ten".into());
        assert!(r.into_config().is_err());
    }

    #[test]
    fn blank_env_values_are_unset() {
        let mut r = raw();
        r.lookup_table = Some("  ".into());
        r.spl_token_mint = Some(String::new());
        r.spl_token_amount = Some(String::new());
        let config = r.into_config().unwrap();
        assert!(config.lookup_table.is_none());
        assert!(config.spl_token_burn.is_none());
    }

    #[test]
    fn multi_mint_cap() {
        let mut r = raw();
        r.multi_mint = true;
        r.max_mint_amount = Some(4);
        assert_eq!(r.into_config().unwrap().quantity_cap(), 4);
    }
}
