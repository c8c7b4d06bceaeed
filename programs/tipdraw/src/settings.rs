use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anchor_lang::prelude::*;

use crate::error::DrawError;

/// Process-wide settings read once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub discord_token: String,
    pub data_dir: PathBuf,
    /// The third-party tipping bot whose confirmations are trusted
    pub tipbot_user_id: u64,
    pub command_prefix: String,
    pub scheduler_period: Duration,
    /// Upper bound on any single price lookup or role change
    pub external_timeout: Duration,
    /// `SYMBOL=price` pairs for the fixed price provider
    pub fixed_prices: Option<String>,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => Ok(value.trim().to_string()),
        None => {
            msg!("missing required setting {}", key);
            Err(DrawError::InvalidSettings.into())
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    raw.trim().parse().map_err(|_| {
        msg!("setting {} has malformed value {:?}", key, raw);
        DrawError::InvalidSettings.into()
    })
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let scheduler_secs: u64 = parsed(&lookup, "TIPDRAW_SCHEDULER_SECS", 60)?;
        let timeout_secs: u64 = parsed(&lookup, "TIPDRAW_EXTERNAL_TIMEOUT_SECS", 10)?;
        require_gt!(scheduler_secs, 0, DrawError::InvalidSettings);
        require_gt!(timeout_secs, 0, DrawError::InvalidSettings);

        Ok(Settings {
            discord_token: required(&lookup, "DISCORD_TOKEN")?,
            data_dir: lookup("TIPDRAW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            tipbot_user_id: required(&lookup, "TIPBOT_USER_ID")?
                .parse()
                .map_err(|_| {
                    msg!("TIPBOT_USER_ID must be a numeric user id");
                    DrawError::InvalidSettings
                })?,
            command_prefix: lookup("TIPDRAW_PREFIX")
                .filter(|prefix| !prefix.trim().is_empty())
                .unwrap_or_else(|| "!".to_string()),
            scheduler_period: Duration::from_secs(scheduler_secs),
            external_timeout: Duration::from_secs(timeout_secs),
            fixed_prices: lookup("TIPDRAW_FIXED_PRICES"),
        })
    }
}
