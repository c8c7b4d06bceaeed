use anchor_lang::prelude::*;

use crate::{
    error::DrawError,
    state::{Document, DonorTier, Recipient},
};

pub fn add_currency(document: &mut Document, symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_uppercase();
    require!(
        !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphanumeric()),
        DrawError::InvalidCommand
    );
    require!(
        !document.config.accepts_currency(&symbol),
        DrawError::CurrencyAlreadyAccepted
    );
    document.config.accepted_currencies.push(symbol.clone());
    Ok(symbol)
}

pub fn remove_currency(document: &mut Document, symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_uppercase();
    let before = document.config.accepted_currencies.len();
    document
        .config
        .accepted_currencies
        .retain(|accepted| !accepted.eq_ignore_ascii_case(&symbol));
    require!(
        document.config.accepted_currencies.len() < before,
        DrawError::CurrencyNotAccepted
    );
    Ok(symbol)
}

pub fn add_recipient(document: &mut Document, recipient: Recipient) -> Result<()> {
    require!(
        !document.config.allowed_recipients.contains(&recipient),
        DrawError::RecipientAlreadyAllowed
    );
    document.config.allowed_recipients.push(recipient);
    Ok(())
}

pub fn remove_recipient(document: &mut Document, recipient: Recipient) -> Result<()> {
    let before = document.config.allowed_recipients.len();
    document
        .config
        .allowed_recipients
        .retain(|allowed| *allowed != recipient);
    require!(
        document.config.allowed_recipients.len() < before,
        DrawError::RecipientNotAllowed
    );
    Ok(())
}

/// Adds a donor tier. Names are unique (case-insensitive) and bounds must be
/// ordered; overlapping ranges are allowed and resolved highest minimum first.
pub fn add_tier(document: &mut Document, tier: DonorTier) -> Result<()> {
    require!(
        !tier.name.trim().is_empty()
            && tier.min_amount.is_finite()
            && tier.min_amount >= 0.0
            && tier.max_amount.map_or(true, |max| max >= tier.min_amount),
        DrawError::InvalidTier
    );
    require!(
        !document
            .config
            .tiers
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(&tier.name)),
        DrawError::InvalidTier
    );
    document.config.tiers.push(tier);
    Ok(())
}

pub fn remove_tier(document: &mut Document, name: &str) -> Result<DonorTier> {
    let index = document
        .config
        .tiers
        .iter()
        .position(|tier| tier.name.eq_ignore_ascii_case(name))
        .ok_or(DrawError::TierNotFound)?;
    Ok(document.config.tiers.remove(index))
}

/// Guild-level settings changed through the `config` command
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConfigSetting {
    AdminRole(Option<u64>),
    VipRole(Option<u64>),
    AnnouncementChannel(Option<u64>),
    LogChannel(Option<u64>),
    AutoEntries(bool),
    RoleRewards(bool),
    MultiDrawFallback(bool),
}

pub fn apply_setting(document: &mut Document, setting: ConfigSetting) {
    let config = &mut document.config;
    match setting {
        ConfigSetting::AdminRole(role_id) => config.admin_role_id = role_id,
        ConfigSetting::VipRole(role_id) => config.vip_role_id = role_id,
        ConfigSetting::AnnouncementChannel(channel_id) => {
            config.announcement_channel_id = channel_id
        }
        ConfigSetting::LogChannel(channel_id) => config.log_channel_id = channel_id,
        ConfigSetting::AutoEntries(enabled) => config.features.auto_entries = enabled,
        ConfigSetting::RoleRewards(enabled) => config.features.role_rewards = enabled,
        ConfigSetting::MultiDrawFallback(enabled) => {
            config.features.multi_draw_fallback = enabled
        }
    }
}
