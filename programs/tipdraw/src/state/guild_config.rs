use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ACCEPTED_CURRENCIES;

/// Who a tip must be sent to for it to count as a donation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    User(u64),
    Role(u64),
}

impl Recipient {
    /// True when a confirmation mentioning these users and roles reaches this recipient.
    pub fn is_reached_by(&self, user_ids: &[u64], role_ids: &[u64]) -> bool {
        match self {
            Recipient::User(id) => user_ids.contains(id),
            Recipient::Role(id) => role_ids.contains(id),
        }
    }
}

/// A donor rank bound to a Discord role. `max_amount: None` is open-ended.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DonorTier {
    pub name: String,
    pub role_id: u64,
    pub min_amount: f64,
    #[serde(default)]
    pub max_amount: Option<f64>,
}

impl DonorTier {
    pub fn contains(&self, total: f64) -> bool {
        total >= self.min_amount && self.max_amount.map_or(true, |max| total <= max)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggles {
    #[serde(default = "enabled")]
    pub auto_entries: bool,
    #[serde(default = "enabled")]
    pub role_rewards: bool,
    // Untagged donations enter every eligible draw instead of the cheapest one
    #[serde(default)]
    pub multi_draw_fallback: bool,
}

fn enabled() -> bool {
    true
}

impl Default for FeatureToggles {
    fn default() -> Self {
        FeatureToggles {
            auto_entries: true,
            role_rewards: true,
            multi_draw_fallback: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuildConfig {
    #[serde(default = "default_currencies")]
    pub accepted_currencies: Vec<String>,
    #[serde(default)]
    pub allowed_recipients: Vec<Recipient>,
    #[serde(default)]
    pub admin_role_id: Option<u64>,
    #[serde(default)]
    pub vip_role_id: Option<u64>,
    #[serde(default)]
    pub announcement_channel_id: Option<u64>,
    #[serde(default)]
    pub log_channel_id: Option<u64>,
    #[serde(default)]
    pub tiers: Vec<DonorTier>,
    #[serde(default)]
    pub features: FeatureToggles,
}

fn default_currencies() -> Vec<String> {
    DEFAULT_ACCEPTED_CURRENCIES
        .iter()
        .map(|symbol| symbol.to_string())
        .collect()
}

impl Default for GuildConfig {
    fn default() -> Self {
        GuildConfig {
            accepted_currencies: default_currencies(),
            allowed_recipients: Vec::new(),
            admin_role_id: None,
            vip_role_id: None,
            announcement_channel_id: None,
            log_channel_id: None,
            tiers: Vec::new(),
            features: FeatureToggles::default(),
        }
    }
}

impl GuildConfig {
    pub fn accepts_currency(&self, symbol: &str) -> bool {
        self.accepted_currencies
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(symbol))
    }

    pub fn is_donation_recipient(&self, user_ids: &[u64], role_ids: &[u64]) -> bool {
        self.allowed_recipients
            .iter()
            .any(|recipient| recipient.is_reached_by(user_ids, role_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_serializes_as_tagged_variant() {
        let json = serde_json::to_string(&Recipient::Role(42)).unwrap();
        assert_eq!(json, r#"{"type":"role","id":42}"#);
        let back: Recipient = serde_json::from_str(r#"{"type":"user","id":7}"#).unwrap();
        assert_eq!(back, Recipient::User(7));
    }

    #[test]
    fn donation_recipient_matches_users_or_roles() {
        let config = GuildConfig {
            allowed_recipients: vec![Recipient::User(1), Recipient::Role(9)],
            ..GuildConfig::default()
        };
        assert!(config.is_donation_recipient(&[1], &[]));
        assert!(config.is_donation_recipient(&[5], &[9]));
        assert!(!config.is_donation_recipient(&[9], &[1]));
    }

    #[test]
    fn currency_check_ignores_case() {
        let config = GuildConfig::default();
        assert!(config.accepts_currency("btc"));
        assert!(!config.accepts_currency("XMR"));
    }
}
