use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{MICRO_USD_PER_USD, UNBOUNDED_MAX_AMOUNT};

pub type DrawId = String;
pub type UserId = u64;

/// A single raffle and the entries accumulated for it.
///
/// `entries` never holds a zero count and its sum never exceeds `max_entries`.
/// Every count here is mirrored in the owning user's `UserAccount::entries`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Draw {
    #[serde(default)]
    pub id: DrawId,
    #[serde(default)]
    pub name: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub max_entries: u64,
    #[serde(default)]
    pub entries: BTreeMap<UserId, u64>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub manual_entries_only: bool,
    #[serde(default)]
    pub vip_only: bool,
    #[serde(default)]
    pub reward: String,
    #[serde(default)]
    pub draw_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub draw_time_formatted: Option<String>,
    #[serde(default)]
    pub notification_sent: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Draw {
    pub fn total_entries(&self) -> u64 {
        self.entries.values().sum()
    }

    pub fn available_entries(&self) -> u64 {
        self.max_entries.saturating_sub(self.total_entries())
    }

    pub fn participants(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_amount(&self, usd_amount: f64) -> bool {
        usd_amount >= self.min_amount && usd_amount <= self.max_amount
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_amount >= UNBOUNDED_MAX_AMOUNT
    }

    /// Entries a donation of `usd_amount` is worth before any capacity clamp:
    /// `floor(usd_amount / min_amount)`, computed on whole micro-dollars so
    /// that `0.6 / 0.2` is exactly 3.
    pub fn entries_for(&self, usd_amount: f64) -> u64 {
        if !usd_amount.is_finite() || usd_amount <= 0.0 {
            return 0;
        }
        let per_entry = micro_usd(self.min_amount);
        if per_entry == 0 {
            return 0;
        }
        u64::try_from(micro_usd(usd_amount) / per_entry).unwrap_or(u64::MAX)
    }

    pub fn set_draw_time(&mut self, draw_time: Option<DateTime<Utc>>) {
        self.draw_time_formatted = draw_time.map(format_draw_time);
        self.draw_time = draw_time;
        self.notification_sent = false;
    }
}

// Saturates for out-of-range input; NaN and negatives become 0
fn micro_usd(usd_amount: f64) -> u128 {
    (usd_amount * MICRO_USD_PER_USD).round() as u128
}

pub fn format_draw_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Normalizes a draw id or tag (`#Big` -> `big`).
pub fn normalize_draw_id(raw: &str) -> DrawId {
    raw.trim().trim_start_matches('#').to_lowercase()
}
