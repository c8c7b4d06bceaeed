use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DrawId, UserId};

/// Lifetime donation record for one donor.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub total_donated: f64,
    // Mirror of Draw::entries for this user
    #[serde(default)]
    pub entries: BTreeMap<DrawId, u64>,
    #[serde(default)]
    pub wins: u64,
    #[serde(default)]
    pub donation_count: u64,
}

impl UserAccount {
    pub fn total_entries(&self) -> u64 {
        self.entries.values().sum()
    }
}

/// One row of the donor leaderboard.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaderboardRow {
    pub user_id: UserId,
    pub username: String,
    pub total_donated: f64,
}
