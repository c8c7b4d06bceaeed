use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DrawId, UserId};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WinnerRecord {
    pub draw_id: DrawId,
    pub draw_name: String,
    pub timestamp: DateTime<Utc>,
    pub winner_id: UserId,
    pub reward: String,
    pub total_entries: u64,
    pub winner_entries: u64,
}

impl WinnerRecord {
    /// Winner's odds as a fraction in `[0, 1]`.
    pub fn odds(&self) -> f64 {
        if self.total_entries == 0 {
            return 0.0;
        }
        self.winner_entries as f64 / self.total_entries as f64
    }
}
