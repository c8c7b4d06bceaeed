use anchor_lang::prelude::*;

use crate::state::Document;

/// Event emitted when every donor total and entry is wiped
#[event]
pub struct LeaderboardReset {
    /// Users whose totals were zeroed
    pub users: u64,
    /// Entries removed across all draws
    pub cleared_entries: u64,
}

/// Zeroes every lifetime total and clears every draw's entries.
///
/// Draw definitions, win counts and history survive. The store layer takes
/// a backup before this runs.
pub fn reset_leaderboard(document: &mut Document) -> Result<u64> {
    let cleared_entries: u64 = document.draws.values().map(|draw| draw.total_entries()).sum();
    for draw in document.draws.values_mut() {
        draw.entries.clear();
    }
    for user in document.users.values_mut() {
        user.total_donated = 0.0;
        user.entries.clear();
    }

    msg!(
        "leaderboard reset for {} users, {} entries cleared",
        document.users.len(),
        cleared_entries
    );
    emit!(LeaderboardReset {
        users: document.users.len() as u64,
        cleared_entries,
    });

    Ok(cleared_entries)
}
