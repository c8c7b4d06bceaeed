use anchor_lang::prelude::*;
use chrono::{DateTime, Utc};

use crate::{
    error::DrawError,
    randomness::{weighted_pick, EntropySource},
    state::{normalize_draw_id, Document, WinnerRecord},
};

/// Event emitted when a winner is picked for a draw
#[event]
pub struct WinnerSelected {
    /// The id of the draw
    pub draw_id: String,
    /// The winner
    pub winner_id: u64,
    /// Entries held by the winner
    pub winner_entries: u64,
    /// Entries held by everyone
    pub total_entries: u64,
}

/// Picks a winner with odds proportional to entries held.
///
/// Only active draws with at least one entry can be drawn. The result is
/// appended to the capped draw history and the winner's win count grows.
/// A pending schedule counts as fired and is cleared, but the draw stays
/// active and its entries stay in place: a redraw runs over the same pool
/// and may pick the same winner again.
///
/// # Errors
/// - `DrawNotFound` if the draw does not exist
/// - `DrawInactive` if the draw is not active
/// - `NoEntries` if nobody holds an entry
pub fn select_winner(
    document: &mut Document,
    draw_id: &str,
    source: &mut impl EntropySource,
    now: DateTime<Utc>,
) -> Result<WinnerRecord> {
    let id = normalize_draw_id(draw_id);
    let draw = document.draws.get_mut(&id).ok_or(DrawError::DrawNotFound)?;
    require!(draw.active, DrawError::DrawInactive);

    let pick = weighted_pick(&draw.entries, source)?;

    if draw.draw_time.is_some() {
        draw.set_draw_time(None);
    }

    let record = WinnerRecord {
        draw_id: id.clone(),
        draw_name: draw.name.clone(),
        timestamp: now,
        winner_id: pick.user_id,
        reward: draw.reward.clone(),
        total_entries: pick.total_entries,
        winner_entries: pick.winner_entries,
    };
    document.push_history(record.clone());
    if let Some(winner) = document.users.get_mut(&pick.user_id) {
        winner.wins = winner.wins.checked_add(1).ok_or(DrawError::Overflow)?;
    }

    msg!(
        "draw {} won by {} holding {} of {} entries",
        id,
        pick.user_id,
        pick.winner_entries,
        pick.total_entries
    );
    emit!(WinnerSelected {
        draw_id: id,
        winner_id: pick.user_id,
        winner_entries: pick.winner_entries,
        total_entries: pick.total_entries,
    });

    Ok(record)
}
