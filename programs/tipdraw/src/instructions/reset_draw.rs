use anchor_lang::prelude::*;

use crate::{
    error::DrawError,
    state::{normalize_draw_id, Document},
};

/// Event emitted when a draw's entries are cleared
#[event]
pub struct DrawReset {
    /// The id of the reset draw
    pub draw_id: String,
    /// Entries removed by the reset
    pub cleared_entries: u64,
}

/// Clears every entry in a draw, on the draw and on each user's mirror.
///
/// The draw's active flag and schedule are left alone. Resetting an empty
/// draw is a no-op that still succeeds.
pub fn reset_draw(document: &mut Document, draw_id: &str) -> Result<u64> {
    let id = normalize_draw_id(draw_id);
    let cleared_entries = document
        .draws
        .get(&id)
        .ok_or(DrawError::DrawNotFound)?
        .total_entries();

    document.clear_draw_entries(&id);

    msg!("reset draw {}, {} entries cleared", id, cleared_entries);
    emit!(DrawReset {
        draw_id: id,
        cleared_entries,
    });

    Ok(cleared_entries)
}
