use anchor_lang::prelude::*;
use chrono::{DateTime, Utc};

use crate::{
    error::DrawError,
    state::{normalize_draw_id, Document, Draw},
};

/// Event emitted when a draw's scheduled time is set or cleared
#[event]
pub struct DrawScheduled {
    /// The id of the draw
    pub draw_id: String,
    /// Unix timestamp of the draw, or `None` when cancelled
    pub draw_time: Option<i64>,
}

/// Schedules a draw to be picked automatically at `fire_at`.
///
/// Re-scheduling replaces the previous time and re-arms the upcoming-draw
/// notification.
pub fn schedule_draw(
    document: &mut Document,
    draw_id: &str,
    fire_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Draw> {
    let id = normalize_draw_id(draw_id);
    let draw = document.draws.get_mut(&id).ok_or(DrawError::DrawNotFound)?;
    require!(fire_at > now, DrawError::DrawTimeInPast);

    draw.set_draw_time(Some(fire_at));

    msg!("draw {} scheduled for {}", id, fire_at);
    emit!(DrawScheduled {
        draw_id: id,
        draw_time: Some(fire_at.timestamp()),
    });

    Ok(draw.clone())
}

/// Removes a draw's scheduled time, returning the time that was cancelled.
pub fn cancel_draw_schedule(document: &mut Document, draw_id: &str) -> Result<DateTime<Utc>> {
    let id = normalize_draw_id(draw_id);
    let draw = document.draws.get_mut(&id).ok_or(DrawError::DrawNotFound)?;
    let previous = draw.draw_time.ok_or(DrawError::DrawNotScheduled)?;

    draw.set_draw_time(None);

    msg!("draw {} schedule for {} cancelled", id, previous);
    emit!(DrawScheduled {
        draw_id: id,
        draw_time: None,
    });

    Ok(previous)
}
