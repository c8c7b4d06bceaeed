use anchor_lang::prelude::*;

use crate::{
    error::DrawError,
    state::{normalize_draw_id, Document, DrawId, UserId},
};

/// Event emitted when an admin grants entries by hand
#[event]
pub struct EntriesAssigned {
    /// The draw receiving entries
    pub draw_id: String,
    /// The user receiving entries
    pub user_id: u64,
    /// Entries the admin asked for
    pub requested: u64,
    /// Entries actually added after the capacity clamp
    pub entry_count: u64,
    /// USD credited to the user's lifetime total
    pub usd_amount: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ManualAssignment {
    pub draw_id: DrawId,
    pub draw_name: String,
    pub entry_count: u64,
    pub requested: u64,
    pub is_full: bool,
    pub total_donated: f64,
}

/// Grants entries to a user on an admin's word.
///
/// Amount-range, manual-only and VIP gates are skipped, but the capacity
/// clamp still applies: a request larger than the space left is cut down
/// rather than rejected. A positive `usd_amount` is added to the user's
/// lifetime total.
///
/// # Errors
/// - `InvalidEntryCount` if `entry_count` is zero
/// - `InvalidAmount` if `usd_amount` is negative or not finite
/// - `DrawNotFound` / `DrawInactive` if the draw cannot take entries
/// - `DrawFull` if no capacity is left
pub fn assign_entries(
    document: &mut Document,
    user_id: UserId,
    username: &str,
    draw_id: &str,
    entry_count: u64,
    usd_amount: f64,
) -> Result<ManualAssignment> {
    require_gt!(entry_count, 0, DrawError::InvalidEntryCount);
    require!(
        usd_amount.is_finite() && usd_amount >= 0.0,
        DrawError::InvalidAmount
    );

    let id = normalize_draw_id(draw_id);
    let draw = document.draws.get(&id).ok_or(DrawError::DrawNotFound)?;
    require!(draw.active, DrawError::DrawInactive);
    let available = draw.available_entries();
    require_gt!(available, 0, DrawError::DrawFull);

    let to_add = entry_count.min(available);
    let draw_name = draw.name.clone();
    document.add_entries(&id, user_id, to_add)?;

    let user = document.user_mut(user_id, username);
    if usd_amount > 0.0 {
        user.total_donated += usd_amount;
    }
    let total_donated = user.total_donated;

    msg!(
        "assigned {} of {} entries in draw {} to {}",
        to_add,
        entry_count,
        id,
        user_id
    );
    emit!(EntriesAssigned {
        draw_id: id.clone(),
        user_id,
        requested: entry_count,
        entry_count: to_add,
        usd_amount,
    });

    Ok(ManualAssignment {
        draw_id: id,
        draw_name,
        entry_count: to_add,
        requested: entry_count,
        is_full: to_add < entry_count,
        total_donated,
    })
}

#[cfg(test)]
mod tests {
    use anchor_lang::error::Error;

    use super::*;
    use crate::instructions::test_support::document_with_draw;

    #[test]
    fn skips_gates_but_clamps_capacity() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 10);
        {
            let draw = doc.draws.get_mut("small").unwrap();
            draw.manual_entries_only = true;
            draw.vip_only = true;
        }
        doc.add_entries("small", 1, 7).unwrap();

        let assignment = assign_entries(&mut doc, 2, "bob", "Small", 5, 250.0).unwrap();
        assert_eq!(assignment.entry_count, 3);
        assert!(assignment.is_full);
        assert_eq!(assignment.total_donated, 250.0);
        assert_eq!(doc.users[&2].entries.get("small"), Some(&3));
        assert!(doc.check_invariants().is_empty());
    }

    #[test]
    fn zero_amount_leaves_total_untouched() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 10);
        let assignment = assign_entries(&mut doc, 2, "bob", "small", 2, 0.0).unwrap();
        assert_eq!(assignment.total_donated, 0.0);
        assert_eq!(assignment.entry_count, 2);
    }

    #[test]
    fn reports_missing_inactive_and_full_draws() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 1);
        assert_eq!(
            assign_entries(&mut doc, 2, "bob", "nope", 1, 0.0).unwrap_err(),
            Error::from(DrawError::DrawNotFound)
        );

        assign_entries(&mut doc, 2, "bob", "small", 1, 0.0).unwrap();
        assert_eq!(
            assign_entries(&mut doc, 3, "eve", "small", 1, 10.0).unwrap_err(),
            Error::from(DrawError::DrawFull)
        );
        assert!(doc.users.get(&3).is_none());

        doc.draws.get_mut("small").unwrap().active = false;
        assert_eq!(
            assign_entries(&mut doc, 2, "bob", "small", 1, 0.0).unwrap_err(),
            Error::from(DrawError::DrawInactive)
        );
    }

    #[test]
    fn rejects_bad_counts_and_amounts() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 10);
        assert_eq!(
            assign_entries(&mut doc, 2, "bob", "small", 0, 0.0).unwrap_err(),
            Error::from(DrawError::InvalidEntryCount)
        );
        assert_eq!(
            assign_entries(&mut doc, 2, "bob", "small", 1, -5.0).unwrap_err(),
            Error::from(DrawError::InvalidAmount)
        );
    }
}
