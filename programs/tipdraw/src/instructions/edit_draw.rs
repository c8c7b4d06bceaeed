use anchor_lang::prelude::*;

use crate::{
    constants::UNBOUNDED_MAX_AMOUNT,
    error::DrawError,
    instructions::create_draw::validate_range,
    state::{normalize_draw_id, Document, Draw},
};

/// Event emitted when a draw definition changes
#[event]
pub struct DrawEdited {
    /// The id of the edited draw
    pub draw_id: String,
    /// Whether the draw accepts entries after the edit
    pub active: bool,
    /// Capacity after the edit
    pub max_entries: u64,
}

/// Fields an admin may change on an existing draw. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawUpdate {
    pub name: Option<String>,
    pub min_amount: Option<f64>,
    /// `0` means no upper bound
    pub max_amount: Option<f64>,
    pub max_entries: Option<u64>,
    pub reward: Option<String>,
    pub active: Option<bool>,
    pub manual_entries_only: Option<bool>,
    pub vip_only: Option<bool>,
}

impl DrawUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.min_amount.is_none()
            && self.max_amount.is_none()
            && self.max_entries.is_none()
            && self.reward.is_none()
            && self.active.is_none()
            && self.manual_entries_only.is_none()
            && self.vip_only.is_none()
    }
}

/// Applies a partial update to a draw.
///
/// Deactivating a draw keeps its entries. Capacity may not drop below the
/// entries already held, and the resulting amount range must stay valid.
/// Nothing changes when any check fails.
pub fn edit_draw(document: &mut Document, draw_id: &str, update: DrawUpdate) -> Result<Draw> {
    let id = normalize_draw_id(draw_id);
    let draw = document.draws.get_mut(&id).ok_or(DrawError::DrawNotFound)?;
    require!(!update.is_empty(), DrawError::InvalidCommand);

    let min_amount = update.min_amount.unwrap_or(draw.min_amount);
    let max_amount = match update.max_amount {
        Some(max) if max == 0.0 => UNBOUNDED_MAX_AMOUNT,
        Some(max) => max,
        None => draw.max_amount,
    };
    validate_range(min_amount, max_amount)?;

    if let Some(max_entries) = update.max_entries {
        require_gt!(max_entries, 0, DrawError::InvalidMaxEntries);
        require!(
            max_entries >= draw.total_entries(),
            DrawError::InvalidMaxEntries
        );
        draw.max_entries = max_entries;
    }

    draw.min_amount = min_amount;
    draw.max_amount = max_amount;
    if let Some(name) = update.name.filter(|name| !name.trim().is_empty()) {
        draw.name = name.trim().to_string();
    }
    if let Some(reward) = update.reward {
        draw.reward = reward;
    }
    if let Some(active) = update.active {
        draw.active = active;
    }
    if let Some(manual_entries_only) = update.manual_entries_only {
        draw.manual_entries_only = manual_entries_only;
    }
    if let Some(vip_only) = update.vip_only {
        draw.vip_only = vip_only;
    }

    msg!(
        "edited draw {}: active {}, capacity {}",
        id,
        draw.active,
        draw.max_entries
    );
    emit!(DrawEdited {
        draw_id: id,
        active: draw.active,
        max_entries: draw.max_entries,
    });

    Ok(draw.clone())
}

#[cfg(test)]
mod tests {
    use anchor_lang::error::Error;

    use super::*;
    use crate::instructions::test_support::document_with_draw;

    #[test]
    fn only_given_fields_change() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        let draw = edit_draw(
            &mut doc,
            "small",
            DrawUpdate {
                reward: Some("Steam key".into()),
                vip_only: Some(true),
                ..DrawUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(draw.reward, "Steam key");
        assert!(draw.vip_only);
        assert_eq!(draw.min_amount, 5.0);
        assert_eq!(draw.max_entries, 100);
    }

    #[test]
    fn deactivating_keeps_entries() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        doc.add_entries("small", 7, 3).unwrap();
        let update = DrawUpdate {
            active: Some(false),
            ..DrawUpdate::default()
        };
        let draw = edit_draw(&mut doc, "small", update).unwrap();
        assert!(!draw.active);
        assert_eq!(draw.entries.get(&7), Some(&3));
    }

    #[test]
    fn capacity_cannot_drop_below_held_entries() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        doc.add_entries("small", 7, 10).unwrap();
        let update = DrawUpdate {
            max_entries: Some(9),
            ..DrawUpdate::default()
        };
        let err = edit_draw(&mut doc, "small", update).unwrap_err();
        assert_eq!(err, Error::from(DrawError::InvalidMaxEntries));
        assert_eq!(doc.draws["small"].max_entries, 100);
    }

    #[test]
    fn invalid_range_and_missing_draw() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        let update = DrawUpdate {
            min_amount: Some(50.0),
            ..DrawUpdate::default()
        };
        assert_eq!(
            edit_draw(&mut doc, "small", update.clone()).unwrap_err(),
            Error::from(DrawError::InvalidAmountRange)
        );
        assert_eq!(
            edit_draw(&mut doc, "nope", update).unwrap_err(),
            Error::from(DrawError::DrawNotFound)
        );
    }
}
