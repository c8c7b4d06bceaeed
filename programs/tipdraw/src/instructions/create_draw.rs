use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use chrono::{DateTime, Utc};

use crate::{
    constants::{MAX_DRAW_ID_LEN, UNBOUNDED_MAX_AMOUNT},
    error::DrawError,
    state::{normalize_draw_id, Document, Draw},
};

/// Event emitted when a draw is created
#[event]
pub struct DrawCreated {
    /// The id of the created draw
    pub draw_id: String,
    /// Smallest donation accepted, and the price of one entry, in USD
    pub min_amount: f64,
    /// Largest donation accepted, in USD
    pub max_amount: f64,
    /// Capacity across all participants
    pub max_entries: u64,
    /// When the draw was created
    pub creation_time: i64,
}

/// Parameters an admin supplies for a new draw
#[derive(Clone, Debug, PartialEq)]
pub struct CreateDrawParams {
    pub id: String,
    pub name: String,
    pub min_amount: f64,
    /// `0` means no upper bound
    pub max_amount: f64,
    pub reward: String,
    pub max_entries: u64,
}

pub fn validate_draw_id(id: &str) -> Result<()> {
    require!(
        !id.is_empty()
            && id.len() <= MAX_DRAW_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'),
        DrawError::InvalidDrawId
    );
    Ok(())
}

pub fn validate_range(min_amount: f64, max_amount: f64) -> Result<()> {
    require!(
        min_amount.is_finite() && max_amount.is_finite(),
        DrawError::InvalidAmountRange
    );
    require!(min_amount > 0.0, DrawError::InvalidAmountRange);
    require!(max_amount >= min_amount, DrawError::InvalidAmountRange);
    Ok(())
}

/// Registers a new, active draw with no entries.
///
/// # Validation
/// 1. The id is normalized to lowercase and must be 1-32 chars of `[a-z0-9_-]`
/// 2. The id must not already exist
/// 3. `min_amount` must be positive and not exceed `max_amount`
/// 4. `max_entries` must be greater than zero
///
/// A `max_amount` of zero is stored as [`UNBOUNDED_MAX_AMOUNT`].
pub fn create_draw(
    document: &mut Document,
    params: CreateDrawParams,
    now: DateTime<Utc>,
) -> Result<Draw> {
    let id = normalize_draw_id(&params.id);
    validate_draw_id(&id)?;
    require!(
        !document.draws.contains_key(&id),
        DrawError::DuplicateDrawId
    );

    let max_amount = if params.max_amount == 0.0 {
        UNBOUNDED_MAX_AMOUNT
    } else {
        params.max_amount
    };
    validate_range(params.min_amount, max_amount)?;
    require_gt!(params.max_entries, 0, DrawError::InvalidMaxEntries);

    let name = if params.name.trim().is_empty() {
        id.clone()
    } else {
        params.name.trim().to_string()
    };

    let draw = Draw {
        id: id.clone(),
        name,
        min_amount: params.min_amount,
        max_amount,
        max_entries: params.max_entries,
        entries: BTreeMap::new(),
        active: true,
        manual_entries_only: false,
        vip_only: false,
        reward: params.reward,
        draw_time: None,
        draw_time_formatted: None,
        notification_sent: false,
        created_at: Some(now),
    };
    document.draws.insert(id.clone(), draw.clone());

    msg!(
        "created draw {} for {} to {} with {} entries",
        id,
        draw.min_amount,
        draw.max_amount,
        draw.max_entries
    );
    emit!(DrawCreated {
        draw_id: id,
        min_amount: draw.min_amount,
        max_amount: draw.max_amount,
        max_entries: draw.max_entries,
        creation_time: now.timestamp(),
    });

    Ok(draw)
}

#[cfg(test)]
mod tests {
    use anchor_lang::error::Error;

    use super::*;

    fn params(id: &str, min: f64, max: f64, cap: u64) -> CreateDrawParams {
        CreateDrawParams {
            id: id.into(),
            name: String::new(),
            min_amount: min,
            max_amount: max,
            reward: "Nitro".into(),
            max_entries: cap,
        }
    }

    #[test]
    fn creates_active_empty_draw() {
        let mut doc = Document::default();
        let draw = create_draw(&mut doc, params("Small", 5.0, 19.99, 100), Utc::now()).unwrap();
        assert_eq!(draw.id, "small");
        assert_eq!(draw.name, "small");
        assert!(draw.active);
        assert!(doc.draws["small"].entries.is_empty());
    }

    #[test]
    fn zero_max_amount_means_unbounded() {
        let mut doc = Document::default();
        let draw = create_draw(&mut doc, params("big", 20.0, 0.0, 10), Utc::now()).unwrap();
        assert_eq!(draw.max_amount, UNBOUNDED_MAX_AMOUNT);
        assert!(draw.is_unbounded());
    }

    #[test]
    fn rejects_duplicates_and_bad_input() {
        let mut doc = Document::default();
        create_draw(&mut doc, params("small", 5.0, 20.0, 100), Utc::now()).unwrap();
        let cases = [
            (params("small", 5.0, 20.0, 100), DrawError::DuplicateDrawId),
            (params("bad id", 5.0, 20.0, 100), DrawError::InvalidDrawId),
            (params("x", 0.0, 20.0, 100), DrawError::InvalidAmountRange),
            (params("x", 30.0, 20.0, 100), DrawError::InvalidAmountRange),
            (params("x", 5.0, 20.0, 0), DrawError::InvalidMaxEntries),
        ];
        for (input, expected) in cases {
            let err = create_draw(&mut doc, input, Utc::now()).unwrap_err();
            assert_eq!(err, Error::from(expected));
        }
        assert_eq!(doc.draws.len(), 1);
    }
}
