use anchor_lang::prelude::*;

use crate::{
    error::DrawError,
    instructions::draw_status::{eligible_draws, find_cheapest_eligible},
    state::{normalize_draw_id, Document, Draw, DrawId, UserId},
};

/// Event emitted when a donation is converted into draw entries
#[event]
pub struct EntriesAllocated {
    /// The donor
    pub user_id: u64,
    /// The donation in USD
    pub usd_amount: f64,
    /// Entries added across all draws
    pub entries_added: u64,
    /// The donor's lifetime total after this donation
    pub total_donated: f64,
}

/// A confirmed donation ready to be turned into entries
#[derive(Clone, Debug)]
pub struct AllocationRequest {
    pub user_id: UserId,
    pub username: String,
    pub usd_amount: f64,
    /// Draw named by the donor's `#tag`, if any
    pub target_draw_id: Option<DrawId>,
    /// Whether the donor holds the guild's VIP role
    pub is_vip: bool,
}

/// Entries granted by one draw for one donation
#[derive(Clone, Debug, PartialEq)]
pub struct DrawOutcome {
    pub draw_id: DrawId,
    pub draw_name: String,
    /// Entries actually added, after the capacity clamp
    pub entry_count: u64,
    /// Entries the donation was worth
    pub requested: u64,
    /// True when capacity cut the grant short
    pub is_full: bool,
    pub min_amount: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Inactive,
    ManualOnly,
    VipOnly,
    OutOfRange,
    BelowOneEntry,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkippedDraw {
    pub draw_id: DrawId,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocationResult {
    pub entered_draws: Vec<DrawOutcome>,
    pub skipped: Vec<SkippedDraw>,
    pub total_donated: f64,
}

impl AllocationResult {
    pub fn entries_added(&self) -> u64 {
        self.entered_draws.iter().map(|outcome| outcome.entry_count).sum()
    }
}

fn gate(draw: &Draw, usd_amount: f64, is_vip: bool) -> std::result::Result<u64, SkipReason> {
    if !draw.active {
        return Err(SkipReason::Inactive);
    }
    if draw.manual_entries_only {
        return Err(SkipReason::ManualOnly);
    }
    if draw.vip_only && !is_vip {
        return Err(SkipReason::VipOnly);
    }
    if !draw.contains_amount(usd_amount) {
        return Err(SkipReason::OutOfRange);
    }
    match draw.entries_for(usd_amount) {
        0 => Err(SkipReason::BelowOneEntry),
        entry_count => Ok(entry_count),
    }
}

/// Draws the donation is aimed at, before gating.
fn target_set(document: &Document, request: &AllocationRequest) -> Vec<DrawId> {
    match &request.target_draw_id {
        Some(target) => vec![normalize_draw_id(target)],
        None if document.config.features.multi_draw_fallback => {
            eligible_draws(document, request.usd_amount, request.is_vip)
                .into_iter()
                .map(|draw| draw.id.clone())
                .collect()
        }
        None => find_cheapest_eligible(document, request.usd_amount, request.is_vip)
            .map(|draw| vec![draw.id.clone()])
            .unwrap_or_default(),
    }
}

/// Converts a confirmed USD donation into draw entries.
///
/// # Behavior
/// 1. The donor's lifetime total always grows by the donation, even when no
///    draw accepts entries
/// 2. A tagged donation only targets that draw; an unknown or inactive tag
///    yields no entries rather than falling back
/// 3. An untagged donation targets the cheapest eligible draw, or every
///    eligible draw when the guild enables `multi_draw_fallback`
/// 4. Each draw grants `floor(usd / min_amount)` entries, clamped to the
///    capacity left; a full draw is reported with zero entries
/// 5. Entries are written to the draw and mirrored on the user together
///
/// # Errors
/// - `InvalidAmount` if the amount is negative or not finite
/// - `Overflow` if an entry count would overflow
pub fn allocate_entries(
    document: &mut Document,
    request: &AllocationRequest,
) -> Result<AllocationResult> {
    require!(
        request.usd_amount.is_finite() && request.usd_amount >= 0.0,
        DrawError::InvalidAmount
    );

    let user = document.user_mut(request.user_id, &request.username);
    user.total_donated += request.usd_amount;
    user.donation_count = user.donation_count.checked_add(1).ok_or(DrawError::Overflow)?;
    let total_donated = user.total_donated;

    let mut result = AllocationResult {
        total_donated,
        ..AllocationResult::default()
    };
    if !document.config.features.auto_entries {
        return Ok(result);
    }

    for draw_id in target_set(document, request) {
        let Some(draw) = document.draws.get(&draw_id) else {
            result.skipped.push(SkippedDraw {
                draw_id,
                reason: SkipReason::NotFound,
            });
            continue;
        };
        let requested = match gate(draw, request.usd_amount, request.is_vip) {
            Ok(requested) => requested,
            Err(reason) => {
                result.skipped.push(SkippedDraw { draw_id, reason });
                continue;
            }
        };

        let to_add = requested.min(draw.available_entries());
        let outcome = DrawOutcome {
            draw_id: draw_id.clone(),
            draw_name: draw.name.clone(),
            entry_count: to_add,
            requested,
            is_full: to_add < requested,
            min_amount: draw.min_amount,
        };
        document.add_entries(&draw_id, request.user_id, to_add)?;
        result.entered_draws.push(outcome);
    }

    msg!(
        "donation of {} from {} added {} entries, lifetime total {}",
        request.usd_amount,
        request.user_id,
        result.entries_added(),
        total_donated
    );
    emit!(EntriesAllocated {
        user_id: request.user_id,
        usd_amount: request.usd_amount,
        entries_added: result.entries_added(),
        total_donated,
    });

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::test_support::{add_draw, document_with_draw};

    fn donation(user_id: UserId, usd_amount: f64, target: Option<&str>) -> AllocationRequest {
        AllocationRequest {
            user_id,
            username: format!("user{user_id}"),
            usd_amount,
            target_draw_id: target.map(str::to_string),
            is_vip: false,
        }
    }

    #[test]
    fn untagged_donation_enters_cheapest_draw() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        add_draw(&mut doc, "mid", 10.0, 50.0, 100);

        let result = allocate_entries(&mut doc, &donation(1, 12.0, None)).unwrap();
        assert_eq!(result.total_donated, 12.0);
        assert_eq!(result.entered_draws.len(), 1);
        let outcome = &result.entered_draws[0];
        assert_eq!(outcome.draw_id, "small");
        assert_eq!(outcome.entry_count, 2);
        assert!(!outcome.is_full);
        assert_eq!(doc.draws["small"].entries.get(&1), Some(&2));
        assert_eq!(doc.users[&1].entries.get("small"), Some(&2));
        assert!(doc.draws["mid"].entries.is_empty());
    }

    #[test]
    fn capacity_clamps_and_reports_full() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        doc.add_entries("small", 100, 99).unwrap();

        let result = allocate_entries(&mut doc, &donation(2, 12.0, None)).unwrap();
        let outcome = &result.entered_draws[0];
        assert_eq!(outcome.entry_count, 1);
        assert_eq!(outcome.requested, 2);
        assert!(outcome.is_full);
        assert_eq!(doc.draws["small"].total_entries(), 100);

        let result = allocate_entries(&mut doc, &donation(2, 12.0, None)).unwrap();
        assert_eq!(result.entered_draws[0].entry_count, 0);
        assert!(result.entered_draws[0].is_full);
        assert_eq!(doc.draws["small"].entries.get(&2), Some(&1));
        assert_eq!(doc.users[&2].total_donated, 24.0);
        assert!(doc.check_invariants().is_empty());
    }

    #[test]
    fn sequential_donations_accumulate() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        allocate_entries(&mut doc, &donation(1, 15.0, Some("small"))).unwrap();
        allocate_entries(&mut doc, &donation(1, 15.0, Some("small"))).unwrap();
        assert_eq!(doc.draws["small"].entries.get(&1), Some(&6));
        assert_eq!(doc.users[&1].entries.get("small"), Some(&6));
        assert_eq!(doc.users[&1].total_donated, 30.0);
        assert_eq!(doc.users[&1].donation_count, 2);
    }

    #[test]
    fn bad_tag_yields_no_entries_without_fallback() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        add_draw(&mut doc, "closed", 5.0, 19.99, 100);
        doc.draws.get_mut("closed").unwrap().active = false;

        let result = allocate_entries(&mut doc, &donation(1, 12.0, Some("#Nope"))).unwrap();
        assert!(result.entered_draws.is_empty());
        assert_eq!(result.skipped[0].reason, SkipReason::NotFound);

        let result = allocate_entries(&mut doc, &donation(1, 12.0, Some("closed"))).unwrap();
        assert_eq!(result.skipped[0].reason, SkipReason::Inactive);

        assert!(doc.draws["small"].entries.is_empty());
        assert_eq!(doc.users[&1].total_donated, 24.0);
    }

    #[test]
    fn tagged_draw_still_applies_gates() {
        let mut doc = document_with_draw("vip", 5.0, 100.0, 100);
        doc.draws.get_mut("vip").unwrap().vip_only = true;
        let result = allocate_entries(&mut doc, &donation(1, 12.0, Some("vip"))).unwrap();
        assert_eq!(result.skipped[0].reason, SkipReason::VipOnly);

        let mut request = donation(1, 200.0, Some("vip"));
        request.is_vip = true;
        let result = allocate_entries(&mut doc, &request).unwrap();
        assert_eq!(result.skipped[0].reason, SkipReason::OutOfRange);

        doc.draws.get_mut("vip").unwrap().manual_entries_only = true;
        request.usd_amount = 50.0;
        let result = allocate_entries(&mut doc, &request).unwrap();
        assert_eq!(result.skipped[0].reason, SkipReason::ManualOnly);
    }

    #[test]
    fn no_eligible_draw_still_counts_donation() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        let result = allocate_entries(&mut doc, &donation(1, 2.0, None)).unwrap();
        assert!(result.entered_draws.is_empty());
        assert!(result.skipped.is_empty());
        assert_eq!(result.total_donated, 2.0);
    }

    #[test]
    fn multi_draw_fallback_enters_every_eligible_draw() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        add_draw(&mut doc, "mid", 10.0, 50.0, 100);
        doc.config.features.multi_draw_fallback = true;

        let result = allocate_entries(&mut doc, &donation(1, 15.0, None)).unwrap();
        let granted: Vec<(&str, u64)> = result
            .entered_draws
            .iter()
            .map(|outcome| (outcome.draw_id.as_str(), outcome.entry_count))
            .collect();
        assert_eq!(granted, vec![("small", 3), ("mid", 1)]);
        assert_eq!(result.entries_added(), 4);
    }

    #[test]
    fn disabled_auto_entries_only_track_totals() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        doc.config.features.auto_entries = false;
        let result = allocate_entries(&mut doc, &donation(1, 12.0, None)).unwrap();
        assert!(result.entered_draws.is_empty());
        assert_eq!(doc.users[&1].total_donated, 12.0);
    }

    #[test]
    fn rejects_invalid_amounts() {
        let mut doc = document_with_draw("small", 5.0, 19.99, 100);
        assert!(allocate_entries(&mut doc, &donation(1, -1.0, None)).is_err());
        assert!(allocate_entries(&mut doc, &donation(1, f64::NAN, None)).is_err());
        assert!(doc.users.is_empty());
    }
}
