use std::cmp::Ordering;

use crate::state::{Document, Draw, DrawId, LeaderboardRow, UserId};

/// Whether a draw takes automatic entries for a donation of `usd_amount`.
pub fn accepts_automatic_entries(draw: &Draw, usd_amount: f64, is_vip: bool) -> bool {
    draw.active
        && !draw.manual_entries_only
        && (!draw.vip_only || is_vip)
        && draw.contains_amount(usd_amount)
}

fn by_min_amount(a: &&Draw, b: &&Draw) -> Ordering {
    a.min_amount
        .partial_cmp(&b.min_amount)
        .unwrap_or(Ordering::Equal)
}

/// Every draw a donation may enter automatically, cheapest first.
pub fn eligible_draws(document: &Document, usd_amount: f64, is_vip: bool) -> Vec<&Draw> {
    let mut draws: Vec<&Draw> = document
        .draws
        .values()
        .filter(|draw| accepts_automatic_entries(draw, usd_amount, is_vip))
        .collect();
    // Stable sort keeps id order among equal minimums
    draws.sort_by(by_min_amount);
    draws
}

/// The draw an untagged donation enters: the lowest `min_amount` among
/// eligible draws, ties going to the smallest id.
pub fn find_cheapest_eligible(document: &Document, usd_amount: f64, is_vip: bool) -> Option<&Draw> {
    eligible_draws(document, usd_amount, is_vip).into_iter().next()
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawSummary {
    pub id: DrawId,
    pub name: String,
    pub reward: String,
    pub min_amount: f64,
    pub max_amount: Option<f64>,
    pub total_entries: u64,
    pub max_entries: u64,
    pub participants: usize,
    pub active: bool,
    pub draw_time: Option<String>,
}

impl From<&Draw> for DrawSummary {
    fn from(draw: &Draw) -> Self {
        DrawSummary {
            id: draw.id.clone(),
            name: draw.name.clone(),
            reward: draw.reward.clone(),
            min_amount: draw.min_amount,
            max_amount: (!draw.is_unbounded()).then_some(draw.max_amount),
            total_entries: draw.total_entries(),
            max_entries: draw.max_entries,
            participants: draw.participants(),
            active: draw.active,
            draw_time: draw.draw_time_formatted.clone(),
        }
    }
}

pub fn draw_summaries(document: &Document) -> Vec<DrawSummary> {
    let mut draws: Vec<&Draw> = document.draws.values().collect();
    draws.sort_by(by_min_amount);
    draws.into_iter().map(DrawSummary::from).collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserDrawStake {
    pub draw_id: DrawId,
    pub entries: u64,
    /// Chance of winning the draw as it stands, in `[0, 1]`
    pub odds: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserStats {
    pub user_id: UserId,
    pub total_donated: f64,
    pub wins: u64,
    pub stakes: Vec<UserDrawStake>,
}

pub fn user_stats(document: &Document, user_id: UserId) -> Option<UserStats> {
    let user = document.users.get(&user_id)?;
    let stakes = user
        .entries
        .iter()
        .filter_map(|(draw_id, entries)| {
            let draw = document.draws.get(draw_id)?;
            let total = draw.total_entries();
            let odds = if total == 0 {
                0.0
            } else {
                *entries as f64 / total as f64
            };
            Some(UserDrawStake {
                draw_id: draw_id.clone(),
                entries: *entries,
                odds,
            })
        })
        .collect();
    Some(UserStats {
        user_id,
        total_donated: user.total_donated,
        wins: user.wins,
        stakes,
    })
}

/// Top donors by lifetime total, ties broken by user id.
pub fn leaderboard(document: &Document, limit: usize) -> Vec<LeaderboardRow> {
    let mut rows: Vec<LeaderboardRow> = document
        .users
        .iter()
        .filter(|(_, user)| user.total_donated > 0.0)
        .map(|(user_id, user)| LeaderboardRow {
            user_id: *user_id,
            username: user.username.clone(),
            total_donated: user.total_donated,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_donated
            .partial_cmp(&a.total_donated)
            .unwrap_or(Ordering::Equal)
            .then(a.user_id.cmp(&b.user_id))
    });
    rows.truncate(limit);
    rows
}
