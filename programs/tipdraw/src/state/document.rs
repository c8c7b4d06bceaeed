use std::collections::{btree_map::Entry, BTreeMap, HashSet};

use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use super::{normalize_draw_id, Draw, DrawId, GuildConfig, UserAccount, UserId, WinnerRecord};
use crate::constants::{DRAW_HISTORY_CAP, SCHEMA_VERSION, UNBOUNDED_MAX_AMOUNT};
use crate::error::DrawError;

/// Everything persisted for one guild.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub draws: BTreeMap<DrawId, Draw>,
    #[serde(default)]
    pub users: BTreeMap<UserId, UserAccount>,
    #[serde(default)]
    pub config: GuildConfig,
    #[serde(default)]
    pub draw_history: Vec<WinnerRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Document {
            schema_version: SCHEMA_VERSION,
            draws: BTreeMap::new(),
            users: BTreeMap::new(),
            config: GuildConfig::default(),
            draw_history: Vec::new(),
        }
    }
}

impl Document {
    pub fn user_mut(&mut self, user_id: UserId, username: &str) -> &mut UserAccount {
        let user = self.users.entry(user_id).or_default();
        if !username.is_empty() {
            user.username = username.to_string();
        }
        user
    }

    /// Adds `count` entries for `user_id` to both sides of the draw/user mirror.
    pub fn add_entries(&mut self, draw_id: &str, user_id: UserId, count: u64) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }
        let draw = self.draws.get_mut(draw_id).ok_or(DrawError::DrawNotFound)?;
        let held = draw.entries.entry(user_id).or_insert(0);
        *held = held.checked_add(count).ok_or(DrawError::Overflow)?;
        let new_total = *held;

        self.users
            .entry(user_id)
            .or_default()
            .entries
            .insert(draw_id.to_string(), new_total);
        Ok(new_total)
    }

    /// Clears a draw's entries and every user's mirror of them.
    pub fn clear_draw_entries(&mut self, draw_id: &str) {
        if let Some(draw) = self.draws.get_mut(draw_id) {
            draw.entries.clear();
        }
        for user in self.users.values_mut() {
            user.entries.remove(draw_id);
        }
    }

    pub fn push_history(&mut self, record: WinnerRecord) {
        self.draw_history.push(record);
        if self.draw_history.len() > DRAW_HISTORY_CAP {
            let overflow = self.draw_history.len() - DRAW_HISTORY_CAP;
            self.draw_history.drain(..overflow);
        }
    }

    /// Brings a document loaded from disk up to the current schema.
    pub fn migrate(mut self) -> Self {
        if self.schema_version > SCHEMA_VERSION {
            msg!(
                "document schema {} is newer than supported {}",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        let mut draws = BTreeMap::new();
        for (key, mut draw) in std::mem::take(&mut self.draws) {
            let id = normalize_draw_id(&key);
            draw.id = id.clone();
            if draw.name.is_empty() {
                draw.name = id.clone();
            }
            if draw.max_amount <= 0.0 {
                draw.max_amount = UNBOUNDED_MAX_AMOUNT;
            }
            draw.entries.retain(|_, count| *count > 0);
            if draw.draw_time.is_some() && draw.draw_time_formatted.is_none() {
                let time = draw.draw_time;
                let sent = draw.notification_sent;
                draw.set_draw_time(time);
                draw.notification_sent = sent;
            }
            match draws.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(draw);
                }
                Entry::Occupied(kept) => {
                    msg!(
                        "migration dropped draw \"{}\" ({} entries), its id collides with \"{}\"",
                        key,
                        draw.total_entries(),
                        kept.get().id
                    );
                }
            }
        }
        self.draws = draws;

        // Draws are authoritative; rebuild every mirror from them
        for user in self.users.values_mut() {
            user.entries.clear();
        }
        for draw in self.draws.values() {
            for (user_id, count) in &draw.entries {
                self.users
                    .entry(*user_id)
                    .or_default()
                    .entries
                    .insert(draw.id.clone(), *count);
            }
        }

        let mut seen = HashSet::new();
        self.config.accepted_currencies = std::mem::take(&mut self.config.accepted_currencies)
            .into_iter()
            .map(|currency| currency.to_uppercase())
            .filter(|currency| seen.insert(currency.clone()))
            .collect();

        if self.draw_history.len() > DRAW_HISTORY_CAP {
            let overflow = self.draw_history.len() - DRAW_HISTORY_CAP;
            self.draw_history.drain(..overflow);
        }

        self.schema_version = SCHEMA_VERSION;
        self
    }

    /// Lists every broken entry invariant; empty when the document is consistent.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for draw in self.draws.values() {
            if draw.total_entries() > draw.max_entries {
                violations.push(format!(
                    "draw {} holds {} entries over capacity {}",
                    draw.id,
                    draw.total_entries(),
                    draw.max_entries
                ));
            }
            for (user_id, count) in &draw.entries {
                if *count == 0 {
                    violations.push(format!("draw {} stores zero entries for {}", draw.id, user_id));
                }
                let mirrored = self
                    .users
                    .get(user_id)
                    .and_then(|user| user.entries.get(&draw.id))
                    .copied();
                if mirrored != Some(*count) {
                    violations.push(format!(
                        "user {} mirrors {:?} entries for draw {}, draw holds {}",
                        user_id, mirrored, draw.id, count
                    ));
                }
            }
        }
        for (user_id, user) in &self.users {
            for draw_id in user.entries.keys() {
                let held = self
                    .draws
                    .get(draw_id)
                    .and_then(|draw| draw.entries.get(user_id));
                if held.is_none() {
                    violations.push(format!(
                        "user {} has orphaned entries for draw {}",
                        user_id, draw_id
                    ));
                }
            }
        }
        violations
    }
}
