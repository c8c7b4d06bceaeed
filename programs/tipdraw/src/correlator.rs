use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::{
    constants::PENDING_TIP_TTL_SECS,
    parser::parse_tip_intent,
    state::{DrawId, PendingTip, Recipient, UserId},
};

/// Matches a donor's `tip` command to the tipping bot's later confirmation,
/// which does not carry the draw tag.
///
/// The table lives only in memory and starts empty on restart; a confirmation
/// with no pending intent simply proceeds without a target draw.
pub struct TipCorrelator {
    pending: Mutex<Vec<PendingTip>>,
    ttl: Duration,
}

impl Default for TipCorrelator {
    fn default() -> Self {
        TipCorrelator::new(Duration::seconds(PENDING_TIP_TTL_SECS))
    }
}

impl TipCorrelator {
    pub fn new(ttl: Duration) -> Self {
        TipCorrelator {
            pending: Mutex::new(Vec::new()),
            ttl,
        }
    }

    fn is_live(&self, tip: &PendingTip, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(tip.timestamp) < self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingTip>> {
        // The table holds plain data, so a poisoned lock is still usable
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores an intent and sweeps expired ones.
    pub fn record_intent(
        &self,
        sender_id: UserId,
        recipient: Recipient,
        target_draw_id: Option<DrawId>,
        message_id: u64,
        channel_id: u64,
        now: DateTime<Utc>,
    ) -> PendingTip {
        let tip = PendingTip {
            message_id,
            sender_id,
            recipient,
            target_draw_id,
            channel_id,
            timestamp: now,
        };
        let mut pending = self.lock();
        pending.retain(|existing| self.is_live(existing, now));
        pending.push(tip.clone());
        tip
    }

    /// Parses a chat message as a tip command and records it.
    /// Off-grammar text has no effect.
    pub fn record_message(
        &self,
        text: &str,
        sender_id: UserId,
        message_id: u64,
        channel_id: u64,
        now: DateTime<Utc>,
    ) -> Option<PendingTip> {
        let intent = parse_tip_intent(text)?;
        Some(self.record_intent(
            sender_id,
            intent.recipient,
            intent.target_draw_id,
            message_id,
            channel_id,
            now,
        ))
    }

    /// Returns the oldest live intent for this sender/recipient pair.
    ///
    /// A confirmation settles the pair: the matched intent and any later
    /// intents for the same pair are all removed.
    pub fn match_and_consume(
        &self,
        sender_id: UserId,
        recipient: Recipient,
        now: DateTime<Utc>,
    ) -> Option<PendingTip> {
        let mut pending = self.lock();
        let index = pending
            .iter()
            .enumerate()
            .filter(|(_, tip)| {
                tip.sender_id == sender_id
                    && tip.recipient == recipient
                    && self.is_live(tip, now)
            })
            .min_by_key(|(_, tip)| tip.timestamp)
            .map(|(index, _)| index)?;
        let matched = pending.remove(index);
        pending.retain(|tip| !(tip.sender_id == sender_id && tip.recipient == recipient));
        Some(matched)
    }

    /// Matches against the first recipient that has a pending intent.
    pub fn match_any(
        &self,
        sender_id: UserId,
        recipients: &[Recipient],
        now: DateTime<Utc>,
    ) -> Option<PendingTip> {
        recipients
            .iter()
            .find_map(|recipient| self.match_and_consume(sender_id, *recipient, now))
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|tip| self.is_live(tip, now));
        before - pending.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
