use chrono::{DateTime, Utc};

use super::{DrawId, Recipient, UserId};

/// A stated tip intent waiting for the tipping bot to confirm the transfer.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTip {
    pub message_id: u64,
    pub sender_id: UserId,
    pub recipient: Recipient,
    pub target_draw_id: Option<DrawId>,
    pub channel_id: u64,
    pub timestamp: DateTime<Utc>,
}
