use std::sync::Arc;
use std::time::Duration;

use anchor_lang::prelude::*;
use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::{
    correlator::TipCorrelator,
    instructions::{allocate_entries, AllocationRequest, AllocationResult},
    ledger::GuildLedger,
    parser::parse_tip_confirmation,
    price::PriceResolver,
    state::{PendingTip, UserId},
    tiers::{reconcile_roles, RoleGateway, RoleReconciliation},
};

/// Where a tipping-bot message ended up.
#[derive(Clone, Debug, PartialEq)]
pub enum DonationOutcome {
    /// Not a transfer confirmation
    Ignored,
    /// A transfer, but not to anyone on the guild's recipient allow-list
    NotADonation,
    CurrencyNotAccepted { symbol: String },
    PriceUnavailable { symbol: String },
    Recorded(RecordedDonation),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDonation {
    pub donor_id: UserId,
    pub usd_amount: f64,
    pub target_draw_id: Option<String>,
    pub allocation: AllocationResult,
    pub persisted: bool,
    pub roles: Option<RoleReconciliation>,
}

/// Turns tipping-bot confirmations into draw entries and donor roles.
///
/// Stages run in order and any of them may drop the donation: parse,
/// recipient allow-list, currency allow-list, price, then allocation under
/// the guild lock. Pricing finishes before the lock is taken, and roles are
/// reconciled after it is released.
pub struct DonationPipeline {
    ledger: Arc<GuildLedger>,
    correlator: TipCorrelator,
    prices: PriceResolver,
    roles: Arc<dyn RoleGateway>,
    external_timeout: Duration,
}

impl DonationPipeline {
    pub fn new(
        ledger: Arc<GuildLedger>,
        prices: PriceResolver,
        roles: Arc<dyn RoleGateway>,
        external_timeout: Duration,
    ) -> Self {
        DonationPipeline {
            ledger,
            correlator: TipCorrelator::default(),
            prices,
            roles,
            external_timeout,
        }
    }

    pub fn ledger(&self) -> &Arc<GuildLedger> {
        &self.ledger
    }

    /// Remembers a donor's `tip` command so its draw tag can be matched to
    /// the confirmation that follows.
    pub fn observe_user_message(
        &self,
        text: &str,
        author_id: UserId,
        message_id: u64,
        channel_id: u64,
        now: DateTime<Utc>,
    ) -> Option<PendingTip> {
        self.correlator
            .record_message(text, author_id, message_id, channel_id, now)
    }

    async fn is_vip(&self, guild_id: u64, user_id: UserId, vip_role_id: Option<u64>) -> bool {
        let Some(vip_role_id) = vip_role_id else {
            return false;
        };
        match timeout(self.external_timeout, self.roles.member_roles(guild_id, user_id)).await {
            Ok(Ok(roles)) => roles.contains(&vip_role_id),
            Ok(Err(err)) => {
                msg!("could not read roles of {} for VIP check: {}", user_id, err);
                false
            }
            Err(_) => {
                msg!("timed out reading roles of {} for VIP check", user_id);
                false
            }
        }
    }

    /// Processes one message from the tipping bot.
    ///
    /// # Errors
    /// Only store failures surface as errors. Every drop is an `Ok` outcome.
    pub async fn handle_confirmation(
        &self,
        guild_id: u64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<DonationOutcome> {
        let Some(tip) = parse_tip_confirmation(text) else {
            return Ok(DonationOutcome::Ignored);
        };

        let config = self
            .ledger
            .read(guild_id, |document| document.config.clone())
            .await?;
        if !config.is_donation_recipient(&tip.recipient_ids, &tip.role_ids) {
            return Ok(DonationOutcome::NotADonation);
        }
        if !config.accepts_currency(&tip.symbol) {
            msg!(
                "guild {}: ignoring {} {} from {}, currency not accepted",
                guild_id,
                tip.amount,
                tip.symbol,
                tip.sender_id
            );
            return Ok(DonationOutcome::CurrencyNotAccepted { symbol: tip.symbol });
        }

        let Some(usd_amount) = self
            .prices
            .resolve(&tip.symbol, tip.amount, Some(text))
            .await
        else {
            msg!(
                "guild {}: no price for {} {} from {}, donation not counted",
                guild_id,
                tip.amount,
                tip.symbol,
                tip.sender_id
            );
            return Ok(DonationOutcome::PriceUnavailable { symbol: tip.symbol });
        };

        let target_draw_id = self
            .correlator
            .match_any(tip.sender_id, &tip.recipients(), now)
            .and_then(|intent| intent.target_draw_id);
        let is_vip = self.is_vip(guild_id, tip.sender_id, config.vip_role_id).await;

        let request = AllocationRequest {
            user_id: tip.sender_id,
            username: String::new(),
            usd_amount,
            target_draw_id: target_draw_id.clone(),
            is_vip,
        };
        let committed = self
            .ledger
            .with_document(guild_id, |document| {
                let allocation = allocate_entries(document, &request)?;
                Ok((allocation, document.config.clone()))
            })
            .await?;
        let (allocation, config) = committed.value;

        let roles = if config.features.role_rewards && !config.tiers.is_empty() {
            Some(
                reconcile_roles(
                    self.roles.as_ref(),
                    guild_id,
                    tip.sender_id,
                    allocation.total_donated,
                    &config.tiers,
                    self.external_timeout,
                )
                .await,
            )
        } else {
            None
        };

        Ok(DonationOutcome::Recorded(RecordedDonation {
            donor_id: tip.sender_id,
            usd_amount,
            target_draw_id,
            allocation,
            persisted: committed.persisted,
            roles,
        }))
    }

    /// Re-applies tier roles for a donor whose total changed outside the
    /// tipping flow, e.g. after a manual assignment.
    pub async fn sync_donor_roles(
        &self,
        guild_id: u64,
        user_id: UserId,
    ) -> Result<Option<RoleReconciliation>> {
        let (total, config) = self
            .ledger
            .read(guild_id, |document| {
                let total = document
                    .users
                    .get(&user_id)
                    .map_or(0.0, |user| user.total_donated);
                (total, document.config.clone())
            })
            .await?;
        if !config.features.role_rewards || config.tiers.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            reconcile_roles(
                self.roles.as_ref(),
                guild_id,
                user_id,
                total,
                &config.tiers,
                self.external_timeout,
            )
            .await,
        ))
    }
}

/// Chat reply for a recorded donation, `None` when nothing needs saying.
pub fn render_donation(donation: &RecordedDonation) -> Option<String> {
    let donor = donation.donor_id;
    let mut lines = Vec::new();
    for outcome in &donation.allocation.entered_draws {
        let line = if outcome.entry_count == 0 {
            format!("<@{donor}> **{}** is full, no entries were added.", outcome.draw_name)
        } else if outcome.is_full {
            format!(
                "<@{donor}> received {} of {} entries in **{}** (the draw is now full).",
                outcome.entry_count, outcome.requested, outcome.draw_name
            )
        } else {
            format!(
                "<@{donor}> received {} {} in **{}**. Thanks for the ${:.2} donation!",
                outcome.entry_count,
                if outcome.entry_count == 1 { "entry" } else { "entries" },
                outcome.draw_name,
                donation.usd_amount
            )
        };
        lines.push(line);
    }
    if lines.is_empty() {
        if let Some(target) = &donation.target_draw_id {
            lines.push(format!(
                "<@{donor}> thanks for the ${:.2} donation! Draw `#{target}` is not taking entries for it.",
                donation.usd_amount
            ));
        } else {
            return None;
        }
    }
    if !donation.persisted {
        lines.push("Warning: this donation could not be saved.".to_string());
    }
    Some(lines.join("\n"))
}
