use std::cmp::Ordering;
use std::time::Duration;

use anchor_lang::prelude::*;
use async_trait::async_trait;
use tokio::time::timeout;

use crate::state::DonorTier;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Role membership on the chat platform.
#[async_trait]
pub trait RoleGateway: Send + Sync {
    async fn member_roles(&self, guild_id: u64, user_id: u64) -> std::result::Result<Vec<u64>, BoxError>;
    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> std::result::Result<(), BoxError>;
    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> std::result::Result<(), BoxError>;
}

/// The tier for a lifetime total: tiers are tried highest minimum first and
/// the first whose inclusive range holds `total_donated` wins.
pub fn tier_for(total_donated: f64, tiers: &[DonorTier]) -> Option<&DonorTier> {
    let mut ordered: Vec<&DonorTier> = tiers.iter().collect();
    ordered.sort_by(|a, b| {
        b.min_amount
            .partial_cmp(&a.min_amount)
            .unwrap_or(Ordering::Equal)
    });
    ordered.into_iter().find(|tier| tier.contains(total_donated))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoleReconciliation {
    pub tier: Option<String>,
    pub added: Vec<u64>,
    pub removed: Vec<u64>,
    pub failures: usize,
}

/// Brings a member's tier roles in line with their lifetime total: every
/// other tier's role is removed and the resolved tier's role is added.
///
/// Best-effort. Each call is bounded by `limit`, and failures are logged and
/// counted but never propagated.
pub async fn reconcile_roles(
    gateway: &dyn RoleGateway,
    guild_id: u64,
    user_id: u64,
    total_donated: f64,
    tiers: &[DonorTier],
    limit: Duration,
) -> RoleReconciliation {
    let target = tier_for(total_donated, tiers);
    let mut report = RoleReconciliation {
        tier: target.map(|tier| tier.name.clone()),
        ..RoleReconciliation::default()
    };
    if tiers.is_empty() {
        return report;
    }

    let held = match timeout(limit, gateway.member_roles(guild_id, user_id)).await {
        Ok(Ok(held)) => held,
        Ok(Err(err)) => {
            msg!("could not read roles of {} in {}: {}", user_id, guild_id, err);
            report.failures += 1;
            return report;
        }
        Err(_) => {
            msg!("timed out reading roles of {} in {}", user_id, guild_id);
            report.failures += 1;
            return report;
        }
    };

    let target_role = target.map(|tier| tier.role_id);
    for tier in tiers {
        if Some(tier.role_id) == target_role || !held.contains(&tier.role_id) {
            continue;
        }
        match timeout(limit, gateway.remove_role(guild_id, user_id, tier.role_id)).await {
            Ok(Ok(())) => report.removed.push(tier.role_id),
            Ok(Err(err)) => {
                msg!("could not remove role {} from {}: {}", tier.role_id, user_id, err);
                report.failures += 1;
            }
            Err(_) => {
                msg!("timed out removing role {} from {}", tier.role_id, user_id);
                report.failures += 1;
            }
        }
    }

    if let Some(role_id) = target_role.filter(|role_id| !held.contains(role_id)) {
        match timeout(limit, gateway.add_role(guild_id, user_id, role_id)).await {
            Ok(Ok(())) => report.added.push(role_id),
            Ok(Err(err)) => {
                msg!("could not add role {} to {}: {}", role_id, user_id, err);
                report.failures += 1;
            }
            Err(_) => {
                msg!("timed out adding role {} to {}", role_id, user_id);
                report.failures += 1;
            }
        }
    }

    report
}
