use std::sync::Arc;
use std::time::Duration;

use anchor_lang::prelude::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    constants::NOTIFY_AHEAD_SECS,
    error::{user_message, DrawError},
    instructions::select_winner,
    ledger::GuildLedger,
    randomness::{EntropySource, OsEntropy},
    state::{Document, Draw, DrawId, WinnerRecord},
};

/// Work a scheduler tick found due.
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerEvent {
    /// The draw fires within the notice window and nobody has been told yet
    NotifyUpcoming(DrawId),
    /// The draw's time has come
    PickWinner(DrawId),
}

fn pending_event(draw: &Draw, now: DateTime<Utc>) -> Option<SchedulerEvent> {
    if !draw.active {
        return None;
    }
    let draw_time = draw.draw_time?;
    if draw_time <= now {
        Some(SchedulerEvent::PickWinner(draw.id.clone()))
    } else if !draw.notification_sent
        && draw_time - now <= chrono::Duration::seconds(NOTIFY_AHEAD_SECS)
    {
        Some(SchedulerEvent::NotifyUpcoming(draw.id.clone()))
    } else {
        None
    }
}

/// Scans a guild's scheduled draws.
///
/// Only active draws fire. An upcoming notice is marked as sent on the
/// document so overlapping ticks announce it once; a due draw stays due until
/// its pick clears `draw_time`.
pub fn tick(document: &mut Document, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    for draw in document.draws.values_mut() {
        let Some(event) = pending_event(draw, now) else {
            continue;
        };
        if matches!(event, SchedulerEvent::NotifyUpcoming(_)) {
            draw.notification_sent = true;
        }
        events.push(event);
    }
    events
}

/// True when [`tick`] would find something to do. Leaves the document alone.
pub fn has_due_work(document: &Document, now: DateTime<Utc>) -> bool {
    document
        .draws
        .values()
        .any(|draw| pending_event(draw, now).is_some())
}

/// What a tick produced, ready to be announced.
#[derive(Clone, Debug, PartialEq)]
pub enum ScheduledOutcome {
    Upcoming {
        draw_id: DrawId,
        draw_name: String,
        reward: String,
        draw_time: String,
    },
    Winner(WinnerRecord),
    /// The draw fired with nobody entered; its schedule is dropped
    NoWinner { draw_id: DrawId, draw_name: String },
}

/// Runs one tick and carries out every pick it found due.
///
/// Runs inside a single ledger mutation, so a pick and the schedule it
/// consumes are saved together.
pub fn fire_due(
    document: &mut Document,
    now: DateTime<Utc>,
    source: &mut impl EntropySource,
) -> Result<Vec<ScheduledOutcome>> {
    let mut outcomes = Vec::new();
    for event in tick(document, now) {
        match event {
            SchedulerEvent::NotifyUpcoming(draw_id) => {
                let Some(draw) = document.draws.get(&draw_id) else {
                    continue;
                };
                outcomes.push(ScheduledOutcome::Upcoming {
                    draw_id,
                    draw_name: draw.name.clone(),
                    reward: draw.reward.clone(),
                    draw_time: draw.draw_time_formatted.clone().unwrap_or_default(),
                });
            }
            SchedulerEvent::PickWinner(draw_id) => {
                match select_winner(document, &draw_id, source, now) {
                    Ok(record) => outcomes.push(ScheduledOutcome::Winner(record)),
                    Err(err) if err == anchor_lang::error::Error::from(DrawError::NoEntries) => {
                        let Some(draw) = document.draws.get_mut(&draw_id) else {
                            continue;
                        };
                        draw.set_draw_time(None);
                        outcomes.push(ScheduledOutcome::NoWinner {
                            draw_id,
                            draw_name: draw.name.clone(),
                        });
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }
    Ok(outcomes)
}

pub fn render_outcome(outcome: &ScheduledOutcome) -> String {
    match outcome {
        ScheduledOutcome::Upcoming {
            draw_name,
            reward,
            draw_time,
            ..
        } => format!("**{draw_name}** ({reward}) will be drawn at {draw_time}. Last chance to enter!"),
        ScheduledOutcome::Winner(record) => format!(
            "<@{}> won **{}** ({}) with {} of {} entries ({:.1}% odds)!",
            record.winner_id,
            record.draw_name,
            record.reward,
            record.winner_entries,
            record.total_entries,
            record.odds() * 100.0
        ),
        ScheduledOutcome::NoWinner { draw_name, .. } => {
            format!("**{draw_name}** reached its draw time with no entries, so there is no winner.")
        }
    }
}

/// Delivers scheduler announcements to a guild channel.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, channel_id: u64, text: String);
}

/// Ticks every guild once and announces what fired.
///
/// Guilds with nothing due are only read, so idle ticks never write the
/// document or rotate its backups.
pub async fn run_once(
    ledger: &GuildLedger,
    announcer: &dyn Announcer,
    guild_ids: &[u64],
    now: DateTime<Utc>,
) {
    for guild_id in guild_ids {
        match ledger
            .read(*guild_id, |document| has_due_work(document, now))
            .await
        {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                msg!("scheduler could not read guild {}: {}", guild_id, user_message(&err));
                continue;
            }
        }
        let committed = ledger
            .with_document(*guild_id, |document| {
                let outcomes = fire_due(document, now, &mut OsEntropy)?;
                Ok((outcomes, document.config.announcement_channel_id))
            })
            .await;
        let (outcomes, channel_id) = match committed {
            Ok(committed) => committed.value,
            Err(err) => {
                msg!("scheduler tick failed for guild {}: {}", guild_id, user_message(&err));
                continue;
            }
        };
        if outcomes.is_empty() {
            continue;
        }
        let Some(channel_id) = channel_id else {
            msg!("guild {} has scheduled results but no announcement channel", guild_id);
            continue;
        };
        for outcome in &outcomes {
            announcer.announce(channel_id, render_outcome(outcome)).await;
        }
    }
}

/// Polls every known guild at a fixed period until the task is dropped.
pub async fn run(
    ledger: Arc<GuildLedger>,
    announcer: Arc<dyn Announcer>,
    period: Duration,
    guild_ids: impl Fn() -> Vec<u64> + Send,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        run_once(&ledger, announcer.as_ref(), &guild_ids(), Utc::now()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::instructions::test_support::document_with_draw;
    use crate::instructions::{allocate_entries, reset_leaderboard, AllocationRequest};
    use crate::randomness::SeededEntropy;
    use crate::store::{JsonFileStore, MemoryStore};

    fn scheduled(at: DateTime<Utc>) -> Document {
        let mut doc = document_with_draw("weekly", 5.0, 100.0, 100);
        doc.draws.get_mut("weekly").unwrap().set_draw_time(Some(at));
        doc
    }

    #[test]
    fn notifies_once_inside_window() {
        let now = Utc::now();
        let mut doc = scheduled(now + ChronoDuration::minutes(10));
        assert_eq!(
            tick(&mut doc, now),
            vec![SchedulerEvent::NotifyUpcoming("weekly".into())]
        );
        assert!(doc.draws["weekly"].notification_sent);
        assert!(tick(&mut doc, now).is_empty());
    }

    #[test]
    fn far_future_and_inactive_draws_stay_quiet() {
        let now = Utc::now();
        let mut doc = scheduled(now + ChronoDuration::hours(5));
        assert!(tick(&mut doc, now).is_empty());

        let mut doc = scheduled(now - ChronoDuration::minutes(1));
        doc.draws.get_mut("weekly").unwrap().active = false;
        assert!(tick(&mut doc, now).is_empty());
    }

    #[test]
    fn due_draw_is_picked_once() {
        let now = Utc::now();
        let mut doc = scheduled(now - ChronoDuration::seconds(5));
        doc.add_entries("weekly", 42, 3).unwrap();

        let outcomes = fire_due(&mut doc, now, &mut SeededEntropy::new(1)).unwrap();
        assert!(matches!(&outcomes[..], [ScheduledOutcome::Winner(record)] if record.winner_id == 42));
        assert!(doc.draws["weekly"].draw_time.is_none());
        assert_eq!(doc.draw_history.len(), 1);

        assert!(fire_due(&mut doc, now, &mut SeededEntropy::new(1)).unwrap().is_empty());
    }

    #[test]
    fn empty_due_draw_drops_its_schedule() {
        let now = Utc::now();
        let mut doc = scheduled(now - ChronoDuration::seconds(5));
        let outcomes = fire_due(&mut doc, now, &mut SeededEntropy::new(1)).unwrap();
        assert!(matches!(&outcomes[..], [ScheduledOutcome::NoWinner { .. }]));
        assert!(doc.draws["weekly"].draw_time.is_none());
        assert!(doc.draw_history.is_empty());
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(u64, String)>>,
    }

    #[async_trait]
    impl Announcer for Recorder {
        async fn announce(&self, channel_id: u64, text: String) {
            self.sent.lock().unwrap().push((channel_id, text));
        }
    }

    #[tokio::test]
    async fn run_once_announces_in_configured_channel() {
        let ledger = GuildLedger::new(Arc::new(MemoryStore::default()));
        let now = Utc::now();
        ledger
            .with_document(3, |doc| {
                *doc = scheduled(now - ChronoDuration::seconds(1));
                doc.add_entries("weekly", 9, 1)?;
                doc.config.announcement_channel_id = Some(555);
                Ok(())
            })
            .await
            .unwrap();

        let recorder = Recorder::default();
        run_once(&ledger, &recorder, &[3], now).await;
        run_once(&ledger, &recorder, &[3], now).await;

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 555);
        assert!(sent[0].1.starts_with("<@9> won **WEEKLY**"));
    }

    #[test]
    fn due_work_check_matches_tick() {
        let now = Utc::now();
        let mut doc = scheduled(now + ChronoDuration::minutes(10));
        assert!(has_due_work(&doc, now));
        tick(&mut doc, now);
        assert!(!has_due_work(&doc, now));
        assert!(has_due_work(&doc, now + ChronoDuration::minutes(11)));
        assert!(!has_due_work(&scheduled(now + ChronoDuration::hours(5)), now));
    }

    #[tokio::test]
    async fn idle_ticks_keep_earlier_backups() {
        let root = std::env::temp_dir().join(format!("tipdraw-idle-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(JsonFileStore::open(&root).unwrap());
        let ledger = GuildLedger::new(store.clone());
        let now = Utc::now();
        ledger
            .with_document(4, |doc| {
                *doc = scheduled(now + ChronoDuration::hours(5));
                doc.config.announcement_channel_id = Some(555);
                let request = AllocationRequest {
                    user_id: 8,
                    username: String::new(),
                    usd_amount: 123.0,
                    target_draw_id: Some("weekly".into()),
                    is_vip: false,
                };
                allocate_entries(doc, &request).map(|_| ())
            })
            .await
            .unwrap();
        ledger.with_backup_first(4, reset_leaderboard).await.unwrap();
        let before = store.backups(4);
        assert!(!before.is_empty());

        let recorder = Recorder::default();
        for _ in 0..25 {
            run_once(&ledger, &recorder, &[4], now).await;
        }
        assert_eq!(store.backups(4), before);
        assert!(recorder.sent.lock().unwrap().is_empty());
        std::fs::remove_dir_all(root).ok();
    }
}
