//! Prefixed text commands: parsing into [`Command`] and running them
//! against a guild's ledger.

use anchor_lang::prelude::*;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{
    constants::DEFAULT_LEADERBOARD_SIZE,
    error::{user_message, DrawError},
    instructions::{
        add_currency, add_recipient, add_tier, apply_setting, assign_entries,
        cancel_draw_schedule, create_draw, draw_summaries, edit_draw, leaderboard, remove_currency,
        remove_recipient, remove_tier, reset_draw, reset_leaderboard, schedule_draw,
        select_winner, user_stats, ConfigSetting, CreateDrawParams, DrawSummary, DrawUpdate,
    },
    ledger::{Committed, GuildLedger},
    randomness::EntropySource,
    scheduler::{render_outcome, ScheduledOutcome},
    state::{DonorTier, DrawId, Recipient, UserId},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScheduleAt {
    At(DateTime<Utc>),
    In(chrono::Duration),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    DrawCreate(CreateDrawParams),
    DrawEdit { id: DrawId, update: DrawUpdate },
    DrawReset(DrawId),
    DrawSchedule { id: DrawId, when: ScheduleAt },
    DrawCancel(DrawId),
    DrawList,
    DrawPick(DrawId),
    EntriesAssign {
        user_id: UserId,
        draw_id: DrawId,
        entry_count: u64,
        usd_amount: f64,
    },
    CurrencyAdd(String),
    CurrencyRemove(String),
    CurrencyList,
    RecipientAdd(Recipient),
    RecipientRemove(Recipient),
    TierAdd(DonorTier),
    TierRemove(String),
    TierList,
    Config(ConfigSetting),
    Leaderboard(usize),
    LeaderboardReset,
    Stats(Option<UserId>),
}

impl Command {
    /// Listing and personal stats are open to everyone; everything else
    /// needs the admin role or the administrator permission.
    pub fn requires_admin(&self) -> bool {
        !matches!(
            self,
            Command::DrawList
                | Command::CurrencyList
                | Command::TierList
                | Command::Leaderboard(_)
                | Command::Stats(_)
        )
    }
}

/// Splits arguments on whitespace, keeping `"quoted text"` together.
fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => {
                if quoted {
                    args.push(std::mem::take(&mut current));
                } else if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

fn invalid<T>() -> Result<T> {
    Err(DrawError::InvalidCommand.into())
}

fn arg<'a>(args: &'a [String], index: usize) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => invalid(),
    }
}

fn amount(raw: &str) -> Result<f64> {
    match raw.trim_start_matches('$').parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => invalid(),
    }
}

fn count(raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| DrawError::InvalidCommand.into())
}

/// A snowflake given raw or wrapped as `<@id>`, `<@!id>`, `<@&id>` or `<#id>`.
fn snowflake(raw: &str) -> Result<u64> {
    let body = raw
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.trim_start_matches(|c: char| matches!(c, '@' | '!' | '&' | '#')))
        .unwrap_or(raw);
    body.parse().map_err(|_| DrawError::InvalidCommand.into())
}

fn optional_snowflake(raw: &str) -> Result<Option<u64>> {
    if matches!(raw.to_ascii_lowercase().as_str(), "none" | "off" | "clear") {
        return Ok(None);
    }
    snowflake(raw).map(Some)
}

fn flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => invalid(),
    }
}

fn recipient(raw: &str) -> Result<Recipient> {
    let id = snowflake(raw)?;
    Ok(if raw.starts_with("<@&") {
        Recipient::Role(id)
    } else {
        Recipient::User(id)
    })
}

/// `YYYY-MM-DD HH:MM` in UTC, or an offset such as `+30m`, `+2h`, `+1d`.
fn schedule_at(args: &[String]) -> Result<ScheduleAt> {
    let first = arg(args, 0)?;
    if let Some(offset) = first.strip_prefix('+') {
        let Some(unit) = offset.chars().last() else {
            return invalid();
        };
        let value: i64 = offset[..offset.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| DrawError::InvalidCommand)?;
        let duration = match unit {
            'm' => chrono::Duration::try_minutes(value),
            'h' => chrono::Duration::try_hours(value),
            'd' => chrono::Duration::try_days(value),
            _ => return invalid(),
        };
        return duration
            .map(ScheduleAt::In)
            .ok_or_else(|| DrawError::InvalidCommand.into());
    }
    let stamp = format!("{} {}", first, arg(args, 1)?);
    NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M")
        .map(|naive| ScheduleAt::At(naive.and_utc()))
        .map_err(|_| DrawError::InvalidCommand.into())
}

fn parse_draw_update(pairs: &[String]) -> Result<DrawUpdate> {
    let mut update = DrawUpdate::default();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return invalid();
        };
        match key.to_ascii_lowercase().as_str() {
            "name" => update.name = Some(value.to_string()),
            "min" => update.min_amount = Some(amount(value)?),
            "max" => update.max_amount = Some(amount(value)?),
            "entries" => update.max_entries = Some(count(value)?),
            "reward" => update.reward = Some(value.to_string()),
            "active" => update.active = Some(flag(value)?),
            "manual" => update.manual_entries_only = Some(flag(value)?),
            "vip" => update.vip_only = Some(flag(value)?),
            _ => return invalid(),
        }
    }
    require!(!update.is_empty(), DrawError::InvalidCommand);
    Ok(update)
}

fn parse_config(args: &[String]) -> Result<ConfigSetting> {
    let value = arg(args, 1)?;
    Ok(match arg(args, 0)?.to_ascii_lowercase().as_str() {
        "admin-role" => ConfigSetting::AdminRole(optional_snowflake(value)?),
        "vip-role" => ConfigSetting::VipRole(optional_snowflake(value)?),
        "announce-channel" => ConfigSetting::AnnouncementChannel(optional_snowflake(value)?),
        "log-channel" => ConfigSetting::LogChannel(optional_snowflake(value)?),
        "auto-entries" => ConfigSetting::AutoEntries(flag(value)?),
        "role-rewards" => ConfigSetting::RoleRewards(flag(value)?),
        "multi-draw" => ConfigSetting::MultiDrawFallback(flag(value)?),
        _ => return invalid(),
    })
}

fn parse_args(group: &str, args: &[String]) -> Result<Command> {
    let action = args.first().map(|action| action.to_ascii_lowercase());
    let rest = args.get(1..).unwrap_or_default();
    let tail = rest.get(1..).unwrap_or_default();
    let command = match (group, action.as_deref()) {
        ("draw", Some("create")) => Command::DrawCreate(CreateDrawParams {
            id: arg(rest, 0)?.to_string(),
            min_amount: amount(arg(rest, 1)?)?,
            max_amount: amount(arg(rest, 2)?)?,
            max_entries: count(arg(rest, 3)?)?,
            name: arg(rest, 4)?.to_string(),
            reward: rest.get(5).cloned().unwrap_or_default(),
        }),
        ("draw", Some("edit")) => Command::DrawEdit {
            id: arg(rest, 0)?.to_string(),
            update: parse_draw_update(tail)?,
        },
        ("draw", Some("reset")) => Command::DrawReset(arg(rest, 0)?.to_string()),
        ("draw", Some("schedule")) => Command::DrawSchedule {
            id: arg(rest, 0)?.to_string(),
            when: schedule_at(tail)?,
        },
        ("draw", Some("cancel")) => Command::DrawCancel(arg(rest, 0)?.to_string()),
        ("draw", Some("list")) | ("draws", None) => Command::DrawList,
        ("draw", Some("pick")) => Command::DrawPick(arg(rest, 0)?.to_string()),
        ("entries", Some("assign")) => Command::EntriesAssign {
            user_id: snowflake(arg(rest, 0)?)?,
            draw_id: arg(rest, 1)?.to_string(),
            entry_count: count(arg(rest, 2)?)?,
            usd_amount: rest.get(3).map_or(Ok(0.0), |raw| amount(raw))?,
        },
        ("currency", Some("add")) => Command::CurrencyAdd(arg(rest, 0)?.to_string()),
        ("currency", Some("remove")) => Command::CurrencyRemove(arg(rest, 0)?.to_string()),
        ("currency", Some("list")) => Command::CurrencyList,
        ("recipient", Some("add")) => Command::RecipientAdd(recipient(arg(rest, 0)?)?),
        ("recipient", Some("remove")) => Command::RecipientRemove(recipient(arg(rest, 0)?)?),
        ("tier", Some("add")) => Command::TierAdd(DonorTier {
            name: arg(rest, 0)?.to_string(),
            role_id: snowflake(arg(rest, 1)?)?,
            min_amount: amount(arg(rest, 2)?)?,
            max_amount: rest.get(3).map(|raw| amount(raw)).transpose()?,
        }),
        ("tier", Some("remove")) => Command::TierRemove(arg(rest, 0)?.to_string()),
        ("tier", Some("list")) => Command::TierList,
        ("config", Some(_)) => Command::Config(parse_config(args)?),
        ("leaderboard", None) => Command::Leaderboard(DEFAULT_LEADERBOARD_SIZE),
        ("leaderboard", Some("reset")) => Command::LeaderboardReset,
        ("leaderboard", Some(size)) => {
            Command::Leaderboard(size.parse().map_err(|_| DrawError::InvalidCommand)?)
        }
        ("stats", None) => Command::Stats(None),
        ("stats", Some(_)) => Command::Stats(Some(snowflake(arg(args, 0)?)?)),
        _ => return invalid(),
    };
    Ok(command)
}

/// Parses a chat message as a command.
///
/// `None` means the message is not addressed to this bot: no prefix, or an
/// unknown command word. A known word with bad arguments is `InvalidCommand`.
pub fn parse_command(text: &str, prefix: &str) -> Option<Result<Command>> {
    let body = text.trim().strip_prefix(prefix)?;
    let mut args = split_args(body);
    if args.is_empty() {
        return None;
    }
    let group = args.remove(0).to_ascii_lowercase();
    if !matches!(
        group.as_str(),
        "draw" | "draws" | "entries" | "currency" | "recipient" | "tier" | "config" | "leaderboard" | "stats"
    ) {
        return None;
    }
    Some(parse_args(&group, &args))
}

/// Who sent a command.
#[derive(Clone, Debug)]
pub struct Invoker {
    pub user_id: UserId,
    pub is_admin: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommandReply {
    pub text: String,
    /// A donor whose lifetime total changed and whose tier roles need a sync
    pub donor_touched: Option<UserId>,
    /// True when a mutation ran but its document could not be saved
    pub unsaved: bool,
}

impl CommandReply {
    fn text(text: impl Into<String>) -> Self {
        CommandReply {
            text: text.into(),
            donor_touched: None,
            unsaved: false,
        }
    }
}

fn money(value: f64) -> String {
    format!("${value:.2}")
}

fn describe_summary(summary: &DrawSummary) -> String {
    let range = match summary.max_amount {
        Some(max) => format!("{} to {}", money(summary.min_amount), money(max)),
        None => format!("{} and up", money(summary.min_amount)),
    };
    let mut line = format!(
        "`#{}` **{}**: {}, {}/{} entries, {} participants, 1 entry per {}",
        summary.id,
        summary.name,
        range,
        summary.total_entries,
        summary.max_entries,
        summary.participants,
        money(summary.min_amount)
    );
    if !summary.reward.is_empty() {
        line.push_str(&format!(", reward: {}", summary.reward));
    }
    if let Some(draw_time) = &summary.draw_time {
        line.push_str(&format!(", drawn at {draw_time}"));
    }
    if !summary.active {
        line.push_str(" (inactive)");
    }
    line
}

async fn mutate<T>(
    ledger: &GuildLedger,
    guild_id: u64,
    action: impl FnOnce(&mut crate::state::Document) -> Result<T>,
    render: impl FnOnce(T) -> String,
) -> Result<CommandReply> {
    let Committed { value, persisted } = ledger.with_document(guild_id, action).await?;
    Ok(CommandReply {
        text: render(value),
        donor_touched: None,
        unsaved: !persisted,
    })
}

async fn run(
    ledger: &GuildLedger,
    guild_id: u64,
    invoker: &Invoker,
    command: Command,
    now: DateTime<Utc>,
    source: &mut impl EntropySource,
) -> Result<CommandReply> {
    require!(
        invoker.is_admin || !command.requires_admin(),
        DrawError::NotAuthorized
    );

    match command {
        Command::DrawCreate(params) => mutate(
            ledger,
            guild_id,
            |doc| create_draw(doc, params, now),
            |draw| {
                format!(
                    "Created {}",
                    describe_summary(&DrawSummary::from(&draw))
                )
            },
        )
        .await,
        Command::DrawEdit { id, update } => mutate(
            ledger,
            guild_id,
            |doc| edit_draw(doc, &id, update),
            |draw| format!("Updated {}", describe_summary(&DrawSummary::from(&draw))),
        )
        .await,
        Command::DrawReset(id) => mutate(
            ledger,
            guild_id,
            |doc| reset_draw(doc, &id),
            |cleared| format!("Cleared {cleared} entries from `#{id}`."),
        )
        .await,
        Command::DrawSchedule { id, when } => {
            let fire_at = match when {
                ScheduleAt::At(at) => at,
                ScheduleAt::In(offset) => now
                    .checked_add_signed(offset)
                    .ok_or(DrawError::InvalidCommand)?,
            };
            mutate(
                ledger,
                guild_id,
                |doc| schedule_draw(doc, &id, fire_at, now),
                |draw| {
                    format!(
                        "`#{}` will be drawn at {}.",
                        draw.id,
                        draw.draw_time_formatted.unwrap_or_default()
                    )
                },
            )
            .await
        }
        Command::DrawCancel(id) => mutate(
            ledger,
            guild_id,
            |doc| cancel_draw_schedule(doc, &id),
            |previous| {
                format!(
                    "Cancelled the draw of `#{id}` scheduled for {}.",
                    crate::state::format_draw_time(previous)
                )
            },
        )
        .await,
        Command::DrawList => {
            let summaries = ledger.read(guild_id, draw_summaries).await?;
            if summaries.is_empty() {
                return Ok(CommandReply::text("No draws yet."));
            }
            let lines: Vec<String> = summaries.iter().map(describe_summary).collect();
            Ok(CommandReply::text(lines.join("\n")))
        }
        Command::DrawPick(id) => mutate(
            ledger,
            guild_id,
            |doc| select_winner(doc, &id, source, now),
            |record| render_outcome(&ScheduledOutcome::Winner(record)),
        )
        .await,
        Command::EntriesAssign {
            user_id,
            draw_id,
            entry_count,
            usd_amount,
        } => {
            let mut reply = mutate(
                ledger,
                guild_id,
                |doc| assign_entries(doc, user_id, "", &draw_id, entry_count, usd_amount),
                |assigned| {
                    let mut text = format!(
                        "Gave <@{user_id}> {} entries in **{}**.",
                        assigned.entry_count, assigned.draw_name
                    );
                    if assigned.is_full {
                        text.push_str(&format!(
                            " Only {} of {} fit, the draw is now full.",
                            assigned.entry_count, assigned.requested
                        ));
                    }
                    text
                },
            )
            .await?;
            if usd_amount > 0.0 {
                reply.donor_touched = Some(user_id);
            }
            Ok(reply)
        }
        Command::CurrencyAdd(symbol) => mutate(
            ledger,
            guild_id,
            |doc| add_currency(doc, &symbol),
            |symbol| format!("{symbol} is now accepted."),
        )
        .await,
        Command::CurrencyRemove(symbol) => mutate(
            ledger,
            guild_id,
            |doc| remove_currency(doc, &symbol),
            |symbol| format!("{symbol} is no longer accepted."),
        )
        .await,
        Command::CurrencyList => {
            let accepted = ledger
                .read(guild_id, |doc| doc.config.accepted_currencies.join(", "))
                .await?;
            Ok(CommandReply::text(format!("Accepted currencies: {accepted}")))
        }
        Command::RecipientAdd(recipient) => mutate(
            ledger,
            guild_id,
            |doc| add_recipient(doc, recipient),
            |()| format!("{} now receives donations.", mention(recipient)),
        )
        .await,
        Command::RecipientRemove(recipient) => mutate(
            ledger,
            guild_id,
            |doc| remove_recipient(doc, recipient),
            |()| format!("{} no longer receives donations.", mention(recipient)),
        )
        .await,
        Command::TierAdd(tier) => {
            let name = tier.name.clone();
            mutate(
                ledger,
                guild_id,
                |doc| add_tier(doc, tier),
                |()| format!("Added tier **{name}**."),
            )
            .await
        }
        Command::TierRemove(name) => mutate(
            ledger,
            guild_id,
            |doc| remove_tier(doc, &name),
            |tier| format!("Removed tier **{}**.", tier.name),
        )
        .await,
        Command::TierList => {
            let tiers = ledger.read(guild_id, |doc| doc.config.tiers.clone()).await?;
            if tiers.is_empty() {
                return Ok(CommandReply::text("No donor tiers configured."));
            }
            let lines: Vec<String> = tiers
                .iter()
                .map(|tier| match tier.max_amount {
                    Some(max) => format!(
                        "**{}** <@&{}>: {} to {}",
                        tier.name,
                        tier.role_id,
                        money(tier.min_amount),
                        money(max)
                    ),
                    None => format!(
                        "**{}** <@&{}>: {} and up",
                        tier.name,
                        tier.role_id,
                        money(tier.min_amount)
                    ),
                })
                .collect();
            Ok(CommandReply::text(lines.join("\n")))
        }
        Command::Config(setting) => mutate(
            ledger,
            guild_id,
            |doc| {
                apply_setting(doc, setting);
                Ok(())
            },
            |()| "Setting updated.".to_string(),
        )
        .await,
        Command::Leaderboard(size) => {
            let rows = ledger.read(guild_id, |doc| leaderboard(doc, size)).await?;
            if rows.is_empty() {
                return Ok(CommandReply::text("No donations yet."));
            }
            let lines: Vec<String> = rows
                .iter()
                .enumerate()
                .map(|(rank, row)| format!("{}. <@{}> {}", rank + 1, row.user_id, money(row.total_donated)))
                .collect();
            Ok(CommandReply::text(lines.join("\n")))
        }
        Command::LeaderboardReset => {
            let Committed { value, persisted } =
                ledger.with_backup_first(guild_id, reset_leaderboard).await?;
            Ok(CommandReply {
                text: format!("Leaderboard reset and {value} entries cleared. A backup was taken first."),
                donor_touched: None,
                unsaved: !persisted,
            })
        }
        Command::Stats(target) => {
            let user_id = target.unwrap_or(invoker.user_id);
            let Some(stats) = ledger
                .read(guild_id, |doc| user_stats(doc, user_id))
                .await?
            else {
                return Ok(CommandReply::text(format!("<@{user_id}> has not donated yet.")));
            };
            let mut lines = vec![format!(
                "<@{user_id}> donated {} and won {} time{}.",
                money(stats.total_donated),
                stats.wins,
                if stats.wins == 1 { "" } else { "s" }
            )];
            for stake in &stats.stakes {
                lines.push(format!(
                    "`#{}`: {} entries ({:.1}% chance)",
                    stake.draw_id,
                    stake.entries,
                    stake.odds * 100.0
                ));
            }
            Ok(CommandReply::text(lines.join("\n")))
        }
    }
}

fn mention(recipient: Recipient) -> String {
    match recipient {
        Recipient::User(id) => format!("<@{id}>"),
        Recipient::Role(id) => format!("<@&{id}>"),
    }
}

/// Runs a command and renders the result, errors included, as chat text.
pub async fn execute(
    ledger: &GuildLedger,
    guild_id: u64,
    invoker: &Invoker,
    command: Command,
    now: DateTime<Utc>,
    source: &mut impl EntropySource,
) -> CommandReply {
    match run(ledger, guild_id, invoker, command, now, source).await {
        Ok(mut reply) => {
            if reply.unsaved {
                reply.text.push_str("\nWarning: the change could not be saved.");
            }
            reply
        }
        Err(err) => {
            msg!("guild {}: command by {} failed: {}", guild_id, invoker.user_id, err);
            CommandReply::text(user_message(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anchor_lang::error::Error;
    use chrono::TimeZone;

    use super::*;
    use crate::randomness::SeededEntropy;
    use crate::store::MemoryStore;

    fn parse(text: &str) -> Result<Command> {
        parse_command(text, "!").unwrap()
    }

    const ADMIN: Invoker = Invoker {
        user_id: 1,
        is_admin: true,
    };
    const MEMBER: Invoker = Invoker {
        user_id: 2,
        is_admin: false,
    };

    async fn run_text(ledger: &GuildLedger, invoker: &Invoker, text: &str) -> CommandReply {
        let command = parse(text).unwrap();
        execute(ledger, 9, invoker, command, Utc::now(), &mut SeededEntropy::new(3)).await
    }

    #[test]
    fn quoted_arguments_stay_together() {
        assert_eq!(
            split_args(r#"create small 5 20 100 "Small Pot" "Steam key""#),
            vec!["create", "small", "5", "20", "100", "Small Pot", "Steam key"]
        );
    }

    #[test]
    fn parses_draw_create() {
        let command = parse(r#"!draw create Small 5 19.99 100 "Small Pot" "$25 card""#).unwrap();
        assert_eq!(
            command,
            Command::DrawCreate(CreateDrawParams {
                id: "Small".into(),
                name: "Small Pot".into(),
                min_amount: 5.0,
                max_amount: 19.99,
                reward: "$25 card".into(),
                max_entries: 100,
            })
        );
    }

    #[test]
    fn parses_edit_schedule_and_mentions() {
        let command = parse("!draw edit big min=10 active=off").unwrap();
        let Command::DrawEdit { update, .. } = command else {
            panic!("expected an edit");
        };
        assert_eq!(update.min_amount, Some(10.0));
        assert_eq!(update.active, Some(false));

        assert_eq!(
            parse("!draw schedule big 2030-01-02 18:30").unwrap(),
            Command::DrawSchedule {
                id: "big".into(),
                when: ScheduleAt::At(Utc.with_ymd_and_hms(2030, 1, 2, 18, 30, 0).unwrap()),
            }
        );
        assert_eq!(
            parse("!draw schedule big +2h").unwrap(),
            Command::DrawSchedule {
                id: "big".into(),
                when: ScheduleAt::In(chrono::Duration::hours(2)),
            }
        );
        assert_eq!(
            parse("!recipient add <@&77>").unwrap(),
            Command::RecipientAdd(Recipient::Role(77))
        );
        assert_eq!(
            parse("!entries assign <@!5> big 3 $15").unwrap(),
            Command::EntriesAssign {
                user_id: 5,
                draw_id: "big".into(),
                entry_count: 3,
                usd_amount: 15.0,
            }
        );
    }

    #[test]
    fn unknown_words_are_not_commands() {
        assert!(parse_command("hello there", "!").is_none());
        assert!(parse_command("!play music", "!").is_none());
        assert!(parse_command("!", "!").is_none());
        assert_eq!(
            parse("!draw create small five").unwrap_err(),
            Error::from(DrawError::InvalidCommand)
        );
        assert!(parse("!draw edit big colour=red").is_err());
    }

    #[tokio::test]
    async fn members_cannot_run_admin_commands() {
        let ledger = GuildLedger::new(Arc::new(MemoryStore::default()));
        let reply = run_text(&ledger, &MEMBER, "!draw create small 5 20 100 Small").await;
        assert_eq!(reply.text, "Only admins may run this command");
        assert_eq!(run_text(&ledger, &MEMBER, "!draw list").await.text, "No draws yet.");
    }

    #[tokio::test]
    async fn admin_flow_create_assign_pick() {
        let ledger = GuildLedger::new(Arc::new(MemoryStore::default()));
        let created =
            run_text(&ledger, &ADMIN, r#"!draw create small 5 0 100 "Small Pot" prize"#).await;
        assert!(created.text.starts_with("Created `#small` **Small Pot**: $5.00 and up"));

        let assigned = run_text(&ledger, &ADMIN, "!entries assign <@5> small 150 $30").await;
        assert!(assigned.text.contains("Only 100 of 150 fit"));
        assert_eq!(assigned.donor_touched, Some(5));

        let picked = run_text(&ledger, &ADMIN, "!draw pick small").await;
        assert!(picked.text.starts_with("<@5> won **Small Pot**"));

        let stats = run_text(&ledger, &MEMBER, "!stats <@5>").await;
        assert!(stats.text.starts_with("<@5> donated $30.00 and won 1 time."));
        assert!(stats.text.contains("`#small`: 100 entries (100.0% chance)"));
    }

    #[tokio::test]
    async fn errors_render_as_messages() {
        let ledger = GuildLedger::new(Arc::new(MemoryStore::default()));
        assert_eq!(
            run_text(&ledger, &ADMIN, "!draw pick ghost").await.text,
            "No draw exists with this id"
        );
        run_text(&ledger, &ADMIN, "!draw create small 5 20 100 Small").await;
        assert_eq!(
            run_text(&ledger, &ADMIN, "!draw pick small").await.text,
            "There are no entries in this draw"
        );
        assert_eq!(
            run_text(&ledger, &ADMIN, "!currency add btc").await.text,
            "This currency is already accepted"
        );
    }

    #[tokio::test]
    async fn leaderboard_and_reset() {
        let ledger = GuildLedger::new(Arc::new(MemoryStore::default()));
        run_text(&ledger, &ADMIN, "!draw create small 5 20 100 Small").await;
        run_text(&ledger, &ADMIN, "!entries assign <@5> small 2 10").await;
        run_text(&ledger, &ADMIN, "!entries assign <@6> small 1 25").await;

        let board = run_text(&ledger, &MEMBER, "!leaderboard").await;
        assert_eq!(board.text, "1. <@6> $25.00\n2. <@5> $10.00");
        assert_eq!(run_text(&ledger, &MEMBER, "!leaderboard 1").await.text, "1. <@6> $25.00");

        let reset = run_text(&ledger, &ADMIN, "!leaderboard reset").await;
        assert!(reset.text.starts_with("Leaderboard reset and 3 entries cleared."));
        assert_eq!(run_text(&ledger, &MEMBER, "!leaderboard").await.text, "No donations yet.");
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        assert_eq!(
            parse("!draw schedule small +9999999999999d").unwrap_err(),
            Error::from(DrawError::InvalidCommand)
        );
        assert!(parse("!draw schedule small +9999999999999999m").is_err());
    }

    #[tokio::test]
    async fn offsets_past_the_calendar_are_refused() {
        let ledger = GuildLedger::new(Arc::new(MemoryStore::default()));
        run_text(&ledger, &ADMIN, "!draw create small 5 20 100 Small").await;
        let reply = run_text(&ledger, &ADMIN, "!draw schedule small +100000000d").await;
        assert_eq!(reply.text, user_message(&Error::from(DrawError::InvalidCommand)));

        let reply = run_text(&ledger, &ADMIN, "!draw schedule small +2h").await;
        assert!(reply.text.starts_with("`#small` will be drawn at"));
    }
}
