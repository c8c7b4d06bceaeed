//! Discord gateway adapter: routes chat messages into the donation pipeline
//! and the command surface, and backs the role and announcement seams with
//! the Discord HTTP API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anchor_lang::prelude::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, Client, Context, EventHandler, GatewayIntents, GuildId, Http, Message, Ready,
    RoleId, UserId as MemberId,
};

use crate::{
    commands::{execute, parse_command, Invoker},
    donation::{render_donation, DonationOutcome, DonationPipeline},
    error::user_message,
    ledger::GuildLedger,
    price::{FixedPriceProvider, PriceProvider, PriceResolver, StablecoinProvider},
    randomness::OsEntropy,
    scheduler::{self, Announcer},
    settings::Settings,
    store::JsonFileStore,
    tiers::{BoxError, RoleGateway},
};

const ROLE_AUDIT_REASON: &str = "donor tier update";

/// Role membership through the Discord HTTP API.
pub struct DiscordRoles {
    http: Arc<Http>,
}

#[async_trait]
impl RoleGateway for DiscordRoles {
    async fn member_roles(&self, guild_id: u64, user_id: u64) -> std::result::Result<Vec<u64>, BoxError> {
        let member = self
            .http
            .get_member(GuildId::new(guild_id), MemberId::new(user_id))
            .await?;
        Ok(member.roles.iter().map(|role| role.get()).collect())
    }

    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> std::result::Result<(), BoxError> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                MemberId::new(user_id),
                RoleId::new(role_id),
                Some(ROLE_AUDIT_REASON),
            )
            .await?;
        Ok(())
    }

    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> std::result::Result<(), BoxError> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                MemberId::new(user_id),
                RoleId::new(role_id),
                Some(ROLE_AUDIT_REASON),
            )
            .await?;
        Ok(())
    }
}

/// Posts plain-text messages to a channel.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn announce(&self, channel_id: u64, text: String) {
        if let Err(err) = ChannelId::new(channel_id).say(&*self.http, text).await {
            msg!("could not post to channel {}: {}", channel_id, err);
        }
    }
}

pub struct Handler {
    pipeline: Arc<DonationPipeline>,
    settings: Settings,
    scheduler_started: AtomicBool,
}

impl Handler {
    pub fn new(pipeline: Arc<DonationPipeline>, settings: Settings) -> Self {
        Handler {
            pipeline,
            settings,
            scheduler_started: AtomicBool::new(false),
        }
    }

    fn ledger(&self) -> &Arc<GuildLedger> {
        self.pipeline.ledger()
    }

    async fn reply(&self, ctx: &Context, channel_id: ChannelId, text: String) {
        if let Err(err) = channel_id.say(&ctx.http, text).await {
            msg!("could not reply in channel {}: {}", channel_id, err);
        }
    }

    /// Raises a problem in the guild's log channel, if one is configured.
    async fn alert(&self, ctx: &Context, guild_id: GuildId, text: String) {
        msg!("guild {}: {}", guild_id, text);
        let channel = self
            .ledger()
            .read(guild_id.get(), |document| document.config.log_channel_id)
            .await
            .ok()
            .flatten();
        if let Some(channel_id) = channel {
            self.reply(ctx, ChannelId::new(channel_id), text).await;
        }
    }

    async fn is_admin(&self, ctx: &Context, guild_id: GuildId, message: &Message) -> bool {
        let admin_role = self
            .ledger()
            .read(guild_id.get(), |document| document.config.admin_role_id)
            .await
            .ok()
            .flatten();
        let member = match guild_id.member(ctx, message.author.id).await {
            Ok(member) => member,
            Err(err) => {
                msg!("could not load member {}: {}", message.author.id, err);
                return false;
            }
        };
        if admin_role.is_some_and(|role_id| member.roles.contains(&RoleId::new(role_id))) {
            return true;
        }
        ctx.cache
            .guild(guild_id)
            .is_some_and(|guild| guild.member_permissions(&member).administrator())
    }

    async fn on_confirmation(&self, ctx: &Context, guild_id: GuildId, message: &Message, now: DateTime<Utc>) {
        match self
            .pipeline
            .handle_confirmation(guild_id.get(), &message.content, now)
            .await
        {
            Ok(DonationOutcome::Recorded(donation)) => {
                if let Some(text) = render_donation(&donation) {
                    self.reply(ctx, message.channel_id, text).await;
                }
                if !donation.persisted {
                    let text = format!(
                        "A ${:.2} donation from <@{}> could not be saved.",
                        donation.usd_amount, donation.donor_id
                    );
                    self.alert(ctx, guild_id, text).await;
                }
            }
            Ok(_) => {}
            Err(err) => {
                let text = format!("Donation processing failed: {}", user_message(&err));
                self.alert(ctx, guild_id, text).await;
            }
        }
    }

    async fn on_command(&self, ctx: &Context, guild_id: GuildId, message: &Message, now: DateTime<Utc>) {
        let Some(parsed) = parse_command(&message.content, &self.settings.command_prefix) else {
            return;
        };
        let command = match parsed {
            Ok(command) => command,
            Err(err) => {
                self.reply(ctx, message.channel_id, user_message(&err)).await;
                return;
            }
        };
        let invoker = Invoker {
            user_id: message.author.id.get(),
            is_admin: command.requires_admin() && self.is_admin(ctx, guild_id, message).await,
        };
        let reply = execute(
            self.ledger(),
            guild_id.get(),
            &invoker,
            command,
            now,
            &mut OsEntropy,
        )
        .await;

        self.reply(ctx, message.channel_id, reply.text.clone()).await;
        if reply.unsaved {
            self.alert(ctx, guild_id, format!("Unsaved change from: {}", message.content))
                .await;
        }
        if let Some(donor_id) = reply.donor_touched {
            if let Err(err) = self.pipeline.sync_donor_roles(guild_id.get(), donor_id).await {
                msg!("role sync for {} failed: {}", donor_id, user_message(&err));
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        msg!("connected as {} to {} guilds", ready.user.name, ready.guilds.len());
        if self.scheduler_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let announcer: Arc<dyn Announcer> = Arc::new(ChannelAnnouncer {
            http: ctx.http.clone(),
        });
        let cache = ctx.cache.clone();
        tokio::spawn(scheduler::run(
            self.ledger().clone(),
            announcer,
            self.settings.scheduler_period,
            move || cache.guilds().into_iter().map(|guild_id| guild_id.get()).collect(),
        ));
    }

    async fn message(&self, ctx: Context, message: Message) {
        let Some(guild_id) = message.guild_id else {
            return;
        };
        let now = Utc::now();
        if message.author.id.get() == self.settings.tipbot_user_id {
            self.on_confirmation(&ctx, guild_id, &message, now).await;
            return;
        }
        if message.author.bot {
            return;
        }
        self.pipeline.observe_user_message(
            &message.content,
            message.author.id.get(),
            message.id.get(),
            message.channel_id.get(),
            now,
        );
        self.on_command(&ctx, guild_id, &message, now).await;
    }
}

fn price_resolver(settings: &Settings) -> PriceResolver {
    let mut providers: Vec<Box<dyn PriceProvider>> = vec![Box::new(StablecoinProvider)];
    if let Some(fixed) = &settings.fixed_prices {
        providers.push(Box::new(FixedPriceProvider::parse(fixed)));
    }
    PriceResolver::new(providers, settings.external_timeout)
}

/// Opens the store, wires the pipeline and runs the gateway client until it
/// stops.
pub async fn start(settings: Settings) -> std::result::Result<(), BoxError> {
    let store = JsonFileStore::open(&settings.data_dir).map_err(|err| user_message(&err))?;
    let ledger = Arc::new(GuildLedger::new(Arc::new(store)));
    let roles: Arc<dyn RoleGateway> = Arc::new(DiscordRoles {
        http: Arc::new(Http::new(&settings.discord_token)),
    });
    let pipeline = Arc::new(DonationPipeline::new(
        ledger,
        price_resolver(&settings),
        roles,
        settings.external_timeout,
    ));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::MESSAGE_CONTENT;
    let token = settings.discord_token.clone();
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler::new(pipeline, settings))
        .await?;
    client.start().await?;
    Ok(())
}
