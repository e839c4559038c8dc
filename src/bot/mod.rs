//! # Bot Module
//!
//! Gateway-facing side of the bot: the serenity [`EventHandler`] that turns
//! guild messages into [`commands`] and reports back, plus the HTTP
//! [`Announcer`] the player uses for unsolicited messages.
//!
//! Command semantics live in [`commands::execute`]; this module only handles
//! Discord I/O (replies, direct messages, voice-state cache lookups).

use async_trait::async_trait;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId, VoiceState},
    builder::{CreateAllowedMentions, CreateMessage},
    http::Http,
};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

pub mod commands;

use self::commands::{Command, Invocation, Outcome};
use crate::{
    audio::player::{Announcer, MusicPlayer},
    config::Config,
    error::BotError,
    sources::TrackResolver,
};

/// Main Discord event handler.
///
/// Holds the shared [`MusicPlayer`] (the only owner of guild queues) and the
/// resolver used by `play`.
pub struct QueueBot {
    config: Arc<Config>,
    player: Arc<MusicPlayer>,
    resolver: Arc<dyn TrackResolver>,
}

impl QueueBot {
    pub fn new(
        config: Arc<Config>,
        player: Arc<MusicPlayer>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        Self {
            config,
            player,
            resolver,
        }
    }

    async fn deliver(&self, ctx: &Context, msg: &Message, outcome: Outcome) {
        match outcome {
            Outcome::Reply(content) => reply(ctx, msg, content).await,
            Outcome::SendHelp => self.send_help(ctx, msg).await,
            Outcome::Silent => {}
        }
    }

    async fn send_help(&self, ctx: &Context, msg: &Message) {
        let help = CreateMessage::new().content(commands::help_text(&self.config.command_prefix));

        let sent = msg
            .author
            .direct_message(ctx, help)
            .await
            .map(|_| ())
            .map_err(|e| BotError::Delivery(e.to_string()));
        if let Err(err) = &sent {
            warn!("Could not DM {}: {}", msg.author.name, err);
        }
        reply(ctx, msg, help_followup(sent)).await;
    }
}

/// What to tell the channel after trying to DM the command list.
fn help_followup(sent: Result<(), BotError>) -> String {
    match sent {
        Ok(()) => "📬 I've sent you a DM with the list of commands!".to_string(),
        Err(err) => err.user_message(),
    }
}

/// Track titles come from YouTube, so nothing we post may ping anyone.
fn quiet_message(content: impl Into<String>) -> CreateMessage {
    CreateMessage::new()
        .content(content)
        .allowed_mentions(CreateAllowedMentions::new())
}

async fn reply(ctx: &Context, msg: &Message, content: impl Into<String>) {
    let message = quiet_message(content).reference_message(msg);
    if let Err(e) = msg.channel_id.send_message(ctx, message).await {
        error!("Error sending reply in channel {}: {:?}", msg.channel_id, e);
    }
}

/// The voice channel `user_id` currently sits in, from the gateway cache.
fn voice_channel_of(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[async_trait]
impl EventHandler for QueueBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(&msg.content, &self.config.command_prefix) else {
            return;
        };

        info!(
            "📝 {}{} used by {} in guild {}",
            self.config.command_prefix,
            command.name(),
            msg.author.name,
            guild_id
        );

        let invocation = Invocation {
            voice_channel: voice_channel_of(&ctx, guild_id, msg.author.id),
            text_channel: msg.channel_id,
        };
        let outcome = commands::execute(
            &self.player,
            self.resolver.as_ref(),
            guild_id,
            invocation,
            command,
        )
        .await;

        self.deliver(&ctx, &msg, outcome).await;
    }

    /// Resets the guild's queue when someone else disconnects the bot while
    /// it is playing.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        if self.player.is_playing(guild_id).await {
            info!("🔌 Bot disconnected from voice in guild {}", guild_id);
            self.player.reset(guild_id).await;
        }
    }
}

/// Posts player announcements through the client's REST handle.
///
/// The player is built before the client, so the handle is attached once the
/// client exists and shares its rate limiter.
#[derive(Default)]
pub struct HttpAnnouncer {
    http: OnceLock<Arc<Http>>,
}

impl HttpAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, http: Arc<Http>) {
        if self.http.set(http).is_err() {
            warn!("Announcer already has an HTTP client attached");
        }
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn announce(&self, channel: ChannelId, content: String) {
        let Some(http) = self.http.get() else {
            warn!("Dropping announcement for channel {}: client not ready", channel);
            return;
        };
        if let Err(e) = channel.send_message(http, quiet_message(content)).await {
            error!("Error sending announcement to channel {}: {:?}", channel, e);
        }
    }
}
