//! Prefix command surface.
//!
//! Parsing and execution are kept apart from serenity so that every command
//! runs against a [`MusicPlayer`] and a [`TrackResolver`] alone; the event
//! handler only delivers the resulting [`Outcome`].

use serenity::model::id::{ChannelId, GuildId};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::MusicPlayer,
        queue::{Enqueued, SessionTarget},
    },
    error::{BotError, ErrorKind},
    sources::TrackResolver,
};

/// Discord rejects messages longer than this.
const MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Stop,
    Queue,
    Help,
}

impl Command {
    /// Matches the first whitespace-delimited token against `prefix` + name.
    /// Whatever follows, trimmed, is the argument.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let body = content.trim_start().strip_prefix(prefix)?;
        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };

        match name {
            "play" => Some(Self::Play(rest.to_string())),
            "skip" => Some(Self::Skip),
            "stop" => Some(Self::Stop),
            "queue" => Some(Self::Queue),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Play(_) => "play",
            Self::Skip => "skip",
            Self::Stop => "stop",
            Self::Queue => "queue",
            Self::Help => "help",
        }
    }
}

/// Where the command came from.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub voice_channel: Option<ChannelId>,
    pub text_channel: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    /// Playback was started; the player announces it once audio flows.
    Silent,
    /// Direct-message the command list to the author.
    SendHelp,
}

pub fn help_text(prefix: &str) -> String {
    format!(
        "**Music Bot Commands:**\n\
        - `{prefix}play <song name or URL>`: Add a song to the queue and play it.\n\
        - `{prefix}queue`: Display the current song queue.\n\
        - `{prefix}skip`: Skip the current song.\n\
        - `{prefix}stop`: Stop the music and clear the queue.\n\
        - `{prefix}help`: Show this help message."
    )
}

pub async fn execute(
    player: &MusicPlayer,
    resolver: &dyn TrackResolver,
    guild_id: GuildId,
    invocation: Invocation,
    command: Command,
) -> Outcome {
    let name = command.name();
    let result = match command {
        Command::Play(query) => play(player, resolver, guild_id, invocation, &query).await,
        Command::Skip => player
            .skip(guild_id)
            .await
            .map(|skipped| Outcome::Reply(format!("⏭ Skipped {}.", skipped.link()))),
        Command::Stop => player.stop(guild_id).await.map(|()| {
            Outcome::Reply("🛑 Music stopped and the bot has left the voice channel.".to_string())
        }),
        Command::Queue => player
            .listing(guild_id)
            .await
            .map(|lines| Outcome::Reply(render_queue(&lines))),
        Command::Help => Ok(Outcome::SendHelp),
    };

    result.unwrap_or_else(|e| {
        match e.kind() {
            ErrorKind::UserInput => debug!("Guild {}: {} rejected: {}", guild_id, name, e),
            _ => warn!("Guild {}: {} failed: {}", guild_id, name, e),
        }
        Outcome::Reply(e.user_message())
    })
}

async fn play(
    player: &MusicPlayer,
    resolver: &dyn TrackResolver,
    guild_id: GuildId,
    invocation: Invocation,
    query: &str,
) -> Result<Outcome, BotError> {
    let voice_channel = invocation.voice_channel.ok_or(BotError::NotInVoiceChannel)?;
    if query.is_empty() {
        return Err(BotError::EmptyQuery);
    }

    let track = resolver.resolve(query).await?;
    let link = track.link();
    let target = SessionTarget {
        voice_channel,
        text_channel: invocation.text_channel,
    };

    match player.enqueue(guild_id, target, track).await? {
        Enqueued::StartNow => {
            info!("Guild {}: starting playback of {}", guild_id, link);
            Ok(Outcome::Silent)
        }
        Enqueued::Waiting(position) => Ok(Outcome::Reply(format!(
            "🎶 Added to queue: {link} (position {position})"
        ))),
    }
}

/// Renders the listing, cut short to fit in one message.
pub fn render_queue(lines: &[String]) -> String {
    let mut message = String::from("🎵 **Current Queue:**\n");

    for (shown, line) in lines.iter().enumerate() {
        let remaining = lines.len() - shown;
        let footer = format!("…and {remaining} more");
        if message.len() + line.len() + 1 + footer.len() > MESSAGE_LIMIT {
            message.push_str(&footer);
            return message;
        }
        message.push_str(line);
        message.push('\n');
    }

    message
}
