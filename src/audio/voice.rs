//! Songbird-backed [`VoiceBackend`]: joins voice, spawns yt-dlp and streams
//! its stdout.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{ChildContainer, Input},
    Call, Event as VoiceEvent, Songbird, TrackEvent,
};
use std::{
    process::{Child, Command, Stdio},
    sync::Arc,
};
use tokio::sync::{mpsc::UnboundedSender, Mutex};
use tracing::{debug, info};

use super::{
    events::{PlaybackEvent, TrackEventForwarder},
    player::VoiceBackend,
    queue::{PlaybackTicket, SessionTarget},
};
use crate::{config::Config, error::BotError, sources::Track};

/// The media-extraction subprocess.
#[derive(Debug, Clone)]
pub struct Extractor {
    program: String,
    format: String,
}

impl Extractor {
    pub fn new(program: String, format: String) -> Self {
        Self { program, format }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ytdlp_path.clone(), config.ytdlp_format.clone())
    }

    fn args(&self, url: &str) -> Vec<String> {
        vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            "-".to_string(),
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }

    /// Spawns the extractor with its stdout piped for decoding.
    pub fn spawn(&self, url: &str) -> Result<Child, BotError> {
        debug!("Spawning {} for {}", self.program, url);

        Command::new(&self.program)
            .args(self.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BotError::Playback(format!("failed to spawn {}: {e}", self.program)))
    }
}

pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    events: UnboundedSender<PlaybackEvent>,
    extractor: Extractor,
}

impl SongbirdBackend {
    pub fn new(
        manager: Arc<Songbird>,
        events: UnboundedSender<PlaybackEvent>,
        extractor: Extractor,
    ) -> Self {
        Self {
            manager,
            events,
            extractor,
        }
    }

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<Mutex<Call>>, BotError> {
        if let Some(call) = self.manager.get(guild_id) {
            let current = call.lock().await.current_channel();
            if current.map(|channel| channel.0.get()) == Some(channel_id.get()) {
                return Ok(call);
            }
        }

        info!("🔊 Guild {}: joining voice channel {}", guild_id, channel_id);
        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| BotError::Playback(format!("could not join voice channel: {e}")))
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    async fn start(
        &self,
        target: SessionTarget,
        track: Track,
        ticket: PlaybackTicket,
    ) -> Result<(), BotError> {
        let call = self.connect(ticket.guild_id, target.voice_channel).await?;
        let child = self.extractor.spawn(track.url())?;
        let input: Input = ChildContainer::from(child).into();

        let handle = call.lock().await.play_only_input(input);

        for on in [TrackEvent::Playable, TrackEvent::End, TrackEvent::Error] {
            let forwarder = TrackEventForwarder::new(ticket, on, self.events.clone());
            if let Err(e) = handle.add_event(VoiceEvent::Track(on), forwarder) {
                let _ = handle.stop();
                return Err(BotError::Playback(format!("could not watch track: {e}")));
            }
        }

        Ok(())
    }

    async fn halt(&self, guild_id: GuildId) {
        if let Some(call) = self.manager.get(guild_id) {
            call.lock().await.stop();
        }
    }

    async fn disconnect(&self, guild_id: GuildId) {
        if let Err(e) = self.manager.remove(guild_id).await {
            debug!("Guild {}: nothing to disconnect ({})", guild_id, e);
        }
    }
}
