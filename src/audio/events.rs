use async_trait::async_trait;
use songbird::{
    tracks::PlayMode, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
    TrackEvent,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::queue::PlaybackTicket;

/// Player lifecycle, as seen by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    /// The input is decoded and audio is flowing.
    Started,
    Ended,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub ticket: PlaybackTicket,
    pub kind: PlaybackEventKind,
}

/// Forwards one songbird track event into the player's event channel.
///
/// Queue advancement never runs inside the songbird callback; it happens on
/// the task draining the channel.
pub struct TrackEventForwarder {
    ticket: PlaybackTicket,
    on: TrackEvent,
    events: UnboundedSender<PlaybackEvent>,
}

impl TrackEventForwarder {
    pub fn new(ticket: PlaybackTicket, on: TrackEvent, events: UnboundedSender<PlaybackEvent>) -> Self {
        Self { ticket, on, events }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let kind = match self.on {
            TrackEvent::Playable => PlaybackEventKind::Started,
            TrackEvent::Error => PlaybackEventKind::Failed(failure_reason(ctx)),
            _ => PlaybackEventKind::Ended,
        };
        debug!(
            "Guild {} generation {}: {:?}",
            self.ticket.guild_id, self.ticket.generation, kind
        );

        if self
            .events
            .send(PlaybackEvent {
                ticket: self.ticket,
                kind,
            })
            .is_err()
        {
            warn!("Playback event channel closed, dropping event");
        }

        None
    }
}

fn failure_reason(ctx: &EventContext<'_>) -> String {
    if let EventContext::Track(track_list) = ctx {
        for (state, _handle) in *track_list {
            if let PlayMode::Errored(error) = &state.playing {
                return format!("{error:?}");
            }
        }
    }
    "unknown playback error".to_string()
}
