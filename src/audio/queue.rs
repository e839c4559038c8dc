//! Per-guild queue state.
//!
//! [`GuildQueue`] owns no I/O handles. Each transition returns what has to
//! happen next (start the new front track, tear the voice session down) and
//! [`MusicPlayer`](super::player::MusicPlayer) carries it out while holding
//! the guild lock.
//!
//! The front of `pending` is the track currently streaming whenever
//! `is_playing` is set.

use serenity::model::id::{ChannelId, GuildId};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::BotError, sources::Track};

/// Where a guild's playback happens and where its announcements go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTarget {
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
}

/// Identifies one started track. Player events carry it back so that events
/// from a track that was already skipped or stopped can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTicket {
    pub guild_id: GuildId,
    pub generation: u64,
}

/// Result of [`GuildQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The guild was idle; the new track has to be started.
    StartNow,
    /// Something is playing; the track waits at this 1-based position.
    Waiting(usize),
}

/// What to do after the front track left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next,
    Drained,
}

#[derive(Debug)]
pub struct GuildQueue {
    guild_id: GuildId,
    pending: VecDeque<Track>,
    is_playing: bool,
    session: Option<SessionTarget>,
    generation: u64,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(guild_id: GuildId, max_size: usize) -> Self {
        Self {
            guild_id,
            pending: VecDeque::new(),
            is_playing: false,
            session: None,
            generation: 0,
            max_size,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn front(&self) -> Option<&Track> {
        self.pending.front()
    }

    pub fn session(&self) -> Option<SessionTarget> {
        self.session
    }

    /// Appends a track. An idle guild adopts `target` as its session.
    pub fn enqueue(&mut self, track: Track, target: SessionTarget) -> Result<Enqueued, BotError> {
        if self.pending.len() >= self.max_size {
            return Err(BotError::QueueFull(self.max_size));
        }

        info!("➕ Guild {}: queued {}", self.guild_id, track.title());
        self.pending.push_back(track);

        if self.is_playing {
            return Ok(Enqueued::Waiting(self.pending.len()));
        }

        self.session = Some(target);
        Ok(Enqueued::StartNow)
    }

    /// Issues a ticket for starting the front track.
    ///
    /// Returns `None` when there is nothing to start or no session to start
    /// it in. The guild only counts as playing after [`mark_playing`].
    ///
    /// [`mark_playing`]: Self::mark_playing
    pub fn begin(&mut self) -> Option<(Track, SessionTarget, PlaybackTicket)> {
        let track = self.pending.front()?.clone();
        let target = self.session?;
        self.generation += 1;

        let ticket = PlaybackTicket {
            guild_id: self.guild_id,
            generation: self.generation,
        };
        Some((track, target, ticket))
    }

    pub fn mark_playing(&mut self, ticket: PlaybackTicket) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.is_playing = true;
        true
    }

    /// True when `ticket` belongs to the track streaming right now.
    pub fn is_current(&self, ticket: PlaybackTicket) -> bool {
        self.is_playing && ticket.generation == self.generation
    }

    /// Track end and track error both land here. Stale tickets are ignored.
    pub fn finish(&mut self, ticket: PlaybackTicket) -> Option<(Track, Advance)> {
        if !self.is_current(ticket) {
            debug!(
                "Guild {}: ignoring event for stale generation {} (current {})",
                self.guild_id, ticket.generation, self.generation
            );
            return None;
        }

        let finished = self.pending.pop_front()?;
        Some((finished, self.after_pop()))
    }

    /// Drops the front track after its playback could not be started.
    pub fn discard_front(&mut self) -> Advance {
        self.pending.pop_front();
        self.after_pop()
    }

    pub fn skip(&mut self) -> Result<(Track, Advance), BotError> {
        if !self.is_playing {
            return Err(BotError::NoActiveTrack);
        }

        let skipped = self.pending.pop_front().ok_or(BotError::NoActiveTrack)?;
        Ok((skipped, self.after_pop()))
    }

    /// Clears everything. Fails when nothing was playing, but the queue ends
    /// up empty and idle either way.
    pub fn stop(&mut self) -> Result<usize, BotError> {
        let was_playing = self.is_playing;
        let cleared = self.pending.len();
        self.reset();

        if was_playing {
            Ok(cleared)
        } else {
            Err(BotError::NoActiveTrack)
        }
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.is_playing = false;
        self.session = None;
        self.generation += 1;
    }

    /// 1-indexed lines for every pending track, the playing one first.
    pub fn listing(&self) -> Result<Vec<String>, BotError> {
        if self.pending.is_empty() {
            return Err(BotError::QueueEmpty);
        }

        Ok(self
            .pending
            .iter()
            .enumerate()
            .map(|(index, track)| format!("{}. {}", index + 1, track.link()))
            .collect())
    }

    fn after_pop(&mut self) -> Advance {
        self.is_playing = false;
        self.generation += 1;

        if self.pending.is_empty() {
            self.session = None;
            Advance::Drained
        } else {
            Advance::Next
        }
    }
}
