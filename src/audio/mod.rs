//! # Audio Module
//!
//! Per-guild queue and playback for the bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue State
//! - FIFO list of pending tracks, the front one being the one that plays
//! - Transitions return what to do next instead of doing I/O
//! - Generation tickets tell current player events from stale ones
//!
//! ### [`player`] - Coordinator
//! - [`MusicPlayer`](player::MusicPlayer) owns every guild queue behind a
//!   per-guild async mutex
//! - Starts tracks through a [`VoiceBackend`](player::VoiceBackend) and
//!   advances the queue when a track ends, fails or is skipped
//!
//! ### [`voice`] - Songbird Backend
//! - Joins voice channels and streams `yt-dlp` stdout through songbird
//!
//! ### [`events`] - Player Events
//! - Songbird track events are forwarded into a channel drained by
//!   [`MusicPlayer::run_events`](player::MusicPlayer::run_events), so queue
//!   advancement never runs inside a songbird callback

pub mod events;
pub mod player;
pub mod queue;
pub mod voice;
