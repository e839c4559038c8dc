use thiserror::Error;

/// Failures a command or a playback step can surface to a guild.
///
/// None of these is fatal to the process: each one is either answered with
/// an inline reply or absorbed by advancing the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    #[error("empty query")]
    EmptyQuery,
    #[error("requester is not in a voice channel")]
    NotInVoiceChannel,
    #[error("no track is playing")]
    NoActiveTrack,
    #[error("queue is empty")]
    QueueEmpty,
    #[error("queue is full ({0} tracks)")]
    QueueFull(usize),
    #[error("search returned no results")]
    NoResults,
    #[error("search failed: {0}")]
    Resolution(String),
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("direct message failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    Resolution,
    Playback,
    Delivery,
}

impl BotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery
            | Self::NotInVoiceChannel
            | Self::NoActiveTrack
            | Self::QueueEmpty
            | Self::QueueFull(_) => ErrorKind::UserInput,
            Self::NoResults | Self::Resolution(_) => ErrorKind::Resolution,
            Self::Playback(_) => ErrorKind::Playback,
            Self::Delivery(_) => ErrorKind::Delivery,
        }
    }

    /// Text posted back to the channel the command came from.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuery => "Please provide a song name or URL!".to_string(),
            Self::NotInVoiceChannel => "You need to join a voice channel first!".to_string(),
            Self::NoActiveTrack => "There is no song currently playing.".to_string(),
            Self::QueueEmpty => "The queue is currently empty.".to_string(),
            Self::QueueFull(limit) => format!("The queue is full (maximum {limit} songs)."),
            Self::NoResults => "No results found for that query.".to_string(),
            Self::Resolution(_) => "An error occurred while searching for the song.".to_string(),
            Self::Playback(_) => "Error fetching audio. Please try again later.".to_string(),
            Self::Delivery(_) => {
                "I couldn't send you a DM. Please check your privacy settings.".to_string()
            }
        }
    }
}
