use anyhow::{Context, Result};

#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Extraction
    pub ytdlp_path: String,
    pub ytdlp_format: String,

    // Search
    pub youtube_api_key: Option<String>,

    // Limits
    pub max_queue_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_format: std::env::var("YTDLP_FORMAT").unwrap_or(defaults.ytdlp_format),
            youtube_api_key: std::env::var("YOUTUBE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            max_queue_size: match std::env::var("MAX_QUEUE_SIZE") {
                Ok(val) if !val.trim().is_empty() => val
                    .trim()
                    .parse()
                    .with_context(|| format!("MAX_QUEUE_SIZE is not a number: {val}"))?,
                _ => defaults.max_queue_size,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!(
                "Command prefix must not contain whitespace, got: {:?}",
                self.command_prefix
            );
        }

        if self.ytdlp_path.trim().is_empty() {
            anyhow::bail!("yt-dlp path must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    /// Loggable summary; never includes secrets.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix {:?}\n  \
            Extraction: {} -f {}\n  \
            Search: {}\n  \
            Limits: {} queued tracks per guild",
            self.command_prefix,
            self.ytdlp_path,
            self.ytdlp_format,
            if self.youtube_api_key.is_some() {
                "YouTube Data API"
            } else {
                "yt-dlp"
            },
            self.max_queue_size,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: "!".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_format: "bestaudio".to_string(),
            youtube_api_key: None,
            max_queue_size: 1000,
        }
    }
}
