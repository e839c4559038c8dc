use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::{process::Stdio, time::Duration};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{is_url, Track, TrackResolver};
use crate::error::BotError;

/// Search and URL metadata lookup through the yt-dlp executable.
pub struct YtDlpSearch {
    program: String,
}

/// One line of `--dump-json` output. Flat search results only carry
/// `id`/`url`, full extractions carry `webpage_url`.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
}

impl YtDlpEntry {
    fn into_track(self) -> Option<Track> {
        let url = self
            .webpage_url
            .or(self.url.filter(|url| is_url(url)))
            .or(self.id.map(|id| format!("https://www.youtube.com/watch?v={id}")))?;
        let title = self.title.unwrap_or_else(|| url.clone());

        let track = Track::new(title, url);
        let duration = self
            .duration
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        Some(match duration {
            Some(duration) => track.with_duration(duration),
            None => track,
        })
    }
}

impl YtDlpSearch {
    pub fn new(program: String) -> Self {
        Self { program }
    }

    /// Runs `--version`; used by the health check.
    pub async fn verify(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.program, output.status);
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp version: {}", version);
        Ok(version)
    }

    fn target(query: &str) -> String {
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        }
    }

    fn args(query: &str) -> Vec<String> {
        [
            "--dump-json",
            "--flat-playlist",
            "--no-playlist",
            "--skip-download",
            "--no-warnings",
            "--",
        ]
        .into_iter()
        .map(String::from)
        .chain(std::iter::once(Self::target(query)))
        .collect()
    }

    fn first_track(stdout: &str) -> Option<Track> {
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unparseable yt-dlp line: {}", e);
                    None
                }
            })
            .find_map(YtDlpEntry::into_track)
    }
}

#[async_trait]
impl TrackResolver for YtDlpSearch {
    async fn resolve(&self, query: &str) -> Result<Track, BotError> {
        let output = Command::new(&self.program)
            .args(Self::args(query))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BotError::Resolution(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp lookup failed for {:?}: {}", query, stderr.trim());
            return Err(BotError::Resolution(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let track = Self::first_track(&stdout).ok_or(BotError::NoResults)?;
        info!("🎯 Resolved {:?} to {}", query, track.url());
        Ok(track)
    }
}
