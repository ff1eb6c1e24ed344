use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{FfmpegSection, LecdlConfig};
use crate::playlist::{
    playlist_text, split_angles, AngleSet, DirectiveKind, KeyRewriter, PlaylistError,
    PlaylistFetcher, Quality,
};
use crate::serve::{ContentServer, ServeError};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not fetch stream {url}")]
    StreamUnavailable { url: String },
    #[error("no video streams found")]
    NoStreams,
    #[error("playlist error: {0}")]
    Playlist(#[from] PlaylistError),
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remux failed for {output}: {stderr}")]
    CommandFailure {
        output: String,
        status: Option<i32>,
        stderr: String,
    },
}

pub type DownloadResult<T> = Result<T, DownloadError>;

#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        command.kill_on_drop(true).output().await
    }
}

/// One lecture to download. Supplied by the orchestration layer.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub token: String,
    pub stream_url: String,
    pub output: PathBuf,
    pub quality: Quality,
    /// 0 downloads every available angle.
    pub angle: u8,
}

#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub output: PathBuf,
    pub angles: Vec<u8>,
    pub duration_seconds: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Assembles and runs one remux invocation per lecture: variant fetch,
/// angle split, key rewriting, local publication, then the external tool.
///
/// Every failure is contained to the lecture at hand; a batch driver calls
/// `download` once per lecture and keeps going on errors. Instances hold no
/// per-lecture state, so one `Downloader` may serve many concurrent
/// pipelines sharing one `ContentServer`.
pub struct Downloader {
    fetcher: PlaylistFetcher,
    rewriter: KeyRewriter,
    ffmpeg: FfmpegSection,
    executor: Arc<dyn CommandExecutor>,
}

impl Downloader {
    pub fn new(
        config: &LecdlConfig,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> DownloadResult<Self> {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Ok(Self {
            fetcher: PlaylistFetcher::new(&config.api)?,
            rewriter: KeyRewriter::new(&config.api)?,
            ffmpeg: config.ffmpeg.clone(),
            executor,
        })
    }

    pub async fn download(
        &self,
        request: &DownloadRequest,
        server: &ContentServer,
    ) -> DownloadResult<DownloadReport> {
        let started_at = Utc::now();
        info!(output = %request.output.display(), "processing lecture");

        let variant = self
            .fetcher
            .fetch_variant(&request.stream_url, request.quality)
            .await?
            .ok_or_else(|| DownloadError::StreamUnavailable {
                url: request.stream_url.clone(),
            })?;

        // A key directive anywhere marks a normal pre-recorded stream; its
        // absence means an unencrypted (likely live) single-angle stream
        // that must bypass key rewriting entirely.
        let encrypted = variant
            .lines()
            .any(|line| DirectiveKind::of(line).is_key());
        let angles = if encrypted {
            split_angles(&variant)?
        } else {
            AngleSet::single(&variant)
        };
        if angles.is_empty() {
            return Err(DownloadError::NoStreams);
        }

        let selected = self.select_angles(&angles, request.angle);
        let mut args = self.base_args();
        let mut inputs = 0usize;
        for (number, lines) in angles.iter() {
            if !selected.contains(&number) {
                continue;
            }
            let lines = if encrypted {
                info!(angle = number, "extracting encryption keys");
                self.rewriter
                    .rewrite_keys(lines, &request.token, server)
                    .await?
            } else {
                lines.clone()
            };
            let playlist_url = server.publish(playlist_text(&lines).as_bytes(), ".m3u8").await?;
            self.push_input_args(&mut args, &request.token, &playlist_url);
            inputs += 1;
        }

        // One video track per input; audio is synchronized across angles,
        // so a single track from the first input suffices.
        for index in 0..inputs {
            args.push("-map".to_string());
            args.push(format!("{index}:v:0"));
        }
        args.push("-map".to_string());
        args.push("0:a:0".to_string());
        args.push("-c".to_string());
        args.push("copy".to_string());
        args.push(request.output.to_string_lossy().to_string());

        let duration_seconds = selected.first().and_then(|angle| angles.duration(*angle));
        if let Some(duration) = duration_seconds {
            info!(seconds = duration, "variant duration");
        }

        let mut command = Command::new(&self.ffmpeg.binary);
        for arg in &args {
            command.arg(arg);
        }
        let outcome = self.executor.run(&mut command).await?;
        if !outcome.status.success() {
            let stderr = String::from_utf8_lossy(&outcome.stderr).to_string();
            return Err(DownloadError::CommandFailure {
                output: request.output.to_string_lossy().to_string(),
                status: outcome.status.code(),
                stderr,
            });
        }

        info!(output = %request.output.display(), "downloaded");
        Ok(DownloadReport {
            output: request.output.clone(),
            angles: selected,
            duration_seconds,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Angle 0 selects every available angle; a selector beyond the
    /// available count is non-fatal and falls back to all of them.
    fn select_angles(&self, angles: &AngleSet, requested: u8) -> Vec<u8> {
        let available = angles.numbers();
        if requested == 0 {
            return available;
        }
        if requested as usize > available.len() {
            warn!(
                requested,
                available = ?available,
                "invalid angle selected, downloading all available angles"
            );
            return available;
        }
        vec![requested]
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.ffmpeg.log_level.clone(),
        ]
    }

    /// The tool only honors `-cookies` over HTTP inputs, which is the whole
    /// reason the rewritten playlist is served locally instead of passed as
    /// a file. The whitelists let it dereference local keys and playlists
    /// alongside the origin's segments.
    fn push_input_args(&self, args: &mut Vec<String>, token: &str, playlist_url: &str) {
        args.push("-cookies".to_string());
        args.push(format!("Bearer={token}; path=/"));
        args.push("-allowed_extensions".to_string());
        args.push("key,m3u8,ts".to_string());
        args.push("-protocol_whitelist".to_string());
        args.push("file,http,https,tcp,tls,crypto".to_string());
        args.push("-i".to_string());
        args.push(playlist_url.to_string());
    }
}
