pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playlist;
pub mod serve;

pub use api::{ApiClient, ApiError, ApiResult, Lecture};
pub use config::{
    load_config, ApiSection, DownloadSection, FfmpegSection, LecdlConfig, ServerSection,
};
pub use error::{ConfigError, Result};
pub use pipeline::{
    CommandExecutor, DownloadError, DownloadReport, DownloadRequest, DownloadResult, Downloader,
    SystemCommandExecutor,
};
pub use playlist::{
    descramble_key, playlist_text, split_angles, AngleSet, DirectiveKind, KeyRewriter,
    PlaylistError, PlaylistFetcher, PlaylistResult, Quality,
};
pub use serve::{ContentServer, ServeError, ServeResult};
