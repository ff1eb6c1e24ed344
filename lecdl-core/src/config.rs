use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LecdlConfig {
    pub api: ApiSection,
    pub download: DownloadSection,
    pub server: ServerSection,
    pub ffmpeg: FfmpegSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl ApiSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSection {
    pub quality: String,
    pub angle: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// 0 binds an ephemeral port.
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FfmpegSection {
    pub binary: String,
    pub log_level: String,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LecdlConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/lecdl.toml");
        let config = load_config(path).expect("config should parse");
        assert_eq!(config.download.quality, "720p");
        assert_eq!(config.download.angle, 0);
        assert_eq!(config.server.port, 0);
        assert_eq!(config.ffmpeg.binary, "ffmpeg");
        assert_eq!(config.api.connect_timeout(), Duration::from_secs(5));
    }
}
