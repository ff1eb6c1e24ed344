use std::collections::BTreeMap;
use std::fmt;

use reqwest::Client;
use tracing::{debug, warn};

use super::PlaylistResult;
use crate::config::ApiSection;

/// The closed set of quality labels the platform serves. The variant order
/// is the quality ranking: the fallback picks the highest-ranked label
/// present rather than comparing label strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quality {
    Q450,
    Q720,
}

impl Quality {
    /// Classify a master-playlist variant URL. The platform encodes the
    /// resolution in the URL; anything not marked 720 is the low variant.
    pub fn classify(url: &str) -> Self {
        if url.contains("720") {
            Self::Q720
        } else {
            Self::Q450
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "450p" => Some(Self::Q450),
            "720p" => Some(Self::Q720),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Q450 => "450p",
            Self::Q720 => "720p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct PlaylistFetcher {
    client: Client,
}

impl PlaylistFetcher {
    pub fn new(config: &ApiSection) -> PlaylistResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }

    /// Fetch the master playlist at `stream_url` and return the variant
    /// playlist text for `quality`, falling back to the best available
    /// quality when the requested one is not offered. `Ok(None)` means the
    /// master listed no variants at all; the caller skips the lecture.
    pub async fn fetch_variant(
        &self,
        stream_url: &str,
        quality: Quality,
    ) -> PlaylistResult<Option<String>> {
        let master = self
            .client
            .get(stream_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let variants = classify_variants(&master);
        let Some((label, url)) = choose_variant(&variants, quality) else {
            return Ok(None);
        };
        if label != quality {
            warn!(requested = %quality, fallback = %label, "requested quality not offered, falling back");
        }
        debug!(quality = %label, "fetching variant playlist");
        let variant = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(Some(variant))
    }
}

/// Variant URLs are the master's lines starting with `http`. The platform
/// serves at most one URL per label; should it ever send more, the last one
/// wins and the collision is logged.
fn classify_variants(master: &str) -> BTreeMap<Quality, String> {
    let mut variants = BTreeMap::new();
    for line in master.lines().filter(|line| line.starts_with("http")) {
        let label = Quality::classify(line);
        if let Some(dropped) = variants.insert(label, line.to_string()) {
            warn!(quality = %label, dropped = %dropped, kept = %line, "duplicate variant for quality label");
        }
    }
    variants
}

fn choose_variant(
    variants: &BTreeMap<Quality, String>,
    requested: Quality,
) -> Option<(Quality, &String)> {
    if let Some(url) = variants.get(&requested) {
        return Some((requested, url));
    }
    variants.iter().next_back().map(|(label, url)| (*label, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_720_substring_match() {
        assert_eq!(Quality::classify("http://h/s/720/pl.m3u8"), Quality::Q720);
        assert_eq!(Quality::classify("http://h/s/450/pl.m3u8"), Quality::Q450);
        assert_eq!(Quality::classify("http://h/s/1080/pl.m3u8"), Quality::Q450);
    }

    #[test]
    fn labels_round_trip() {
        assert_eq!(Quality::from_label("720p"), Some(Quality::Q720));
        assert_eq!(Quality::from_label(Quality::Q450.label()), Some(Quality::Q450));
        assert_eq!(Quality::from_label("1080p"), None);
    }

    #[test]
    fn falls_back_to_best_available_quality() {
        let mut variants = BTreeMap::new();
        variants.insert(Quality::Q450, "http://h/450".to_string());
        let (label, url) = choose_variant(&variants, Quality::Q720).unwrap();
        assert_eq!(label, Quality::Q450);
        assert_eq!(url, "http://h/450");

        variants.insert(Quality::Q720, "http://h/720".to_string());
        let (label, _) = choose_variant(&variants, Quality::Q720).unwrap();
        assert_eq!(label, Quality::Q720);
    }

    #[test]
    fn no_variants_means_none() {
        let variants = classify_variants("#EXTM3U\n# nothing fetchable here\n");
        assert!(choose_variant(&variants, Quality::Q720).is_none());
    }

    #[test]
    fn duplicate_label_keeps_the_last_url() {
        let master = "http://h/a/450/pl.m3u8\nhttp://h/b/450/pl.m3u8\n";
        let variants = classify_variants(master);
        assert_eq!(variants[&Quality::Q450], "http://h/b/450/pl.m3u8");
    }
}
