mod fetch;
mod keys;
mod split;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::serve::ServeError;

pub use fetch::{PlaylistFetcher, Quality};
pub use keys::{descramble_key, KeyRewriter};
pub use split::split_angles;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("key directive carries no quoted URI: {line}")]
    MissingKeyUri { line: String },
    #[error("invalid key uri pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("discontinuity marker with no lines after it")]
    EmptySecondAngle,
    #[error("second angle has no key directive to inherit")]
    MissingKeyDirective,
    #[error(transparent)]
    Serve(#[from] ServeError),
}

pub type PlaylistResult<T> = Result<T, PlaylistError>;

/// Line classification over the subset of the HLS grammar this pipeline
/// cares about. Matching is by prefix, mirroring how the origin emits
/// directives; unknown `#` lines fall through to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `#EXT-X-KEY` declaring an encryption method other than NONE.
    Key,
    /// `#EXT-X-KEY:METHOD=NONE` — the unencrypted sentinel, never rewritten.
    UnencryptedKey,
    Discontinuity,
    EndList,
    Inf,
    /// Any other directive or comment line.
    Other,
    /// A segment URL or path.
    Resource,
    Blank,
}

impl DirectiveKind {
    pub fn of(line: &str) -> Self {
        if line.is_empty() {
            Self::Blank
        } else if line.starts_with("#EXT-X-KEY:METHOD=NONE") {
            Self::UnencryptedKey
        } else if line.starts_with("#EXT-X-KEY") {
            Self::Key
        } else if line.starts_with("#EXT-X-DISCONTINUITY") {
            Self::Discontinuity
        } else if line.starts_with("#EXT-X-ENDLIST") {
            Self::EndList
        } else if line.starts_with("#EXTINF") {
            Self::Inf
        } else if line.starts_with('#') {
            Self::Other
        } else {
            Self::Resource
        }
    }

    /// Both encrypted and METHOD=NONE key directives.
    pub fn is_key(self) -> bool {
        matches!(self, Self::Key | Self::UnencryptedKey)
    }
}

/// Per-angle playlists derived from one variant, keyed by angle number
/// starting at 1. A recording without a discontinuity marker yields a single
/// angle holding the whole variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AngleSet {
    angles: BTreeMap<u8, Vec<String>>,
}

impl AngleSet {
    pub(crate) fn from_angles(angles: BTreeMap<u8, Vec<String>>) -> Self {
        Self { angles }
    }

    /// The whole variant as angle 1, used for unencrypted (live) streams.
    pub fn single(variant: &str) -> Self {
        let mut angles = BTreeMap::new();
        angles.insert(1, variant.lines().map(str::to_owned).collect());
        Self { angles }
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn numbers(&self) -> Vec<u8> {
        self.angles.keys().copied().collect()
    }

    pub fn get(&self, angle: u8) -> Option<&[String]> {
        self.angles.get(&angle).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Vec<String>)> {
        self.angles.iter().map(|(number, lines)| (*number, lines))
    }

    /// Sum of `#EXTINF` durations for one angle, in seconds.
    pub fn duration(&self, angle: u8) -> Option<f64> {
        let lines = self.angles.get(&angle)?;
        let total = lines
            .iter()
            .filter_map(|line| {
                line.strip_prefix("#EXTINF:")
                    .and_then(|rest| rest.split(',').next())
                    .and_then(|value| value.trim().parse::<f64>().ok())
            })
            .sum();
        Some(total)
    }
}

/// Render an angle's lines back into playlist text.
pub fn playlist_text(lines: &[String]) -> String {
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_directives_by_prefix() {
        assert_eq!(
            DirectiveKind::of("#EXT-X-KEY:METHOD=AES-128,URI=\"http://x/k\""),
            DirectiveKind::Key
        );
        assert_eq!(
            DirectiveKind::of("#EXT-X-KEY:METHOD=NONE"),
            DirectiveKind::UnencryptedKey
        );
        assert_eq!(
            DirectiveKind::of("#EXT-X-DISCONTINUITY"),
            DirectiveKind::Discontinuity
        );
        assert_eq!(DirectiveKind::of("#EXT-X-ENDLIST"), DirectiveKind::EndList);
        assert_eq!(DirectiveKind::of("#EXTINF:9.009,"), DirectiveKind::Inf);
        assert_eq!(DirectiveKind::of("#EXT-X-VERSION:3"), DirectiveKind::Other);
        assert_eq!(DirectiveKind::of("seg_001.ts"), DirectiveKind::Resource);
        assert_eq!(DirectiveKind::of(""), DirectiveKind::Blank);
    }

    #[test]
    fn method_none_still_counts_as_key_directive() {
        assert!(DirectiveKind::of("#EXT-X-KEY:METHOD=NONE").is_key());
        assert!(DirectiveKind::of("#EXT-X-KEY:METHOD=AES-128,URI=\"u\"").is_key());
        assert!(!DirectiveKind::of("#EXT-X-VERSION:3").is_key());
    }

    #[test]
    fn duration_sums_extinf_lines() {
        let set = AngleSet::single("#EXTM3U\n#EXTINF:9.009,\na.ts\n#EXTINF:3.5,\nb.ts");
        let total = set.duration(1).unwrap();
        assert!((total - 12.509).abs() < 1e-9);
        assert_eq!(set.duration(2), None);
    }
}
