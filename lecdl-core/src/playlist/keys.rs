use regex::Regex;
use reqwest::header;
use reqwest::Client;
use tracing::debug;

use super::{DirectiveKind, PlaylistError, PlaylistResult};
use crate::config::ApiSection;
use crate::serve::ContentServer;

const URI_PATTERN: &str = r#"URI="(?P<key_url>.*?)""#;

/// Undo the origin's key obfuscation: the real AES key is the first 16
/// bytes of the reversed payload.
pub fn descramble_key(scrambled: &[u8]) -> Vec<u8> {
    let mut key: Vec<u8> = scrambled.iter().rev().copied().collect();
    key.truncate(16);
    key
}

/// Rewrites the key directives of one angle playlist to point at locally
/// served, descrambled keys.
pub struct KeyRewriter {
    client: Client,
    uri_pattern: Regex,
}

impl KeyRewriter {
    pub fn new(config: &ApiSection) -> PlaylistResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        let uri_pattern = Regex::new(URI_PATTERN)?;
        Ok(Self {
            client,
            uri_pattern,
        })
    }

    /// Returns a new line vector with every encrypted key directive's URI
    /// replaced by a local handle; `METHOD=NONE` directives and all other
    /// lines pass through untouched. The origin authenticates key fetches
    /// through a `Bearer` cookie, not the Authorization header used by the
    /// API channel.
    ///
    /// Each published handle is tied to the playlist document being built,
    /// so angles are rewritten one at a time.
    pub async fn rewrite_keys(
        &self,
        lines: &[String],
        token: &str,
        server: &ContentServer,
    ) -> PlaylistResult<Vec<String>> {
        let mut rewritten = Vec::with_capacity(lines.len());
        for line in lines {
            if DirectiveKind::of(line) != DirectiveKind::Key {
                rewritten.push(line.clone());
                continue;
            }
            let key_url = self
                .uri_pattern
                .captures(line)
                .and_then(|captures| captures.name("key_url"))
                .ok_or_else(|| PlaylistError::MissingKeyUri { line: line.clone() })?
                .as_str();
            let scrambled = self
                .client
                .get(key_url)
                .header(header::COOKIE, format!("Bearer={token}"))
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            let key = descramble_key(&scrambled);
            let handle = server.publish(&key, ".key").await?;
            debug!(from = key_url, to = %handle, "rewrote key directive");
            rewritten.push(
                self.uri_pattern
                    .replace(line, format!("URI=\"{handle}\"").as_str())
                    .into_owned(),
            );
        }
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descramble_reverses_then_truncates() {
        let scrambled: Vec<u8> = (0u8..32).collect();
        let expected: Vec<u8> = (16u8..32).rev().collect();
        assert_eq!(descramble_key(&scrambled), expected);
    }

    #[test]
    fn descramble_of_short_key_keeps_everything() {
        assert_eq!(descramble_key(&[1, 2, 3]), vec![3, 2, 1]);
    }

    #[test]
    fn uri_pattern_extracts_quoted_url() {
        let pattern = Regex::new(URI_PATTERN).unwrap();
        let line = "#EXT-X-KEY:METHOD=AES-128,URI=\"http://origin/key?id=7\",IV=0x01";
        let captures = pattern.captures(line).unwrap();
        assert_eq!(&captures["key_url"], "http://origin/key?id=7");
    }
}
