//! Cache keys and artifact file naming.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use backdrop_models::Effect;

/// Hex characters kept from the SHA-256 digest.
const KEY_LEN: usize = 32;

const ARTIFACT_PREFIX: &str = "processed_";
const ARTIFACT_EXT: &str = ".mp4";

/// Stable identity of a (source, effect) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `source` processed with `effect`.
    pub fn new(source: &str, effect: Effect) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_source(source).as_bytes());
        hasher.update(b"\n");
        hasher.update(effect.as_str().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..KEY_LEN].to_string())
    }

    /// Accept an existing key string if it has the expected shape.
    pub fn parse(s: &str) -> Option<Self> {
        (s.len() == KEY_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)))
            .then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical form of a source reference.
///
/// URLs are reduced to their serialized form without fragment (so scheme and
/// host case, default ports and dot segments do not split the cache). Paths
/// are only trimmed.
pub fn normalize_source(source: &str) -> String {
    let trimmed = source.trim();
    if trimmed.contains("://") {
        if let Ok(mut url) = Url::parse(trimmed) {
            url.set_fragment(None);
            return url.to_string();
        }
    }
    trimmed.to_string()
}

/// Output filename for a cached artifact.
pub fn artifact_filename(effect: Effect, key: &CacheKey) -> String {
    format!("{}{}_{}{}", ARTIFACT_PREFIX, effect.as_str(), key.as_str(), ARTIFACT_EXT)
}

/// Recover effect and key from an artifact filename.
pub fn parse_artifact_filename(filename: &str) -> Option<(Effect, CacheKey)> {
    let stem = filename
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_EXT)?;
    let (effect, key) = stem.rsplit_once('_')?;
    Some((effect.parse().ok()?, CacheKey::parse(key)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_short() {
        let a = CacheKey::new("https://example.com/v.mp4", Effect::Sepia);
        let b = CacheKey::new("https://example.com/v.mp4", Effect::Sepia);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), KEY_LEN);
        assert!(CacheKey::parse(a.as_str()).is_some());
    }

    #[test]
    fn test_effect_changes_key() {
        let source = "videos/clip.mp4";
        assert_ne!(
            CacheKey::new(source, Effect::Sepia),
            CacheKey::new(source, Effect::Blur)
        );
    }

    #[test]
    fn test_url_normalisation() {
        assert_eq!(
            normalize_source("  HTTPS://Example.COM:443/a/../v.mp4#t=10 "),
            "https://example.com/v.mp4"
        );
        assert_eq!(
            CacheKey::new("https://example.com/v.mp4", Effect::Blur),
            CacheKey::new("https://EXAMPLE.com/v.mp4#frag", Effect::Blur)
        );
        // Query strings are part of the identity
        assert_ne!(
            CacheKey::new("https://example.com/v.mp4?id=1", Effect::Blur),
            CacheKey::new("https://example.com/v.mp4?id=2", Effect::Blur)
        );
    }

    #[test]
    fn test_paths_are_only_trimmed() {
        assert_eq!(normalize_source(" /data/My Clip.mp4\n"), "/data/My Clip.mp4");
    }

    #[test]
    fn test_artifact_filename_round_trip() {
        let key = CacheKey::new("a.mp4", Effect::Grayscale);
        let name = artifact_filename(Effect::Grayscale, &key);
        assert!(name.starts_with("processed_grayscale_"));
        assert_eq!(parse_artifact_filename(&name), Some((Effect::Grayscale, key)));
    }

    #[test]
    fn test_foreign_filenames_ignored() {
        assert_eq!(parse_artifact_filename("processed_sepia_123.mp4"), None);
        assert_eq!(parse_artifact_filename("holiday.mp4"), None);
        assert_eq!(
            parse_artifact_filename("processed_vignette_0123456789abcdef0123456789abcdef.mp4"),
            None
        );
    }
}
