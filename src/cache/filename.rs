use sha2::{Digest, Sha256};

/// Extension used when the URL does not reveal an audio format
const FALLBACK_EXTENSION: &str = "bin";

/// Hex encoded SHA-256 digest of a cache key
pub fn key_digest(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// File name under which a cached URL is stored
///
/// Format: "<sha256 of url>.<audio extension>", e.g. "9f86d0...15b0.mp3"
pub fn cache_file_name(url: &str) -> String {
    let ext = audio_extension(url).unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    format!("{}.{}", key_digest(url), ext)
}

/// Audio extension taken from the last path segment of a URL
pub fn audio_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_audio_extension(ext))
        .map(|ext| ext.to_lowercase())
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let digest = key_digest("https://example.com/ep.mp3");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, key_digest("https://example.com/ep.mp3"));
    }

    #[test]
    fn digest_differs_per_url() {
        assert_ne!(
            key_digest("https://example.com/a.mp3"),
            key_digest("https://example.com/b.mp3")
        );
    }

    #[test]
    fn extension_from_url_path() {
        assert_eq!(
            audio_extension("https://example.com/path/episode.mp3").as_deref(),
            Some("mp3")
        );
        assert_eq!(
            audio_extension("https://example.com/episode.M4A?token=abc").as_deref(),
            Some("m4a")
        );
    }

    #[test]
    fn extension_ignores_query_string() {
        assert_eq!(
            audio_extension("https://example.com/play?file=episode.mp3"),
            None
        );
    }

    #[test]
    fn extension_rejects_non_audio() {
        assert_eq!(audio_extension("https://example.com/page.html"), None);
        assert_eq!(audio_extension("https://example.com/noext"), None);
        assert_eq!(audio_extension("not a url"), None);
    }

    #[test]
    fn cache_file_name_uses_fallback_extension() {
        let name = cache_file_name("https://example.com/stream");
        assert!(name.ends_with(".bin"));

        let name = cache_file_name("https://example.com/ep.ogg");
        assert!(name.ends_with(".ogg"));
        assert!(name.starts_with(&key_digest("https://example.com/ep.ogg")));
    }
}
