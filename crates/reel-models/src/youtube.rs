//! YouTube video id extraction.
//!
//! Every YouTube URL form of one video (watch, short link, embed, shorts,
//! live) must map to the same identity key, so the id is pulled out of the
//! parsed URL rather than compared as a string.

use url::Url;

/// Hosts that serve YouTube videos (after stripping a leading `www.`).
const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
];

const SHORT_HOST: &str = "youtu.be";

/// Path prefixes that carry the id as the following segment.
const ID_PATH_PREFIXES: &[&str] = &["embed", "v", "shorts", "live"];

/// Extract the 11-character video id from a YouTube URL.
///
/// Returns `None` for non-YouTube URLs and for YouTube URLs whose id is
/// missing or malformed.
pub fn extract_youtube_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let candidate = if host == SHORT_HOST {
        url.path_segments()?.next().map(str::to_string)?
    } else if YOUTUBE_HOSTS.contains(&host) {
        from_watch_query(url).or_else(|| from_path(url))?
    } else {
        return None;
    };

    is_valid_id(&candidate).then_some(candidate)
}

fn from_watch_query(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
}

fn from_path(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    let prefix = segments.next()?;
    if !ID_PATH_PREFIXES.contains(&prefix) {
        return None;
    }
    segments.next().map(str::to_string)
}

/// YouTube ids are exactly 11 characters of `[A-Za-z0-9_-]`.
fn is_valid_id(id: &str) -> bool {
    id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
