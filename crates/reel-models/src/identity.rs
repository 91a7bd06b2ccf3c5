//! Video identity resolution.
//!
//! A [`VideoKey`] is the stable identifier every cached record hangs off.
//! Keys are derived from the source alone, so the same input produces the
//! same key across calls and across process restarts:
//!
//! - YouTube URLs: `yt_<video id>`
//! - other URLs: `url_<sha256 of the normalized URL>`
//! - local files: `file_<sha256 of canonical path, size and mtime>`
//!   (or of canonical path and file content when content hashing is enabled)

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::youtube::extract_youtube_id;

/// Result type for identity resolution.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors raised while resolving a source into a key.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Unresolvable source '{input}': {reason}")]
    UnresolvableSource { input: String, reason: String },
}

impl IdentityError {
    pub fn unresolvable(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvableSource {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Stable identity key of a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoKey(String);

impl VideoKey {
    /// Wrap an already-derived key (e.g. one read back from the store).
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where a video comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Remote,
    Local,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Remote => "remote",
            SourceKind::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "remote" => Some(SourceKind::Remote),
            "local" => Some(SourceKind::Local),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed video source: a remote locator or an existing local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Remote(Url),
    Local(PathBuf),
}

impl VideoSource {
    /// Parse user input into a source.
    ///
    /// `http`/`https` inputs are remote locators; anything else must name an
    /// existing regular file.
    pub fn parse(input: &str) -> IdentityResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IdentityError::unresolvable(input, "empty source"));
        }

        if let Some((scheme, _)) = input.split_once("://") {
            let scheme = scheme.to_ascii_lowercase();
            if scheme != "http" && scheme != "https" {
                return Err(IdentityError::unresolvable(
                    input,
                    format!("unsupported scheme '{}'", scheme),
                ));
            }
            let url = Url::parse(input)
                .map_err(|e| IdentityError::unresolvable(input, format!("invalid URL: {}", e)))?;
            if url.host_str().map_or(true, str::is_empty) {
                return Err(IdentityError::unresolvable(input, "URL has no host"));
            }
            return Ok(VideoSource::Remote(url));
        }

        let path = Path::new(input);
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {
                let canonical = fs::canonicalize(path).map_err(|e| {
                    IdentityError::unresolvable(input, format!("cannot canonicalize: {}", e))
                })?;
                Ok(VideoSource::Local(canonical))
            }
            Ok(_) => Err(IdentityError::unresolvable(input, "not a regular file")),
            Err(e) => Err(IdentityError::unresolvable(
                input,
                format!("neither a URL nor a readable file: {}", e),
            )),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            VideoSource::Remote(_) => SourceKind::Remote,
            VideoSource::Local(_) => SourceKind::Local,
        }
    }

    /// Original reference as stored on the video record.
    pub fn reference(&self) -> String {
        match self {
            VideoSource::Remote(url) => url.to_string(),
            VideoSource::Local(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

/// Derives [`VideoKey`]s from sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    /// Hash full file content for local sources instead of size and mtime.
    content_hash: bool,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the file content as the change signal for local sources.
    pub fn with_content_hash(mut self, enabled: bool) -> Self {
        self.content_hash = enabled;
        self
    }

    /// Parse and resolve in one step.
    pub fn resolve_input(&self, input: &str) -> IdentityResult<(VideoSource, VideoKey)> {
        let source = VideoSource::parse(input)?;
        let key = self.resolve(&source)?;
        Ok((source, key))
    }

    /// Derive the identity key of a source.
    pub fn resolve(&self, source: &VideoSource) -> IdentityResult<VideoKey> {
        match source {
            VideoSource::Remote(url) => Ok(remote_key(url)),
            VideoSource::Local(path) => self.local_key(path),
        }
    }

    fn local_key(&self, path: &Path) -> IdentityResult<VideoKey> {
        let input = path.to_string_lossy();
        let meta = fs::metadata(path)
            .map_err(|e| IdentityError::unresolvable(input.as_ref(), e.to_string()))?;
        if !meta.is_file() {
            return Err(IdentityError::unresolvable(input.as_ref(), "not a regular file"));
        }

        let mut hasher = Sha256::new();
        hasher.update(path.as_os_str().as_encoded_bytes());
        hasher.update([0u8]);

        if self.content_hash {
            let content = hash_file(path)
                .map_err(|e| IdentityError::unresolvable(input.as_ref(), e.to_string()))?;
            hasher.update(content);
        } else {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            hasher.update(meta.len().to_le_bytes());
            hasher.update(mtime.to_le_bytes());
        }

        Ok(VideoKey(format!("file_{:x}", hasher.finalize())))
    }
}

fn remote_key(url: &Url) -> VideoKey {
    if let Some(id) = extract_youtube_id(url) {
        return VideoKey(format!("yt_{}", id));
    }
    let digest = Sha256::digest(normalize_url(url).as_bytes());
    VideoKey(format!("url_{:x}", digest))
}

fn hash_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

/// Canonical string form of a remote locator.
///
/// Scheme and host are lowercased by the parser; on top of that a leading
/// `www.`, the fragment and a trailing path slash are dropped and query
/// parameters are sorted.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    if let Some(stripped) = url.host_str().and_then(|h| h.strip_prefix("www.")) {
        let stripped = stripped.to_string();
        // set_host only fails for hosts that could not have parsed
        let _ = url.set_host(Some(&stripped));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    url.to_string()
}
