//! Backend classification for locators.
//!
//! A locator is an opaque string whose scheme prefix decides which storage
//! backend owns it. Anything without a recognized scheme is a local path.

use std::fmt;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Storage backend that owns a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum Backend {
    /// Plain filesystem path.
    Local,
    /// Document-tree storage addressed by content identifiers.
    Scoped,
    Smb,
    Sftp,
    Ftp,
    /// Cloud object store.
    Cloud,
}

impl Backend {
    /// Whether the backend is reached over the network.
    ///
    /// Scoped storage lives on the device, so it is not a network backend
    /// even though it cannot be addressed with filesystem paths.
    pub fn is_network(self) -> bool {
        matches!(self, Self::Smb | Self::Sftp | Self::Ftp | Self::Cloud)
    }

    /// Map a URI scheme (without the colon) to its backend.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        let backend = match scheme.to_ascii_lowercase().as_str() {
            "file" => Self::Local,
            "content" => Self::Scoped,
            "smb" => Self::Smb,
            "sftp" => Self::Sftp,
            "ftp" | "ftps" => Self::Ftp,
            "cloud" | "gdrive" | "onedrive" | "dropbox" => Self::Cloud,
            _ => return None,
        };
        Some(backend)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Scoped => write!(f, "scoped"),
            Self::Smb => write!(f, "SMB"),
            Self::Sftp => write!(f, "SFTP"),
            Self::Ftp => write!(f, "FTP"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Split `scheme:rest` when `rest` starts with a slash and the scheme is known.
fn split_scheme(raw: &str) -> Option<(Backend, &str, &str)> {
    let colon = raw.find(':')?;
    let (scheme, rest) = (&raw[..colon], &raw[colon + 1..]);
    if scheme.is_empty() || !rest.starts_with('/') {
        return None;
    }
    Backend::from_scheme(scheme).map(|backend| (backend, scheme, rest))
}

/// Classify a locator string.
///
/// Schemes may be written with one or two slashes after the colon
/// (`smb:/host/share` and `smb://host/share` are both SMB).
pub fn classify(locator: &str) -> Backend {
    split_scheme(locator.trim_start())
        .map(|(backend, _, _)| backend)
        .unwrap_or(Backend::Local)
}

/// Memoized classifier for hot loops.
#[derive(Debug, Default)]
pub struct ClassifierCache {
    entries: DashMap<String, Backend>,
}

impl ClassifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a locator, caching the answer.
    pub fn classify(&self, locator: &str) -> Backend {
        if let Some(hit) = self.entries.get(locator) {
            return *hit;
        }
        let backend = classify(locator);
        self.entries.insert(locator.to_string(), backend);
        backend
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An opaque path on some backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    /// Create a locator, normalizing `scheme:/x` to `scheme://x`.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = match split_scheme(&raw) {
            Some((backend, scheme, rest)) if backend != Backend::Local => {
                let body = rest.strip_prefix("//").unwrap_or(&rest[1..]);
                Some(format!("{}://{}", scheme.to_ascii_lowercase(), body))
            }
            _ => None,
        };
        Self(normalized.unwrap_or(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn backend(&self) -> Backend {
        classify(&self.0)
    }

    pub fn is_local(&self) -> bool {
        self.backend() == Backend::Local
    }

    /// Filesystem path for local locators.
    pub fn to_path(&self) -> Option<PathBuf> {
        if !self.is_local() {
            return None;
        }
        let raw = self.0.as_str();
        let path = match raw.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("file:") => {
                let rest = &raw[5..];
                // file:///abs keeps its leading slash, file://abs is treated the same way
                match rest.strip_prefix("//") {
                    Some(stripped) if stripped.starts_with('/') => stripped,
                    Some(stripped) => return Some(Path::new("/").join(stripped)),
                    None => rest,
                }
            }
            _ => raw,
        };
        Some(PathBuf::from(path))
    }

    /// Offset of the first path byte after `scheme://authority`.
    fn remote_body_start(&self) -> usize {
        self.0.find("://").map(|i| i + 3).unwrap_or(0)
    }

    fn trimmed(&self) -> &str {
        let body_start = self.remote_body_start();
        let trimmed = self.0.trim_end_matches('/');
        if trimmed.len() < body_start {
            &self.0
        } else {
            trimmed
        }
    }

    /// Last path segment.
    pub fn file_name(&self) -> String {
        if let Some(path) = self.to_path() {
            return path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        let trimmed = self.trimmed();
        let start = self.remote_body_start();
        match trimmed[start..].rfind('/') {
            Some(idx) => trimmed[start + idx + 1..].to_string(),
            None => String::new(),
        }
    }

    /// Locator of the containing directory.
    pub fn parent(&self) -> Option<Locator> {
        if let Some(path) = self.to_path() {
            return path.parent().map(|p| Locator::from(p.to_path_buf()));
        }
        let trimmed = self.trimmed();
        let start = self.remote_body_start();
        // the first segment is the host/authority and has no parent
        let idx = trimmed[start..].rfind('/')?;
        Some(Locator(trimmed[..start + idx].to_string()))
    }

    /// Child locator named `name`.
    pub fn join(&self, name: &str) -> Locator {
        if let Some(path) = self.to_path() {
            return Locator::from(path.join(name));
        }
        Locator(format!("{}/{}", self.trimmed(), name))
    }

    /// Sibling locator with the last segment replaced by `name`.
    pub fn with_file_name(&self, name: &str) -> Locator {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => Locator::new(name),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<PathBuf> for Locator {
    fn from(path: PathBuf) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<&Path> for Locator {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_schemes() {
        assert_eq!(classify("/home/user/a.jpg"), Backend::Local);
        assert_eq!(classify("file:///home/user/a.jpg"), Backend::Local);
        assert_eq!(classify("content://com.android.externalstorage/tree/x"), Backend::Scoped);
        assert_eq!(classify("smb://nas/share/a.jpg"), Backend::Smb);
        assert_eq!(classify("SFTP://host/a.jpg"), Backend::Sftp);
        assert_eq!(classify("ftps://host/a.jpg"), Backend::Ftp);
        assert_eq!(classify("gdrive://root/a.jpg"), Backend::Cloud);
        assert_eq!(classify("mystery://x"), Backend::Local);
    }

    #[test]
    fn test_classify_single_slash() {
        assert_eq!(classify("smb:/nas/share"), Backend::Smb);
        assert_eq!(classify("cloud:/bucket/a"), Backend::Cloud);
        // no slash at all is not a scheme
        assert_eq!(classify("smb:nas"), Backend::Local);
    }

    #[test]
    fn test_locator_normalizes() {
        let locator = Locator::new("SMB:/nas/share/a.jpg");
        assert_eq!(locator.as_str(), "smb://nas/share/a.jpg");
        assert_eq!(locator.backend(), Backend::Smb);
    }

    #[test]
    fn test_remote_segments() {
        let locator = Locator::new("sftp://host/photos/2024/a.jpg");
        assert_eq!(locator.file_name(), "a.jpg");
        assert_eq!(
            locator.parent().unwrap().as_str(),
            "sftp://host/photos/2024"
        );
        assert_eq!(
            locator.with_file_name("b.jpg").as_str(),
            "sftp://host/photos/2024/b.jpg"
        );
        assert_eq!(
            Locator::new("sftp://host/photos/").join("c.jpg").as_str(),
            "sftp://host/photos/c.jpg"
        );
    }

    #[test]
    fn test_local_paths() {
        let locator = Locator::new("file:///tmp/a.txt");
        assert_eq!(locator.to_path().unwrap(), PathBuf::from("/tmp/a.txt"));
        assert_eq!(locator.file_name(), "a.txt");
        assert!(Locator::new("smb://nas/a").to_path().is_none());
    }

    #[test]
    fn test_classifier_cache() {
        let cache = ClassifierCache::new();
        assert_eq!(cache.classify("ftp://host/a"), Backend::Ftp);
        assert_eq!(cache.classify("ftp://host/a"), Backend::Ftp);
        assert_eq!(cache.len(), 1);
    }
}
