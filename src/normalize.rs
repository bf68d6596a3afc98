//! Repository URL canonicalization and folder name validation
//!
//! Shared by the stack registry and the world layout resolver so both agree
//! on what "the same repository" means.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Serialize, Serializer};
use url::Url;

use crate::error::{Result, StackError};

const REPOSITORY_SUFFIX: &str = ".git";

fn folder_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^[^<>:"/\\|?*\x00-\x1F]+$"#).expect("valid folder name regex"))
}

fn plugin_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid plugin name regex"))
}

/// Whether `name` can be used as a single directory name on any platform
pub fn is_valid_folder_name(name: &str) -> bool {
    if name == "." || name == ".." {
        return false;
    }
    if name.trim() != name {
        return false;
    }
    folder_name_regex().is_match(name)
}

pub fn validate_folder_name(name: &str) -> Result<()> {
    if is_valid_folder_name(name) {
        Ok(())
    } else {
        Err(StackError::InvalidFolderName(name.to_string()))
    }
}

/// Plugin short names double as element names in the definition document
pub fn is_valid_plugin_name(name: &str) -> bool {
    plugin_name_regex().is_match(name)
}

/// A canonical repository URL
///
/// Canonical form: the trailing `.git` suffix and trailing slashes are
/// stripped, query components are rejected, and the final path segment,
/// percent-decoded, is the repository's short name (the directory it is
/// cloned into).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoUrl {
    url: Url,
    name: String,
}

impl RepoUrl {
    /// Parse and canonicalize an absolute URL
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|e| invalid(raw, e.to_string()))?;
        Self::from_url(url)
    }

    /// Canonicalize an already parsed URL
    pub fn from_url(mut url: Url) -> Result<Self> {
        if url.cannot_be_a_base() {
            return Err(invalid(url.as_str(), "not a hierarchical url"));
        }
        if url.query().is_some() {
            return Err(invalid(url.as_str(), "query components are not allowed"));
        }

        let path = strip_repository_suffix(url.path()).to_string();
        let segment = path.rsplit('/').next().unwrap_or_default();
        let name = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| invalid(url.as_str(), "repository name is not valid UTF-8"))?
            .into_owned();
        if name.is_empty() {
            return Err(invalid(url.as_str(), "no repository name in path"));
        }
        if !is_valid_folder_name(&name) {
            return Err(invalid(url.as_str(), format!("'{}' is not a valid repository name", name)));
        }
        url.set_path(&path);

        Ok(Self { url, name })
    }

    /// File URL for a local repository directory
    pub fn from_local_dir(dir: &Path) -> Result<Self> {
        let url = Url::from_directory_path(dir)
            .map_err(|_| invalid(&dir.display().to_string(), "not an absolute directory path"))?;
        Self::from_url(url)
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Canonical short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local directory for `file:` URLs
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.url.scheme() != "file" {
            return None;
        }
        self.url.to_file_path().ok()
    }
}

fn strip_repository_suffix(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    let cut = trimmed.len().saturating_sub(REPOSITORY_SUFFIX.len());
    match trimmed.get(cut..) {
        Some(tail) if tail.eq_ignore_ascii_case(REPOSITORY_SUFFIX) => trimmed[..cut].trim_end_matches('/'),
        _ => trimmed,
    }
}

fn invalid(url: &str, reason: impl Into<String>) -> StackError {
    StackError::InvalidUrl {
        url: url.to_string(),
        reason: reason.into(),
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepoUrl {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for RepoUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
