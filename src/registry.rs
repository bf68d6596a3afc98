//! Stack Registry
//!
//! A machine-wide index of every Stack root known on this machine, stored as a
//! flat text file in the local data directory:
//!
//! ```text
//! /home/me/dev/MyStack/PublicStack*https://github.com/me/my-stack
//! /home/me/dev/Other/PrivateStack*https://git.example.com/team/other
//! ```
//!
//! Every operation runs one full load-repair-save cycle under a named lock
//! shared by all processes using the same data directory. Reading repairs the
//! file: malformed lines, vanished Stack directories and duplicated paths are
//! dropped and the file is rewritten.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, StackError};
use crate::lock::{FileLock, NamedLock};
use crate::normalize::RepoUrl;

/// Registry file name inside the local data directory
pub const REGISTRY_FILE_NAME: &str = "StackRegistry.txt";

/// Lock file name inside the local data directory
pub const LOCK_FILE_NAME: &str = "StackRegistry.lock";

/// Minimal number of path segments of a registered Stack path
pub const MIN_STACK_PATH_SEGMENTS: usize = 4;

const FIELD_SEPARATOR: char = '*';

/// Public or private Stack flavor, named by the final segment of its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StackKind {
    Public,
    Private,
}

impl StackKind {
    /// Name of the directory that marks a Stack root
    pub fn marker(&self) -> &'static str {
        match self {
            StackKind::Public => "PublicStack",
            StackKind::Private => "PrivateStack",
        }
    }

    pub fn from_marker(name: &str) -> Option<Self> {
        match name {
            "PublicStack" => Some(StackKind::Public),
            "PrivateStack" => Some(StackKind::Private),
            _ => None,
        }
    }

    /// Flavor of a Stack path, from its final segment
    pub fn of_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::from_marker)
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// One registered Stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub path: PathBuf,
    pub url: RepoUrl,
}

impl RegistryEntry {
    pub fn kind(&self) -> Option<StackKind> {
        StackKind::of_path(&self.path)
    }
}

/// Check that `path` can be registered as a Stack root
pub fn validate_stack_path(path: &Path) -> Result<StackKind> {
    let invalid = |reason: &str| StackError::InvalidStackPath {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };
    if !path.is_absolute() {
        return Err(invalid("path must be absolute"));
    }
    let segments = path
        .components()
        .filter(|c| !matches!(c, Component::RootDir))
        .count();
    if segments < MIN_STACK_PATH_SEGMENTS {
        return Err(invalid("path has too few segments"));
    }
    StackKind::of_path(path).ok_or_else(|| invalid("last segment must be PublicStack or PrivateStack"))
}

/// The machine-wide Stack registry
pub struct StackRegistry {
    /// Local data directory holding the registry and its lock
    data_dir: PathBuf,
    /// Registry file
    file: PathBuf,
    /// Cross-process lock guarding `file`
    lock: Box<dyn NamedLock>,
}

impl StackRegistry {
    /// Open the registry of a local data directory, locked by a file lock
    /// inside that directory
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let lock = FileLock::new(data_dir.join(LOCK_FILE_NAME));
        Self::with_lock(data_dir, lock)
    }

    /// Open the registry with a caller supplied lock
    pub fn with_lock(data_dir: impl AsRef<Path>, lock: impl NamedLock + 'static) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            file: data_dir.join(REGISTRY_FILE_NAME),
            data_dir,
            lock: Box::new(lock),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the backing registry file
    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Paths of every Stack registered under `url`
    ///
    /// More than one path means the same Stack has been cloned more than once
    /// on this machine.
    pub fn check_existing_stack(&self, url: &RepoUrl) -> Result<Vec<PathBuf>> {
        let map = self.run(None)?;
        Ok(map
            .into_iter()
            .filter(|(_, u)| u == url)
            .map(|(p, _)| p)
            .collect())
    }

    /// Register (or re-register) the Stack at `path`
    pub fn register_new_stack(&self, path: &Path, url: &RepoUrl) -> Result<()> {
        validate_stack_path(path)?;
        if !path.is_dir() {
            return Err(StackError::InvalidStackPath {
                path: path.display().to_string(),
                reason: "directory does not exist".to_string(),
            });
        }
        self.run(Some((path, url)))?;
        Ok(())
    }

    /// Every registered Stack, sorted by path
    pub fn get_all_stacks(&self) -> Result<Vec<RegistryEntry>> {
        let map = self.run(None)?;
        Ok(map
            .into_iter()
            .map(|(path, url)| RegistryEntry { path, url })
            .collect())
    }

    /// Delete the registry file. Returns whether a file existed.
    pub fn clear(&self) -> Result<bool> {
        let _guard = self.lock.acquire()?;
        match fs::remove_file(&self.file) {
            Ok(()) => {
                info!(file = %self.file.display(), "stack registry cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// One locked load-repair-save cycle, optionally upserting one entry
    fn run(&self, register: Option<(&Path, &RepoUrl)>) -> Result<BTreeMap<PathBuf, RepoUrl>> {
        let _guard = self.lock.acquire()?;

        let (mut map, mut must_save) = self.load()?;

        if let Some((path, url)) = register {
            map.insert(path.to_path_buf(), url.clone());
            must_save = true;
        }

        if must_save {
            self.save(&map)?;
        }
        Ok(map)
    }

    /// Read and repair the registry file. Returns the surviving entries and
    /// whether the file must be rewritten.
    fn load(&self) -> Result<(BTreeMap<PathBuf, RepoUrl>, bool)> {
        let mut map = BTreeMap::new();
        if !self.file.exists() {
            return Ok((map, false));
        }

        let content = fs::read_to_string(&self.file)?;
        let mut must_save = false;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = index + 1;

            let (path, url) = match parse_line(line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(file = %self.file.display(), line = line_no, "dropping invalid registry line '{}': {}", line, e);
                    must_save = true;
                    continue;
                }
            };

            if !path.is_dir() {
                info!(path = %path.display(), "registered stack no longer exists; removing it from the registry");
                must_save = true;
                continue;
            }

            if map.contains_key(&path) {
                warn!(path = %path.display(), line = line_no, "duplicate stack path in registry; keeping the first entry");
                must_save = true;
                continue;
            }

            map.insert(path, url);
        }

        Ok((map, must_save))
    }

    /// Rewrite the whole registry file
    fn save(&self, map: &BTreeMap<PathBuf, RepoUrl>) -> Result<()> {
        let mut content = String::new();
        for (path, url) in map {
            content.push_str(&format!("{}{}{}\n", path.display(), FIELD_SEPARATOR, url));
        }

        let tmp = self.file.with_extension("txt.partial");
        fs::write(&tmp, &content)?;
        fs::rename(&tmp, &self.file)?;

        debug!(file = %self.file.display(), entries = map.len(), "stack registry saved");
        Ok(())
    }
}

fn parse_line(line: &str) -> Result<(PathBuf, RepoUrl)> {
    let (path, url) = line.split_once(FIELD_SEPARATOR).ok_or_else(|| StackError::InvalidStackPath {
        path: line.to_string(),
        reason: format!("missing '{}' separator", FIELD_SEPARATOR),
    })?;
    let path = PathBuf::from(path.trim());
    validate_stack_path(&path)?;
    let url = RepoUrl::parse(url.trim())?;
    Ok((path, url))
}
