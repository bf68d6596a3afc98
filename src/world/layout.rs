//! Repository Layout Resolver
//!
//! Flattens the Folder/Repository tree of a world definition into the ordered
//! list of (canonical url, local path) pairs the stack clones and updates.
//! The walk never stops at the first problem: every error is recorded in the
//! returned [`Diagnostics`] and any error means "no layout".

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;
use walkdir::WalkDir;

use super::tree::Element;
use super::{WorldOptions, FOLDER, NAME_ATTR, PLUGINS, REPOSITORY, URL_ATTR};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, StackError};
use crate::normalize::{is_valid_folder_name, RepoUrl};

/// Diagnostic codes produced by the resolver
pub mod codes {
    pub const INVALID_FOLDER_NAME: &str = "L001";
    pub const MISSING_URL: &str = "L002";
    pub const UNRESOLVED_URL: &str = "L003";
    pub const DUPLICATE_DECLARATION: &str = "L004";
    pub const PATH_COLLISION: &str = "L005";
    pub const URL_COLLISION: &str = "L006";
    pub const NAME_COLLISION: &str = "L007";
    pub const EMPTY_FOLDER: &str = "W001";
    pub const UNKNOWN_ELEMENT: &str = "W002";
}

/// How the flattened layout is ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutOrder {
    /// Document order, as the author wrote it
    #[default]
    DefinitionFile,
    /// Case-insensitive order of the path below the world root
    Path,
    /// Case-insensitive order of the repository short name
    Name,
}

impl fmt::Display for LayoutOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LayoutOrder::DefinitionFile => "definition_file",
            LayoutOrder::Path => "path",
            LayoutOrder::Name => "name",
        };
        f.write_str(s)
    }
}

/// One repository of a validated layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoLayoutEntry {
    pub url: RepoUrl,
    /// Child indexes leading from the document root to the Repository element
    #[serde(skip)]
    pub node: Vec<usize>,
    /// Folder chain below the world root
    pub folders: Vec<String>,
    /// World root + folders + repository short name
    pub path: PathBuf,
}

impl RepoLayoutEntry {
    pub fn name(&self) -> &str {
        self.url.name()
    }

    /// Path below the world root, `/` separated
    pub fn relative_path(&self) -> String {
        let mut parts: Vec<&str> = self.folders.iter().map(String::as_str).collect();
        parts.push(self.url.name());
        parts.join("/")
    }
}

/// Cached outcome of a layout read
#[derive(Debug, Clone)]
pub(crate) struct LayoutState {
    pub entries: Option<Vec<RepoLayoutEntry>>,
    pub diagnostics: Diagnostics,
}

/// Resolve the `Url` attribute of a Repository element
///
/// Absolute urls are used as they are. Anything else is a proxy folder name
/// and resolves to a `file:` url when that folder exists below `proxy_root`.
pub fn resolve_repository_url(raw: &str, proxy_root: Option<&Path>) -> Result<RepoUrl> {
    if let Ok(url) = Url::parse(raw) {
        return RepoUrl::from_url(url);
    }

    let unresolved = |reason: String| StackError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let Some(proxy_root) = proxy_root else {
        return Err(unresolved("not an absolute url and no local proxy is configured".to_string()));
    };
    if !is_valid_folder_name(raw) || !proxy_root.join(raw).is_dir() {
        let available = proxy_folders(proxy_root);
        return Err(unresolved(format!(
            "no proxy repository '{}' under {} (available: {})",
            raw,
            proxy_root.display(),
            if available.is_empty() { "none".to_string() } else { available.join(", ") }
        )));
    }
    RepoUrl::from_local_dir(&proxy_root.join(raw))
}

/// Folder names directly below the proxy root, sorted
pub fn proxy_folders(proxy_root: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(proxy_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Value stored in a Repository `Url` attribute for `url`
///
/// Local repositories living directly under the proxy root are stored by
/// folder name only; everything else is stored as the full url.
pub fn stored_url_value(url: &RepoUrl, proxy_root: Option<&Path>) -> String {
    if let (Some(proxy_root), Some(local)) = (proxy_root, url.to_file_path()) {
        if local.parent() == Some(proxy_root) {
            if let Some(folder) = local.file_name().and_then(|n| n.to_str()) {
                return folder.to_string();
            }
        }
    }
    url.as_str().to_string()
}

struct Pending {
    node: Vec<usize>,
    folders: Vec<String>,
}

/// Walk, validate and order the layout of a world definition tree
pub fn resolve_layout(root: &Element, options: &WorldOptions) -> (Option<Vec<RepoLayoutEntry>>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut entries = Vec::new();
    let proxy_root = options.proxy_root.as_deref();

    let mut pending: Vec<Pending> = Vec::new();
    push_children(&mut pending, root, &[], &[]);

    while let Some(Pending { node, folders }) = pending.pop() {
        let Some(element) = root.descendant(&node) else {
            continue;
        };
        let at = location(root.name(), &folders);

        match element.name() {
            PLUGINS if node.len() == 1 => {}
            FOLDER => {
                let name = match element.attribute(NAME_ATTR) {
                    Some(name) if is_valid_folder_name(name) => name.to_string(),
                    Some(name) => {
                        diagnostics.error(
                            codes::INVALID_FOLDER_NAME,
                            &at,
                            format!("invalid folder name '{}'", name),
                        );
                        name.to_string()
                    }
                    None => {
                        diagnostics.error(codes::INVALID_FOLDER_NAME, &at, "folder without Name attribute");
                        String::new()
                    }
                };
                if !element.has_elements() {
                    diagnostics.warning(
                        codes::EMPTY_FOLDER,
                        &at,
                        format!("empty folder '{}' is ignored", name),
                    );
                    continue;
                }
                let mut inner = folders.clone();
                inner.push(name);
                push_children(&mut pending, element, &node, &inner);
            }
            REPOSITORY => {
                let Some(raw) = element.attribute(URL_ATTR) else {
                    diagnostics.error(codes::MISSING_URL, &at, "repository without Url attribute");
                    continue;
                };
                match resolve_repository_url(raw, proxy_root) {
                    Ok(url) => {
                        let mut path = options.world_root.clone();
                        path.extend(folders.iter());
                        path.push(url.name());
                        entries.push(RepoLayoutEntry {
                            url,
                            node,
                            folders,
                            path,
                        });
                    }
                    Err(e) => diagnostics.error(codes::UNRESOLVED_URL, &at, e.to_string()),
                }
            }
            other => diagnostics.warning(
                codes::UNKNOWN_ELEMENT,
                &at,
                format!("unexpected element '{}' is ignored", other),
            ),
        }
    }

    cross_validate(&entries, &mut diagnostics);
    if !diagnostics.is_clean() {
        return (None, diagnostics);
    }

    sort_layout(&mut entries, options.order);
    (Some(entries), diagnostics)
}

/// Queue the element children of `parent` so they pop in document order
fn push_children(pending: &mut Vec<Pending>, parent: &Element, node: &[usize], folders: &[String]) {
    for (index, child) in parent.children().iter().enumerate().rev() {
        if child.as_element().is_none() {
            continue;
        }
        let mut path = node.to_vec();
        path.push(index);
        pending.push(Pending {
            node: path,
            folders: folders.to_vec(),
        });
    }
}

fn location(world: &str, folders: &[String]) -> String {
    if folders.is_empty() {
        world.to_string()
    } else {
        format!("{}/{}", world, folders.join("/"))
    }
}

fn cross_validate(entries: &[RepoLayoutEntry], diagnostics: &mut Diagnostics) {
    let mut declarations: HashMap<(&Path, &RepoUrl), usize> = HashMap::new();
    let mut url_by_path: HashMap<&Path, &RepoUrl> = HashMap::new();
    let mut path_by_url: HashMap<&RepoUrl, &Path> = HashMap::new();
    let mut url_by_name: HashMap<String, &RepoUrl> = HashMap::new();

    for entry in entries {
        let path = entry.path.as_path();
        let location = entry.relative_path();

        let count = declarations.entry((path, &entry.url)).or_insert(0);
        *count += 1;
        if *count == 2 {
            diagnostics.error(
                codes::DUPLICATE_DECLARATION,
                &location,
                format!("repository {} is declared more than once", entry.url),
            );
        }

        match url_by_path.entry(path) {
            Entry::Occupied(o) if *o.get() != &entry.url => diagnostics.error(
                codes::PATH_COLLISION,
                &location,
                format!("path {} is used by both {} and {}", path.display(), o.get(), entry.url),
            ),
            Entry::Occupied(_) => {}
            Entry::Vacant(v) => {
                v.insert(&entry.url);
            }
        }

        match path_by_url.entry(&entry.url) {
            Entry::Occupied(o) if *o.get() != path => diagnostics.error(
                codes::URL_COLLISION,
                &location,
                format!(
                    "repository {} appears at both {} and {}",
                    entry.url,
                    o.get().display(),
                    path.display()
                ),
            ),
            Entry::Occupied(_) => {}
            Entry::Vacant(v) => {
                v.insert(path);
            }
        }

        match url_by_name.entry(entry.name().to_lowercase()) {
            Entry::Occupied(o) if *o.get() != &entry.url => diagnostics.error(
                codes::NAME_COLLISION,
                &location,
                format!(
                    "repositories {} and {} share the directory name '{}'",
                    o.get(),
                    entry.url,
                    entry.name()
                ),
            ),
            Entry::Occupied(_) => {}
            Entry::Vacant(v) => {
                v.insert(&entry.url);
            }
        }
    }
}

pub fn sort_layout(entries: &mut [RepoLayoutEntry], order: LayoutOrder) {
    match order {
        LayoutOrder::DefinitionFile => {}
        LayoutOrder::Path => entries.sort_by_key(|e| e.relative_path().to_lowercase()),
        LayoutOrder::Name => entries.sort_by_key(|e| e.name().to_lowercase()),
    }
}
