//! World Definition Document
//!
//! A world definition file declares which repositories a World holds and
//! where they live on disk:
//!
//! ```xml
//! <MyWorld>
//!   <Plugins CompileMode="Debug">
//!     <Formatter Disabled="true" />
//!   </Plugins>
//!   <Folder Name="Libraries">
//!     <Repository Url="https://github.com/me/core.git" />
//!     <Repository Url="LocalOnly">
//!       <Formatter Style="tabs" />
//!     </Repository>
//!   </Folder>
//! </MyWorld>
//! ```
//!
//! [`WorldDefinition`] owns the tree. Reading is open to anyone through
//! [`WorldDefinition::root`]; mutation only happens through an [`EditScope`]
//! obtained from [`WorldDefinition::start_edit`]. Every mutation through the
//! scope marks the document dirty and drops the derived caches. Operations on
//! the scope never save: the `WorldDefinition` level operations open a scope,
//! apply the change, close the scope and save, so a caller composing several
//! edits inside one scope saves once at the end.

pub mod layout;
pub mod plugins;
pub mod tree;

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::diagnostics::Diagnostics;
use crate::error::{Result, StackError};
use crate::normalize::{validate_folder_name, RepoUrl};
use crate::vcs::VersionControl;

use self::layout::{resolve_layout, resolve_repository_url, stored_url_value, LayoutOrder, LayoutState, RepoLayoutEntry};
use self::plugins::PluginsState;
use self::tree::{Element, Node};

pub const PLUGINS: &str = "Plugins";
pub const FOLDER: &str = "Folder";
pub const REPOSITORY: &str = "Repository";
pub const NAME_ATTR: &str = "Name";
pub const URL_ATTR: &str = "Url";
pub const COMPILE_MODE_ATTR: &str = "CompileMode";
pub const DISABLED_ATTR: &str = "Disabled";

/// How plugins of a world are compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    Debug,
    None,
    #[default]
    Release,
}

impl CompileMode {
    /// Any value other than `Debug` or `None` means `Release`
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("Debug") => CompileMode::Debug,
            Some("None") => CompileMode::None,
            _ => CompileMode::Release,
        }
    }
}

/// Rewrites a Repository `Url` value at load time; `None` keeps it
pub type UrlRewriter = Box<dyn Fn(&str) -> Option<String>>;

/// Context a world definition is interpreted in
pub struct WorldOptions {
    /// Directory the layout paths are rooted at
    pub world_root: PathBuf,
    /// Local proxy repositories root of the owning stack; `None` disables proxy mode
    pub proxy_root: Option<PathBuf>,
    pub order: LayoutOrder,
    pub url_rewriter: Option<UrlRewriter>,
}

impl WorldOptions {
    pub fn new(world_root: impl Into<PathBuf>) -> Self {
        Self {
            world_root: world_root.into(),
            proxy_root: None,
            order: LayoutOrder::default(),
            url_rewriter: None,
        }
    }

    pub fn with_proxy_root(mut self, proxy_root: impl Into<PathBuf>) -> Self {
        let proxy_root = proxy_root.into();
        self.proxy_root = if proxy_root.as_os_str().is_empty() { None } else { Some(proxy_root) };
        self
    }

    pub fn with_order(mut self, order: LayoutOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_url_rewriter(mut self, rewriter: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.url_rewriter = Some(Box::new(rewriter));
        self
    }
}

/// The definition document of one World
pub struct WorldDefinition {
    name: String,
    file: PathBuf,
    root: Element,
    options: WorldOptions,
    dirty: bool,
    /// Set once a layout has been read; a save then re-reads it from disk
    layout_requested: bool,
    layout: OnceCell<LayoutState>,
    plugins: OnceCell<PluginsState>,
}

impl WorldDefinition {
    /// Load the definition file at `file`
    pub fn load(file: impl AsRef<Path>, options: WorldOptions) -> Result<Self> {
        let file = file.as_ref().to_path_buf();
        let content = fs::read_to_string(&file)?;
        let root = Element::parse(&content)?;
        debug!(file = %file.display(), world = root.name(), "world definition loaded");
        Ok(Self::from_element(file, root, options))
    }

    /// Wrap an already parsed tree whose backing file is `file`
    pub fn from_element(file: impl Into<PathBuf>, mut root: Element, options: WorldOptions) -> Self {
        ensure_plugins_first(&mut root);
        if let Some(rewriter) = &options.url_rewriter {
            rewrite_urls(&mut root, rewriter.as_ref());
        }
        Self {
            name: root.name().to_string(),
            file: file.into(),
            root,
            options,
            dirty: false,
            layout_requested: false,
            layout: OnceCell::new(),
            plugins: OnceCell::new(),
        }
    }

    /// World name (the root element name)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Read-only view of the whole tree
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn options(&self) -> &WorldOptions {
        &self.options
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The Plugins container, kept as the first child element of the root
    pub fn plugins_element(&self) -> Option<&Element> {
        self.root.elements().next().filter(|e| e.name() == PLUGINS)
    }

    pub fn compile_mode(&self) -> CompileMode {
        CompileMode::from_attribute(self.plugins_element().and_then(|p| p.attribute(COMPILE_MODE_ATTR)))
    }

    /// Change the layout order; the next layout read re-sorts
    pub fn set_layout_order(&mut self, order: LayoutOrder) {
        if self.options.order != order {
            self.options.order = order;
            self.layout_requested |= self.layout.get().is_some();
            self.layout.take();
        }
    }

    /// Open an edit transaction
    pub fn start_edit(&mut self) -> EditScope<'_> {
        EditScope { doc: self }
    }

    /// The validated, ordered layout, or `None` when the tree is invalid
    ///
    /// The result is cached. On `None`, [`WorldDefinition::layout_diagnostics`]
    /// lists every problem found.
    pub fn layout(&self) -> Option<&[RepoLayoutEntry]> {
        self.layout_state().entries.as_deref()
    }

    pub fn layout_diagnostics(&self) -> &Diagnostics {
        &self.layout_state().diagnostics
    }

    fn layout_state(&self) -> &LayoutState {
        self.layout.get_or_init(|| {
            let (entries, diagnostics) = resolve_layout(&self.root, &self.options);
            LayoutState { entries, diagnostics }
        })
    }

    /// The Repository element a layout entry was produced from
    pub fn layout_node(&self, entry: &RepoLayoutEntry) -> Option<&Element> {
        self.root.descendant(&entry.node)
    }

    /// Find the Repository element declaring `url`
    pub fn find_repository(&self, url: &RepoUrl) -> Option<&Element> {
        let found = self.repository_nodes(url);
        match found.as_slice() {
            [node] => self.root.descendant(node),
            _ => None,
        }
    }

    /// Write the document if it has unsaved edits
    ///
    /// On a write failure the document stays dirty so the save can be retried.
    /// When a layout had been read before, it is re-read from the written file;
    /// if that fails validation the save reports an error even though the file
    /// was written.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let xml = self.root.to_xml()?;
        if let Err(e) = fs::write(&self.file, xml) {
            error!(file = %self.file.display(), "failed to save world definition: {}", e);
            return Err(e.into());
        }
        self.dirty = false;
        info!(world = %self.name, file = %self.file.display(), "world definition saved");

        if self.layout_requested || self.layout.get().is_some() {
            self.reload_layout()?;
        }
        Ok(())
    }

    /// Re-read the layout from the freshly written file
    fn reload_layout(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.file)?;
        let written = Element::parse(&content)?;
        let (entries, diagnostics) = resolve_layout(&written, &self.options);

        let Some(entries) = entries else {
            let errors = diagnostics.errors.len();
            self.layout = OnceCell::new();
            let _ = self.layout.set(LayoutState { entries: None, diagnostics });
            return Err(StackError::InvalidLayout {
                world: self.name.clone(),
                errors,
            });
        };

        match self.layout.get_mut() {
            Some(LayoutState {
                entries: Some(cached),
                diagnostics: cached_diagnostics,
            }) => {
                cached.clear();
                cached.extend(entries);
                *cached_diagnostics = diagnostics;
            }
            _ => {
                self.layout = OnceCell::new();
                let _ = self.layout.set(LayoutState {
                    entries: Some(entries),
                    diagnostics,
                });
            }
        }
        Ok(())
    }

    /// Add a repository below `folders` (created as needed) and save
    pub fn add_repository<S: AsRef<str>>(&mut self, folders: &[S], url: &RepoUrl) -> Result<()> {
        self.start_edit().add_repository(folders, url)?;
        self.save()
    }

    /// Remove the repository declaring `url` and save
    pub fn remove_repository(&mut self, url: &RepoUrl, remove_empty_folders: bool) -> Result<()> {
        self.start_edit().remove_repository(url, remove_empty_folders)?;
        self.save()
    }

    /// Enable or disable a plugin, save and commit
    ///
    /// Asking for the state the plugin is already in does nothing: no save and
    /// no commit.
    pub fn set_plugin_enabled(&mut self, plugin: &str, enabled: bool, vcs: &dyn VersionControl) -> Result<()> {
        if !self.start_edit().set_plugin_disabled(plugin, !enabled)? {
            debug!(world = %self.name, plugin, enabled, "plugin already in requested state");
            return Ok(());
        }
        self.save()?;

        let action = if enabled { "Enable" } else { "Disable" };
        vcs.commit(&format!("{} plugin '{}' in world '{}'.", action, plugin, self.name))
    }

    /// Make sure a Plugins level configuration exists for `plugin`, and save
    pub fn ensure_plugin_configuration(&mut self, plugin: &str) -> Result<()> {
        self.start_edit().ensure_plugin_configuration(plugin)?;
        self.save()
    }

    /// Remove every configuration of `plugin`, and save
    pub fn remove_plugin_configuration(&mut self, plugin: &str) -> Result<usize> {
        let removed = self.start_edit().remove_plugin_configuration(plugin)?;
        self.save()?;
        Ok(removed)
    }

    /// Child index paths of every Repository element declaring `url`
    fn repository_nodes(&self, url: &RepoUrl) -> Vec<Vec<usize>> {
        let proxy_root = self.options.proxy_root.as_deref();
        let stored = stored_url_value(url, proxy_root);
        let mut found = Vec::new();
        walk_repositories(&self.root, |node, element| {
            let Some(raw) = element.attribute(URL_ATTR) else {
                return;
            };
            let matches = raw == stored
                || resolve_repository_url(raw, proxy_root)
                    .map(|resolved| &resolved == url)
                    .unwrap_or(false);
            if matches {
                found.push(node.to_vec());
            }
        });
        found
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.layout_requested |= self.layout.get().is_some();
        self.layout.take();
        self.plugins.take();
    }
}

/// An open edit transaction on a [`WorldDefinition`]
///
/// Closing the scope (dropping it) ends the transaction; saving is up to the
/// caller.
pub struct EditScope<'a> {
    doc: &'a mut WorldDefinition,
}

impl<'a> EditScope<'a> {
    /// Read access to the document while the scope is open
    pub fn document(&self) -> &WorldDefinition {
        &*self.doc
    }

    /// Mutable access to the whole tree; marks the document dirty
    pub fn root_mut(&mut self) -> &mut Element {
        self.doc.touch();
        &mut self.doc.root
    }

    /// Add a Repository element under the folder chain `folders`
    ///
    /// Missing folders are created in case-insensitive name order among their
    /// sibling folders; the repository is appended after its siblings.
    pub fn add_repository<S: AsRef<str>>(&mut self, folders: &[S], url: &RepoUrl) -> Result<()> {
        for folder in folders {
            validate_folder_name(folder.as_ref())?;
        }
        let value = stored_url_value(url, self.doc.options.proxy_root.as_deref());

        self.doc.touch();
        let mut current = &mut self.doc.root;
        for folder in folders {
            let index = find_or_create_folder(current, folder.as_ref());
            let Some(next) = current.children_mut().get_mut(index).and_then(Node::as_element_mut) else {
                return Err(StackError::InvalidDocument(format!("folder '{}' could not be created", folder.as_ref())));
            };
            current = next;
        }
        current.push(Element::new(REPOSITORY).with_attribute(URL_ATTR, value));

        debug!(world = %self.doc.name, url = %url, "repository added");
        Ok(())
    }

    /// Remove the Repository element declaring `url`
    ///
    /// With `remove_empty_folders`, ancestor folders left without any element
    /// are removed too, up to the first non-empty folder or the root.
    pub fn remove_repository(&mut self, url: &RepoUrl, remove_empty_folders: bool) -> Result<()> {
        let found = self.doc.repository_nodes(url);
        let mut node = match found.len() {
            0 => {
                return Err(StackError::RepositoryNotFound {
                    world: self.doc.name.clone(),
                    url: url.to_string(),
                })
            }
            1 => found.into_iter().next().unwrap_or_default(),
            count => {
                return Err(StackError::AmbiguousRepository {
                    world: self.doc.name.clone(),
                    url: url.to_string(),
                    count,
                })
            }
        };

        self.doc.touch();
        let root = &mut self.doc.root;
        while let Some(index) = node.pop() {
            let Some(parent) = root.descendant_mut(&node) else {
                break;
            };
            parent.children_mut().remove(index);

            let parent_is_empty_folder = parent.name() == FOLDER && !parent.has_elements();
            if !remove_empty_folders || node.is_empty() || !parent_is_empty_folder {
                break;
            }
        }

        debug!(world = %self.doc.name, url = %url, "repository removed");
        Ok(())
    }
}

/// Index of the Folder child named `name` (case-insensitive), created if needed
fn find_or_create_folder(parent: &mut Element, name: &str) -> usize {
    let key = name.to_lowercase();
    let mut insert_at = None;
    for (index, child) in parent.children().iter().enumerate() {
        let Some(folder) = child.as_element().filter(|e| e.name() == FOLDER) else {
            continue;
        };
        let Some(existing) = folder.attribute(NAME_ATTR) else {
            continue;
        };
        let existing = existing.to_lowercase();
        if existing == key {
            return index;
        }
        if insert_at.is_none() && existing > key {
            insert_at = Some(index);
        }
    }

    let folder = Element::new(FOLDER).with_attribute(NAME_ATTR, name);
    match insert_at {
        Some(index) => {
            parent.insert(index, folder);
            index
        }
        None => {
            parent.push(folder);
            parent.children().len() - 1
        }
    }
}

/// Visit every Repository element below Folders, with its child index path
pub(crate) fn walk_repositories(root: &Element, mut visit: impl FnMut(&[usize], &Element)) {
    let mut pending: Vec<Vec<usize>> = (0..root.children().len()).rev().map(|i| vec![i]).collect();
    while let Some(node) = pending.pop() {
        let Some(element) = root.descendant(&node) else {
            continue;
        };
        match element.name() {
            REPOSITORY => visit(&node, element),
            FOLDER => {
                for index in (0..element.children().len()).rev() {
                    let mut child = node.clone();
                    child.push(index);
                    pending.push(child);
                }
            }
            _ => {}
        }
    }
}

/// Make the Plugins container the first child element, creating it if missing
fn ensure_plugins_first(root: &mut Element) {
    let first_element = root.children().iter().position(|c| c.as_element().is_some());
    let position = root
        .children()
        .iter()
        .position(|c| c.as_element().map(|e| e.name() == PLUGINS).unwrap_or(false));
    match position {
        Some(index) if Some(index) == first_element => {}
        Some(index) => {
            let plugins = root.children_mut().remove(index);
            root.children_mut().insert(first_element.unwrap_or(0), plugins);
        }
        None => root.insert(0, Element::new(PLUGINS)),
    }
}

fn rewrite_urls(element: &mut Element, rewriter: &dyn Fn(&str) -> Option<String>) {
    for child in element.elements_mut() {
        if child.name() == REPOSITORY {
            if let Some(rewritten) = child.attribute(URL_ATTR).and_then(rewriter) {
                child.set_attribute(URL_ATTR, rewritten);
            }
        }
        rewrite_urls(child, rewriter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    const WORLD: &str = r#"<MyWorld>
  <Plugins CompileMode="Debug">
    <Formatter />
  </Plugins>
  <Folder Name="Core">
    <Repository Url="https://example.com/org/base.git" />
  </Folder>
  <Folder Name="Tools">
    <Repository Url="https://example.com/org/cli" />
  </Folder>
</MyWorld>
"#;

    fn url(s: &str) -> RepoUrl {
        RepoUrl::parse(s).unwrap()
    }

    fn load(dir: &TempDir, xml: &str) -> WorldDefinition {
        let file = dir.path().join("MyWorld.xml");
        fs::write(&file, xml).unwrap();
        WorldDefinition::load(&file, WorldOptions::new(dir.path().join("MyWorld"))).unwrap()
    }

    #[test]
    fn test_load_reads_world_name_and_compile_mode() {
        let dir = tempdir().unwrap();
        let world = load(&dir, WORLD);
        assert_eq!(world.name(), "MyWorld");
        assert_eq!(world.compile_mode(), CompileMode::Debug);
        assert!(!world.is_dirty());
    }

    #[test]
    fn test_plugins_container_is_inserted_and_moved_first() {
        let dir = tempdir().unwrap();
        let world = load(&dir, r#"<W><Repository Url="https://example.com/a"/></W>"#);
        assert_eq!(world.plugins_element().unwrap().name(), PLUGINS);
        assert_eq!(world.compile_mode(), CompileMode::Release);
        assert!(!world.is_dirty());

        let world = load(&dir, r#"<W><Repository Url="https://example.com/a"/><Plugins CompileMode="None"/></W>"#);
        assert_eq!(world.compile_mode(), CompileMode::None);
        assert_eq!(world.root().children().len(), 2);
    }

    #[test]
    fn test_url_rewriter_applies_to_every_repository() {
        let root = Element::parse(WORLD).unwrap();
        let options = WorldOptions::new("/w").with_url_rewriter(|u| Some(u.replace("example.com", "mirror.local")));
        let world = WorldDefinition::from_element("/w.xml", root, options);
        let layout = world.layout().unwrap();
        assert!(layout.iter().all(|e| e.url.as_str().starts_with("https://mirror.local/")));
        assert!(!world.is_dirty());
    }

    #[test]
    fn test_save_is_noop_when_clean() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        world.save().unwrap();
        assert_eq!(fs::read_to_string(world.file_path()).unwrap(), WORLD);
    }

    #[test]
    fn test_add_repository_creates_sorted_folders() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        world
            .add_repository(&["Docs", "Site"], &url("https://example.com/org/site.git"))
            .unwrap();
        assert!(!world.is_dirty());

        let folders: Vec<&str> = world
            .root()
            .elements()
            .filter_map(|e| e.attribute(NAME_ATTR))
            .collect();
        assert_eq!(folders, vec!["Core", "Docs", "Tools"]);

        let site = world.find_repository(&url("https://example.com/org/site")).unwrap();
        assert_eq!(site.attribute(URL_ATTR), Some("https://example.com/org/site"));

        let layout = world.layout().unwrap();
        let added = layout.iter().find(|e| e.name() == "site").unwrap();
        assert_eq!(added.path, dir.path().join("MyWorld").join("Docs").join("Site").join("site"));
    }

    #[test]
    fn test_add_repository_appends_inside_existing_folder() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        world.add_repository(&["core"], &url("https://example.com/org/aaa")).unwrap();

        let core = world.root().elements().find(|e| e.attribute(NAME_ATTR) == Some("Core")).unwrap();
        let urls: Vec<&str> = core.elements().filter_map(|e| e.attribute(URL_ATTR)).collect();
        assert_eq!(urls, vec!["https://example.com/org/base.git", "https://example.com/org/aaa"]);
    }

    #[test]
    fn test_add_repository_rejects_invalid_folder_without_editing() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        let err = world.add_repository(&["ok", "bad/name"], &url("https://example.com/x")).unwrap_err();
        assert!(matches!(err, StackError::InvalidFolderName(_)));
        assert!(!world.is_dirty());
    }

    #[test]
    fn test_add_then_remove_restores_shape() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        let before = world.root().clone();

        let u = url("https://example.com/org/deep.git");
        world.add_repository(&["F1", "F2"], &u).unwrap();
        assert_ne!(world.root(), &before);

        world.remove_repository(&u, true).unwrap();
        assert_eq!(world.root(), &before);
    }

    #[test]
    fn test_remove_keeps_empty_folders_on_request() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        world.remove_repository(&url("https://example.com/org/cli.git"), false).unwrap();

        let tools = world.root().elements().find(|e| e.attribute(NAME_ATTR) == Some("Tools"));
        assert!(tools.is_some());
        assert!(!tools.unwrap().has_elements());
    }

    #[test]
    fn test_remove_stops_at_non_empty_folder() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        world.add_repository(&["Core", "Inner"], &url("https://example.com/org/inner")).unwrap();
        world.remove_repository(&url("https://example.com/org/inner"), true).unwrap();

        let core = world.root().elements().find(|e| e.attribute(NAME_ATTR) == Some("Core")).unwrap();
        assert_eq!(core.elements().count(), 1);
    }

    #[test]
    fn test_remove_unknown_repository_fails() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        let err = world.remove_repository(&url("https://example.com/none"), true).unwrap_err();
        assert!(matches!(err, StackError::RepositoryNotFound { .. }));
        assert!(!world.is_dirty());
    }

    #[test]
    fn test_edit_scope_composes_without_saving() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        {
            let mut edit = world.start_edit();
            edit.add_repository(&["A"], &url("https://example.com/one")).unwrap();
            edit.add_repository(&["B"], &url("https://example.com/two")).unwrap();
            assert!(edit.document().is_dirty());
        }
        assert!(world.is_dirty());
        assert_eq!(fs::read_to_string(world.file_path()).unwrap(), WORLD);

        world.save().unwrap();
        assert!(!world.is_dirty());
        let reloaded = WorldDefinition::load(world.file_path(), WorldOptions::new("/w")).unwrap();
        assert_eq!(reloaded.root(), world.root());
    }

    #[test]
    fn test_save_recomputes_cached_layout() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        assert_eq!(world.layout().unwrap().len(), 2);

        world.add_repository(&["Core"], &url("https://example.com/org/extra")).unwrap();
        assert_eq!(world.layout().unwrap().len(), 3);
    }

    #[test]
    fn test_save_fails_when_saved_layout_is_invalid() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        assert!(world.layout().is_some());

        let err = world
            .add_repository(&["Other"], &url("https://example.com/elsewhere/base"))
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidLayout { .. }));
        // the bytes were written
        assert!(!world.is_dirty());
        assert!(world.layout().is_none());
        assert!(world.layout_diagnostics().has_error(layout::codes::NAME_COLLISION));
    }

    #[test]
    fn test_save_failure_keeps_dirty() {
        let dir = tempdir().unwrap();
        let root = Element::parse(WORLD).unwrap();
        let missing = dir.path().join("no-such-dir").join("MyWorld.xml");
        let mut world = WorldDefinition::from_element(&missing, root, WorldOptions::new("/w"));

        assert!(world.add_repository(&["X"], &url("https://example.com/x")).is_err());
        assert!(world.is_dirty());

        fs::create_dir_all(missing.parent().unwrap()).unwrap();
        world.save().unwrap();
        assert!(!world.is_dirty());
        assert!(missing.exists());
    }

    #[test]
    fn test_order_change_keeps_save_validation() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        assert!(world.layout().is_some());
        world.set_layout_order(LayoutOrder::Name);

        let err = world
            .add_repository(&["X"], &url("https://example.com/elsewhere/base"))
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidLayout { .. }));
        assert!(world.layout_diagnostics().has_error(layout::codes::NAME_COLLISION));
    }

    #[test]
    fn test_add_proxy_repository_with_space_in_name() {
        let dir = tempdir().unwrap();
        let proxy = tempdir().unwrap();
        let local = proxy.path().join("My Repo");
        fs::create_dir(&local).unwrap();

        let file = dir.path().join("MyWorld.xml");
        fs::write(&file, WORLD).unwrap();
        let options = WorldOptions::new(dir.path().join("MyWorld")).with_proxy_root(proxy.path());
        let mut world = WorldDefinition::load(&file, options).unwrap();
        assert!(world.layout().is_some());

        let repo = RepoUrl::from_local_dir(&local).unwrap();
        world.add_repository(&["F"], &repo).unwrap();

        assert!(fs::read_to_string(&file).unwrap().contains(r#"<Repository Url="My Repo"/>"#));
        let added = world.layout().unwrap().iter().find(|e| e.url == repo).cloned().unwrap();
        assert_eq!(added.path, dir.path().join("MyWorld").join("F").join("My Repo"));

        world.remove_repository(&repo, true).unwrap();
        assert!(world.find_repository(&repo).is_none());
    }

    #[test]
    fn test_set_layout_order_resorts() {
        let dir = tempdir().unwrap();
        let mut world = load(&dir, WORLD);
        let names: Vec<String> = world.layout().unwrap().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["base", "cli"]);

        world.add_repository(&["Tools"], &url("https://example.com/org/abc")).unwrap();
        world.set_layout_order(LayoutOrder::Name);
        let names: Vec<String> = world.layout().unwrap().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["abc", "base", "cli"]);
    }
}
