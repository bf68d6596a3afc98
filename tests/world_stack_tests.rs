//! End-to-end tests over real files: world definitions on disk, a git
//! repository for plugin commits, and registries shared between handles.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use git2::Repository;
use tempfile::{tempdir, TempDir};
use worldstack::world::layout::codes;
use worldstack::{
    CompileMode, GitRepository, LayoutOrder, RepoUrl, StackError, StackKind, StackRegistry, WorldDefinition,
    WorldOptions,
};

const ORDERED_WORLD: &str = include_str!("fixtures/ordered_world.xml");
const BROKEN_WORLD: &str = include_str!("fixtures/broken_world.xml");

fn url(s: &str) -> RepoUrl {
    RepoUrl::parse(s).unwrap()
}

fn write_world(dir: &Path, name: &str, xml: &str) -> PathBuf {
    let file = dir.join(format!("{}.xml", name));
    fs::write(&file, xml).unwrap();
    file
}

fn load(file: &Path, order: LayoutOrder) -> WorldDefinition {
    let options = WorldOptions::new(file.with_extension("")).with_order(order);
    WorldDefinition::load(file, options).unwrap()
}

fn names(world: &WorldDefinition) -> Vec<String> {
    world
        .layout()
        .unwrap()
        .iter()
        .map(|e| e.name().to_string())
        .collect()
}

fn stack_dir(root: &TempDir, name: &str, kind: StackKind) -> PathBuf {
    let path = root.path().join("dev").join(name).join(kind.marker());
    fs::create_dir_all(&path).unwrap();
    path
}

#[test]
fn test_layout_follows_configured_order() {
    let dir = tempdir().unwrap();
    let file = write_world(dir.path(), "OrderedWorld", ORDERED_WORLD);

    let world = load(&file, LayoutOrder::DefinitionFile);
    assert_eq!(names(&world), vec!["C", "b", "A"]);
    assert_eq!(world.compile_mode(), CompileMode::None);

    let layout = world.layout().unwrap();
    assert_eq!(layout[0].path, dir.path().join("OrderedWorld").join("Zeta").join("C"));
    assert_eq!(layout[2].relative_path(), "Alpha/Inner/A");
    assert_eq!(layout[0].url.as_str(), "https://example.com/org/C");

    let world = load(&file, LayoutOrder::Name);
    assert_eq!(names(&world), vec!["A", "b", "C"]);

    let world = load(&file, LayoutOrder::Path);
    assert_eq!(names(&world), vec!["A", "b", "C"]);
}

#[test]
fn test_broken_world_reports_every_problem() {
    let dir = tempdir().unwrap();
    let file = write_world(dir.path(), "BrokenWorld", BROKEN_WORLD);
    let world = load(&file, LayoutOrder::DefinitionFile);

    assert!(world.layout().is_none());
    let diagnostics = world.layout_diagnostics();
    assert!(diagnostics.has_error(codes::URL_COLLISION));
    assert!(diagnostics.has_error(codes::NAME_COLLISION));
    assert!(diagnostics.has_error(codes::INVALID_FOLDER_NAME));
    assert!(diagnostics.has_warning(codes::EMPTY_FOLDER));

    // reading never edits the document
    assert!(!world.is_dirty());
    assert_eq!(fs::read_to_string(&file).unwrap(), BROKEN_WORLD);
}

#[test]
fn test_add_and_remove_round_trip_on_disk() {
    let dir = tempdir().unwrap();
    let file = write_world(dir.path(), "OrderedWorld", ORDERED_WORLD);
    let mut world = load(&file, LayoutOrder::DefinitionFile);
    assert_eq!(world.layout().unwrap().len(), 3);

    let docs = url("https://example.com/org/docs.git");
    world.add_repository(&["Beta", "Guides"], &docs).unwrap();

    // the cached layout was refreshed from the written file
    assert_eq!(world.layout().unwrap().len(), 4);
    let reloaded = load(&file, LayoutOrder::DefinitionFile);
    let entry = reloaded
        .layout()
        .unwrap()
        .iter()
        .find(|e| e.url == docs)
        .cloned()
        .unwrap();
    assert_eq!(entry.folders, vec!["Beta", "Guides"]);

    world.remove_repository(&docs, true).unwrap();
    assert_eq!(world.layout().unwrap().len(), 3);

    let after = fs::read_to_string(&file).unwrap();
    assert!(!after.contains("Beta"));
    assert!(after.contains("<!-- plugins shared by every repository -->"));
    assert!(!after.starts_with("<?xml"));
}

#[test]
fn test_adding_a_colliding_repository_fails_on_save() {
    let dir = tempdir().unwrap();
    let file = write_world(dir.path(), "OrderedWorld", ORDERED_WORLD);
    let mut world = load(&file, LayoutOrder::DefinitionFile);
    assert!(world.layout().is_some());

    // same short name as an existing repository, different url
    let result = world.add_repository(&["Other"], &url("https://example.com/fork/c.git"));
    assert!(matches!(result, Err(StackError::InvalidLayout { .. })));
    assert!(world.layout().is_none());
    assert!(world.layout_diagnostics().has_error(codes::NAME_COLLISION));
}

#[test]
fn test_plugin_toggle_commits_to_git() {
    let dir = tempdir().unwrap();
    let file = write_world(dir.path(), "OrderedWorld", ORDERED_WORLD);
    let git = GitRepository::open_or_init(dir.path()).unwrap();
    git.commit_all("Add world").unwrap();

    let mut world = load(&file, LayoutOrder::DefinitionFile);

    // already enabled: no save, no commit
    world.set_plugin_enabled("Formatter", true, &git).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), ORDERED_WORLD);
    let repo = Repository::open(dir.path()).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.message(), Some("Add world"));

    world.set_plugin_enabled("Linter", true, &git).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.message(), Some("Enable plugin 'Linter' in world 'OrderedWorld'."));
    assert!(!world.plugin("linter").unwrap().unwrap().disabled);

    let reloaded = load(&file, LayoutOrder::DefinitionFile);
    let plugins = reloaded.plugin_configuration().unwrap();
    assert!(plugins.iter().all(|p| !p.disabled));
}

#[test]
fn test_remove_plugin_drops_repository_overrides() {
    let dir = tempdir().unwrap();
    let file = write_world(dir.path(), "OrderedWorld", ORDERED_WORLD);
    let mut world = load(&file, LayoutOrder::DefinitionFile);

    assert_eq!(world.remove_plugin_configuration("formatter").unwrap(), 2);
    let content = fs::read_to_string(&file).unwrap();
    assert!(!content.contains("Formatter"));
    assert!(content.contains("Linter"));
}

#[test]
fn test_registry_shared_between_handles() {
    let stacks = tempdir().unwrap();
    let data = tempdir().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let path = stack_dir(&stacks, &format!("Stack{}", i), StackKind::Public);
            let data_dir = data.path().to_path_buf();
            thread::spawn(move || {
                let registry = StackRegistry::open(&data_dir).unwrap();
                let repo = url(&format!("https://example.com/org/stack{}.git", i));
                registry.register_new_stack(&path, &repo).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let registry = StackRegistry::open(data.path()).unwrap();
    let all = registry.get_all_stacks().unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].path < w[1].path));
    assert!(all.iter().all(|e| e.kind() == Some(StackKind::Public)));
}

#[test]
fn test_registry_reports_second_clone_of_a_stack() {
    let stacks = tempdir().unwrap();
    let data = tempdir().unwrap();
    let registry = StackRegistry::open(data.path()).unwrap();
    let repo = url("https://example.com/org/shared.git");

    let first = stack_dir(&stacks, "Shared", StackKind::Public);
    let second = stack_dir(&stacks, "SharedCopy", StackKind::Private);
    registry.register_new_stack(&first, &repo).unwrap();
    registry.register_new_stack(&second, &url("https://example.com/org/shared")).unwrap();

    let paths = registry.check_existing_stack(&repo).unwrap();
    assert_eq!(paths, vec![first.clone(), second.clone()]);

    fs::remove_dir_all(&second).unwrap();
    let paths = StackRegistry::open(data.path())
        .unwrap()
        .check_existing_stack(&repo)
        .unwrap();
    assert_eq!(paths, vec![first]);
}
