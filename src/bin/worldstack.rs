//! Worldstack CLI
//!
//! Inspects the machine-wide stack registry and edits world definitions.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use worldstack::{GitRepository, LayoutOrder, RepoUrl, StackConfig, WorldDefinition};

#[derive(Parser)]
#[command(name = "worldstack")]
#[command(about = "Manage stacks and world definitions")]
struct Cli {
    /// Extra configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Print machine readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Machine-wide stack registry
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },

    /// World definition documents
    World {
        /// World definition file
        file: PathBuf,

        /// Directory the repositories are laid out in (defaults to the file path without extension)
        #[arg(long)]
        world_root: Option<PathBuf>,

        #[command(subcommand)]
        command: WorldCommands,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// List every registered stack
    List,

    /// Show the stacks cloned from a repository
    Check {
        url: String,
    },

    /// Register a stack root and the repository it was cloned from
    Register {
        path: PathBuf,
        url: String,
    },

    /// Delete the registry
    Clear,
}

#[derive(Subcommand)]
enum WorldCommands {
    /// Print the validated repository layout
    Layout {
        /// Override the configured layout order
        #[arg(long, value_parser = parse_order)]
        order: Option<LayoutOrder>,
    },

    /// Add a repository
    Add {
        url: String,
        /// Folder chain, `/` separated
        #[arg(short, long, default_value = "")]
        folder: String,
    },

    /// Remove a repository
    Remove {
        url: String,
        /// Keep folders the removal leaves empty
        #[arg(long)]
        keep_empty_folders: bool,
    },

    /// Plugin configuration
    Plugin {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Subcommand)]
enum PluginCommands {
    /// List configured plugins
    List,
    /// Enable a plugin and commit the change
    Enable { name: String },
    /// Disable a plugin and commit the change
    Disable { name: String },
    /// Make sure a plugin has a configuration section
    Ensure { name: String },
    /// Remove every configuration of a plugin
    Remove { name: String },
}

#[derive(Serialize)]
struct PluginRow<'a> {
    name: &'a str,
    disabled: bool,
}

fn parse_order(s: &str) -> Result<LayoutOrder, String> {
    match s {
        "definition_file" | "definition-file" => Ok(LayoutOrder::DefinitionFile),
        "path" => Ok(LayoutOrder::Path),
        "name" => Ok(LayoutOrder::Name),
        other => Err(format!("unknown layout order '{}'", other)),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = StackConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Registry { command } => run_registry(&config, command, cli.json),
        Commands::World {
            file,
            world_root,
            command,
        } => {
            let world_root = world_root.unwrap_or_else(|| file.with_extension(""));
            let options = config.world_options(world_root);
            let mut world = WorldDefinition::load(&file, options)
                .with_context(|| format!("failed to load {}", file.display()))?;
            run_world(&mut world, command, cli.json)
        }
    }
}

fn run_registry(config: &StackConfig, command: RegistryCommands, json: bool) -> anyhow::Result<()> {
    let registry = config.open_registry()?;

    match command {
        RegistryCommands::List => {
            let stacks = registry.get_all_stacks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stacks)?);
            } else if stacks.is_empty() {
                println!("No stacks registered in {}", registry.file_path().display());
            } else {
                for entry in &stacks {
                    println!("{}  {}", entry.path.display(), entry.url);
                }
            }
        }

        RegistryCommands::Check { url } => {
            let url = RepoUrl::parse(&url)?;
            let paths = registry.check_existing_stack(&url)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else if paths.is_empty() {
                println!("No stack cloned from {}", url);
            } else {
                for path in &paths {
                    println!("{}", path.display());
                }
            }
        }

        RegistryCommands::Register { path, url } => {
            let url = RepoUrl::parse(&url)?;
            registry.register_new_stack(&path, &url)?;
            println!("Registered {} -> {}", path.display(), url);
        }

        RegistryCommands::Clear => {
            if registry.clear()? {
                println!("Registry cleared");
            } else {
                println!("Registry was already empty");
            }
        }
    }
    Ok(())
}

fn run_world(world: &mut WorldDefinition, command: WorldCommands, json: bool) -> anyhow::Result<()> {
    match command {
        WorldCommands::Layout { order } => {
            if let Some(order) = order {
                world.set_layout_order(order);
            }
            let Some(layout) = world.layout() else {
                for diagnostic in &world.layout_diagnostics().errors {
                    eprintln!("  {}", diagnostic);
                }
                bail!("world '{}' has an invalid layout", world.name());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(layout)?);
            } else {
                for entry in layout {
                    println!("{:<40} {}", entry.relative_path(), entry.url);
                }
            }
            for diagnostic in &world.layout_diagnostics().warnings {
                eprintln!("  warning: {}", diagnostic);
            }
        }

        WorldCommands::Add { url, folder } => {
            let url = RepoUrl::parse(&url)?;
            let folders: Vec<&str> = folder.split('/').filter(|f| !f.is_empty()).collect();
            world.add_repository(&folders, &url)?;
            println!("Added {} to world '{}'", url, world.name());
        }

        WorldCommands::Remove {
            url,
            keep_empty_folders,
        } => {
            let url = RepoUrl::parse(&url)?;
            world.remove_repository(&url, !keep_empty_folders)?;
            println!("Removed {} from world '{}'", url, world.name());
        }

        WorldCommands::Plugin { command } => run_plugin(world, command, json)?,
    }
    Ok(())
}

fn run_plugin(world: &mut WorldDefinition, command: PluginCommands, json: bool) -> anyhow::Result<()> {
    match command {
        PluginCommands::List => {
            let Some(plugins) = world.plugin_configuration() else {
                for diagnostic in &world.plugin_diagnostics().errors {
                    eprintln!("  {}", diagnostic);
                }
                bail!("world '{}' has an invalid plugin configuration", world.name());
            };
            if json {
                let rows: Vec<PluginRow> = plugins
                    .iter()
                    .map(|p| PluginRow {
                        name: p.name,
                        disabled: p.disabled,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for plugin in &plugins {
                    let state = if plugin.disabled { "disabled" } else { "enabled" };
                    println!("{:<30} {}", plugin.name, state);
                }
            }
        }

        PluginCommands::Enable { name } => set_enabled(world, &name, true)?,
        PluginCommands::Disable { name } => set_enabled(world, &name, false)?,

        PluginCommands::Ensure { name } => {
            world.ensure_plugin_configuration(&name)?;
            println!("Plugin '{}' is configured in world '{}'", name, world.name());
        }

        PluginCommands::Remove { name } => {
            let removed = world.remove_plugin_configuration(&name)?;
            println!("Removed {} configuration(s) of plugin '{}'", removed, name);
        }
    }
    Ok(())
}

fn set_enabled(world: &mut WorldDefinition, plugin: &str, enabled: bool) -> anyhow::Result<()> {
    let dir = definition_dir(world.file_path());
    let git = GitRepository::discover(dir)
        .with_context(|| format!("{} is not inside a git repository", dir.display()))?;
    world.set_plugin_enabled(plugin, enabled, &git)?;

    let state = if enabled { "enabled" } else { "disabled" };
    println!("Plugin '{}' {} in world '{}'", plugin, state, world.name());
    Ok(())
}

/// Directory holding a definition file; a bare file name lives in the current directory
fn definition_dir(file: &Path) -> &Path {
    file.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}
