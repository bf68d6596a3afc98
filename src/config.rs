//! Configuration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (worldstack.toml)
//! - Environment variables (WORLDSTACK_*)
//!
//! ## Example config file (worldstack.toml):
//! ```toml
//! [registry]
//! data_dir = "/home/me/.local/share/worldstack"
//! wait_notice = true
//!
//! [layout]
//! order = "path"
//!
//! [stack]
//! proxy_root = "/srv/git-proxy"
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::lock::FileLock;
use crate::registry::{StackRegistry, LOCK_FILE_NAME};
use crate::world::layout::LayoutOrder;
use crate::world::WorldOptions;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Layout settings
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Settings of the stack being worked on
    #[serde(default)]
    pub stack: StackSettings,
}

/// Stack registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Local data directory holding the registry (machine default when absent)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Log a notice before blocking on a registry held by another process
    #[serde(default = "default_true")]
    pub wait_notice: bool,
}

/// Layout configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub order: LayoutOrder,
}

/// Stack configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackSettings {
    /// Local proxy repositories root; absent or empty disables proxy mode
    #[serde(default)]
    pub proxy_root: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            wait_notice: true,
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "worldstack", "worldstack")
}

impl StackConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = [
            "worldstack.toml",
            ".worldstack.toml",
            "config/worldstack.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = project_dirs() {
            let user_config = dirs.config_dir().join("worldstack.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("WORLDSTACK")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Local data directory of the stack registry
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.registry.data_dir {
            return dir.clone();
        }
        project_dirs()
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("worldstack"))
    }

    /// Proxy root, `None` when proxy mode is disabled
    pub fn proxy_root(&self) -> Option<PathBuf> {
        self.stack
            .proxy_root
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Open the stack registry of the configured data directory
    pub fn open_registry(&self) -> Result<StackRegistry> {
        let data_dir = self.data_dir();
        let lock = FileLock::new(data_dir.join(LOCK_FILE_NAME))
            .with_wait_notice(self.registry.wait_notice);
        StackRegistry::with_lock(data_dir, lock)
    }

    /// Options for interpreting a world definition rooted at `world_root`
    pub fn world_options(&self, world_root: impl Into<PathBuf>) -> WorldOptions {
        let options = WorldOptions::new(world_root).with_order(self.layout.order);
        match self.proxy_root() {
            Some(proxy_root) => options.with_proxy_root(proxy_root),
            None => options,
        }
    }
}
