//! Error types for stacks and world definitions

use thiserror::Error;

/// Result type for stack operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Stack registry and world definition errors
///
/// Layout and plugin-configuration problems found while reading a document are
/// not reported through this type one by one; they accumulate in
/// [`Diagnostics`](crate::diagnostics::Diagnostics) and surface here only as
/// [`StackError::InvalidLayout`] or [`StackError::InvalidPluginConfiguration`].
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Invalid repository url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid folder name: '{0}'")]
    InvalidFolderName(String),

    #[error("Invalid plugin name: '{0}'")]
    InvalidPluginName(String),

    #[error("Invalid stack path '{path}': {reason}")]
    InvalidStackPath { path: String, reason: String },

    #[error("Invalid world definition: {0}")]
    InvalidDocument(String),

    #[error("Repository not found in world '{world}': {url}")]
    RepositoryNotFound { world: String, url: String },

    #[error("Repository {url} is declared {count} times in world '{world}'")]
    AmbiguousRepository { world: String, url: String, count: usize },

    #[error("Plugin '{plugin}' is not configured in world '{world}'")]
    PluginNotConfigured { world: String, plugin: String },

    #[error("Invalid layout for world '{world}': {errors} error(s)")]
    InvalidLayout { world: String, errors: usize },

    #[error("Invalid plugin configuration for world '{world}': {errors} error(s)")]
    InvalidPluginConfiguration { world: String, errors: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
