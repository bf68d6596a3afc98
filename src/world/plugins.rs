//! Plugin configuration of a world
//!
//! Each child of the Plugins container configures one plugin; its element name
//! is the plugin short name. A Repository element may carry children with the
//! same names to override that configuration for one repository.

use tracing::debug;

use super::tree::{Element, Node};
use super::{ensure_plugins_first, walk_repositories, EditScope, WorldDefinition, DISABLED_ATTR, PLUGINS};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, StackError};
use crate::normalize::is_valid_plugin_name;

/// Diagnostic codes produced while reading plugin configuration
pub mod codes {
    pub const DUPLICATE_PLUGIN: &str = "P001";
}

/// Configuration of one plugin
#[derive(Debug, Clone, Copy)]
pub struct PluginConfig<'a> {
    pub name: &'a str,
    pub element: &'a Element,
    pub disabled: bool,
}

/// Cached outcome of a plugin configuration read
#[derive(Debug, Clone)]
pub(crate) struct PluginsState {
    /// Lowercased short name and child index in the Plugins container
    entries: Option<Vec<(String, usize)>>,
    diagnostics: Diagnostics,
}

fn is_disabled(element: &Element) -> bool {
    element
        .attribute(DISABLED_ATTR)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn read_plugins(plugins: &[Node], world: &str) -> PluginsState {
    let mut diagnostics = Diagnostics::new();
    let mut entries: Vec<(String, usize)> = Vec::new();

    for (index, child) in plugins.iter().enumerate() {
        let Some(element) = child.as_element() else {
            continue;
        };
        let key = element.name().to_lowercase();
        if entries.iter().any(|(k, _)| *k == key) {
            diagnostics.error(
                codes::DUPLICATE_PLUGIN,
                format!("{}/{}", world, PLUGINS),
                format!("plugin '{}' is configured more than once", element.name()),
            );
            continue;
        }
        entries.push((key, index));
    }

    PluginsState {
        entries: if diagnostics.is_clean() { Some(entries) } else { None },
        diagnostics,
    }
}

impl WorldDefinition {
    fn plugins_state(&self) -> &PluginsState {
        self.plugins
            .get_or_init(|| read_plugins(self.plugins_element().map(Element::children).unwrap_or(&[]), self.name()))
    }

    /// Every configured plugin, in document order
    ///
    /// `None` when the configuration is invalid (see
    /// [`WorldDefinition::plugin_diagnostics`]); callers must not fall back to
    /// a partial configuration.
    pub fn plugin_configuration(&self) -> Option<Vec<PluginConfig<'_>>> {
        let entries = self.plugins_state().entries.as_ref()?;
        let plugins = self.plugins_element()?;
        Some(
            entries
                .iter()
                .filter_map(|(_, index)| plugins.child(*index).and_then(Node::as_element))
                .map(|element| PluginConfig {
                    name: element.name(),
                    element,
                    disabled: is_disabled(element),
                })
                .collect(),
        )
    }

    pub fn plugin_diagnostics(&self) -> &Diagnostics {
        &self.plugins_state().diagnostics
    }

    /// Configuration of `plugin` (case-insensitive)
    pub fn plugin(&self, plugin: &str) -> Result<Option<PluginConfig<'_>>> {
        let index = self.plugin_index(plugin)?;
        Ok(index
            .and_then(|i| self.plugins_element().and_then(|p| p.child(i)))
            .and_then(Node::as_element)
            .map(|element| PluginConfig {
                name: element.name(),
                element,
                disabled: is_disabled(element),
            }))
    }

    /// Per-repository override of `plugin` on the Repository element `repository`
    pub fn plugin_override<'a>(&self, repository: &'a Element, plugin: &str) -> Option<&'a Element> {
        repository
            .elements()
            .find(|e| e.name().eq_ignore_ascii_case(plugin))
    }

    fn plugin_index(&self, plugin: &str) -> Result<Option<usize>> {
        let state = self.plugins_state();
        let entries = state.entries.as_ref().ok_or_else(|| StackError::InvalidPluginConfiguration {
            world: self.name().to_string(),
            errors: state.diagnostics.errors.len(),
        })?;
        let key = plugin.to_lowercase();
        Ok(entries.iter().find(|(k, _)| *k == key).map(|(_, index)| *index))
    }
}

impl<'a> EditScope<'a> {
    /// Set or clear the `Disabled` flag of `plugin`
    ///
    /// Returns `false`, without touching the document, when the plugin is
    /// already in the requested state.
    pub fn set_plugin_disabled(&mut self, plugin: &str, disabled: bool) -> Result<bool> {
        let index = self
            .doc
            .plugin_index(plugin)?
            .ok_or_else(|| StackError::PluginNotConfigured {
                world: self.doc.name().to_string(),
                plugin: plugin.to_string(),
            })?;

        let current = self
            .doc
            .plugins_element()
            .and_then(|p| p.child(index))
            .and_then(Node::as_element)
            .map(is_disabled)
            .unwrap_or(false);
        if current == disabled {
            return Ok(false);
        }

        let Some(element) = self.plugins_mut()?.children_mut().get_mut(index).and_then(Node::as_element_mut) else {
            return Ok(false);
        };
        if disabled {
            element.set_attribute(DISABLED_ATTR, "true");
        } else {
            element.remove_attribute(DISABLED_ATTR);
        }
        debug!(world = %self.doc.name(), plugin, disabled, "plugin state changed");
        Ok(true)
    }

    /// Make sure the Plugins container holds a configuration for `plugin`
    ///
    /// Returns whether one had to be created.
    pub fn ensure_plugin_configuration(&mut self, plugin: &str) -> Result<bool> {
        if !is_valid_plugin_name(plugin) {
            return Err(StackError::InvalidPluginName(plugin.to_string()));
        }
        // a configuration holding duplicates fails here instead of growing
        if self.doc.plugin_index(plugin)?.is_some() {
            return Ok(false);
        }

        self.plugins_mut()?.push(Element::new(plugin));
        debug!(world = %self.doc.name(), plugin, "plugin configuration created");
        Ok(true)
    }

    /// Remove every configuration of `plugin`: the Plugins level one and every
    /// per-repository override. Returns how many elements were removed.
    pub fn remove_plugin_configuration(&mut self, plugin: &str) -> Result<usize> {
        let matches = |node: &Node| {
            node.as_element()
                .map(|e| e.name().eq_ignore_ascii_case(plugin))
                .unwrap_or(false)
        };

        let mut count = self
            .doc
            .root()
            .elements()
            .find(|e| e.name() == PLUGINS)
            .map(|p| p.children().iter().filter(|n| matches(n)).count())
            .unwrap_or(0);
        walk_repositories(self.doc.root(), |_, element| {
            count += element.children().iter().filter(|n| matches(n)).count();
        });
        if count == 0 {
            return Ok(0);
        }

        self.plugins_mut()?.children_mut().retain(|n| !matches(n));

        // collected after the Plugins container is back in place
        let mut repositories: Vec<Vec<usize>> = Vec::new();
        walk_repositories(self.doc.root(), |node, element| {
            if element.children().iter().any(|n| matches(n)) {
                repositories.push(node.to_vec());
            }
        });
        let root = self.root_mut();
        for node in &repositories {
            if let Some(repository) = root.descendant_mut(node) {
                repository.children_mut().retain(|n| !matches(n));
            }
        }

        debug!(world = %self.doc.name(), plugin, removed = count, "plugin configuration removed");
        Ok(count)
    }

    /// The Plugins container, for mutation; restored first if an edit moved it
    fn plugins_mut(&mut self) -> Result<&mut Element> {
        let world = self.doc.name().to_string();
        let root = self.root_mut();
        ensure_plugins_first(root);
        root.elements_mut()
            .next()
            .ok_or_else(|| StackError::InvalidDocument(format!("world '{}' has no {} container", world, PLUGINS)))
    }
}
