//! Task types: the kinds of work a plugin can perform, as declared in its
//! manifest, and the registry that indexes them by `domain/name`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::command::ConfigEntry;

/// A declared kind of work exposed by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskType {
    /// The bare task name; combined with the owning plugin's domain to form
    /// the fully-qualified `domain/name` key.
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// If set, this task type installs the named runtime (e.g. `"python"`)
    /// and can serve as a provider task for plugins that depend on it.
    #[serde(default)]
    pub provides: Option<String>,
    #[serde(default, rename = "config")]
    pub config_schema: Vec<ConfigEntry>,

    /// Fully-qualified `domain/name`, filled in once the owning plugin's
    /// domain is known. Not part of the manifest wire format.
    #[serde(skip, default)]
    pub qualified: String,
}

impl TaskType {
    pub fn qualify(&mut self, domain: &str) {
        self.qualified = format!("{domain}/{}", self.name);
    }
}

/// Index of every task type across the loaded plugin set, keyed by
/// `domain/name`.
#[derive(Debug, Default)]
pub struct TaskTypeIndex {
    by_key: HashMap<String, (String, TaskType)>,
}

impl TaskTypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type, recording which plugin (by name) owns it.
    pub fn insert(&mut self, plugin_name: &str, task_type: TaskType) {
        self.by_key
            .insert(task_type.qualified.clone(), (plugin_name.to_string(), task_type));
    }

    pub fn get(&self, qualified: &str) -> Option<&TaskType> {
        self.by_key.get(qualified).map(|(_, t)| t)
    }

    /// The plugin name that owns the given task type.
    pub fn owner(&self, qualified: &str) -> Option<&str> {
        self.by_key.get(qualified).map(|(owner, _)| owner.as_str())
    }

    /// Every task type whose normalised `provides` equals `runtime`.
    pub fn providers_of(&self, runtime: &str) -> Vec<&TaskType> {
        self.by_key
            .values()
            .filter(|(_, t)| t.provides.as_deref() == Some(runtime))
            .map(|(_, t)| t)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskType> {
        self.by_key.values().map(|(_, t)| t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, provides: Option<&str>) -> TaskType {
        TaskType {
            name: name.to_string(),
            description: String::new(),
            provides: provides.map(str::to_string),
            config_schema: vec![],
            qualified: String::new(),
        }
    }

    #[test]
    fn qualify_builds_domain_slash_name() {
        let mut t = task("install", None);
        t.qualify("pkg");
        assert_eq!(t.qualified, "pkg/install");
    }

    #[test]
    fn providers_of_filters_by_runtime() {
        let mut index = TaskTypeIndex::new();
        let mut python_task = task("install", Some("python"));
        python_task.qualify("pkg");
        index.insert("pkg-plugin", python_task);

        let mut node_task = task("install", Some("node"));
        node_task.qualify("node-pkg");
        index.insert("node-pkg-plugin", node_task);

        let providers = index.providers_of("python");
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].qualified, "pkg/install");
    }

    #[test]
    fn owner_returns_registering_plugin_name() {
        let mut index = TaskTypeIndex::new();
        let mut t = task("install", None);
        t.qualify("pkg");
        index.insert("pkg-plugin", t);
        assert_eq!(index.owner("pkg/install"), Some("pkg-plugin"));
    }
}
