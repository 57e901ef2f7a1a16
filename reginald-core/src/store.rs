//! The plugin store: owns every plugin handle, flattens their command
//! forests and task-type declarations, and enforces the global uniqueness
//! invariants from §3.
//!
//! Built-ins are inserted before external plugins so that an external
//! plugin can never mask a built-in's name, domain, or commands.

use std::collections::HashMap;

use crate::command::{Command, CommandIndex, CommandTree};
use crate::error::{ReginaldError, Result};
use crate::fileid::FileId;
use crate::manifest::Manifest;
use crate::plugin::Plugin;
use crate::task_type::TaskTypeIndex;

/// Owns the full plugin set plus the indices derived from it.
pub struct Store {
    plugins: HashMap<String, Plugin>,
    commands: CommandIndex,
    task_types: TaskTypeIndex,
}

impl Store {
    /// Build a store from the built-in plugins and the manifests discovered
    /// on disk, enforcing §3's uniqueness invariants.
    ///
    /// `builtins` must be inserted before `external` — this function relies
    /// on caller ordering rather than re-sorting, so that built-ins always
    /// win the name/domain race deterministically and callers can reason
    /// about it by reading the argument order.
    pub fn new(builtins: Vec<Plugin>, external: Vec<Manifest>) -> Result<Self> {
        let mut store = Store {
            plugins: HashMap::new(),
            commands: CommandIndex::new(),
            task_types: TaskTypeIndex::new(),
        };

        for plugin in builtins {
            store.insert(plugin)?;
        }
        for manifest in external {
            store.insert(Plugin::external(manifest))?;
        }
        store.check_duplicate_executables()?;

        Ok(store)
    }

    fn insert(&mut self, plugin: Plugin) -> Result<()> {
        let name = plugin.manifest().name.clone();
        let domain = plugin.manifest().domain.clone();

        if self.plugins.contains_key(&name) {
            return Err(ReginaldError::DuplicatePlugin {
                kind: "name",
                value: name,
            });
        }
        if self
            .plugins
            .values()
            .any(|p| p.manifest().domain == domain)
        {
            return Err(ReginaldError::DuplicatePlugin {
                kind: "domain",
                value: domain,
            });
        }

        if domain == "core" {
            // Built-in `core` plugins contribute their commands directly at
            // top level: each declared command becomes its own addressable
            // root rather than being nested under a synthetic "core" node.
            for mut command in plugin.manifest().commands.clone() {
                command.set_owner_domain("core");
                self.commands.insert(CommandTree {
                    domain: domain.clone(),
                    root: command,
                });
            }
        } else {
            let root = Self::synthesize_root(&plugin);
            self.commands.insert(CommandTree {
                domain: domain.clone(),
                root,
            });
        }
        for task in plugin.manifest().tasks.clone() {
            self.task_types.insert(&name, task);
        }

        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Build the synthetic root command for an external plugin: a node
    /// named after its domain, with its declared commands as children.
    fn synthesize_root(plugin: &Plugin) -> Command {
        let manifest = plugin.manifest();
        let mut root = Command {
            name: manifest.domain.clone(),
            aliases: vec![],
            usage: String::new(),
            description: manifest.description.clone(),
            config_schema: vec![],
            commands: manifest.commands.clone(),
            args: vec![],
            owner_domain: manifest.domain.clone(),
        };
        root.set_owner_domain(&manifest.domain);
        root
    }

    /// External plugins sharing the same executable identity — by direct
    /// path, hard link, or symlink — are a configuration mistake, not a
    /// feature; catch it once, up front.
    fn check_duplicate_executables(&self) -> Result<()> {
        let mut seen: HashMap<FileId, &str> = HashMap::new();
        for plugin in self.plugins.values() {
            if !plugin.is_external() {
                continue;
            }
            let path = plugin.manifest().executable.clone();
            if path.is_empty() {
                continue;
            }
            let id = FileId::of(std::path::Path::new(&path))?;
            if let Some(existing) = seen.insert(id, plugin.manifest().name.as_str()) {
                return Err(ReginaldError::DuplicatePlugin {
                    kind: "executable",
                    value: format!("{existing} and {}", plugin.manifest().name),
                });
            }
        }
        Ok(())
    }

    pub fn plugin(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    pub fn plugin_mut(&mut self, name: &str) -> Option<&mut Plugin> {
        self.plugins.get_mut(name)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values()
    }

    pub fn plugins_mut(&mut self) -> impl Iterator<Item = &mut Plugin> {
        self.plugins.values_mut()
    }

    pub fn resolve_command(&self, dotted: &str) -> Option<&Command> {
        self.commands.resolve(dotted)
    }

    pub fn task_types(&self) -> &TaskTypeIndex {
        &self.task_types
    }

    /// The plugin name that owns the task type `qualified` (`domain/name`).
    pub fn task_type_owner(&self, qualified: &str) -> Result<&str> {
        self.task_types
            .owner(qualified)
            .ok_or_else(|| ReginaldError::TaskTypeNotFound(qualified.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use std::fs;
    use tempfile::TempDir;

    fn manifest_at(dir: &TempDir, name: &str, domain: &str) -> Manifest {
        let plugin_dir = dir.path().join(name);
        fs::create_dir_all(&plugin_dir).unwrap();
        let bin = plugin_dir.join("bin");
        fs::write(&bin, b"#!/bin/sh\n").unwrap();
        let manifest_path = plugin_dir.join("manifest.json");
        let json = format!(r#"{{"name":"{name}","domain":"{domain}","executable":"./bin"}}"#);
        fs::write(&manifest_path, &json).unwrap();
        Manifest::parse(&json, &manifest_path).unwrap()
    }

    #[test]
    fn rejects_duplicate_domain() {
        let dir = TempDir::new().unwrap();
        let a = manifest_at(&dir, "a", "shared");
        let b = manifest_at(&dir, "b", "shared");

        let err = Store::new(vec![], vec![a, b]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate plugin domain \"shared\""
        );
    }

    #[test]
    fn rejects_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let mut a = manifest_at(&dir, "a", "a");
        let mut b = manifest_at(&dir, "a", "b");
        a.name = "dup".to_string();
        b.name = "dup".to_string();

        let err = Store::new(vec![], vec![a, b]).unwrap_err();
        assert_eq!(err.to_string(), "duplicate plugin name \"dup\"");
    }

    #[test]
    fn rejects_duplicate_executable_via_hard_link() {
        let dir = TempDir::new().unwrap();
        let a_dir = dir.path().join("a");
        let b_dir = dir.path().join("b");
        fs::create_dir_all(&a_dir).unwrap();
        fs::create_dir_all(&b_dir).unwrap();
        fs::write(a_dir.join("bin"), b"#!/bin/sh\n").unwrap();
        fs::hard_link(a_dir.join("bin"), b_dir.join("bin")).unwrap();

        let a_json = r#"{"name":"a","domain":"a","executable":"./bin"}"#;
        let b_json = r#"{"name":"b","domain":"b","executable":"./bin"}"#;
        let a = Manifest::parse(a_json, &a_dir.join("manifest.json")).unwrap();
        let b = Manifest::parse(b_json, &b_dir.join("manifest.json")).unwrap();

        let err = Store::new(vec![], vec![a, b]).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::DuplicatePlugin);
    }

    #[test]
    fn builtins_registered_before_external_win_domain_race() {
        let dir = TempDir::new().unwrap();
        let external = manifest_at(&dir, "ext", "core");

        let builtin = crate::plugin::builtin_stub("link", "core");
        let err = Store::new(vec![builtin], vec![external]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate plugin domain \"core\""
        );
    }

    #[test]
    fn nested_commands_inherit_owner_domain() {
        let dir = TempDir::new().unwrap();
        let plugin_dir = dir.path().join("deep");
        fs::create_dir_all(&plugin_dir).unwrap();
        fs::write(plugin_dir.join("bin"), b"#!/bin/sh\n").unwrap();
        let json = r#"{
            "name": "deep",
            "domain": "deep",
            "executable": "./bin",
            "commands": [
                {"name": "status", "commands": [{"name": "detail"}]}
            ]
        }"#;
        let manifest_path = plugin_dir.join("manifest.json");
        fs::write(&manifest_path, json).unwrap();
        let manifest = Manifest::parse(json, &manifest_path).unwrap();

        let store = Store::new(vec![], vec![manifest]).unwrap();
        let command = store.resolve_command("deep.status.detail").unwrap();
        assert_eq!(command.owner_domain, "deep");
    }
}
