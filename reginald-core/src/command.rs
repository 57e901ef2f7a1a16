//! The command tree: the shape a plugin exposes to the CLI front-end.
//!
//! Every plugin (built-in or external) contributes a forest of [`Command`]
//! nodes. External plugins get a synthetic root named after their domain;
//! their declared commands become its children. Built-in `core` plugins
//! attach their commands directly at the top level.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry of a command's declared configuration schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// A node in a plugin's command tree.
///
/// Deserialized directly from a manifest's `commands` array. The manifest
/// loader strips `null` entries after decoding so every `Command` reachable
/// at runtime is well-formed — the "no nil command" invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "config")]
    pub config_schema: Vec<ConfigEntry>,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub args: Vec<String>,

    /// The plugin domain that owns this node, filled in by the store once
    /// the command forest is flattened. Not part of the manifest wire
    /// format.
    #[serde(skip, default)]
    pub owner_domain: String,
}

impl Command {
    /// Remove children that failed to decode into a usable node. The JSON
    /// manifest format permits `null` inside a `commands` array; serde
    /// already skips outright-null children for `Vec<Command>`, so this
    /// pass only needs to recurse and trim grandchildren.
    pub fn strip_nil_children(&mut self) {
        for child in &mut self.commands {
            child.strip_nil_children();
        }
    }

    /// Stamp `domain` onto this node and every descendant, so a command
    /// resolved at any depth still carries its owning plugin's domain.
    pub fn set_owner_domain(&mut self, domain: &str) {
        self.owner_domain = domain.to_string();
        for child in &mut self.commands {
            child.set_owner_domain(domain);
        }
    }

    /// All names this node answers to: its name plus every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Look up a child by name or alias.
    pub fn child(&self, segment: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.names().any(|n| n == segment))
    }

    /// Walk a dotted path (e.g. `"status.detail"`) down from this node.
    pub fn resolve<'a>(&'a self, path: &[&str]) -> Option<&'a Command> {
        match path {
            [] => Some(self),
            [head, rest @ ..] => self.child(head).and_then(|c| c.resolve(rest)),
        }
    }
}

/// A root command tree contributed by one plugin, synthesised by the store
/// during flattening.
#[derive(Debug, Clone)]
pub struct CommandTree {
    pub domain: String,
    pub root: Command,
}

/// Index of every command tree, keyed by root name and alias, built once by
/// [`crate::store::Store`].
#[derive(Debug, Default)]
pub struct CommandIndex {
    trees: HashMap<String, CommandTree>,
}

impl CommandIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root command tree under every name it answers to.
    pub fn insert(&mut self, tree: CommandTree) {
        for name in tree.root.names() {
            self.trees.entry(name.to_string()).or_insert_with(|| tree.clone());
        }
    }

    pub fn resolve(&self, dotted: &str) -> Option<&Command> {
        let mut segments = dotted.split('.');
        let root_name = segments.next()?;
        let rest: Vec<&str> = segments.collect();
        let tree = self.trees.get(root_name)?;
        tree.root.resolve(&rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Command {
        Command {
            name: name.to_string(),
            aliases: vec![],
            usage: String::new(),
            description: String::new(),
            config_schema: vec![],
            commands: vec![],
            args: vec![],
            owner_domain: String::new(),
        }
    }

    #[test]
    fn resolves_dotted_path() {
        let mut root = leaf("dotfiles");
        let mut status = leaf("status");
        status.commands.push(leaf("detail"));
        root.commands.push(status);

        let found = root.resolve(&["status", "detail"]);
        assert!(found.is_some());
        assert_eq!(found.unwrap().name, "detail");
    }

    #[test]
    fn child_matches_by_alias() {
        let mut root = leaf("dotfiles");
        let mut status = leaf("status");
        status.aliases.push("st".to_string());
        root.commands.push(status);

        assert!(root.child("st").is_some());
    }

    #[test]
    fn index_resolves_across_trees() {
        let mut index = CommandIndex::new();
        index.insert(CommandTree {
            domain: "dotfiles".to_string(),
            root: leaf("dotfiles"),
        });
        assert!(index.resolve("dotfiles").is_some());
        assert!(index.resolve("missing").is_none());
    }
}
