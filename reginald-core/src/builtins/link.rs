//! `core/link` — creates a symlink from `source` to `target`, and a
//! `link status` command reporting whether it is currently correct.
//!
//! Deliberately minimal: this is an illustration of a dotfile-symlinking
//! task, not a dotfile manager. Full symlink-task semantics are out of
//! scope (spec.md §1 Non-goals).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::command::Command;
use crate::error::{ReginaldError, Result};
use crate::manifest::Manifest;
use crate::plugin::BuiltinPlugin;
use crate::task_type::TaskType;

pub struct LinkPlugin {
    manifest: Manifest,
}

impl LinkPlugin {
    pub fn new() -> Self {
        let status_command = Command {
            name: "status".to_string(),
            aliases: vec![],
            usage: "link status --source <path> --target <path>".to_string(),
            description: "Report whether the symlink at target currently points at source."
                .to_string(),
            config_schema: vec![],
            commands: vec![],
            args: vec![],
            owner_domain: "core".to_string(),
        };
        let link_command = Command {
            name: "link".to_string(),
            aliases: vec![],
            usage: "link --source <path> --target <path>".to_string(),
            description: "Create a symlink from source to target.".to_string(),
            config_schema: vec![],
            commands: vec![status_command],
            args: vec![],
            owner_domain: "core".to_string(),
        };

        let mut task_type = TaskType {
            name: "link".to_string(),
            description: "Symlink a file or directory into place.".to_string(),
            provides: None,
            config_schema: vec![],
            qualified: String::new(),
        };
        task_type.qualify("core");

        Self {
            manifest: Manifest {
                name: "core-link".to_string(),
                domain: "core".to_string(),
                description: "Built-in symlinking task.".to_string(),
                help: String::new(),
                executable: String::new(),
                runtime: None,
                commands: vec![link_command],
                tasks: vec![task_type],
                dir: PathBuf::new(),
            },
        }
    }

    fn read_paths(config: &Value) -> Result<(PathBuf, PathBuf)> {
        let source = config
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| ReginaldError::ManifestInvalid("link task requires \"source\"".into()))?;
        let target = config
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| ReginaldError::ManifestInvalid("link task requires \"target\"".into()))?;
        Ok((PathBuf::from(source), PathBuf::from(target)))
    }

    fn is_correct(source: &Path, target: &Path) -> bool {
        std::fs::read_link(target)
            .map(|resolved| resolved == source)
            .unwrap_or(false)
    }
}

impl Default for LinkPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuiltinPlugin for LinkPlugin {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    async fn run_command(&self, cmd: &str, config: Value) -> Result<()> {
        match cmd {
            "link.status" => {
                let (source, target) = Self::read_paths(&config)?;
                if Self::is_correct(&source, &target) {
                    Ok(())
                } else {
                    Err(ReginaldError::ManifestInvalid(format!(
                        "{} does not point at {}",
                        target.display(),
                        source.display()
                    )))
                }
            }
            other => Err(ReginaldError::CommandNotFound(other.to_string())),
        }
    }

    async fn run_task(&self, task_type: &str, config: Value) -> Result<()> {
        if task_type != "core/link" {
            return Err(ReginaldError::TaskTypeNotFound(task_type.to_string()));
        }
        let (source, target) = Self::read_paths(&config)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if target.symlink_metadata().is_ok() {
            std::fs::remove_file(&target)?;
        }
        symlink(&source, &target)?;
        Ok(())
    }
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}
