//! Built-in plugins (§4.12): minimal `core`-domain reference
//! implementations that exercise the same `Plugin` surface as an external
//! process, without spawning one.
//!
//! Every built-in capability contributes its manifest fragment to a single
//! [`CorePlugin`] rather than registering as its own plugin: §3 reserves the
//! `core` domain for "a host-provided root command" (singular), and
//! [`crate::store::Store`]'s domain-uniqueness invariant would reject two
//! separate `domain: "core"` plugins outright.

mod link;
mod run;

pub use link::LinkPlugin;
pub use run::RunPlugin;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ReginaldError, Result};
use crate::manifest::Manifest;
use crate::plugin::{BuiltinPlugin, Plugin};

/// The single host-provided `core` plugin, aggregating every built-in's
/// commands and task types under one manifest.
pub struct CorePlugin {
    link: LinkPlugin,
    run: RunPlugin,
    manifest: Manifest,
}

impl CorePlugin {
    pub fn new() -> Self {
        let link = LinkPlugin::new();
        let run = RunPlugin::new();

        let mut commands = link.manifest().commands.clone();
        commands.extend(run.manifest().commands.clone());
        let mut tasks = link.manifest().tasks.clone();
        tasks.extend(run.manifest().tasks.clone());

        let manifest = Manifest {
            name: "core".to_string(),
            domain: "core".to_string(),
            description: "Built-in host commands: symlinking and ad hoc command execution."
                .to_string(),
            help: String::new(),
            executable: String::new(),
            runtime: None,
            commands,
            tasks,
            dir: Default::default(),
        };

        Self { link, run, manifest }
    }
}

impl Default for CorePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuiltinPlugin for CorePlugin {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    async fn run_command(&self, cmd: &str, config: Value) -> Result<()> {
        if cmd == "link" || cmd.starts_with("link.") {
            self.link.run_command(cmd, config).await
        } else if cmd == "run" || cmd.starts_with("run.") {
            self.run.run_command(cmd, config).await
        } else {
            Err(ReginaldError::CommandNotFound(cmd.to_string()))
        }
    }

    async fn run_task(&self, task_type: &str, config: Value) -> Result<()> {
        match task_type {
            "core/link" => self.link.run_task(task_type, config).await,
            "core/run" => self.run.run_task(task_type, config).await,
            other => Err(ReginaldError::TaskTypeNotFound(other.to_string())),
        }
    }
}

/// The built-in plugin set: one `core` plugin aggregating every built-in
/// capability. Registered into the store before external discovery so it
/// always wins the name/domain race.
pub fn all() -> Vec<Plugin> {
    vec![Plugin::builtin(CorePlugin::new())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn core_plugin_merges_both_manifests() {
        let core = CorePlugin::new();
        assert_eq!(core.manifest().domain, "core");
        assert_eq!(core.manifest().commands.len(), 2);
        assert_eq!(core.manifest().tasks.len(), 2);
    }

    #[tokio::test]
    async fn core_plugin_dispatches_run_task_by_type() {
        let core = CorePlugin::new();
        let config = serde_json::json!({ "command": "true", "args": [] });
        assert!(core.run_task("core/run", config).await.is_ok());
    }

    #[tokio::test]
    async fn core_plugin_rejects_unknown_task_type() {
        let core = CorePlugin::new();
        let err = core.run_task("core/ghost", Value::Null).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::TaskTypeNotFound);
    }
}
