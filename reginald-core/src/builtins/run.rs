//! `core/run` — shells out to an arbitrary `command` with `args`, for ad
//! hoc custom work. `run exec` does the same synchronously from the CLI.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::command::Command;
use crate::error::{ReginaldError, Result};
use crate::manifest::Manifest;
use crate::plugin::BuiltinPlugin;
use crate::task_type::TaskType;

pub struct RunPlugin {
    manifest: Manifest,
}

impl RunPlugin {
    pub fn new() -> Self {
        let exec_command = Command {
            name: "exec".to_string(),
            aliases: vec![],
            usage: "run exec -- <command> [args...]".to_string(),
            description: "Run a command synchronously.".to_string(),
            config_schema: vec![],
            commands: vec![],
            args: vec![],
            owner_domain: "core".to_string(),
        };
        let run_command = Command {
            name: "run".to_string(),
            aliases: vec![],
            usage: "run -- <command> [args...]".to_string(),
            description: "Run an arbitrary command.".to_string(),
            config_schema: vec![],
            commands: vec![exec_command],
            args: vec![],
            owner_domain: "core".to_string(),
        };

        let mut task_type = TaskType {
            name: "run".to_string(),
            description: "Shell out to a command.".to_string(),
            provides: None,
            config_schema: vec![],
            qualified: String::new(),
        };
        task_type.qualify("core");

        Self {
            manifest: Manifest {
                name: "core-run".to_string(),
                domain: "core".to_string(),
                description: "Built-in command execution task.".to_string(),
                help: String::new(),
                executable: String::new(),
                runtime: None,
                commands: vec![run_command],
                tasks: vec![task_type],
                dir: PathBuf::new(),
            },
        }
    }

    fn exec(config: &Value) -> Result<()> {
        let command = config
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ReginaldError::ManifestInvalid("run task requires \"command\"".into()))?;
        let args: Vec<String> = config
            .get("args")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let status = std::process::Command::new(command)
            .args(&args)
            .status()
            .map_err(|e| ReginaldError::StartFailed {
                plugin: "core-run".to_string(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ReginaldError::StartFailed {
                plugin: "core-run".to_string(),
                reason: format!("{command} exited with {status}"),
            })
        }
    }
}

impl Default for RunPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuiltinPlugin for RunPlugin {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    async fn run_command(&self, cmd: &str, config: Value) -> Result<()> {
        match cmd {
            "run.exec" => Self::exec(&config),
            other => Err(ReginaldError::CommandNotFound(other.to_string())),
        }
    }

    async fn run_task(&self, task_type: &str, config: Value) -> Result<()> {
        if task_type != "core/run" {
            return Err(ReginaldError::TaskTypeNotFound(task_type.to_string()));
        }
        Self::exec(&config)
    }
}
