//! The supervisor (§4.8): coordinates init, command execution, staged task
//! execution, and global shutdown. This is the one component that borrows
//! the store rather than owning plugins directly — see §9 "Cyclic
//! ownership".

use std::collections::HashSet;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::TaskConfig;
use crate::context::Shutdown;
use crate::error::{JoinedError, ReginaldError, Result};
use crate::graph::{Node, TaskGraph};
use crate::platform::Os;
use crate::runtime::{ProviderPrompt, Resolution, RuntimeResolver};
use crate::store::Store;

pub struct Supervisor {
    store: Store,
    shutdown: Shutdown,
    os: Os,
    runtime_resolver: RuntimeResolver,
    deferred: HashSet<String>,
    interactive: bool,
    provider_prompt: ProviderPrompt,
}

impl Supervisor {
    /// `interactive` and `provider_prompt` together drive §4.7 step 4: when
    /// a runtime has no declared provider instance, `interactive` gates
    /// whether the operator is asked at all, and `provider_prompt` is the
    /// callback that actually asks them (reading stdin, in the CLI
    /// front-end; see `crate::runtime::decline_prompt` for a non-interactive
    /// or test stand-in).
    pub fn new(store: Store, shutdown: Shutdown, interactive: bool, provider_prompt: ProviderPrompt) -> Self {
        Self {
            store,
            shutdown,
            os: Os::current(),
            runtime_resolver: RuntimeResolver::new(),
            deferred: HashSet::new(),
            interactive,
            provider_prompt,
        }
    }

    /// Compute the plugin working set for a single command invocation, then
    /// start every non-deferred member concurrently.
    pub async fn init_for_command(&mut self, dotted_command: &str) -> Result<()> {
        let command = self
            .store
            .resolve_command(dotted_command)
            .ok_or_else(|| ReginaldError::CommandNotFound(dotted_command.to_string()))?;
        let owner = command.owner_domain.clone();
        let plugin_name = self.plugin_name_for_domain(&owner)?;
        self.start_plugins(&[plugin_name]).await
    }

    /// Compute the working set for `attend` (running the full task list):
    /// every plugin that owns a referenced task type, plus (transitively)
    /// any plugin whose provider task is owned by a different plugin.
    /// Builds and caches the task graph.
    pub async fn init_for_tasks(&mut self, configs: &mut Vec<TaskConfig>) -> Result<TaskGraph> {
        crate::config::normalize_bare_dependencies(configs)?;

        let mut working_set: HashSet<String> = HashSet::new();
        for config in configs.iter() {
            let owner = self.store.task_type_owner(&config.task_type)?.to_string();
            working_set.insert(owner);
        }

        for plugin_name in working_set.clone() {
            let plugin = self
                .store
                .plugin(&plugin_name)
                .ok_or_else(|| ReginaldError::TaskTypeNotFound(plugin_name.clone()))?;
            let Some(runtime_req) = plugin.manifest().runtime.clone() else {
                continue;
            };
            let prompt = &self.provider_prompt;
            let resolution = self.runtime_resolver.resolve(
                &plugin_name,
                &runtime_req.name,
                self.store.task_types(),
                configs,
                self.interactive,
                |candidates| prompt(candidates),
            )?;
            if let Resolution::Deferred { provider_task_id } = resolution {
                self.deferred.insert(plugin_name.clone());
                let owner = self.store.task_type_owner(
                    &configs
                        .iter()
                        .find(|c| c.id == provider_task_id)
                        .expect("provider task registered above")
                        .task_type,
                )?;
                working_set.insert(owner.to_string());

                // §2 "schedule provider ahead of consumer": every task
                // instance this plugin owns must actually depend on the
                // provider, not just be started after it by convention —
                // otherwise a synthesised provider (§4.7 step 4), which
                // starts with no dependents of its own, can land in the
                // same stage as the consumer's dependency-free tasks.
                for config in configs.iter_mut() {
                    if config.id == provider_task_id {
                        continue;
                    }
                    if self.store.task_type_owner(&config.task_type)? == plugin_name
                        && !config.requires.contains(&provider_task_id)
                    {
                        config.requires.push(provider_task_id.clone());
                    }
                }
            }
        }

        let graph = TaskGraph::build(configs)?;

        let to_start: Vec<String> = working_set
            .into_iter()
            .filter(|name| !self.deferred.contains(name))
            .collect();

        if let Err(e) = self.start_plugins(&to_start).await {
            self.shutdown.cancel();
            let _ = self.shutdown_all().await;
            return Err(e);
        }

        Ok(graph)
    }

    fn plugin_name_for_domain(&self, domain: &str) -> Result<String> {
        self.store
            .plugins()
            .find(|p| p.manifest().domain == domain)
            .map(|p| p.manifest().name.clone())
            .ok_or_else(|| ReginaldError::CommandNotFound(domain.to_string()))
    }

    /// Start every not-yet-ready plugin named in `names` concurrently,
    /// returning each one's own outcome so callers can tell which member of
    /// the set failed.
    async fn start_plugins_each(&mut self, names: &[String]) -> Vec<(String, Result<()>)> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        let starts = self.store.plugins_mut().filter_map(|plugin| {
            let name = plugin.manifest().name.clone();
            if !wanted.contains(name.as_str()) || plugin.is_ready() {
                return None;
            }
            Some(async move {
                let result = plugin.start().await;
                (name, result)
            })
        });
        futures::future::join_all(starts).await
    }

    /// Start every non-ready plugin in `names` in parallel (§4.8); on any
    /// failure, cancel and reap the whole working set.
    async fn start_plugins(&mut self, names: &[String]) -> Result<()> {
        let outcomes = self.start_plugins_each(names).await;
        let mut errors = Vec::new();
        for (name, outcome) in outcomes {
            if let Err(e) = outcome {
                error!(plugin = %name, error = %e, "plugin failed to start");
                errors.push(e);
            }
        }
        if let Some(joined) = JoinedError::new(errors) {
            self.shutdown.cancel();
            let _ = self.shutdown_all().await;
            return Err(ReginaldError::StartFailed {
                plugin: names.join(","),
                reason: joined.to_string(),
            });
        }
        Ok(())
    }

    /// Dispatch `runCommand` on the owning plugin.
    ///
    /// An external plugin's leading path segment is the synthetic
    /// domain root the store wraps its commands in (§3) and is stripped
    /// before the plugin ever sees it; a built-in `core` command has no
    /// such wrapper, since its top-level name is a command it declared
    /// itself, so the full dotted path is passed through unchanged.
    pub async fn run(&self, dotted_command: &str, config: Value) -> Result<()> {
        let command = self
            .store
            .resolve_command(dotted_command)
            .ok_or_else(|| ReginaldError::CommandNotFound(dotted_command.to_string()))?;
        let plugin_name = self.plugin_name_for_domain(&command.owner_domain)?;
        let plugin = self
            .store
            .plugin(&plugin_name)
            .ok_or_else(|| ReginaldError::CommandNotFound(plugin_name.clone()))?;
        let sub_path = if plugin.is_external() {
            dotted_command.splitn(2, '.').nth(1).unwrap_or(dotted_command)
        } else {
            dotted_command
        };
        plugin.run_command(sub_path, config, &self.shutdown).await
    }

    /// Run every stage to completion, in order; within a stage, every node
    /// runs concurrently (§4.8, §5). A deferred plugin is started the
    /// moment a task it owns is reached; `init_for_tasks` wires every such
    /// task to `require` its provider, so topological ordering already
    /// guarantees the provider ran first, and this method double-checks
    /// that against the set of task ids that have actually completed.
    pub async fn run_tasks(&mut self, graph: &TaskGraph, configs: &[TaskConfig]) -> Result<()> {
        let stages = graph.stages();
        let mut completed: HashSet<String> = HashSet::new();
        for stage in stages {
            let mut errors = Vec::new();

            // Resolve each node's owner up front; a bad task type fails
            // that node alone, not the rest of the stage.
            let mut runnable: Vec<(&Node, String)> = Vec::new();
            for node in &stage {
                let config = configs
                    .iter()
                    .find(|c| c.id == node.id)
                    .expect("graph node backed by a config");
                if !self.os.matches_any(&config.platforms) {
                    continue;
                }
                match self.store.task_type_owner(&node.task_type) {
                    Ok(owner) => runnable.push((node, owner.to_string())),
                    Err(e) => errors.push(e),
                }
            }

            // A plugin stays deferred until we are about to run a task it
            // owns. `init_for_tasks` makes every task instance this plugin
            // owns `requires` its provider task, so topological ordering
            // guarantees the provider has already run by the time we get
            // here — but a plugin can own no tasks of its own beyond the
            // ones needing the runtime, so double-check the provider
            // actually completed rather than trust ordering alone.
            let mut owners_to_start: Vec<String> = runnable
                .iter()
                .map(|(_, owner)| owner.clone())
                .filter(|owner| self.deferred.contains(owner))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            owners_to_start.retain(|owner| {
                match self.runtime_resolver.provider_for_plugin(owner) {
                    Some(provider_id) if !completed.contains(provider_id) => {
                        errors.push(ReginaldError::StartFailed {
                            plugin: owner.clone(),
                            reason: format!(
                                "provider task \"{provider_id}\" has not completed yet"
                            ),
                        });
                        false
                    }
                    _ => true,
                }
            });
            if !owners_to_start.is_empty() {
                for (owner, outcome) in self.start_plugins_each(&owners_to_start).await {
                    match outcome {
                        Ok(()) => {
                            self.deferred.remove(&owner);
                        }
                        Err(e) => {
                            error!(plugin = %owner, error = %e, "plugin failed to start");
                            errors.push(e);
                        }
                    }
                }
            }

            // Run one unit of work per node, concurrently (§4.8, §5: no
            // ordering guarantee within a stage).
            let store = &self.store;
            let shutdown = &self.shutdown;
            let task_runs = runnable.into_iter().filter_map(|(node, owner)| {
                if self.deferred.contains(&owner) {
                    // Its provider start failed above; already recorded.
                    return None;
                }
                let config = configs.iter().find(|c| c.id == node.id).expect("checked above");
                let options = serde_json::to_value(&config.options).unwrap_or(Value::Null);
                let id = node.id.clone();
                Some(async move {
                    let outcome = match store.plugin(&owner) {
                        Some(plugin) => plugin.run_task(&node.task_type, options, shutdown).await,
                        None => Err(ReginaldError::TaskTypeNotFound(owner)),
                    };
                    (id, outcome)
                })
            });
            for (id, outcome) in futures::future::join_all(task_runs).await {
                match outcome {
                    Ok(()) => {
                        completed.insert(id);
                    }
                    Err(e) => errors.push(e),
                }
            }

            if let Some(joined) = JoinedError::new(errors) {
                self.shutdown.cancel();
                let _ = self.shutdown_all().await;
                return Err(ReginaldError::StartFailed {
                    plugin: "stage".to_string(),
                    reason: joined.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Notify every external session that was ever Ready, reap the clean
    /// ones, and kill whatever does not exit before the shutdown signal.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        let mut errors = Vec::new();
        for plugin in self.store.plugins_mut() {
            if !plugin.is_external() || !plugin.is_ready() {
                continue;
            }
            if let Err(e) = plugin.shutdown(&self.shutdown).await {
                warn!(error = %e, "plugin shutdown did not complete cleanly");
                errors.push(e);
            }
        }
        match JoinedError::new(errors) {
            Some(joined) => Err(ReginaldError::ShutdownHalted(joined.to_string())),
            None => {
                info!("all plugin sessions reaped");
                Ok(())
            }
        }
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
