//! Runtime resolution (§4.7): detect interpreters a plugin needs but the
//! host lacks, match them to a provider task, and defer the plugin's start
//! until that provider has run.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use crate::config::TaskConfig;
use crate::error::{ReginaldError, Result};
use crate::task_type::TaskTypeIndex;

/// Normalise a declared runtime name to the form used for PATH lookup and
/// `provides` matching (`node.js` and `python3` are the two documented
/// aliases; anything else passes through unchanged).
pub fn normalize_runtime_name(name: &str) -> String {
    match name {
        "node.js" => "node".to_string(),
        "python3" => "python".to_string(),
        other => other.to_string(),
    }
}

/// Is `runtime` (already normalised) present on the current `PATH`?
pub fn is_present_on_path(runtime: &str) -> bool {
    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path_var).any(|dir| {
        let candidate = dir.join(runtime);
        candidate.is_file() || is_executable_with_extensions(&candidate)
    })
}

#[cfg(windows)]
fn is_executable_with_extensions(candidate: &Path) -> bool {
    for ext in ["exe", "cmd", "bat"] {
        if candidate.with_extension(ext).is_file() {
            return true;
        }
    }
    false
}

#[cfg(not(windows))]
fn is_executable_with_extensions(_candidate: &Path) -> bool {
    false
}

/// The operator-prompt callback for §4.7 step 4: given the numbered list of
/// candidate provider task types, return the chosen index, or `None` to
/// decline. Boxed so `Supervisor` can hold one real implementation (a CLI
/// front-end reading stdin) across every plugin it resolves in a run.
pub type ProviderPrompt = Box<dyn Fn(&[String]) -> Option<usize> + Send + Sync>;

/// A prompt that always declines, for non-interactive runs and tests that
/// never expect to reach step 4.
pub fn decline_prompt() -> ProviderPrompt {
    Box::new(|_candidates| None)
}

/// Outcome of resolving one plugin's runtime requirement.
pub enum Resolution {
    /// No runtime declared, or the runtime is already present.
    NotNeeded,
    /// The runtime is missing but a provider task instance will install
    /// it; this plugin must not start until that task completes.
    Deferred { provider_task_id: String },
}

/// Accumulated state across one run's worth of runtime resolution.
#[derive(Default)]
pub struct RuntimeResolver {
    plugin_to_provider: HashMap<String, String>,
    runtime_to_provider: HashMap<String, String>,
}

impl RuntimeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the runtime requirement for one plugin. `configs` is the
    /// mutable working set of task instances; a synthesised provider, if
    /// any, is appended to it. `interactive` and `choose` together model
    /// the operator prompt in step 4 of §4.7: `choose` receives the
    /// numbered list of candidate provider task types and returns the
    /// chosen index, or `None` to decline.
    pub fn resolve(
        &mut self,
        plugin_name: &str,
        runtime_name: &str,
        task_types: &TaskTypeIndex,
        configs: &mut Vec<TaskConfig>,
        interactive: bool,
        choose: impl FnOnce(&[String]) -> Option<usize>,
    ) -> Result<Resolution> {
        let runtime = normalize_runtime_name(runtime_name);
        if is_present_on_path(&runtime) {
            return Ok(Resolution::NotNeeded);
        }

        let existing_instances: Vec<&TaskConfig> = configs
            .iter()
            .filter(|c| {
                task_types
                    .get(&c.task_type)
                    .and_then(|t| t.provides.as_deref())
                    .map(|p| normalize_runtime_name(p) == runtime)
                    .unwrap_or(false)
            })
            .collect();

        match existing_instances.len() {
            1 => {
                let provider_id = existing_instances[0].id.clone();
                self.register(plugin_name, &runtime, provider_id.clone())?;
                Ok(Resolution::Deferred {
                    provider_task_id: provider_id,
                })
            }
            0 if interactive => {
                let candidates: Vec<String> = task_types
                    .iter()
                    .filter(|t| {
                        t.provides
                            .as_deref()
                            .map(|p| normalize_runtime_name(p) == runtime)
                            .unwrap_or(false)
                    })
                    .map(|t| t.qualified.clone())
                    .collect();

                if candidates.is_empty() {
                    return Err(ReginaldError::NoProvider(runtime));
                }

                match choose(&candidates) {
                    Some(index) if index < candidates.len() => {
                        let task_type = candidates[index].clone();
                        let id = unique_provider_id(&task_type, configs);
                        configs.push(TaskConfig {
                            id: id.clone(),
                            task_type,
                            options: Default::default(),
                            requires: vec![],
                            platforms: vec![],
                        });
                        self.register(plugin_name, &runtime, id.clone())?;
                        Ok(Resolution::Deferred {
                            provider_task_id: id,
                        })
                    }
                    _ => Err(ReginaldError::NoProvider(runtime)),
                }
            }
            0 => Err(ReginaldError::NoProvider(runtime)),
            _ => Err(ReginaldError::AmbiguousProvider {
                runtime,
                candidates: existing_instances.iter().map(|c| c.id.clone()).collect(),
            }),
        }
    }

    fn register(&mut self, plugin_name: &str, runtime: &str, provider_task_id: String) -> Result<()> {
        if self
            .plugin_to_provider
            .insert(plugin_name.to_string(), provider_task_id.clone())
            .is_some()
        {
            panic!("provider already registered for plugin {plugin_name}");
        }
        if self
            .runtime_to_provider
            .insert(runtime.to_string(), provider_task_id)
            .is_some()
        {
            panic!("provider already registered for runtime {runtime}");
        }
        Ok(())
    }

    pub fn provider_for_plugin(&self, plugin_name: &str) -> Option<&str> {
        self.plugin_to_provider.get(plugin_name).map(String::as_str)
    }

    pub fn provider_for_runtime(&self, runtime: &str) -> Option<&str> {
        self.runtime_to_provider.get(runtime).map(String::as_str)
    }
}

fn unique_provider_id(task_type: &str, configs: &[TaskConfig]) -> String {
    let base = format!("{}-provider", task_type.replace('/', "-"));
    let existing: std::collections::HashSet<&str> = configs.iter().map(|c| c.id.as_str()).collect();
    if !existing.contains(base.as_str()) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}
