//! Run configuration and the task configuration loader (§4.11, §6).
//!
//! Two distinct documents live here: [`RunConfig`] is the ambient,
//! host-level configuration (search roots, interactivity, logging, shutdown
//! grace period), layered from a TOML file and environment variables in the
//! style of the teacher's `config::Config::builder()` pipeline. [`TaskConfig`]
//! is the external, user-authored task list from §6, loaded from YAML or
//! TOML and normalised before it ever reaches [`crate::graph::TaskGraph`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReginaldError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Search roots for external plugin discovery, relative to the working
    /// directory unless absolute (some conventionally home-prefixed, e.g.
    /// `~/.reginald/plugins`, resolved by the CLI front-end before this
    /// struct is built).
    #[serde(default = "default_search_roots")]
    pub search_roots: Vec<PathBuf>,

    /// Whether the run may prompt the operator (§4.7 step 4).
    #[serde(default = "default_interactive")]
    pub interactive: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// How long `Supervisor::shutdown` waits for a session's graceful exit
    /// before escalating to `kill`.
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            search_roots: default_search_roots(),
            interactive: default_interactive(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

fn default_search_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("plugins")]
}
fn default_interactive() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

impl RunConfig {
    /// Load from `reginald.toml` (if present) layered under environment
    /// overrides (`REGINALD__<FIELD>`), matching the teacher's
    /// `config::Config::builder()` shape.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())?;
        let built = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path.unwrap_or("reginald")).required(false))
            .add_source(config::Environment::with_prefix("REGINALD").separator("__"))
            .build()?;
        built.try_deserialize().map_err(ReginaldError::from)
    }
}

/// One user-configured task instance (§3 "Task instance (TaskConfig)").
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default, flatten)]
    pub options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Parse the task configuration document. `format` is `"yaml"` or
/// `"toml"`; everything else is an error.
pub fn parse_task_configs(contents: &str, format: &str) -> Result<Vec<TaskConfig>> {
    match format {
        "yaml" | "yml" => Ok(serde_yaml::from_str(contents)?),
        "toml" => {
            #[derive(Deserialize)]
            struct Document {
                #[serde(default)]
                tasks: Vec<TaskConfig>,
            }
            let doc: Document = toml::from_str(contents)?;
            Ok(doc.tasks)
        }
        other => Err(ReginaldError::ManifestInvalid(format!(
            "unsupported task configuration format {other:?}"
        ))),
    }
}

/// Resolve every bare-type `requires` entry into a concrete instance id
/// before the task graph is built (§4.11, resolving the open question in
/// spec §9).
///
/// For each `requires` entry that isn't itself a declared instance id: look
/// up how many declared instances share that task type. Exactly one ⇒
/// rewrite the entry to that instance's id. Zero or more than one ⇒ fail.
pub fn normalize_bare_dependencies(configs: &mut [TaskConfig]) -> Result<()> {
    let known_ids: std::collections::HashSet<String> =
        configs.iter().map(|c| c.id.clone()).collect();

    let mut instances_by_type: HashMap<String, Vec<String>> = HashMap::new();
    for config in configs.iter() {
        instances_by_type
            .entry(config.task_type.clone())
            .or_default()
            .push(config.id.clone());
    }

    for config in configs.iter_mut() {
        for entry in &mut config.requires {
            if known_ids.contains(entry) {
                continue;
            }
            match instances_by_type.get(entry) {
                Some(ids) if ids.len() == 1 => {
                    *entry = ids[0].clone();
                }
                Some(ids) if ids.len() > 1 => {
                    return Err(ReginaldError::AmbiguousProvider {
                        runtime: entry.clone(),
                        candidates: ids.clone(),
                    });
                }
                _ => {
                    return Err(ReginaldError::UnknownDependency(entry.clone()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, task_type: &str, requires: &[&str]) -> TaskConfig {
        TaskConfig {
            id: id.to_string(),
            task_type: task_type.to_string(),
            options: HashMap::new(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            platforms: vec![],
        }
    }

    #[test]
    fn bare_type_with_single_instance_is_rewritten() {
        let mut configs = vec![
            config("i1", "pkg/install", &[]),
            config("consumer", "core/run", &["pkg/install"]),
        ];
        normalize_bare_dependencies(&mut configs).unwrap();
        assert_eq!(configs[1].requires, vec!["i1".to_string()]);
    }

    #[test]
    fn bare_type_with_multiple_instances_is_ambiguous() {
        let mut configs = vec![
            config("i1", "pkg/install", &[]),
            config("i2", "pkg/install", &[]),
            config("consumer", "core/run", &["pkg/install"]),
        ];
        let err = normalize_bare_dependencies(&mut configs).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AmbiguousProvider);
    }

    #[test]
    fn unresolvable_dependency_fails() {
        let mut configs = vec![config("consumer", "core/run", &["ghost/type"])];
        let err = normalize_bare_dependencies(&mut configs).unwrap_err();
        assert_eq!(err.to_string(), "unknown dependency \"ghost/type\"");
    }

    #[test]
    fn direct_instance_id_references_are_left_alone() {
        let mut configs = vec![
            config("a", "core/run", &[]),
            config("b", "core/run", &["a"]),
        ];
        normalize_bare_dependencies(&mut configs).unwrap();
        assert_eq!(configs[1].requires, vec!["a".to_string()]);
    }

    #[test]
    fn parses_yaml_task_list() {
        let yaml = "- id: a\n  type: core/run\n  command: echo\n";
        let configs = parse_task_configs(yaml, "yaml").unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].id, "a");
    }
}
