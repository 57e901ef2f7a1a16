//! Plugin manifest discovery, decoding, and normalisation.
//!
//! A manifest is the static description of one plugin: `manifest.json` in
//! its own directory under a search root. Discovery walks every root
//! concurrently, reads one manifest per child directory, and normalises
//! paths relative to the manifest's own location — the same shape lapce's
//! `find_all_manifests`/`load_manifest` pair uses, generalised to several
//! search roots and an async fan-out.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::Command;
use crate::error::{ReginaldError, Result};
use crate::task_type::TaskType;

/// Interpreter a plugin needs present on the host before it can start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRequirement {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Static description of a plugin, decoded from `manifest.json`.
///
/// Reserved `domain == "core"` designates a host-provided root command;
/// built-ins construct this struct directly rather than decoding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    /// Absolute path to the plugin binary after normalisation. Empty for
    /// built-ins, which never spawn a process.
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub runtime: Option<RuntimeRequirement>,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub tasks: Vec<TaskType>,

    /// The directory the manifest was read from. Not part of the wire
    /// format; filled in by the loader.
    #[serde(skip, default)]
    pub dir: PathBuf,
}

impl Manifest {
    /// Decode and normalise one manifest already read from `path`.
    ///
    /// `deny_unknown_fields` on the struct rejects typos in the manifest at
    /// decode time; everything after that is the loader's own validation.
    pub fn parse(contents: &str, manifest_path: &Path) -> Result<Self> {
        let mut manifest: Manifest = serde_json::from_str(contents)?;
        let dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if manifest.name.is_empty() {
            return Err(ReginaldError::ManifestInvalid("name must not be empty".into()));
        }
        if manifest.domain.is_empty() {
            manifest.domain = manifest.name.clone();
        }
        if manifest.executable.is_empty() {
            return Err(ReginaldError::ManifestInvalid(format!(
                "plugin {:?} has no executable",
                manifest.name
            )));
        }

        let resolved = dir.join(&manifest.executable);
        let resolved = resolved.canonicalize().map_err(|_| {
            ReginaldError::ManifestInvalid(format!(
                "plugin {:?} executable {:?} does not resolve to an existing file",
                manifest.name, manifest.executable
            ))
        })?;
        if !resolved.is_file() {
            return Err(ReginaldError::ManifestInvalid(format!(
                "plugin {:?} executable {:?} is not a regular file",
                manifest.name, manifest.executable
            )));
        }
        manifest.executable = resolved.to_string_lossy().into_owned();

        for command in &mut manifest.commands {
            command.strip_nil_children();
        }
        for task in &mut manifest.tasks {
            task.qualify(&manifest.domain);
        }

        manifest.dir = dir;
        Ok(manifest)
    }
}

/// One recoverable failure to read a search root, collected rather than
/// treated as fatal (§7 "path-not-found").
#[derive(Debug)]
pub struct PathIssue {
    pub root: PathBuf,
    pub error: std::io::Error,
}

/// Result of a discovery pass: the manifests found, plus any search roots
/// that could not be read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub manifests: Vec<Manifest>,
    pub path_issues: Vec<PathIssue>,
}

/// Discover every plugin manifest under `roots`, relative to `working_dir`
/// for non-absolute entries.
///
/// Each root is canonicalised, then scanned for immediate child
/// directories; a child without `manifest.json` is silently skipped. A root
/// that cannot be read is recorded as a [`PathIssue`] and discovery
/// continues with the remaining roots. A malformed manifest is fatal.
pub async fn discover(working_dir: &Path, roots: &[PathBuf]) -> Result<Discovery> {
    let mut discovery = Discovery::default();
    let mut tasks = tokio::task::JoinSet::new();

    for root in roots {
        let root = if root.is_absolute() {
            root.clone()
        } else {
            working_dir.join(root)
        };
        tasks.spawn(async move { scan_root(root).await });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| ReginaldError::RpcTransport(e.to_string()))?;
        match outcome {
            ScanOutcome::Manifests(found) => discovery.manifests.extend(found),
            ScanOutcome::PathIssue(issue) => discovery.path_issues.push(issue),
            ScanOutcome::Fatal(err) => return Err(err),
        }
    }

    Ok(discovery)
}

enum ScanOutcome {
    Manifests(Vec<Manifest>),
    PathIssue(PathIssue),
    Fatal(ReginaldError),
}

async fn scan_root(root: PathBuf) -> ScanOutcome {
    let canonical = match tokio::fs::canonicalize(&root).await {
        Ok(c) => c,
        Err(e) => return ScanOutcome::PathIssue(PathIssue { root, error: e }),
    };

    let mut entries = match tokio::fs::read_dir(&canonical).await {
        Ok(e) => e,
        Err(e) => {
            return ScanOutcome::PathIssue(PathIssue {
                root: canonical,
                error: e,
            })
        }
    };

    let mut manifests = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => {
                return ScanOutcome::PathIssue(PathIssue {
                    root: canonical,
                    error: e,
                })
            }
        };

        let plugin_dir = entry.path();
        if !plugin_dir.is_dir() {
            continue;
        }
        let manifest_path = plugin_dir.join("manifest.json");
        if !manifest_path.is_file() {
            continue;
        }

        let contents = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "failed to read manifest");
                return ScanOutcome::Fatal(ReginaldError::ManifestInvalid(format!(
                    "cannot read {}: {e}",
                    manifest_path.display()
                )));
            }
        };

        match Manifest::parse(&contents, &manifest_path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => return ScanOutcome::Fatal(e),
        }
    }

    ScanOutcome::Manifests(manifests)
}
