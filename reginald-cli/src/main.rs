//! `reginald` — the CLI front-end around `reginald-core`'s supervisor.
//!
//! Argument parsing and config-file merging are explicitly out of scope for
//! the core (spec.md §1); this binary exists only so the crate compiles
//! into something runnable end to end. Two entry points: `reginald attend`
//! runs every task in a task-configuration file to completion, and
//! `reginald <domain> <command...>` resolves and runs a single plugin
//! command.

mod output;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use reginald_core::config::RunConfig;
use reginald_core::context::Shutdown;
use reginald_core::logging::{self, LogFormat as CoreLogFormat};
use reginald_core::runtime::ProviderPrompt;
use reginald_core::{builtins, config, manifest, store::Store, supervisor::Supervisor};

use output::{print_detail, print_error, print_header, print_success};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogFormatArg {
    #[default]
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(
    name = "reginald",
    version,
    about = "Reginald — a personal workstation valet",
    propagate_version = true
)]
struct Cli {
    /// Path to the run configuration file (reginald.toml by default).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log rendering.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Increase verbosity (stackable: -v, -vv).
    #[arg(short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (stackable: -q, -qq).
    #[arg(short = 'q', global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Never prompt the operator (runtime-resolver ambiguity becomes a hard failure).
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every task in a task-configuration file to completion.
    Attend {
        /// Path to the task-configuration document (YAML or TOML).
        #[arg(short = 'c', long = "tasks")]
        tasks: PathBuf,
    },

    /// List every discovered plugin and its domain.
    Plugins,

    /// A plugin command: `reginald <domain> <command...> [--flag value]...`
    #[command(external_subcommand)]
    Plugin(Vec<String>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let run_config = match load_run_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let log_format = match run_config.log_format.as_str() {
        "json" => CoreLogFormat::Json,
        _ => CoreLogFormat::Pretty,
    };
    if let Err(e) = logging::init(&run_config.log_level, log_format) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    match run(cli, run_config).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            if let Some(core_err) = e.downcast_ref::<reginald_core::ReginaldError>() {
                if core_err.is_cancellation() {
                    print_error("cancelled");
                    std::process::exit(130);
                }
            }
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

fn load_run_config(cli: &Cli) -> Result<RunConfig> {
    let mut run_config = RunConfig::load(cli.config.as_deref().and_then(|p| p.to_str()))
        .context("failed to load run configuration")?;

    if let Some(format) = cli.log_format {
        run_config.log_format = match format {
            LogFormatArg::Pretty => "pretty".to_string(),
            LogFormatArg::Json => "json".to_string(),
        };
    }
    if cli.verbose > 0 {
        run_config.log_level = bump_level(&run_config.log_level, cli.verbose as i8);
    }
    if cli.quiet > 0 {
        run_config.log_level = bump_level(&run_config.log_level, -(cli.quiet as i8));
    }
    if cli.non_interactive {
        run_config.interactive = false;
    }
    run_config.search_roots = run_config.search_roots.into_iter().map(expand_home).collect();

    Ok(run_config)
}

/// `~/...` is conventional shorthand in manifest search roots; the CLI is
/// the one place allowed to know about the operator's home directory, since
/// path canonicalisation proper is the core's job, not this front-end's.
fn expand_home(path: PathBuf) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path;
    };
    match dirs::home_dir() {
        Some(home) => home.join(stripped),
        None => path,
    }
}

/// The operator prompt for §4.7 step 4: print the candidate provider task
/// types and read a choice (or a decline) from stdin. Used as-is when
/// `run_config.interactive` is true; `RuntimeResolver::resolve` never calls
/// it otherwise.
fn stdin_provider_prompt() -> ProviderPrompt {
    Box::new(|candidates: &[String]| {
        println!();
        println!("No runtime found; choose a provider task type to install it:");
        for (i, candidate) in candidates.iter().enumerate() {
            println!("  {}) {candidate}", i + 1);
        }
        print!("Choice (or 'n' to decline): ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return None;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n") {
            return None;
        }
        trimmed
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .filter(|&i| i < candidates.len())
    })
}

fn bump_level(level: &str, steps: i8) -> String {
    const ORDER: &[&str] = &["error", "warn", "info", "debug", "trace"];
    let current = ORDER.iter().position(|l| *l == level).unwrap_or(2);
    let next = (current as i8 + steps).clamp(0, ORDER.len() as i8 - 1) as usize;
    ORDER[next].to_string()
}

async fn run(cli: Cli, run_config: RunConfig) -> Result<()> {
    let working_dir = std::env::current_dir().context("cannot determine working directory")?;
    let store = build_store(&run_config, &working_dir).await?;

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }
    let mut supervisor = Supervisor::new(store, shutdown, run_config.interactive, stdin_provider_prompt());

    let result = match cli.command {
        Commands::Attend { tasks } => run_attend(&mut supervisor, &tasks).await,
        Commands::Plugins => {
            print_plugins(&supervisor);
            Ok(())
        }
        Commands::Plugin(args) => run_plugin_command(&mut supervisor, &args).await,
    };

    let shutdown_result = supervisor.shutdown_all().await;
    result?;
    shutdown_result.context("plugin shutdown did not complete cleanly")?;
    Ok(())
}

async fn build_store(run_config: &RunConfig, working_dir: &Path) -> Result<Store> {
    let discovery = manifest::discover(working_dir, &run_config.search_roots)
        .await
        .map_err(anyhow::Error::from)?;
    for issue in &discovery.path_issues {
        tracing::warn!(root = %issue.root.display(), error = %issue.error, "search root not found");
    }
    Store::new(builtins::all(), discovery.manifests).map_err(anyhow::Error::from)
}

async fn run_attend(supervisor: &mut Supervisor, tasks_path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(tasks_path)
        .with_context(|| format!("cannot read task configuration at {}", tasks_path.display()))?;
    let format = match tasks_path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => "yaml",
        Some("toml") => "toml",
        other => bail!("unsupported task configuration extension {other:?}"),
    };
    let mut configs = config::parse_task_configs(&contents, format).map_err(anyhow::Error::from)?;

    let graph = supervisor
        .init_for_tasks(&mut configs)
        .await
        .map_err(anyhow::Error::from)?;
    supervisor
        .run_tasks(&graph, &configs)
        .await
        .map_err(anyhow::Error::from)?;
    print_success(&format!("ran {} task(s) to completion", configs.len()));
    Ok(())
}

async fn run_plugin_command(supervisor: &mut Supervisor, args: &[String]) -> Result<()> {
    let (dotted, config) = parse_command_invocation(args);
    if dotted.is_empty() {
        bail!("no command given");
    }
    supervisor
        .init_for_command(&dotted)
        .await
        .map_err(anyhow::Error::from)?;
    supervisor.run(&dotted, config).await.map_err(anyhow::Error::from)?;
    print_success(&format!("ran {dotted}"));
    Ok(())
}

/// Split an external-subcommand argv into a dotted command path (the
/// leading run of non-flag tokens) and a flat config object built from the
/// remaining `--key value` pairs. Full config-schema-driven parsing is a
/// CLI front-end concern the core intentionally leaves undefined (§1).
fn parse_command_invocation(args: &[String]) -> (String, Value) {
    let mut i = 0;
    let mut path = Vec::new();
    while i < args.len() && !args[i].starts_with('-') {
        path.push(args[i].clone());
        i += 1;
    }

    let mut map = serde_json::Map::new();
    while i < args.len() {
        let key = args[i].trim_start_matches('-').to_string();
        let value = args.get(i + 1).cloned();
        match value {
            Some(v) if !v.starts_with('-') => {
                map.insert(key, Value::String(v));
                i += 2;
            }
            _ => {
                map.insert(key, Value::Bool(true));
                i += 1;
            }
        }
    }

    (path.join("."), Value::Object(map))
}

fn print_plugins(supervisor: &Supervisor) {
    print_header("Discovered plugins");
    for plugin in supervisor.store().plugins() {
        let manifest = plugin.manifest();
        print_detail("name", &manifest.name);
        print_detail("domain", &manifest.domain);
        print_detail("kind", if plugin.is_external() { "external" } else { "built-in" });
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_path_and_flags() {
        let args = vec![
            "link".to_string(),
            "status".to_string(),
            "--source".to_string(),
            "/a".to_string(),
            "--target".to_string(),
            "/b".to_string(),
        ];
        let (path, config) = parse_command_invocation(&args);
        assert_eq!(path, "link.status");
        assert_eq!(config["source"], "/a");
        assert_eq!(config["target"], "/b");
    }

    #[test]
    fn flag_without_value_becomes_boolean() {
        let args = vec!["run".to_string(), "--dry-run".to_string()];
        let (path, config) = parse_command_invocation(&args);
        assert_eq!(path, "run");
        assert_eq!(config["dry-run"], true);
    }

    #[test]
    fn bump_level_clamps_within_known_levels() {
        assert_eq!(bump_level("info", 1), "debug");
        assert_eq!(bump_level("error", -5), "error");
        assert_eq!(bump_level("trace", 5), "trace");
    }
}
