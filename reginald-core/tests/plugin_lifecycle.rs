//! End-to-end tests driving real `fake_plugin` child processes through
//! `PluginSession`/`Plugin`/`Store`/`Supervisor`, covering the scenarios in
//! spec.md §8 that need an actual process on the other end of the pipe
//! rather than a unit-level stub.
//!
//! `fake_plugin` (a second `[[bin]]` in this package, not part of the
//! crate's public surface) reports the plugin name its own executable was
//! copied under, and hangs forever on `shutdown` when that name contains
//! `hang`. Each test copies the compiled binary to uniquely-named temp
//! files so concurrently-started "plugins" each report a distinct
//! identity.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reginald_core::config::TaskConfig;
use reginald_core::context::Shutdown;
use reginald_core::error::ErrorCode;
use reginald_core::manifest::Manifest;
use reginald_core::plugin::Plugin;
use reginald_core::store::Store;
use reginald_core::supervisor::Supervisor;
use tempfile::TempDir;

fn fake_plugin_copy(dir: &Path, name: &str) -> PathBuf {
    let src = PathBuf::from(env!("CARGO_BIN_EXE_fake_plugin"));
    let dest = dir.join(name);
    fs::copy(&src, &dest).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&dest).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&dest, perms).unwrap();
    }
    dest
}

/// Build a minimal external manifest naming `executable` directly (already
/// absolute, so the directory `Manifest::parse` resolves it against is
/// irrelevant) with no declared commands or tasks.
fn bare_manifest(name: &str, executable: &Path) -> Manifest {
    let json = format!(
        r#"{{"name":"{name}","executable":{:?}}}"#,
        executable.display().to_string()
    );
    Manifest::parse(&json, &executable.with_file_name("manifest.json")).unwrap()
}

fn task_config(id: &str, task_type: &str, requires: &[&str]) -> TaskConfig {
    TaskConfig {
        id: id.to_string(),
        task_type: task_type.to_string(),
        options: Default::default(),
        requires: requires.iter().map(|s| s.to_string()).collect(),
        platforms: vec![],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_lifecycle_start_run_command_graceful_shutdown() {
    let dir = TempDir::new().unwrap();
    let exe = fake_plugin_copy(dir.path(), "greeter");
    let manifest = bare_manifest("greeter", &exe);

    let mut plugin = Plugin::external(manifest);
    plugin.start().await.unwrap();
    assert!(plugin.is_ready());

    let shutdown = Shutdown::new();
    plugin
        .run_command("status", serde_json::json!({}), &shutdown)
        .await
        .unwrap();

    plugin.shutdown(&shutdown).await.unwrap();
}

/// Scenario B: the plugin's handshake reply carries a different name than
/// the manifest declared, so init must fail and the process must not be
/// left running.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_name_mismatch_fails_init_and_reaps_the_process() {
    let dir = TempDir::new().unwrap();
    // The binary reports its own file stem as its name ("c"); the manifest
    // claims the plugin is named "d".
    let exe = fake_plugin_copy(dir.path(), "c");
    let mut manifest = bare_manifest("d", &exe);
    manifest.name = "d".to_string();
    manifest.domain = "d".to_string();

    let mut plugin = Plugin::external(manifest);
    let err = plugin.start().await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::HandshakeMismatch);
    assert_eq!(
        err.to_string(),
        "mismatching plugin name, want \"d\", got \"c\""
    );
    assert!(!plugin.is_ready());
}

/// Scenario F: three Ready sessions are asked to shut down; one acks
/// promptly, two never respond and must be killed once the shutdown
/// signal trips, without the first session's clean shutdown being
/// affected.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_under_cancel_kills_hung_sessions_without_failing_the_clean_one() {
    let dir = TempDir::new().unwrap();
    let ok_exe = fake_plugin_copy(dir.path(), "ok-session");
    let hang_a_exe = fake_plugin_copy(dir.path(), "hang-a");
    let hang_b_exe = fake_plugin_copy(dir.path(), "hang-b");

    let mut ok = Plugin::external(bare_manifest("ok-session", &ok_exe));
    let mut hang_a = Plugin::external(bare_manifest("hang-a", &hang_a_exe));
    let mut hang_b = Plugin::external(bare_manifest("hang-b", &hang_b_exe));

    ok.start().await.unwrap();
    hang_a.start().await.unwrap();
    hang_b.start().await.unwrap();

    let shutdown = Shutdown::new();

    // The well-behaved session completes before anything is cancelled.
    ok.shutdown(&shutdown).await.unwrap();

    // Trip the shutdown signal shortly after kicking off the two hung
    // shutdowns, simulating the host's deadline/cancel firing mid-wait.
    let canceller = shutdown.clone();
    let canceller_handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let hang_a_result = hang_a.shutdown(&shutdown).await;
    let hang_b_result = hang_b.shutdown(&shutdown).await;
    canceller_handle.await.unwrap();

    let err_a = hang_a_result.unwrap_err();
    let err_b = hang_b_result.unwrap_err();
    assert_eq!(err_a.code(), ErrorCode::ShutdownHalted);
    assert_eq!(err_b.code(), ErrorCode::ShutdownHalted);
    assert!(!hang_a.is_ready());
    assert!(!hang_b.is_ready());
}

/// Scenario E: a plugin declaring a runtime the host doesn't have is
/// deferred until the sole task instance that provides that runtime has
/// run; only then does the consumer plugin get started and handshaked.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_wiring_defers_plugin_start_until_its_provider_task_runs() {
    let dir = TempDir::new().unwrap();
    let provider_exe = fake_plugin_copy(dir.path(), "providerp");
    let consumer_exe = fake_plugin_copy(dir.path(), "p");

    let provider_json = format!(
        r#"{{"name":"providerp","executable":{:?},"tasks":[{{"type":"install","provides":"reginald-test-ghost-runtime"}}]}}"#,
        provider_exe.display().to_string()
    );
    let provider_manifest = Manifest::parse(
        &provider_json,
        &provider_exe.with_file_name("manifest.json"),
    )
    .unwrap();

    let consumer_json = format!(
        r#"{{"name":"p","executable":{:?},"runtime":{{"name":"reginald-test-ghost-runtime"}},"tasks":[{{"type":"do"}}]}}"#,
        consumer_exe.display().to_string()
    );
    let consumer_manifest = Manifest::parse(
        &consumer_json,
        &consumer_exe.with_file_name("manifest.json"),
    )
    .unwrap();

    let store = Store::new(vec![], vec![provider_manifest, consumer_manifest]).unwrap();
    let shutdown = Shutdown::new();
    let mut supervisor =
        Supervisor::new(store, shutdown, false, reginald_core::runtime::decline_prompt());

    let mut configs = vec![
        task_config("i1", "providerp/install", &[]),
        task_config("consumer-task", "p/do", &["i1"]),
    ];

    let graph = supervisor.init_for_tasks(&mut configs).await.unwrap();

    // The provider plugin is needed immediately; the consumer is deferred.
    assert!(supervisor.store().plugin("providerp").unwrap().is_ready());
    assert!(!supervisor.store().plugin("p").unwrap().is_ready());

    let stages = graph.stages();
    let stage_of = |id: &str| {
        stages
            .iter()
            .position(|s| s.iter().any(|n| n.id == id))
            .unwrap()
    };
    assert!(stage_of("i1") < stage_of("consumer-task"));

    supervisor.run_tasks(&graph, &configs).await.unwrap();

    // Once the stage owning "consumer-task" has run, "p" must have been
    // started and handshaked.
    assert!(supervisor.store().plugin("p").unwrap().is_ready());
}

/// §4.7 step 4: no task instance already provides the missing runtime, but
/// an interactive operator accepts the one candidate offered, so the
/// resolver synthesises a provider task instance and the consumer plugin
/// is still deferred until that synthesised task has run.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operator_accepting_a_synthesised_provider_still_defers_the_consumer() {
    let dir = TempDir::new().unwrap();
    let provider_exe = fake_plugin_copy(dir.path(), "providerq");
    let consumer_exe = fake_plugin_copy(dir.path(), "q");

    let provider_json = format!(
        r#"{{"name":"providerq","executable":{:?},"tasks":[{{"type":"install","provides":"reginald-test-ghost-runtime-2"}}]}}"#,
        provider_exe.display().to_string()
    );
    let provider_manifest = Manifest::parse(
        &provider_json,
        &provider_exe.with_file_name("manifest.json"),
    )
    .unwrap();

    let consumer_json = format!(
        r#"{{"name":"q","executable":{:?},"runtime":{{"name":"reginald-test-ghost-runtime-2"}},"tasks":[{{"type":"do"}}]}}"#,
        consumer_exe.display().to_string()
    );
    let consumer_manifest = Manifest::parse(
        &consumer_json,
        &consumer_exe.with_file_name("manifest.json"),
    )
    .unwrap();

    let store = Store::new(vec![], vec![provider_manifest, consumer_manifest]).unwrap();
    let shutdown = Shutdown::new();
    // Accept whatever single candidate is offered rather than decline.
    let mut supervisor = Supervisor::new(store, shutdown, true, Box::new(|_candidates| Some(0)));

    // No task instance providing the runtime is declared up front — the
    // resolver has to synthesise one from `providerq/install`.
    let mut configs = vec![task_config("consumer-task", "q/do", &[])];

    let graph = supervisor.init_for_tasks(&mut configs).await.unwrap();

    // The synthesised provider config was appended and wired as a
    // dependency, without the test having to hand-write `requires`.
    let provider_config = configs
        .iter()
        .find(|c| c.task_type == "providerq/install")
        .expect("resolver synthesised a provider task instance");
    let consumer_config = configs.iter().find(|c| c.id == "consumer-task").unwrap();
    assert!(consumer_config.requires.contains(&provider_config.id));

    assert!(supervisor.store().plugin("providerq").unwrap().is_ready());
    assert!(!supervisor.store().plugin("q").unwrap().is_ready());

    supervisor.run_tasks(&graph, &configs).await.unwrap();

    assert!(supervisor.store().plugin("q").unwrap().is_ready());
}
