//! The polymorphic plugin handle (§9 "Polymorphic plugin"): a two-case
//! tagged variant rather than an open-ended trait-object hierarchy. The
//! supervisor only ever needs `manifest`, `is_external`, `start`, `call`
//! (as `run_command`/`run_task`), `notify`, and `kill` — built-ins satisfy
//! the call/notify surface with direct in-process dispatch.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Shutdown;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::session::{PluginSession, SessionState};

/// A built-in plugin linked directly into the host. No process, no RPC —
/// `run_command`/`run_task` execute in-process.
#[async_trait]
pub trait BuiltinPlugin: Send + Sync {
    fn manifest(&self) -> &Manifest;
    async fn run_command(&self, cmd: &str, config: Value) -> Result<()>;
    async fn run_task(&self, task_type: &str, config: Value) -> Result<()>;
}

/// Either a built-in or an external (out-of-process) plugin.
pub enum Plugin {
    Builtin(Box<dyn BuiltinPlugin>),
    External {
        manifest: Manifest,
        session: PluginSession,
    },
}

impl Plugin {
    pub fn builtin(plugin: impl BuiltinPlugin + 'static) -> Self {
        Plugin::Builtin(Box::new(plugin))
    }

    pub fn external(manifest: Manifest) -> Self {
        let session = PluginSession::new(manifest.name.clone());
        Plugin::External { manifest, session }
    }

    pub fn manifest(&self) -> &Manifest {
        match self {
            Plugin::Builtin(b) => b.manifest(),
            Plugin::External { manifest, .. } => manifest,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Plugin::External { .. })
    }

    pub fn is_ready(&self) -> bool {
        match self {
            Plugin::Builtin(_) => true,
            Plugin::External { session, .. } => session.state() == SessionState::Ready,
        }
    }

    /// Start the underlying process and handshake. A no-op for built-ins.
    pub async fn start(&mut self) -> Result<()> {
        match self {
            Plugin::Builtin(_) => Ok(()),
            Plugin::External { manifest, session } => {
                session.start(&manifest.executable, &manifest.name).await
            }
        }
    }

    pub async fn run_command(&self, cmd: &str, config: Value, shutdown: &Shutdown) -> Result<()> {
        match self {
            Plugin::Builtin(b) => b.run_command(cmd, config).await,
            Plugin::External { manifest, session } => {
                session
                    .run_command(cmd, config, Value::Null, shutdown)
                    .await
                    .map_err(|e| {
                        tracing::debug!(plugin = %manifest.name, "runCommand failed");
                        e
                    })
            }
        }
    }

    pub async fn run_task(&self, task_type: &str, config: Value, shutdown: &Shutdown) -> Result<()> {
        match self {
            Plugin::Builtin(b) => b.run_task(task_type, config).await,
            Plugin::External { session, .. } => {
                let cmd = format!("tasks.{}", task_type.rsplit('/').next().unwrap_or(task_type));
                session.run_command(&cmd, config, Value::Null, shutdown).await
            }
        }
    }

    /// Graceful shutdown, escalating to `kill` if it does not complete
    /// before the shutdown signal is already tripped.
    pub async fn shutdown(&mut self, shutdown: &Shutdown) -> Result<()> {
        match self {
            Plugin::Builtin(_) => Ok(()),
            Plugin::External { session, .. } => {
                if session.state() != SessionState::Ready {
                    return Ok(());
                }
                match session.graceful_shutdown(shutdown).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        session.kill().await;
                        Err(e)
                    }
                }
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Plugin::External { session, .. } = self {
            session.kill().await;
        }
    }
}

#[cfg(test)]
/// A minimal built-in used only to exercise name/domain collision checks
/// in [`crate::store`]'s tests.
pub fn builtin_stub(name: &str, domain: &str) -> Plugin {
    struct Stub(Manifest);

    #[async_trait]
    impl BuiltinPlugin for Stub {
        fn manifest(&self) -> &Manifest {
            &self.0
        }
        async fn run_command(&self, _cmd: &str, _config: Value) -> Result<()> {
            Ok(())
        }
        async fn run_task(&self, _task_type: &str, _config: Value) -> Result<()> {
            Ok(())
        }
    }

    Plugin::builtin(Stub(Manifest {
        name: name.to_string(),
        domain: domain.to_string(),
        description: String::new(),
        help: String::new(),
        executable: String::new(),
        runtime: None,
        commands: vec![],
        tasks: vec![],
        dir: std::path::PathBuf::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_always_ready_and_never_external() {
        let plugin = builtin_stub("link", "core");
        assert!(plugin.is_ready());
        assert!(!plugin.is_external());
    }
}
