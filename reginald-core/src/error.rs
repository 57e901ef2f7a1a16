//! Crate-wide error handling.
//!
//! Every fatal path in Reginald resolves to a [`ReginaldError`] with a
//! stable [`ErrorCode`], so the CLI can print `Error: <message>` and the
//! test suite can assert on the exact kind of failure without string
//! matching the whole message.

use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for Reginald operations.
pub type Result<T> = std::result::Result<T, ReginaldError>;

/// Machine-readable error codes, one per §7 error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ManifestInvalid,
    DuplicatePlugin,
    PathNotFound,
    HandshakeMismatch,
    RpcTransport,
    RpcRemote,
    StartFailed,
    ShutdownHalted,
    CycleDetected,
    EmptyTaskId,
    AmbiguousProvider,
    NoProvider,
    TypeConversion,
    UnknownDependency,
    TaskTypeNotFound,
    CommandNotFound,
    Cancelled,
    Io,
    Decode,
    Config,
    Logging,
}

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum ReginaldError {
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("duplicate plugin {kind} {value:?}")]
    DuplicatePlugin { kind: &'static str, value: String },

    #[error("search root not found: {0}")]
    PathNotFound(PathBuf),

    #[error("mismatching plugin {field}, want {want:?}, got {got:?}")]
    HandshakeMismatch {
        field: &'static str,
        want: String,
        got: String,
    },

    #[error("rpc transport error: {0}")]
    RpcTransport(String),

    #[error("plugin {plugin} returned error {code}: {message}")]
    RpcRemote {
        plugin: String,
        code: i64,
        message: String,
    },

    #[error("failed to start plugin {plugin}: {reason}")]
    StartFailed { plugin: String, reason: String },

    #[error("shutting down plugin {0:?} halted")]
    ShutdownHalted(String),

    #[error("circular task dependencies detected: {0}")]
    CycleDetected(String),

    #[error("task config at index {0} has an empty id")]
    EmptyTaskId(usize),

    #[error("ambiguous provider for runtime {runtime:?}: {candidates:?}")]
    AmbiguousProvider {
        runtime: String,
        candidates: Vec<String>,
    },

    #[error("no provider available for runtime {0:?}")]
    NoProvider(String),

    #[error("type conversion failed: cannot interpret {value} as {target}")]
    TypeConversion { value: String, target: &'static str },

    #[error("unknown dependency {0:?}")]
    UnknownDependency(String),

    #[error("task type not found: {0}")]
    TaskTypeNotFound(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("yaml decode error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl ReginaldError {
    /// The stable, machine-readable code for this error, where one applies.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ManifestInvalid(_) => ErrorCode::ManifestInvalid,
            Self::DuplicatePlugin { .. } => ErrorCode::DuplicatePlugin,
            Self::PathNotFound(_) => ErrorCode::PathNotFound,
            Self::HandshakeMismatch { .. } => ErrorCode::HandshakeMismatch,
            Self::RpcTransport(_) => ErrorCode::RpcTransport,
            Self::RpcRemote { .. } => ErrorCode::RpcRemote,
            Self::StartFailed { .. } => ErrorCode::StartFailed,
            Self::ShutdownHalted(_) => ErrorCode::ShutdownHalted,
            Self::CycleDetected(_) => ErrorCode::CycleDetected,
            Self::EmptyTaskId(_) => ErrorCode::EmptyTaskId,
            Self::AmbiguousProvider { .. } => ErrorCode::AmbiguousProvider,
            Self::NoProvider(_) => ErrorCode::NoProvider,
            Self::TypeConversion { .. } => ErrorCode::TypeConversion,
            Self::UnknownDependency(_) => ErrorCode::UnknownDependency,
            Self::TaskTypeNotFound(_) => ErrorCode::TaskTypeNotFound,
            Self::CommandNotFound(_) => ErrorCode::CommandNotFound,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Io(_) => ErrorCode::Io,
            Self::Json(_) | Self::TomlDecode(_) | Self::Yaml(_) => ErrorCode::Decode,
            Self::Config(_) => ErrorCode::Config,
            Self::Logging(_) => ErrorCode::Logging,
        }
    }

    /// Whether this error represents an operator-triggered cancellation
    /// rather than a crash (see §7 "user-visible behaviour").
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors collected during discovery or shutdown, where several
/// independent failures must be reported together rather than the first
/// one winning (§7 "Propagation").
#[derive(Debug, Error)]
pub struct JoinedError {
    pub errors: Vec<ReginaldError>,
}

impl std::fmt::Display for JoinedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

impl JoinedError {
    pub fn new(errors: Vec<ReginaldError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }
}
