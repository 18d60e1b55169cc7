use thiserror::Error;

/// The error kinds shared across the control plane: unreachable backends, transport I/O,
/// constraint violations, (de)serialization, config, and fatal startup failures. CAS conflicts
/// and lock contention are expected, recoverable outcomes rather than errors, so they're
/// signaled through `CasOutcome`/`LockOutcome` in `kv.rs` instead of a variant here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("kv unreachable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] reqwest::Error),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
