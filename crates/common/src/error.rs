//! Error taxonomy for guest task orchestration.
//!
//! - **Launch failures** abort one navigation request and surface a status code
//! - **Remote failures** come from cross-process calls and are usually only logged
//! - **State failures** mean a lock was poisoned by a panicking thread

use std::path::PathBuf;
use thiserror::Error;

use crate::types::UserId;

/// Result alias for orchestration operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Failure of a call into another process (guest, host window manager, snapshot provider).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote call '{call}' failed: {reason}")]
    CallFailed { call: String, reason: String },

    #[error("peer process {pid} is no longer alive")]
    DeadPeer { pid: u32 },
}

impl RemoteError {
    pub fn call_failed(call: impl Into<String>, reason: impl Into<String>) -> Self {
        RemoteError::CallFailed {
            call: call.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// E_PROCESS_START - the process manager returned no handle
    #[error("unable to start sandbox process '{process_name}' for {package} ({user})")]
    ProcessStart {
        process_name: String,
        package: String,
        user: UserId,
    },

    /// E_NO_PLACEHOLDER - the destination slot has no pre-registered placeholder
    #[error("no placeholder registered for slot {slot} (pool size {pool_size})")]
    NoPlaceholder { slot: usize, pool_size: usize },

    /// E_HOST_REJECTED - the host window manager refused the launch
    #[error("host rejected launch: {source}")]
    HostRejected {
        #[source]
        source: RemoteError,
    },

    /// E_INVALID_REQUEST - malformed input from the dispatch layer
    #[error("invalid navigation request: {0}")]
    InvalidRequest(String),

    /// E_STATE_POISONED - a lock holder panicked
    #[error("orchestration state poisoned: {0}")]
    StatePoisoned(&'static str),

    /// E_ALREADY_INSTALLED - process-wide orchestrator installed twice
    #[error("an orchestrator is already installed for this process")]
    AlreadyInstalled,
}

impl OrchestrationError {
    pub fn code(&self) -> &'static str {
        match self {
            OrchestrationError::ProcessStart { .. } => "E_PROCESS_START",
            OrchestrationError::NoPlaceholder { .. } => "E_NO_PLACEHOLDER",
            OrchestrationError::HostRejected { .. } => "E_HOST_REJECTED",
            OrchestrationError::InvalidRequest(_) => "E_INVALID_REQUEST",
            OrchestrationError::StatePoisoned(_) => "E_STATE_POISONED",
            OrchestrationError::AlreadyInstalled => "E_ALREADY_INSTALLED",
        }
    }

    /// Numeric status returned across the dispatch boundary. Success is `0`.
    pub fn status_code(&self) -> i32 {
        match self {
            OrchestrationError::ProcessStart { .. } => -1,
            OrchestrationError::NoPlaceholder { .. } => -2,
            OrchestrationError::HostRejected { .. } => -3,
            OrchestrationError::InvalidRequest(_) => -4,
            OrchestrationError::StatePoisoned(_) => -5,
            OrchestrationError::AlreadyInstalled => -6,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_negative_and_distinct() {
        let errors = [
            OrchestrationError::ProcessStart {
                process_name: "p".into(),
                package: "p".into(),
                user: UserId(0),
            },
            OrchestrationError::NoPlaceholder {
                slot: 9,
                pool_size: 4,
            },
            OrchestrationError::HostRejected {
                source: RemoteError::DeadPeer { pid: 1 },
            },
            OrchestrationError::InvalidRequest("empty".into()),
            OrchestrationError::StatePoisoned("task table"),
            OrchestrationError::AlreadyInstalled,
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.status_code()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn host_rejection_keeps_source() {
        let err = OrchestrationError::HostRejected {
            source: RemoteError::call_failed("submit_launch", "binder died"),
        };
        assert_eq!(err.code(), "E_HOST_REJECTED");
        assert!(err.to_string().contains("binder died"));
    }
}
