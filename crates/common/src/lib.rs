// # -----------------------------
// # crates/common/src/lib.rs
// # -----------------------------
pub mod config;
pub mod error;
pub mod types;

pub use config::{load_config, OrchestratorConfig, PlaceholderConfig};
pub use error::{ConfigError, OrchestrationError, OrchestrationResult, RemoteError};
pub use types::{
    ComponentDescriptor, ComponentName, DocumentLaunchMode, LaunchFlags, LaunchMode,
    NavigationRequest, TaskId, Token, UserId, SYSTEM_CALLER,
};
