//! Process-wide orchestrator, installed once by the host service at startup.

use std::sync::{Arc, OnceLock};

use guesthost_common::{OrchestrationError, OrchestrationResult};
use tracing::info;

use crate::stack::TaskOrchestrator;

static ORCHESTRATOR: OnceLock<Arc<TaskOrchestrator>> = OnceLock::new();

pub fn install(orchestrator: Arc<TaskOrchestrator>) -> OrchestrationResult<()> {
    ORCHESTRATOR
        .set(orchestrator)
        .map_err(|_| OrchestrationError::AlreadyInstalled)?;
    info!("task orchestrator installed");
    Ok(())
}

pub fn get() -> Option<Arc<TaskOrchestrator>> {
    ORCHESTRATOR.get().cloned()
}
