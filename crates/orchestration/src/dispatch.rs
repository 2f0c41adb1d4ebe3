use std::sync::Arc;

use guesthost_common::{
    ComponentName, LaunchFlags, OrchestrationError, OrchestrationResult, TaskId, UserId,
};
use tracing::{debug, info, warn};

use crate::backend::{HostBridge, ProcessManager};
use crate::stub::PlaceholderSelector;
use crate::types::{HostLaunch, LaunchRequest, LaunchTarget, StubRecord, NEW_TASK_LAUNCH_FLAGS};

/// Turns a resolved launch into host window manager calls.
///
/// Preparing a launch starts (or reuses) the sandbox process and picks the
/// placeholder; nothing is sent to the host until `submit`.
pub struct DispatchBridge {
    processes: Arc<dyn ProcessManager>,
    host: Arc<dyn HostBridge>,
    selector: PlaceholderSelector,
}

impl DispatchBridge {
    pub fn new(
        processes: Arc<dyn ProcessManager>,
        host: Arc<dyn HostBridge>,
        selector: PlaceholderSelector,
    ) -> Self {
        Self {
            processes,
            host,
            selector,
        }
    }

    pub fn prepare(
        &self,
        user: UserId,
        launch: &LaunchRequest,
        caller: Option<ComponentName>,
        target: LaunchTarget,
        flags: LaunchFlags,
    ) -> OrchestrationResult<HostLaunch> {
        let component = &launch.component;
        let process_name = component.process_name();
        let handle = self
            .processes
            .start_or_get_process(process_name, user, &component.package)
            .ok_or_else(|| OrchestrationError::ProcessStart {
                process_name: process_name.to_string(),
                package: component.package.clone(),
                user,
            })?;

        let placeholder = self.selector.select(component, handle.slot)?;
        let flags = match target {
            LaunchTarget::NewTask => flags | NEW_TASK_LAUNCH_FLAGS,
            LaunchTarget::InTask { .. } | LaunchTarget::Chained => flags,
        };
        let mut request = launch.request.clone();
        request.flags = flags;

        Ok(HostLaunch {
            placeholder,
            stub: StubRecord {
                user,
                request,
                component: component.clone(),
                caller,
                slot: handle.slot,
            },
            target,
            flags,
            result: launch.result.clone(),
            options: launch.options.clone(),
        })
    }

    pub fn submit(&self, launch: HostLaunch) -> OrchestrationResult<()> {
        info!(
            component = %launch.stub.component.component_name(),
            placeholder = %launch.placeholder.class_name,
            target = ?launch.target,
            "submitting launch"
        );
        self.host
            .submit_launch(launch)
            .map_err(|source| OrchestrationError::HostRejected { source })
    }

    pub fn submit_batch(&self, launches: Vec<HostLaunch>) -> OrchestrationResult<()> {
        info!(count = launches.len(), "submitting launch batch");
        self.host
            .submit_batch(launches)
            .map_err(|source| OrchestrationError::HostRejected { source })
    }

    /// Best effort; a failure only means the host keeps its current order.
    pub fn bring_to_front(&self, task: TaskId) {
        match self.host.move_task_to_front(task) {
            Ok(()) => debug!("moved task {} to front", task),
            Err(err) => warn!("failed to move task {} to front: {}", task, err),
        }
    }
}
