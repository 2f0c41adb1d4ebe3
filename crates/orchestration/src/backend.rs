//! Collaborators the orchestrator drives but does not own.
//!
//! Every cross-process edge of the core is one of these traits: the process
//! manager that starts sandbox processes, the host window manager bridge, the
//! host's task snapshot, theme resolution, and the per-process guest client.

use std::fmt;
use std::sync::Arc;

use guesthost_common::{ComponentName, NavigationRequest, RemoteError, TaskId, Token, UserId};
use serde::{Deserialize, Serialize};

use crate::types::HostLaunch;

/// Calls into a running guest process.
pub trait GuestClient: Send + Sync {
    /// Route a navigation request to an existing screen instead of creating one.
    fn deliver_new_request(
        &self,
        creator: &str,
        token: &Token,
        request: &NavigationRequest,
    ) -> Result<(), RemoteError>;

    /// Ask the guest to finish (tear down) a screen.
    fn finish(&self, token: &Token) -> Result<(), RemoteError>;
}

/// Handle on a sandbox process owned by the process manager.
#[derive(Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Slot number in the sandbox pool; scopes the placeholder identity.
    pub slot: usize,
    pub user: UserId,
    pub process_name: String,
    pub package: String,
    client: Arc<dyn GuestClient>,
}

impl ProcessHandle {
    pub fn new(
        pid: u32,
        slot: usize,
        user: UserId,
        process_name: impl Into<String>,
        package: impl Into<String>,
        client: Arc<dyn GuestClient>,
    ) -> Self {
        Self {
            pid,
            slot,
            user,
            process_name: process_name.into(),
            package: package.into(),
            client,
        }
    }

    pub fn client(&self) -> &Arc<dyn GuestClient> {
        &self.client
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("slot", &self.slot)
            .field("user", &self.user)
            .field("process_name", &self.process_name)
            .field("package", &self.package)
            .finish_non_exhaustive()
    }
}

pub trait ProcessManager: Send + Sync {
    /// Returns the running process for `process_name`, starting it if needed.
    /// `None` means the process could not be started.
    fn start_or_get_process(
        &self,
        process_name: &str,
        user: UserId,
        package: &str,
    ) -> Option<ProcessHandle>;
}

/// Window style attributes that decide the placeholder shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowStyle {
    pub translucent: bool,
    pub floating: bool,
    pub shows_wallpaper: bool,
}

impl WindowStyle {
    pub fn is_dialog(&self) -> bool {
        self.translucent || self.floating || self.shows_wallpaper
    }
}

pub trait ThemeResolver: Send + Sync {
    /// `Ok(None)` is a cache miss; the caller may consult another resolver.
    fn resolve_window_style(
        &self,
        package: &str,
        theme: Option<u32>,
    ) -> Result<Option<WindowStyle>, RemoteError>;
}

/// One entry of the host's recent-task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTaskInfo {
    pub id: TaskId,
    #[serde(default)]
    pub base_component: Option<ComponentName>,
    #[serde(default)]
    pub top_component: Option<ComponentName>,
}

impl HostTaskInfo {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            base_component: None,
            top_component: None,
        }
    }
}

/// Ground truth about which tasks the host still has.
pub trait HostTaskSnapshot: Send + Sync {
    fn live_tasks(&self) -> Result<Vec<HostTaskInfo>, RemoteError>;
}

/// Host window manager primitives.
pub trait HostBridge: Send + Sync {
    fn submit_launch(&self, launch: HostLaunch) -> Result<(), RemoteError>;

    /// Chained launches; the first entry decides the task, the rest stack on it.
    fn submit_batch(&self, launches: Vec<HostLaunch>) -> Result<(), RemoteError>;

    fn move_task_to_front(&self, task: TaskId) -> Result<(), RemoteError>;
}
