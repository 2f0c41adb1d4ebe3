use chrono::{DateTime, Utc};
use guesthost_common::{
    ComponentDescriptor, ComponentName, LaunchFlags, NavigationRequest, TaskId, Token, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flags added to every launch that must open a fresh host task.
pub const NEW_TASK_LAUNCH_FLAGS: LaunchFlags = LaunchFlags::from_bits(
    LaunchFlags::NEW_TASK.bits()
        | LaunchFlags::MULTIPLE_TASK.bits()
        | LaunchFlags::RESET_TASK_IF_NEEDED.bits()
        | LaunchFlags::NEW_DOCUMENT.bits(),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Normal,
    Dialog,
}

/// A pre-registered host identity standing in for a guest component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub host_package: String,
    pub class_name: String,
    pub kind: PlaceholderKind,
    pub slot: usize,
}

/// Routing metadata carried inside the placeholder launch so the sandbox
/// process can rebuild the real component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubRecord {
    pub user: UserId,
    pub request: NavigationRequest,
    pub component: ComponentDescriptor,
    pub caller: Option<ComponentName>,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LaunchTarget {
    NewTask,
    /// Launch on top of `anchor`, which the host places in `task`.
    InTask { task: TaskId, anchor: Token },
    /// Later entry of a batch; stacks on the entry before it.
    Chained,
}

/// Where a result should be delivered when the launched screen finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRoute {
    pub result_to: Token,
    #[serde(default)]
    pub result_who: Option<String>,
    pub request_code: i32,
}

/// One host-facing launch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostLaunch {
    pub placeholder: Placeholder,
    pub stub: StubRecord,
    pub target: LaunchTarget,
    pub flags: LaunchFlags,
    #[serde(default)]
    pub result: Option<ResultRoute>,
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LaunchOutcome {
    /// Routed as a new-request notification to an existing screen.
    Delivered { task: TaskId, token: Token },
    /// The matching task was already showing the requested root.
    BroughtToFront { task: TaskId },
    Launched {
        target: LaunchTarget,
        placeholders: Vec<String>,
    },
}

/// Input of a single navigation launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub request: NavigationRequest,
    pub component: ComponentDescriptor,
    pub source: Option<Token>,
    pub result: Option<ResultRoute>,
    pub options: Option<Value>,
}

impl LaunchRequest {
    pub fn new(component: ComponentDescriptor, request: NavigationRequest) -> Self {
        Self {
            request,
            component,
            source: None,
            result: None,
            options: None,
        }
    }

    pub fn from_source(mut self, token: Token) -> Self {
        self.source = Some(token);
        self
    }

    pub fn with_result(mut self, result: ResultRoute) -> Self {
        self.result = Some(result);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub token: Token,
    pub component: ComponentName,
    pub caller: Option<ComponentName>,
    pub pid: u32,
    pub marked: bool,
}

/// Read-only view of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task: TaskId,
    pub user: UserId,
    pub affinity: String,
    pub base_request: NavigationRequest,
    pub base_component: Option<ComponentName>,
    pub top_component: Option<ComponentName>,
    pub screens: Vec<InstanceSnapshot>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
