pub mod backend;
pub mod dispatch;
pub mod global;
pub mod instances;
pub mod local;
pub mod reconcile;
pub mod resolver;
pub mod stack;
pub mod stub;
pub mod task_table;
pub mod teardown;
pub mod types;

pub use backend::{
    GuestClient, HostBridge, HostTaskInfo, HostTaskSnapshot, ProcessHandle, ProcessManager,
    ThemeResolver, WindowStyle,
};
pub use instances::{InstanceList, ScreenInstance};
pub use local::{LocalProcessManager, SandboxProcess};
pub use resolver::{resolve, ClearDecision, Resolution, ReuseDecision, SourceContext, TaskIndex};
pub use stack::{Collaborators, CreatedComponent, TaskOrchestrator};
pub use task_table::{Task, TaskTable};
pub use teardown::TeardownQueue;
pub use types::*;
