//! Reuse/clear decision for a navigation request.
//!
//! [`resolve`] is pure: it reads the request, the target component and the
//! launching screen (if any) and never touches the task table. Finding the
//! concrete task is a separate step against a [`TaskIndex`].

use guesthost_common::{
    ComponentDescriptor, ComponentName, DocumentLaunchMode, LaunchFlags, LaunchMode,
    NavigationRequest, TaskId, UserId,
};
use serde::{Deserialize, Serialize};

use crate::instances::ScreenInstance;

/// Which existing task receives the new screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReuseDecision {
    Current,
    Affinity,
    DocumentKey,
    AlwaysNew,
}

/// Which screens of the chosen task get marked for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearDecision {
    None,
    SpecificComponent,
    WholeTask,
    TaskTop,
}

impl ClearDecision {
    /// After marking, a surviving top instance of the target gets the request.
    pub fn delivers(self) -> bool {
        matches!(self, ClearDecision::WholeTask | ClearDecision::TaskTop)
    }
}

/// What the resolver needs to know about the launching screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub task: TaskId,
    pub component: ComponentName,
    pub launch_mode: LaunchMode,
}

impl From<&ScreenInstance> for SourceContext {
    fn from(instance: &ScreenInstance) -> Self {
        Self {
            task: instance.task,
            component: instance.component.clone(),
            launch_mode: instance.launch_mode,
        }
    }
}

/// Lookup of existing tasks by grouping key.
pub trait TaskIndex {
    fn task_for_affinity(&self, user: UserId, affinity: &str) -> Option<TaskId>;
    fn task_for_document(&self, user: UserId, request: &NavigationRequest) -> Option<TaskId>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Request flags after normalization.
    pub flags: LaunchFlags,
    pub reuse: ReuseDecision,
    pub clear: ClearDecision,
    pub single_top: bool,
    /// CLEAR_TOP still in effect after launch-mode refinement.
    pub clear_top: bool,
    /// The request asked for CLEAR_TASK.
    pub clear_task: bool,
    pub affinity: String,
}

impl Resolution {
    /// Whether a surviving top instance of the target takes the request.
    pub fn delivers(&self) -> bool {
        self.clear.delivers() || self.single_top
    }

    pub fn locate<I: TaskIndex + ?Sized>(
        &self,
        user: UserId,
        request: &NavigationRequest,
        source: Option<&SourceContext>,
        index: &I,
    ) -> Option<TaskId> {
        match self.reuse {
            ReuseDecision::Current => source.map(|s| s.task),
            ReuseDecision::Affinity => index.task_for_affinity(user, &self.affinity),
            ReuseDecision::DocumentKey => index.task_for_document(user, request),
            ReuseDecision::AlwaysNew => None,
        }
    }
}

pub fn resolve(
    request: &NavigationRequest,
    target: &ComponentDescriptor,
    source: Option<&SourceContext>,
) -> Resolution {
    let mut flags = request.flags;
    let clear_task = flags.contains(LaunchFlags::CLEAR_TASK);
    let mut clear_top = flags.contains(LaunchFlags::CLEAR_TOP);
    let mut clear = ClearDecision::None;
    let mut reuse: Option<ReuseDecision> = None;
    let mut single_top = false;

    if source.is_some_and(|s| s.launch_mode == LaunchMode::SingleInstance) {
        flags.insert(LaunchFlags::NEW_TASK);
    }

    if clear_top {
        flags.remove(LaunchFlags::REORDER_TO_FRONT);
        clear = ClearDecision::TaskTop;
    }

    if clear_task {
        if flags.contains(LaunchFlags::NEW_TASK) {
            clear = ClearDecision::WholeTask;
        } else {
            flags.remove(LaunchFlags::CLEAR_TASK);
        }
    }

    match target.document_launch_mode {
        DocumentLaunchMode::IntoExisting => {
            clear = ClearDecision::WholeTask;
            reuse = Some(ReuseDecision::DocumentKey);
        }
        DocumentLaunchMode::Always => reuse = Some(ReuseDecision::AlwaysNew),
        DocumentLaunchMode::None | DocumentLaunchMode::Never => {}
    }

    let multiple = flags.contains(LaunchFlags::MULTIPLE_TASK);
    match target.launch_mode {
        LaunchMode::SingleTop => single_top = true,
        LaunchMode::SingleTask => {
            clear_top = false;
            clear = ClearDecision::TaskTop;
            reuse = Some(if multiple {
                ReuseDecision::AlwaysNew
            } else {
                ReuseDecision::Affinity
            });
        }
        LaunchMode::SingleInstance => {
            clear_top = false;
            clear = ClearDecision::TaskTop;
            reuse = Some(ReuseDecision::Affinity);
        }
        LaunchMode::Standard => {
            if flags.contains(LaunchFlags::SINGLE_TOP) {
                single_top = true;
            }
        }
    }

    if reuse.is_none() && flags.contains(LaunchFlags::NEW_TASK) {
        reuse = Some(if multiple {
            ReuseDecision::AlwaysNew
        } else {
            ReuseDecision::Affinity
        });
    }

    let reuse = reuse.unwrap_or(if source.is_some() {
        ReuseDecision::Current
    } else {
        ReuseDecision::Affinity
    });

    if clear == ClearDecision::None && flags.contains(LaunchFlags::REORDER_TO_FRONT) {
        clear = ClearDecision::SpecificComponent;
    }

    Resolution {
        flags,
        reuse,
        clear,
        single_top,
        clear_top,
        clear_task,
        affinity: target.task_affinity(),
    }
}
