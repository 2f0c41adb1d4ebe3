// # -----------------------------
// # crates/cli/src/sim_host.rs
// # -----------------------------
//! In-memory stand-in for the host window manager.
//!
//! Accepted launches and guest finish calls are queued as [`HostEvent`]s; the
//! scenario runner drains the queue and feeds the orchestrator callbacks, the
//! way the real host would call back once a window exists or goes away.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use guesthost_common::{NavigationRequest, RemoteError, TaskId, Token, UserId};
use guesthost_orchestration::{
    GuestClient, HostBridge, HostLaunch, HostTaskInfo, HostTaskSnapshot, LaunchTarget,
    ThemeResolver, WindowStyle,
};
use tracing::{debug, info};

const FIRST_TASK_ID: i32 = 100;

#[derive(Debug, Clone)]
pub enum HostEvent {
    Create { launch: HostLaunch, task: TaskId },
    Destroy { user: UserId, token: Token },
}

struct SimState {
    next_task: i32,
    live: BTreeSet<TaskId>,
    pending: VecDeque<HostEvent>,
    fronted: Vec<TaskId>,
    delivered: usize,
}

pub struct SimHost {
    state: Mutex<SimState>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_task: FIRST_TASK_ID,
                live: BTreeSet::new(),
                pending: VecDeque::new(),
                fronted: Vec::new(),
                delivered: 0,
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>, RemoteError> {
        self.state
            .lock()
            .map_err(|_| RemoteError::call_failed("sim_host", "state poisoned"))
    }

    pub fn drain(&self) -> Vec<HostEvent> {
        match self.state() {
            Ok(mut state) => state.pending.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// The user swiped the task away.
    pub fn dismiss(&self, task: TaskId) -> bool {
        self.state()
            .map(|mut state| state.live.remove(&task))
            .unwrap_or(false)
    }

    pub fn fronted(&self) -> Vec<TaskId> {
        self.state()
            .map(|state| state.fronted.clone())
            .unwrap_or_default()
    }

    pub fn delivered(&self) -> usize {
        self.state().map(|state| state.delivered).unwrap_or(0)
    }

    /// Places `launch` and returns the task it landed in.
    fn place(state: &mut SimState, launch: HostLaunch, previous: Option<TaskId>) -> TaskId {
        let task = match (&launch.target, previous) {
            (LaunchTarget::InTask { task, .. }, _) => *task,
            (LaunchTarget::Chained, Some(previous)) => previous,
            (LaunchTarget::NewTask, _) | (LaunchTarget::Chained, None) => {
                let id = TaskId(state.next_task);
                state.next_task += 1;
                id
            }
        };
        state.live.insert(task);
        debug!(
            "host placed {} in task {}",
            launch.placeholder.class_name, task
        );
        state.pending.push_back(HostEvent::Create { launch, task });
        task
    }

    fn finished(&self, user: UserId, token: &Token) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        state.pending.push_back(HostEvent::Destroy {
            user,
            token: token.clone(),
        });
        Ok(())
    }

    fn delivered_to(&self) -> Result<(), RemoteError> {
        self.state()?.delivered += 1;
        Ok(())
    }
}

impl HostBridge for SimHost {
    fn submit_launch(&self, launch: HostLaunch) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        Self::place(&mut state, launch, None);
        Ok(())
    }

    fn submit_batch(&self, launches: Vec<HostLaunch>) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        let mut previous = None;
        for launch in launches {
            previous = Some(Self::place(&mut state, launch, previous));
        }
        Ok(())
    }

    fn move_task_to_front(&self, task: TaskId) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        if !state.live.contains(&task) {
            return Err(RemoteError::call_failed(
                "move_task_to_front",
                format!("unknown task {task}"),
            ));
        }
        state.fronted.push(task);
        Ok(())
    }
}

impl HostTaskSnapshot for SimHost {
    fn live_tasks(&self) -> Result<Vec<HostTaskInfo>, RemoteError> {
        Ok(self
            .state()?
            .live
            .iter()
            .map(|id| HostTaskInfo::new(*id))
            .collect())
    }
}

/// Guest side of one simulated sandbox process.
pub struct SimGuest {
    pid: u32,
    user: UserId,
    host: Arc<SimHost>,
}

impl SimGuest {
    pub fn new(pid: u32, user: UserId, host: Arc<SimHost>) -> Self {
        Self { pid, user, host }
    }
}

impl GuestClient for SimGuest {
    fn deliver_new_request(
        &self,
        creator: &str,
        token: &Token,
        request: &NavigationRequest,
    ) -> Result<(), RemoteError> {
        info!(
            "process {} got new request for {} on {} from {}",
            self.pid, request.component, token, creator
        );
        self.host.delivered_to()
    }

    fn finish(&self, token: &Token) -> Result<(), RemoteError> {
        debug!("process {} finishing {}", self.pid, token);
        self.host.finished(self.user, token)
    }
}

/// Theme ids listed as dialog themes resolve to a floating window.
pub struct SimTheme {
    dialog_themes: HashSet<u32>,
}

impl SimTheme {
    pub fn new(dialog_themes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            dialog_themes: dialog_themes.into_iter().collect(),
        }
    }
}

impl ThemeResolver for SimTheme {
    fn resolve_window_style(
        &self,
        _package: &str,
        theme: Option<u32>,
    ) -> Result<Option<WindowStyle>, RemoteError> {
        Ok(theme
            .filter(|t| self.dialog_themes.contains(t))
            .map(|_| WindowStyle {
                floating: true,
                ..WindowStyle::default()
            }))
    }
}
