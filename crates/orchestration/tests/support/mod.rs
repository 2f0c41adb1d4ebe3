#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use guesthost_common::{
    ComponentDescriptor, NavigationRequest, OrchestratorConfig, RemoteError, TaskId, Token,
    UserId,
};
use guesthost_orchestration::{
    Collaborators, CreatedComponent, GuestClient, HostBridge, HostLaunch, HostTaskInfo,
    HostTaskSnapshot, LocalProcessManager, ProcessManager, TaskOrchestrator, TeardownQueue,
    ThemeResolver, WindowStyle,
};

pub type DeliverHook = Box<dyn Fn(&Token) + Send + Sync>;

/// Guest client that records every call it receives.
#[derive(Default)]
pub struct RecordingClient {
    pub delivered: Mutex<Vec<(String, Token, NavigationRequest)>>,
    pub finished: Mutex<Vec<Token>>,
    /// Runs inside `deliver_new_request`, before it returns.
    pub on_deliver: Mutex<Option<DeliverHook>>,
}

impl GuestClient for RecordingClient {
    fn deliver_new_request(
        &self,
        creator: &str,
        token: &Token,
        request: &NavigationRequest,
    ) -> Result<(), RemoteError> {
        self.delivered
            .lock()
            .unwrap()
            .push((creator.to_string(), token.clone(), request.clone()));
        if let Some(hook) = self.on_deliver.lock().unwrap().as_ref() {
            hook(token);
        }
        Ok(())
    }

    fn finish(&self, token: &Token) -> Result<(), RemoteError> {
        self.finished.lock().unwrap().push(token.clone());
        Ok(())
    }
}

/// Host window manager plus recent-task list, both in memory.
#[derive(Default)]
pub struct FakeHost {
    pub live: Mutex<BTreeSet<TaskId>>,
    pub launches: Mutex<Vec<HostLaunch>>,
    pub batches: Mutex<Vec<Vec<HostLaunch>>>,
    pub fronted: Mutex<Vec<TaskId>>,
    pub reject: Mutex<bool>,
    pub snapshot_down: Mutex<bool>,
}

impl FakeHost {
    pub fn add_task(&self, id: TaskId) {
        self.live.lock().unwrap().insert(id);
    }

    pub fn dismiss(&self, id: TaskId) {
        self.live.lock().unwrap().remove(&id);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn last_launch(&self) -> HostLaunch {
        self.launches.lock().unwrap().last().cloned().unwrap()
    }
}

impl HostBridge for FakeHost {
    fn submit_launch(&self, launch: HostLaunch) -> Result<(), RemoteError> {
        if *self.reject.lock().unwrap() {
            return Err(RemoteError::call_failed("submit_launch", "rejected"));
        }
        self.launches.lock().unwrap().push(launch);
        Ok(())
    }

    fn submit_batch(&self, launches: Vec<HostLaunch>) -> Result<(), RemoteError> {
        if *self.reject.lock().unwrap() {
            return Err(RemoteError::call_failed("submit_batch", "rejected"));
        }
        self.batches.lock().unwrap().push(launches);
        Ok(())
    }

    fn move_task_to_front(&self, task: TaskId) -> Result<(), RemoteError> {
        self.fronted.lock().unwrap().push(task);
        Ok(())
    }
}

impl HostTaskSnapshot for FakeHost {
    fn live_tasks(&self) -> Result<Vec<HostTaskInfo>, RemoteError> {
        if *self.snapshot_down.lock().unwrap() {
            return Err(RemoteError::call_failed("live_tasks", "unavailable"));
        }
        Ok(self
            .live
            .lock()
            .unwrap()
            .iter()
            .map(|id| HostTaskInfo::new(*id))
            .collect())
    }
}

pub struct PlainTheme;

impl ThemeResolver for PlainTheme {
    fn resolve_window_style(
        &self,
        _package: &str,
        _theme: Option<u32>,
    ) -> Result<Option<WindowStyle>, RemoteError> {
        Ok(Some(WindowStyle::default()))
    }
}

pub struct Harness {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub host: Arc<FakeHost>,
    pub processes: Arc<LocalProcessManager>,
    pub clients: Arc<Mutex<HashMap<u32, Arc<RecordingClient>>>>,
}

impl Harness {
    /// Must run inside a tokio runtime; the teardown worker is spawned on it.
    pub fn new() -> Self {
        Self::with_slots(8)
    }

    pub fn with_slots(slots: usize) -> Self {
        let clients: Arc<Mutex<HashMap<u32, Arc<RecordingClient>>>> = Arc::default();
        let registry = clients.clone();
        let processes = Arc::new(LocalProcessManager::new(slots, move |pid, _name| {
            let client = Arc::new(RecordingClient::default());
            registry.lock().unwrap().insert(pid, client.clone());
            client as Arc<dyn GuestClient>
        }));
        let host = Arc::new(FakeHost::default());
        let (teardown, _worker) = TeardownQueue::spawn();
        let orchestrator = TaskOrchestrator::new(
            OrchestratorConfig::default(),
            Collaborators {
                process_manager: processes.clone(),
                host: host.clone(),
                snapshot: host.clone(),
                theme: Arc::new(PlainTheme),
                fallback_theme: None,
            },
            teardown,
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            host,
            processes,
            clients,
        }
    }

    pub fn client(&self, pid: u32) -> Arc<RecordingClient> {
        self.clients.lock().unwrap().get(&pid).cloned().unwrap()
    }

    /// Plays the guest side: the component now exists in `task`.
    pub fn create(&self, task: i32, component: &ComponentDescriptor, token: &str) -> u32 {
        self.create_from(task, component, token, None)
    }

    pub fn create_from(
        &self,
        task: i32,
        component: &ComponentDescriptor,
        token: &str,
        caller: Option<&ComponentDescriptor>,
    ) -> u32 {
        self.create_with_root(task, component, token, caller, NavigationRequest::to(component))
    }

    /// Same as [`Harness::create_from`], with an explicit task root request.
    pub fn create_with_root(
        &self,
        task: i32,
        component: &ComponentDescriptor,
        token: &str,
        caller: Option<&ComponentDescriptor>,
        root_request: NavigationRequest,
    ) -> u32 {
        self.host.add_task(TaskId(task));
        let process = self
            .processes
            .start_or_get_process(component.process_name(), UserId(0), &component.package)
            .unwrap();
        let pid = process.pid;
        self.orchestrator
            .on_component_created(CreatedComponent {
                process,
                component: component.component_name(),
                caller: caller.map(|c| c.component_name()),
                token: Token::new(token),
                root_request,
                affinity: component.task_affinity(),
                task: TaskId(task),
                launch_mode: component.launch_mode,
                flags: component.flags,
            })
            .unwrap();
        pid
    }

    pub fn tokens(&self, task: i32) -> Vec<(String, bool)> {
        self.orchestrator
            .task_snapshot(TaskId(task))
            .unwrap()
            .map(|s| {
                s.screens
                    .into_iter()
                    .map(|r| (r.token.as_str().to_string(), r.marked))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn component(class: &str) -> ComponentDescriptor {
    ComponentDescriptor::new("com.example", format!("com.example.{class}"))
}
