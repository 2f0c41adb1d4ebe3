//! The task orchestrator: resolves navigation requests against the task
//! table and keeps the table in sync with guest lifecycle callbacks.
//!
//! Locking follows one rule set everywhere in this file:
//! - the table lock is taken first and held while the plan is computed
//! - at most one task lock is held, and only briefly
//! - no guest or host call happens under either lock

use std::sync::{Arc, Mutex, MutexGuard};

use guesthost_common::{
    ComponentDescriptor, ComponentName, LaunchMode, NavigationRequest,
    OrchestrationError, OrchestrationResult, OrchestratorConfig, TaskId, Token, UserId,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{HostBridge, HostTaskSnapshot, ProcessHandle, ProcessManager, ThemeResolver};
use crate::dispatch::DispatchBridge;
use crate::instances::ScreenInstance;
use crate::reconcile::HostReconciler;
use crate::resolver::{resolve, Resolution, SourceContext};
use crate::stub::PlaceholderSelector;
use crate::task_table::{Task, TaskTable};
use crate::teardown::TeardownQueue;
use crate::types::{LaunchOutcome, LaunchRequest, LaunchTarget, TaskSnapshot};

/// External collaborators wired into an orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub process_manager: Arc<dyn ProcessManager>,
    pub host: Arc<dyn HostBridge>,
    pub snapshot: Arc<dyn HostTaskSnapshot>,
    pub theme: Arc<dyn ThemeResolver>,
    pub fallback_theme: Option<Arc<dyn ThemeResolver>>,
}

/// Guest confirmation that a component instance now exists.
#[derive(Debug, Clone)]
pub struct CreatedComponent {
    pub process: ProcessHandle,
    pub component: ComponentName,
    pub caller: Option<ComponentName>,
    pub token: Token,
    pub root_request: NavigationRequest,
    pub affinity: String,
    pub task: TaskId,
    pub launch_mode: LaunchMode,
    pub flags: u32,
}

/// What an existing task should do with a request, computed under its lock.
struct TaskPlan {
    doomed: Vec<Token>,
    deliver_to: Option<ScreenInstance>,
    anchor: Token,
}

pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    table: Mutex<TaskTable>,
    reconciler: HostReconciler,
    dispatch: DispatchBridge,
    teardown: TeardownQueue,
}

impl TaskOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators,
        teardown: TeardownQueue,
    ) -> Self {
        let selector = PlaceholderSelector::new(
            config.host_package.clone(),
            config.placeholders.clone(),
            collaborators.theme,
            collaborators.fallback_theme,
        );
        Self {
            reconciler: HostReconciler::new(collaborators.snapshot),
            dispatch: DispatchBridge::new(
                collaborators.process_manager,
                collaborators.host,
                selector,
            ),
            table: Mutex::new(TaskTable::new()),
            teardown,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn teardown(&self) -> &TeardownQueue {
        &self.teardown
    }

    fn table(&self) -> OrchestrationResult<MutexGuard<'_, TaskTable>> {
        self.table
            .lock()
            .map_err(|_| OrchestrationError::StatePoisoned("task table"))
    }

    /// Locks the table after pruning tasks the host dropped. The host is
    /// queried before the lock is taken.
    fn reconciled_table(&self) -> OrchestrationResult<MutexGuard<'_, TaskTable>> {
        let live = self.reconciler.live_tasks();
        let mut table = self.table()?;
        if let Some(live) = live {
            self.reconciler.prune(&mut table, &live);
        }
        Ok(table)
    }

    /// Numeric entry point for the dispatch layer. `0` on success.
    pub fn resolve_and_launch(
        &self,
        user: UserId,
        requests: Vec<NavigationRequest>,
        components: Vec<ComponentDescriptor>,
        source: Option<Token>,
        options: Option<Value>,
    ) -> i32 {
        let outcome = if requests.len() != components.len() {
            Err(OrchestrationError::InvalidRequest(format!(
                "{} requests for {} components",
                requests.len(),
                components.len()
            )))
        } else {
            let mut launches: Vec<LaunchRequest> = requests
                .into_iter()
                .zip(components)
                .map(|(request, component)| LaunchRequest {
                    request,
                    component,
                    source: source.clone(),
                    result: None,
                    options: options.clone(),
                })
                .collect();
            if launches.len() == 1 {
                self.launch(user, launches.remove(0))
            } else {
                self.launch_batch(user, launches)
            }
        };

        match outcome {
            Ok(outcome) => {
                debug!(?outcome, "launch resolved");
                0
            }
            Err(err) => {
                warn!("launch failed [{}]: {}", err.code(), err);
                err.status_code()
            }
        }
    }

    pub fn launch(
        &self,
        user: UserId,
        launch: LaunchRequest,
    ) -> OrchestrationResult<LaunchOutcome> {
        validate(&launch)?;
        let table = self.reconciled_table()?;

        let source = match &launch.source {
            Some(token) => table.find_instance(user, token)?.map(|(_, screen)| screen),
            None => None,
        };
        let source_ctx = source.as_ref().map(SourceContext::from);
        let caller = source.as_ref().map(|s| s.component.clone());
        let resolution = resolve(&launch.request, &launch.component, source_ctx.as_ref());
        debug!(
            component = %launch.component.component_name(),
            reuse = ?resolution.reuse,
            clear = ?resolution.clear,
            single_top = resolution.single_top,
            "resolved launch"
        );

        let task = resolution
            .locate(user, &launch.request, source_ctx.as_ref(), &*table)
            .and_then(|id| table.get(id));
        let planned = match task {
            Some(task) => match plan_for_task(&task, &launch, &resolution)? {
                Some(plan) => Some((task, plan)),
                None => {
                    debug!("task {} has no screens left, opening a new one", task.id);
                    None
                }
            },
            None => None,
        };
        // Everything below talks to other processes.
        drop(table);

        let Some((task, plan)) = planned else {
            return self.launch_in_new_task(user, &launch, caller, &resolution);
        };
        self.dispatch.bring_to_front(task.id);

        if let Some(receiver) = plan.deliver_to {
            self.commit_marks(&task, &plan.doomed)?;
            self.deliver(caller.as_ref(), &receiver, &launch.request);
            return Ok(LaunchOutcome::Delivered {
                task: task.id,
                token: receiver.token,
            });
        }

        // A marked root still needs its replacement launched.
        let to_front = !resolution.clear_task
            && !resolution.clear_top
            && plan.doomed.is_empty()
            && launch.request.same_destination(&task.root_request);
        if to_front {
            info!("task {} already shows {}", task.id, launch.request.component);
            return Ok(LaunchOutcome::BroughtToFront { task: task.id });
        }

        let target = LaunchTarget::InTask {
            task: task.id,
            anchor: plan.anchor,
        };
        let host_launch =
            self.dispatch
                .prepare(user, &launch, caller, target.clone(), resolution.flags)?;
        self.commit_marks(&task, &plan.doomed)?;
        let placeholder = host_launch.placeholder.class_name.clone();
        self.dispatch.submit(host_launch)?;
        Ok(LaunchOutcome::Launched {
            target,
            placeholders: vec![placeholder],
        })
    }

    /// Chained multi-screen launch. The first request decides the task.
    pub fn launch_batch(
        &self,
        user: UserId,
        launches: Vec<LaunchRequest>,
    ) -> OrchestrationResult<LaunchOutcome> {
        let Some(first) = launches.first() else {
            return Err(OrchestrationError::InvalidRequest("empty launch batch".into()));
        };
        for launch in &launches {
            validate(launch)?;
        }
        let table = self.reconciled_table()?;

        let source = match &first.source {
            Some(token) => table.find_instance(user, token)?.map(|(_, screen)| screen),
            None => None,
        };
        let source_ctx = source.as_ref().map(SourceContext::from);
        let caller = source.as_ref().map(|s| s.component.clone());
        let resolution = resolve(&first.request, &first.component, source_ctx.as_ref());

        let mut target = LaunchTarget::NewTask;
        if let Some(task) = resolution
            .locate(user, &first.request, source_ctx.as_ref(), &*table)
            .and_then(|id| table.get(id))
        {
            let instances = task.lock()?;
            if let Some(top) = instances.topmost_unmarked() {
                target = LaunchTarget::InTask {
                    task: task.id,
                    anchor: top.token.clone(),
                };
            }
        }
        drop(table);

        let mut prepared = Vec::with_capacity(launches.len());
        for (index, launch) in launches.iter().enumerate() {
            let (entry_target, flags) = if index == 0 {
                (target.clone(), resolution.flags)
            } else {
                (LaunchTarget::Chained, launch.request.flags)
            };
            prepared.push(
                self.dispatch
                    .prepare(user, launch, caller.clone(), entry_target, flags)?,
            );
        }

        let placeholders = prepared
            .iter()
            .map(|l| l.placeholder.class_name.clone())
            .collect();
        self.dispatch.submit_batch(prepared)?;
        Ok(LaunchOutcome::Launched {
            target,
            placeholders,
        })
    }

    fn launch_in_new_task(
        &self,
        user: UserId,
        launch: &LaunchRequest,
        caller: Option<ComponentName>,
        resolution: &Resolution,
    ) -> OrchestrationResult<LaunchOutcome> {
        let host_launch =
            self.dispatch
                .prepare(user, launch, caller, LaunchTarget::NewTask, resolution.flags)?;
        let placeholder = host_launch.placeholder.class_name.clone();
        self.dispatch.submit(host_launch)?;
        Ok(LaunchOutcome::Launched {
            target: LaunchTarget::NewTask,
            placeholders: vec![placeholder],
        })
    }

    /// Marks `doomed` and queues their teardown once the task lock is released.
    fn commit_marks(&self, task: &Task, doomed: &[Token]) -> OrchestrationResult<()> {
        if doomed.is_empty() {
            return Ok(());
        }
        let marked = task.lock()?.mark_matching(|r| doomed.contains(&r.token));
        debug!("marked {} screens of task {}", marked.len(), task.id);
        for screen in &marked {
            self.teardown.schedule(screen);
        }
        Ok(())
    }

    fn deliver(
        &self,
        caller: Option<&ComponentName>,
        receiver: &ScreenInstance,
        request: &NavigationRequest,
    ) {
        let creator = caller
            .map(|c| c.package.as_str())
            .unwrap_or(self.config.system_caller.as_str());
        match receiver
            .process
            .client()
            .deliver_new_request(creator, &receiver.token, request)
        {
            Ok(()) => info!("delivered new request to {}", receiver.token),
            Err(err) => warn!(
                "failed to deliver new request to {} in process {}: {}",
                receiver.token, receiver.process.pid, err
            ),
        }
    }

    pub fn on_component_created(&self, created: CreatedComponent) -> OrchestrationResult<()> {
        let mut table = self.reconciled_table()?;

        if let Some((stale, _)) = table.find_instance_any_user(&created.token)? {
            let now_empty = {
                let mut instances = stale.lock()?;
                instances.remove(&created.token);
                instances.is_empty()
            };
            if now_empty && stale.id != created.task {
                table.remove(stale.id);
            }
            debug!("replaced stale registration of {}", created.token);
        }

        let user = created.process.user;
        let task = table.create_or_get(
            created.task,
            user,
            &created.affinity,
            &created.root_request,
        );
        let screen = ScreenInstance {
            token: created.token,
            task: task.id,
            component: created.component,
            caller: created.caller,
            process: created.process,
            launch_mode: created.launch_mode,
            flags: created.flags,
            affinity: created.affinity,
            marked: false,
        };
        info!(
            "screen {} ({}) created in task {}",
            screen.token, screen.component, task.id
        );
        task.lock()?.append(screen);
        Ok(())
    }

    pub fn on_component_resumed(&self, user: UserId, token: &Token) -> OrchestrationResult<()> {
        let table = self.reconciled_table()?;
        if let Some((task, _)) = table.find_instance(user, token)? {
            task.lock()?.move_to_top(token);
            debug!("screen {} resumed in task {}", token, task.id);
        }
        Ok(())
    }

    pub fn on_component_destroyed(
        &self,
        user: UserId,
        token: &Token,
    ) -> OrchestrationResult<Option<ScreenInstance>> {
        let mut table = self.reconciled_table()?;
        let Some((task, _)) = table.find_instance(user, token)? else {
            return Ok(None);
        };
        let (removed, now_empty) = {
            let mut instances = task.lock()?;
            let removed = instances.remove(token);
            (removed, instances.is_empty())
        };
        if now_empty {
            table.remove(task.id);
            debug!("task {} emptied and removed", task.id);
        }
        Ok(removed)
    }

    /// Sweeps every screen hosted by `process` and drops tasks left empty.
    pub fn on_process_died(&self, process: &ProcessHandle) -> OrchestrationResult<usize> {
        let mut table = self.reconciled_table()?;
        let mut swept = 0;
        let mut emptied = Vec::new();
        for task in table.iter() {
            let mut instances = task.lock()?;
            let dead = instances.remove_process(process.pid);
            if !dead.is_empty() {
                swept += dead.len();
                if instances.is_empty() {
                    emptied.push(task.id);
                }
            }
        }
        for id in &emptied {
            table.remove(*id);
        }
        info!(
            pid = process.pid,
            swept,
            emptied = emptied.len(),
            "process died"
        );
        Ok(swept)
    }

    fn screen(&self, user: UserId, token: &Token) -> OrchestrationResult<Option<ScreenInstance>> {
        let table = self.table()?;
        Ok(table.find_instance(user, token)?.map(|(_, screen)| screen))
    }

    pub fn owner_package(
        &self,
        user: UserId,
        token: &Token,
    ) -> OrchestrationResult<Option<String>> {
        Ok(self.screen(user, token)?.map(|s| s.component.package))
    }

    /// The caller component, or the screen's own component when it has none.
    pub fn caller_component(
        &self,
        user: UserId,
        token: &Token,
    ) -> OrchestrationResult<Option<ComponentName>> {
        Ok(self
            .screen(user, token)?
            .map(|s| s.caller.unwrap_or(s.component)))
    }

    pub fn caller_package(&self, user: UserId, token: &Token) -> OrchestrationResult<String> {
        Ok(self
            .screen(user, token)?
            .and_then(|s| s.caller)
            .map(|c| c.package)
            .unwrap_or_else(|| self.config.system_caller.clone()))
    }

    pub fn component_class(
        &self,
        user: UserId,
        token: &Token,
    ) -> OrchestrationResult<Option<ComponentName>> {
        Ok(self.screen(user, token)?.map(|s| s.component))
    }

    pub fn task_snapshot(&self, task: TaskId) -> OrchestrationResult<Option<TaskSnapshot>> {
        let table = self.table()?;
        table.get(task).map(|t| t.snapshot()).transpose()
    }

    pub fn snapshots(&self) -> OrchestrationResult<Vec<TaskSnapshot>> {
        let table = self.table()?;
        table.iter().map(|t| t.snapshot()).collect()
    }
}

fn validate(launch: &LaunchRequest) -> OrchestrationResult<()> {
    let declared = launch.component.component_name();
    if launch.request.component != declared {
        return Err(OrchestrationError::InvalidRequest(format!(
            "request targets {} but component info describes {}",
            launch.request.component, declared
        )));
    }
    if launch.component.package.is_empty() || launch.component.class.is_empty() {
        return Err(OrchestrationError::InvalidRequest(
            "component package and class are required".into(),
        ));
    }
    Ok(())
}

/// Computes marks, delivery and anchor for `task` without mutating it.
/// `None` when the task has no screens at all.
fn plan_for_task(
    task: &Task,
    launch: &LaunchRequest,
    resolution: &Resolution,
) -> OrchestrationResult<Option<TaskPlan>> {
    let target = &launch.request.component;
    let instances = task.lock()?;
    let Some(last) = instances.last() else {
        return Ok(None);
    };
    let doomed = instances.clear_candidates(resolution.clear, target);
    let deliver_to = if resolution.delivers() {
        instances
            .topmost_surviving(&doomed)
            .filter(|top| &top.component == target)
            .cloned()
    } else {
        None
    };
    Ok(Some(TaskPlan {
        anchor: last.token.clone(),
        doomed,
        deliver_to,
    }))
}
