// # -----------------------------
// # crates/cli/src/scenario.rs
// # -----------------------------
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use guesthost_common::{
    ComponentDescriptor, ComponentName, LaunchFlags, NavigationRequest, OrchestratorConfig,
    TaskId, Token, UserId,
};
use guesthost_orchestration::{
    Collaborators, CreatedComponent, GuestClient, HostLaunch, LocalProcessManager,
    TaskOrchestrator, TaskSnapshot, TeardownQueue,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sim_host::{HostEvent, SimGuest, SimHost, SimTheme};

/// A scripted run: a component catalog and the steps to replay against it.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub user: u32,
    pub components: BTreeMap<String, ComponentDescriptor>,
    #[serde(default)]
    pub dialog_themes: Vec<u32>,
    pub steps: Vec<Step>,
}

/// Screens are referred to by label, `<component key>#<n>`, numbered from 1
/// in creation order per component.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// One entry launches a single screen; more entries launch a chained batch.
    Launch {
        components: Vec<String>,
        #[serde(default)]
        flags: LaunchFlags,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        action: Option<String>,
    },
    Resume { screen: String },
    /// The guest finishes a screen on its own.
    Destroy { screen: String },
    KillProcess { process: String },
    DismissTask { screen: String },
    Snapshot,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Launch { .. } => "launch",
            Step::Resume { .. } => "resume",
            Step::Destroy { .. } => "destroy",
            Step::KillProcess { .. } => "kill_process",
            Step::DismissTask { .. } => "dismiss_task",
            Step::Snapshot => "snapshot",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: &'static str,
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskSnapshot>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub labels: BTreeMap<String, Token>,
    pub delivered: usize,
    /// Tasks the host was asked to bring forward, in order.
    pub fronted: Vec<TaskId>,
    pub tasks: Vec<TaskSnapshot>,
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("parsing scenario {}", path.display()))?;
    scenario.validate()?;
    Ok(scenario)
}

impl Scenario {
    pub fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Launch { components, .. } = step {
                if components.is_empty() {
                    bail!("step {index}: launch needs at least one component");
                }
                let unknown = components.iter().find(|c| !self.components.contains_key(*c));
                if let Some(missing) = unknown {
                    bail!("step {index}: unknown component '{missing}'");
                }
            }
        }
        Ok(())
    }
}

pub struct Runner {
    user: UserId,
    catalog: BTreeMap<String, ComponentDescriptor>,
    host: Arc<SimHost>,
    processes: Arc<LocalProcessManager>,
    orchestrator: TaskOrchestrator,
    labels: BTreeMap<String, Token>,
    counters: HashMap<String, usize>,
}

impl Runner {
    /// Wires a fresh orchestrator to the simulated host. Needs a tokio runtime.
    pub fn new(config: OrchestratorConfig, scenario: &Scenario) -> Self {
        let user = UserId(scenario.user);
        let host = Arc::new(SimHost::new());
        let guest_host = host.clone();
        let processes = Arc::new(LocalProcessManager::new(
            config.placeholders.slots,
            move |pid, _name| {
                Arc::new(SimGuest::new(pid, user, guest_host.clone())) as Arc<dyn GuestClient>
            },
        ));
        let (teardown, _worker) = TeardownQueue::spawn();
        let orchestrator = TaskOrchestrator::new(
            config,
            Collaborators {
                process_manager: processes.clone(),
                host: host.clone(),
                snapshot: host.clone(),
                theme: Arc::new(SimTheme::new(scenario.dialog_themes.iter().copied())),
                fallback_theme: None,
            },
            teardown,
        );
        Self {
            user,
            catalog: scenario.components.clone(),
            host,
            processes,
            orchestrator,
            labels: BTreeMap::new(),
            counters: HashMap::new(),
        }
    }

    pub async fn run(mut self, steps: &[Step]) -> Result<RunReport> {
        let mut reports = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            debug!(index, step = step.name(), "running step");
            let status = self.apply(step)?;
            self.settle().await?;
            let tasks = match step {
                Step::Snapshot => Some(self.orchestrator.snapshots()?),
                _ => None,
            };
            reports.push(StepReport {
                index,
                step: step.name(),
                status,
                tasks,
            });
        }

        info!("scenario finished after {} steps", reports.len());
        Ok(RunReport {
            steps: reports,
            labels: self.labels.clone(),
            delivered: self.host.delivered(),
            fronted: self.host.fronted(),
            tasks: self.orchestrator.snapshots()?,
        })
    }

    fn apply(&mut self, step: &Step) -> Result<i32> {
        match step {
            Step::Launch {
                components,
                flags,
                source,
                data,
                action,
            } => {
                let source = source.as_deref().map(|s| self.token(s)).transpose()?;
                let mut requests = Vec::with_capacity(components.len());
                let mut descriptors = Vec::with_capacity(components.len());
                for key in components {
                    let descriptor = self.descriptor(key)?.clone();
                    let mut request = NavigationRequest::to(&descriptor).with_flags(*flags);
                    if let Some(data) = data {
                        request = request.with_data(data.clone());
                    }
                    if let Some(action) = action {
                        request = request.with_action(action.clone());
                    }
                    requests.push(request);
                    descriptors.push(descriptor);
                }
                Ok(self
                    .orchestrator
                    .resolve_and_launch(self.user, requests, descriptors, source, None))
            }
            Step::Resume { screen } => {
                let token = self.token(screen)?;
                self.orchestrator.on_component_resumed(self.user, &token)?;
                Ok(0)
            }
            Step::Destroy { screen } => {
                let token = self.token(screen)?;
                let removed = self.orchestrator.on_component_destroyed(self.user, &token)?;
                Ok(if removed.is_some() { 0 } else { 1 })
            }
            Step::KillProcess { process } => {
                let Some(handle) = self
                    .processes
                    .find(self.user, process)
                    .and_then(|h| self.processes.kill(h.pid))
                else {
                    warn!("process '{}' is not running", process);
                    return Ok(1);
                };
                self.orchestrator.on_process_died(&handle)?;
                Ok(0)
            }
            Step::DismissTask { screen } => {
                let token = self.token(screen)?;
                let task = self.task_of(&token)?;
                Ok(if self.host.dismiss(task) { 0 } else { 1 })
            }
            Step::Snapshot => Ok(0),
        }
    }

    /// Replays host callbacks until both the host queue and the teardown queue are idle.
    async fn settle(&mut self) -> Result<()> {
        loop {
            self.orchestrator.teardown().flush().await;
            let events = self.host.drain();
            if events.is_empty() {
                return Ok(());
            }
            for event in events {
                match event {
                    HostEvent::Create { launch, task } => self.create(launch, task)?,
                    HostEvent::Destroy { user, token } => {
                        self.orchestrator.on_component_destroyed(user, &token)?;
                    }
                }
            }
        }
    }

    fn create(&mut self, launch: HostLaunch, task: TaskId) -> Result<()> {
        let stub = launch.stub;
        let descriptor = stub.component;
        let Some(process) = self
            .processes
            .find(stub.user, descriptor.process_name())
        else {
            warn!(
                "process {} died before {} was created",
                descriptor.process_name(),
                descriptor.class
            );
            return Ok(());
        };

        let key = self
            .key_for(&descriptor.component_name())
            .unwrap_or_else(|| descriptor.class.clone());
        let counter = self.counters.entry(key.clone()).or_default();
        *counter += 1;
        let label = format!("{key}#{counter}");
        let token = Token::new(Uuid::new_v4().to_string());
        self.labels.insert(label.clone(), token.clone());
        debug!("{} is {}", label, token);

        self.orchestrator.on_component_created(CreatedComponent {
            process,
            component: descriptor.component_name(),
            caller: stub.caller,
            token,
            root_request: stub.request,
            affinity: descriptor.task_affinity(),
            task,
            launch_mode: descriptor.launch_mode,
            flags: descriptor.flags,
        })?;
        Ok(())
    }

    fn descriptor(&self, key: &str) -> Result<&ComponentDescriptor> {
        self.catalog
            .get(key)
            .ok_or_else(|| anyhow!("unknown component '{key}'"))
    }

    fn key_for(&self, name: &ComponentName) -> Option<String> {
        self.catalog
            .iter()
            .find(|(_, d)| &d.component_name() == name)
            .map(|(key, _)| key.clone())
    }

    fn token(&self, label: &str) -> Result<Token> {
        self.labels
            .get(label)
            .cloned()
            .ok_or_else(|| anyhow!("no screen labelled '{label}'"))
    }

    fn task_of(&self, token: &Token) -> Result<TaskId> {
        self.orchestrator
            .snapshots()?
            .into_iter()
            .find(|t| t.screens.iter().any(|s| &s.token == token))
            .map(|t| t.task)
            .ok_or_else(|| anyhow!("screen {token} is not in any task"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MAIL: &str = r#"{
        "components": {
            "inbox": { "package": "com.mail", "class": "com.mail.Inbox", "launch_mode": "single_task" },
            "compose": { "package": "com.mail", "class": "com.mail.Compose", "theme": 9 },
            "viewer": { "package": "com.mail", "class": "com.mail.Viewer" }
        },
        "dialog_themes": [9],
        "steps": [
            { "step": "launch", "components": ["inbox"] },
            { "step": "launch", "components": ["viewer"], "source": "inbox#1" },
            { "step": "launch", "components": ["compose"], "source": "viewer#1" },
            { "step": "snapshot" },
            { "step": "launch", "components": ["inbox"], "source": "compose#1" },
            { "step": "snapshot" }
        ]
    }"#;

    fn scenario(raw: &str) -> Scenario {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(raw.as_bytes()).unwrap();
        load_scenario(file.path()).unwrap()
    }

    #[tokio::test]
    async fn single_task_relaunch_clears_screens_above() {
        let scenario = scenario(MAIL);
        let runner = Runner::new(OrchestratorConfig::default(), &scenario);
        let report = runner.run(&scenario.steps).await.unwrap();

        assert!(report.steps.iter().all(|s| s.status == 0));
        let before = report.steps[3].tasks.as_ref().unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].screens.len(), 3);

        let after = report.steps[5].tasks.as_ref().unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].screens.len(), 1);
        assert_eq!(after[0].screens[0].component.class, "com.mail.Inbox");
        assert_eq!(report.delivered, 1);
        assert!(!report.fronted.is_empty());
        assert!(report.fronted.iter().all(|task| *task == after[0].task));
    }

    #[tokio::test]
    async fn killed_process_and_dismissed_task_disappear() {
        let scenario = scenario(
            r#"{
                "components": {
                    "a": { "package": "com.a", "class": "com.a.Main" },
                    "b": { "package": "com.b", "class": "com.b.Main" }
                },
                "steps": [
                    { "step": "launch", "components": ["a"] },
                    { "step": "launch", "components": ["b"] },
                    { "step": "kill_process", "process": "com.a" },
                    { "step": "dismiss_task", "screen": "b#1" },
                    { "step": "launch", "components": ["a"] },
                    { "step": "snapshot" }
                ]
            }"#,
        );
        let runner = Runner::new(OrchestratorConfig::default(), &scenario);
        let report = runner.run(&scenario.steps).await.unwrap();

        let tasks = report.steps[5].tasks.as_ref().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].screens[0].component.package, "com.a");
        assert!(report.labels.contains_key("a#2"));
    }

    #[test]
    fn unknown_component_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{ "components": {}, "steps": [ { "step": "launch", "components": ["x"] } ] }"#,
        )
        .unwrap();
        let err = load_scenario(file.path()).unwrap_err();
        assert!(err.to_string().contains("unknown component"));
    }
}
