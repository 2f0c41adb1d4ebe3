use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use guesthost_common::UserId;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{GuestClient, ProcessHandle, ProcessManager};

/// Builds the guest client for a freshly started process.
pub type ClientFactory = dyn Fn(u32, &str) -> Arc<dyn GuestClient> + Send + Sync;

const FIRST_PID: u32 = 10_000;

/// Record of one sandbox process started by [`LocalProcessManager`].
#[derive(Debug, Clone, Serialize)]
pub struct SandboxProcess {
    pub pid: u32,
    pub slot: usize,
    pub user: UserId,
    pub process_name: String,
    pub package: String,
    pub started_at: DateTime<Utc>,
}

struct SandboxState {
    next_pid: u32,
    handles: HashMap<(UserId, String), ProcessHandle>,
    records: HashMap<u32, SandboxProcess>,
}

/// In-memory process manager over a fixed pool of sandbox slots.
pub struct LocalProcessManager {
    slots: usize,
    factory: Box<ClientFactory>,
    state: Mutex<SandboxState>,
}

impl LocalProcessManager {
    pub fn new<F>(slots: usize, factory: F) -> Self
    where
        F: Fn(u32, &str) -> Arc<dyn GuestClient> + Send + Sync + 'static,
    {
        Self {
            slots,
            factory: Box::new(factory),
            state: Mutex::new(SandboxState {
                next_pid: FIRST_PID,
                handles: HashMap::new(),
                records: HashMap::new(),
            }),
        }
    }

    /// Stops a process and frees its slot. The returned handle is what the
    /// orchestrator needs for `on_process_died`.
    pub fn kill(&self, pid: u32) -> Option<ProcessHandle> {
        let mut state = self.state.lock().ok()?;
        let record = state.records.remove(&pid)?;
        let handle = state
            .handles
            .remove(&(record.user, record.process_name.clone()));
        debug!("sandbox process {} ({}) killed", pid, record.process_name);
        handle
    }

    pub fn find(&self, user: UserId, process_name: &str) -> Option<ProcessHandle> {
        let state = self.state.lock().ok()?;
        state.handles.get(&(user, process_name.to_string())).cloned()
    }

    /// Running processes ordered by pid.
    pub fn running(&self) -> Vec<SandboxProcess> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        let mut records: Vec<SandboxProcess> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.pid);
        records
    }
}

impl ProcessManager for LocalProcessManager {
    fn start_or_get_process(
        &self,
        process_name: &str,
        user: UserId,
        package: &str,
    ) -> Option<ProcessHandle> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                warn!("sandbox process state poisoned");
                return None;
            }
        };

        let key = (user, process_name.to_string());
        if let Some(handle) = state.handles.get(&key) {
            return Some(handle.clone());
        }

        let Some(slot) = (0..self.slots).find(|s| !state.records.values().any(|r| r.slot == *s))
        else {
            warn!(
                "no free sandbox slot for {} ({}), pool size {}",
                process_name, user, self.slots
            );
            return None;
        };

        let pid = state.next_pid;
        state.next_pid += 1;
        let client = (self.factory)(pid, process_name);
        let handle = ProcessHandle::new(pid, slot, user, process_name, package, client);
        state.records.insert(
            pid,
            SandboxProcess {
                pid,
                slot,
                user,
                process_name: process_name.to_string(),
                package: package.to_string(),
                started_at: Utc::now(),
            },
        );
        state.handles.insert(key, handle.clone());
        debug!("started sandbox process {} for {} in slot {}", pid, process_name, slot);
        Some(handle)
    }
}
