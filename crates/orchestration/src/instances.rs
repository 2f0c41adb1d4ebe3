//! Screen instance registry of one task.
//!
//! Instances are kept in arrival/resume order; the last element is the most
//! recent. Marked instances stay in the list until the guest confirms their
//! destruction, so every "topmost" query skips them.

use chrono::{DateTime, Utc};
use guesthost_common::{ComponentName, LaunchMode, TaskId, Token};

use crate::backend::ProcessHandle;
use crate::resolver::ClearDecision;
use crate::types::InstanceSnapshot;

/// One running occurrence of a guest component.
#[derive(Debug, Clone)]
pub struct ScreenInstance {
    pub token: Token,
    /// Owning task, by id only.
    pub task: TaskId,
    pub component: ComponentName,
    pub caller: Option<ComponentName>,
    pub process: ProcessHandle,
    pub launch_mode: LaunchMode,
    pub flags: u32,
    pub affinity: String,
    pub marked: bool,
}

impl ScreenInstance {
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            token: self.token.clone(),
            component: self.component.clone(),
            caller: self.caller.clone(),
            pid: self.process.pid,
            marked: self.marked,
        }
    }
}

#[derive(Debug)]
pub struct InstanceList {
    instances: Vec<ScreenInstance>,
    last_activity: DateTime<Utc>,
}

impl Default for InstanceList {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceList {
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            last_activity: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScreenInstance> {
        self.instances.iter()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn find(&self, token: &Token) -> Option<&ScreenInstance> {
        self.instances.iter().find(|r| &r.token == token)
    }

    pub fn append(&mut self, instance: ScreenInstance) {
        self.instances.push(instance);
        self.last_activity = Utc::now();
    }

    pub fn remove(&mut self, token: &Token) -> Option<ScreenInstance> {
        let index = self.instances.iter().position(|r| &r.token == token)?;
        Some(self.instances.remove(index))
    }

    /// Remove + append. Returns false when the token is not in this task.
    pub fn move_to_top(&mut self, token: &Token) -> bool {
        match self.remove(token) {
            Some(instance) => {
                self.append(instance);
                true
            }
            None => false,
        }
    }

    /// Last element, marked or not. New screens launched into the task stack on it.
    pub fn last(&self) -> Option<&ScreenInstance> {
        self.instances.last()
    }

    pub fn topmost_unmarked(&self) -> Option<&ScreenInstance> {
        self.instances.iter().rev().find(|r| !r.marked)
    }

    /// Topmost instance that is neither marked nor about to be.
    pub fn topmost_surviving(&self, doomed: &[Token]) -> Option<&ScreenInstance> {
        self.instances
            .iter()
            .rev()
            .find(|r| !r.marked && !doomed.contains(&r.token))
    }

    pub fn mark_by<F>(&mut self, predicate: F) -> bool
    where
        F: FnMut(&ScreenInstance) -> bool,
    {
        !self.mark_matching(predicate).is_empty()
    }

    /// Marks every unmarked instance matching `predicate` and returns copies
    /// of the ones that changed state.
    pub fn mark_matching<F>(&mut self, mut predicate: F) -> Vec<ScreenInstance>
    where
        F: FnMut(&ScreenInstance) -> bool,
    {
        let mut marked = Vec::new();
        for instance in self.instances.iter_mut() {
            if !instance.marked && predicate(instance) {
                instance.marked = true;
                marked.push(instance.clone());
            }
        }
        marked
    }

    /// Tokens a clear decision would mark, without mutating anything.
    pub fn clear_candidates(&self, clear: ClearDecision, target: &ComponentName) -> Vec<Token> {
        let live = self.instances.iter().filter(|r| !r.marked);
        match clear {
            ClearDecision::None => Vec::new(),
            ClearDecision::WholeTask => live.map(|r| r.token.clone()).collect(),
            ClearDecision::SpecificComponent => live
                .filter(|r| &r.component == target)
                .map(|r| r.token.clone())
                .collect(),
            ClearDecision::TaskTop => {
                let Some(anchor) = self
                    .instances
                    .iter()
                    .rposition(|r| !r.marked && &r.component == target)
                else {
                    return Vec::new();
                };
                self.instances[anchor + 1..]
                    .iter()
                    .filter(|r| !r.marked)
                    .map(|r| r.token.clone())
                    .collect()
            }
        }
    }

    /// Drops every instance hosted by `pid`.
    pub fn remove_process(&mut self, pid: u32) -> Vec<ScreenInstance> {
        let (dead, alive): (Vec<_>, Vec<_>) = self
            .instances
            .drain(..)
            .partition(|r| r.process.pid == pid);
        self.instances = alive;
        dead
    }
}
