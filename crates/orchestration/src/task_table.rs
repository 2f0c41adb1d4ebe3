//! Task table: every known task, keyed by the host-assigned id.
//!
//! The table owns tasks through `Arc` so callers can drop the table lock and
//! keep working on one task under its own lock. Lock order is table first,
//! then at most one task.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use guesthost_common::{
    NavigationRequest, OrchestrationError, OrchestrationResult, TaskId, Token, UserId,
};

use crate::instances::{InstanceList, ScreenInstance};
use crate::resolver::TaskIndex;
use crate::types::TaskSnapshot;

#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub user: UserId,
    pub affinity: String,
    /// Request that created the task's first screen.
    pub root_request: NavigationRequest,
    pub created_at: DateTime<Utc>,
    instances: Mutex<InstanceList>,
}

impl Task {
    pub fn new(
        id: TaskId,
        user: UserId,
        affinity: String,
        root_request: NavigationRequest,
    ) -> Self {
        Self {
            id,
            user,
            affinity,
            root_request,
            created_at: Utc::now(),
            instances: Mutex::new(InstanceList::new()),
        }
    }

    pub fn lock(&self) -> OrchestrationResult<MutexGuard<'_, InstanceList>> {
        self.instances
            .lock()
            .map_err(|_| OrchestrationError::StatePoisoned("task instances"))
    }

    pub fn snapshot(&self) -> OrchestrationResult<TaskSnapshot> {
        let instances = self.lock()?;
        let snapshot = TaskSnapshot {
            task: self.id,
            user: self.user,
            affinity: self.affinity.clone(),
            base_request: self.root_request.clone(),
            base_component: instances.iter().next().map(|r| r.component.clone()),
            top_component: instances.topmost_unmarked().map(|r| r.component.clone()),
            screens: instances.iter().map(ScreenInstance::snapshot).collect(),
            created_at: self.created_at,
            last_activity: instances.last_activity(),
        };
        Ok(snapshot)
    }
}

#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: BTreeMap<TaskId, Arc<Task>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.get(&id).cloned()
    }

    /// Returns the task for `id`, creating it when the id is new.
    pub fn create_or_get(
        &mut self,
        id: TaskId,
        user: UserId,
        affinity: &str,
        root_request: &NavigationRequest,
    ) -> Arc<Task> {
        self.tasks
            .entry(id)
            .or_insert_with(|| {
                Arc::new(Task::new(
                    id,
                    user,
                    affinity.to_string(),
                    root_request.clone(),
                ))
            })
            .clone()
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.remove(&id)
    }

    /// Tasks in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    /// Drops every task the host no longer reports. Returns the removed ids.
    pub fn reconcile(&mut self, live: &HashSet<TaskId>) -> Vec<TaskId> {
        let stale: Vec<TaskId> = self
            .tasks
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in &stale {
            self.tasks.remove(id);
        }
        stale
    }

    /// Finds the task holding `token` for `user`, locking one task at a time.
    pub fn find_instance(
        &self,
        user: UserId,
        token: &Token,
    ) -> OrchestrationResult<Option<(Arc<Task>, ScreenInstance)>> {
        for task in self.tasks.values().filter(|t| t.user == user) {
            let instances = task.lock()?;
            if let Some(instance) = instances.find(token) {
                return Ok(Some((task.clone(), instance.clone())));
            }
        }
        Ok(None)
    }

    /// Same as [`find_instance`](Self::find_instance) but across all users.
    pub fn find_instance_any_user(
        &self,
        token: &Token,
    ) -> OrchestrationResult<Option<(Arc<Task>, ScreenInstance)>> {
        for task in self.tasks.values() {
            let instances = task.lock()?;
            if let Some(instance) = instances.find(token) {
                return Ok(Some((task.clone(), instance.clone())));
            }
        }
        Ok(None)
    }
}

impl TaskIndex for TaskTable {
    fn task_for_affinity(&self, user: UserId, affinity: &str) -> Option<TaskId> {
        self.tasks
            .values()
            .find(|t| t.user == user && t.affinity == affinity)
            .map(|t| t.id)
    }

    fn task_for_document(&self, user: UserId, request: &NavigationRequest) -> Option<TaskId> {
        let key = request.document_key();
        self.tasks
            .values()
            .find(|t| t.user == user && t.root_request.document_key() == key)
            .map(|t| t.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instances::tests::instance;
    use guesthost_common::ComponentName;

    fn request(class: &str) -> NavigationRequest {
        NavigationRequest::new(ComponentName::new("p", class))
    }

    #[test]
    fn create_or_get_keeps_first_root() {
        let mut table = TaskTable::new();
        let first = table.create_or_get(TaskId(4), UserId(0), "p", &request("A"));
        let again = table.create_or_get(TaskId(4), UserId(0), "q", &request("B"));
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.affinity, "p");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn affinity_lookup_scans_ascending_ids() {
        let mut table = TaskTable::new();
        table.create_or_get(TaskId(9), UserId(0), "p", &request("A"));
        table.create_or_get(TaskId(2), UserId(0), "p", &request("B"));
        table.create_or_get(TaskId(1), UserId(1), "p", &request("C"));
        assert_eq!(table.task_for_affinity(UserId(0), "p"), Some(TaskId(2)));
        assert_eq!(table.task_for_affinity(UserId(1), "p"), Some(TaskId(1)));
        assert_eq!(table.task_for_affinity(UserId(2), "p"), None);
    }

    #[test]
    fn document_lookup_matches_component_and_data() {
        let mut table = TaskTable::new();
        let doc = request("Doc").with_data("file:///a");
        table.create_or_get(TaskId(3), UserId(0), "p", &doc);
        let same = request("Doc").with_data("file:///a");
        let other = request("Doc").with_data("file:///b");
        assert_eq!(table.task_for_document(UserId(0), &same), Some(TaskId(3)));
        assert_eq!(table.task_for_document(UserId(0), &other), None);
    }

    #[test]
    fn reconcile_drops_unreported_tasks() {
        let mut table = TaskTable::new();
        for id in 1..=3 {
            table.create_or_get(TaskId(id), UserId(0), "p", &request("A"));
        }
        let live: HashSet<TaskId> = [TaskId(2)].into_iter().collect();
        assert_eq!(table.reconcile(&live), vec![TaskId(1), TaskId(3)]);
        assert_eq!(table.ids(), vec![TaskId(2)]);
    }

    #[test]
    fn find_instance_respects_user() {
        let mut table = TaskTable::new();
        let task = table.create_or_get(TaskId(1), UserId(0), "p", &request("A"));
        task.lock().unwrap().append(instance("tok", "A", 10));

        let (found, screen) = table
            .find_instance(UserId(0), &Token::new("tok"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, TaskId(1));
        assert_eq!(screen.component.class, "A");
        assert!(table
            .find_instance(UserId(1), &Token::new("tok"))
            .unwrap()
            .is_none());
        assert!(table
            .find_instance_any_user(&Token::new("tok"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn snapshot_reports_base_and_top() {
        let mut table = TaskTable::new();
        let task = table.create_or_get(TaskId(1), UserId(0), "p", &request("A"));
        {
            let mut instances = task.lock().unwrap();
            instances.append(instance("a", "A", 1));
            instances.append(instance("b", "B", 1));
            instances.mark_by(|r| r.token.as_str() == "b");
        }
        let snapshot = task.snapshot().unwrap();
        assert_eq!(snapshot.base_component.unwrap().class, "A");
        assert_eq!(snapshot.top_component.unwrap().class, "A");
        assert_eq!(snapshot.screens.len(), 2);
        assert!(snapshot.screens[1].marked);
    }
}
