use std::collections::HashSet;
use std::sync::Arc;

use guesthost_common::TaskId;
use tracing::{debug, warn};

use crate::backend::HostTaskSnapshot;
use crate::task_table::TaskTable;

/// Prunes tasks the host no longer knows about.
///
/// Best effort: when the snapshot cannot be fetched the table is left as is.
#[derive(Clone)]
pub struct HostReconciler {
    snapshot: Arc<dyn HostTaskSnapshot>,
}

impl HostReconciler {
    pub fn new(snapshot: Arc<dyn HostTaskSnapshot>) -> Self {
        Self { snapshot }
    }

    /// Ids the host currently shows, or `None` when it cannot be asked.
    pub fn live_tasks(&self) -> Option<HashSet<TaskId>> {
        match self.snapshot.live_tasks() {
            Ok(tasks) => Some(tasks.into_iter().map(|t| t.id).collect()),
            Err(err) => {
                warn!("host task snapshot unavailable, skipping reconcile: {}", err);
                None
            }
        }
    }

    /// Runs under the table lock held by the caller.
    pub fn prune(&self, table: &mut TaskTable, live: &HashSet<TaskId>) -> Vec<TaskId> {
        let removed = table.reconcile(live);
        if !removed.is_empty() {
            debug!(?removed, "pruned tasks dismissed by the host");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostTaskInfo;
    use guesthost_common::{ComponentName, NavigationRequest, RemoteError, UserId};
    use std::sync::Mutex;

    struct Snapshot(Mutex<Result<Vec<HostTaskInfo>, RemoteError>>);

    impl HostTaskSnapshot for Snapshot {
        fn live_tasks(&self) -> Result<Vec<HostTaskInfo>, RemoteError> {
            self.0.lock().unwrap().clone()
        }
    }

    fn table_with(ids: &[i32]) -> TaskTable {
        let mut table = TaskTable::new();
        let request = NavigationRequest::new(ComponentName::new("p", "A"));
        for id in ids {
            table.create_or_get(TaskId(*id), UserId(0), "p", &request);
        }
        table
    }

    #[test]
    fn prunes_missing_tasks() {
        let reconciler = HostReconciler::new(Arc::new(Snapshot(Mutex::new(Ok(vec![
            HostTaskInfo::new(TaskId(2)),
        ])))));
        let mut table = table_with(&[1, 2]);
        let live = reconciler.live_tasks().unwrap();
        assert_eq!(reconciler.prune(&mut table, &live), vec![TaskId(1)]);
        assert_eq!(table.ids(), vec![TaskId(2)]);
    }

    #[test]
    fn snapshot_failure_keeps_table() {
        let reconciler = HostReconciler::new(Arc::new(Snapshot(Mutex::new(Err(
            RemoteError::call_failed("get_recent_tasks", "timeout"),
        )))));
        assert!(reconciler.live_tasks().is_none());
        assert_eq!(table_with(&[1, 2]).len(), 2);
    }
}
