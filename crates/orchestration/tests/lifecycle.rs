mod support;

use std::sync::Arc;

use anyhow::Result;
use guesthost_common::{
    ComponentDescriptor, ComponentName, LaunchFlags, NavigationRequest, TaskId, Token, UserId,
};
use guesthost_orchestration::{global, LaunchRequest, ProcessManager};
use support::{component, Harness};

#[tokio::test]
async fn resumed_screen_moves_to_top() -> Result<()> {
    let h = Harness::new();
    h.create(1, &component("A"), "a");
    h.create(1, &component("B"), "b");

    h.orchestrator.on_component_resumed(UserId(0), &Token::new("a"))?;
    let order: Vec<String> = h.tokens(1).into_iter().map(|(t, _)| t).collect();
    assert_eq!(order, vec!["b", "a"]);

    h.orchestrator.on_component_resumed(UserId(0), &Token::new("missing"))?;
    Ok(())
}

#[tokio::test]
async fn instance_count_tracks_creations_and_destructions() -> Result<()> {
    let h = Harness::new();
    let a = component("A");
    for i in 0..4 {
        h.create(1, &a, &format!("a{i}"));
    }
    assert_eq!(h.tokens(1).len(), 4);

    let removed = h
        .orchestrator
        .on_component_destroyed(UserId(0), &Token::new("a1"))?
        .map(|s| s.token);
    assert_eq!(removed, Some(Token::new("a1")));
    assert!(h
        .orchestrator
        .on_component_destroyed(UserId(0), &Token::new("a1"))?
        .is_none());
    assert_eq!(h.tokens(1).len(), 3);

    for token in ["a0", "a2", "a3"] {
        h.orchestrator
            .on_component_destroyed(UserId(0), &Token::new(token))?;
    }
    assert!(h.orchestrator.task_snapshot(TaskId(1))?.is_none());
    Ok(())
}

#[tokio::test]
async fn destroy_is_scoped_to_user() -> Result<()> {
    let h = Harness::new();
    h.create(1, &component("A"), "a");
    assert!(h
        .orchestrator
        .on_component_destroyed(UserId(7), &Token::new("a"))?
        .is_none());
    assert_eq!(h.tokens(1).len(), 1);
    Ok(())
}

#[tokio::test]
async fn process_death_sweeps_only_its_screens() -> Result<()> {
    let h = Harness::new();
    let mine = component("A");
    let theirs = ComponentDescriptor::new("com.other", "com.other.B");
    h.create(1, &mine, "a");
    let other_pid = h.create(1, &theirs, "b");
    h.create(2, &theirs, "c");
    h.create(3, &mine, "d");

    let handle = h.processes.kill(other_pid).expect("process was running");
    let swept = h.orchestrator.on_process_died(&handle)?;

    assert_eq!(swept, 2);
    assert_eq!(h.tokens(1), vec![("a".to_string(), false)]);
    assert!(h.orchestrator.task_snapshot(TaskId(2))?.is_none());
    assert_eq!(h.tokens(3), vec![("d".to_string(), false)]);
    Ok(())
}

#[tokio::test]
async fn reconcile_keeps_exactly_live_tasks() -> Result<()> {
    let h = Harness::new();
    for task in 1..=3 {
        h.create(task, &component("A"), &format!("t{task}"));
    }

    h.host.dismiss(TaskId(2));
    h.orchestrator
        .on_component_resumed(UserId(0), &Token::new("t1"))?;

    let ids: Vec<TaskId> = h.orchestrator.snapshots()?.iter().map(|s| s.task).collect();
    assert_eq!(ids, vec![TaskId(1), TaskId(3)]);
    Ok(())
}

#[tokio::test]
async fn snapshot_outage_skips_pruning() -> Result<()> {
    let h = Harness::new();
    h.create(1, &component("A"), "a");
    h.create(2, &component("B").with_affinity("b"), "b");

    h.host.dismiss(TaskId(2));
    *h.host.snapshot_down.lock().unwrap() = true;
    h.orchestrator
        .on_component_resumed(UserId(0), &Token::new("a"))?;

    assert_eq!(h.orchestrator.snapshots()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn dismissed_task_is_not_reused() -> Result<()> {
    let h = Harness::new();
    let x = component("X");
    h.create(1, &x, "x1");
    h.host.dismiss(TaskId(1));

    let request = LaunchRequest::new(
        x.clone(),
        NavigationRequest::to(&x).with_flags(LaunchFlags::NEW_TASK),
    );
    h.orchestrator.launch(UserId(0), request)?;

    assert_eq!(
        h.host.last_launch().target,
        guesthost_orchestration::LaunchTarget::NewTask
    );
    assert!(h.orchestrator.snapshots()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn recreated_token_replaces_stale_registration() -> Result<()> {
    let h = Harness::new();
    let a = component("A");
    h.create(1, &a, "t");
    h.create(2, &a, "t");

    assert!(h.orchestrator.task_snapshot(TaskId(1))?.is_none());
    assert_eq!(h.tokens(2), vec![("t".to_string(), false)]);
    Ok(())
}

#[tokio::test]
async fn caller_queries_fall_back() -> Result<()> {
    let h = Harness::new();
    let a = component("A");
    let b = component("B");
    h.create(1, &a, "a");
    h.create_from(1, &b, "b", Some(&a));
    let o = &h.orchestrator;
    let user = UserId(0);

    assert_eq!(o.caller_package(user, &Token::new("a"))?, "android");
    assert_eq!(o.caller_package(user, &Token::new("b"))?, "com.example");
    assert_eq!(o.caller_package(user, &Token::new("zz"))?, "android");

    assert_eq!(
        o.caller_component(user, &Token::new("a"))?,
        Some(a.component_name())
    );
    assert_eq!(
        o.caller_component(user, &Token::new("b"))?,
        Some(a.component_name())
    );
    assert_eq!(
        o.owner_package(user, &Token::new("b"))?.as_deref(),
        Some("com.example")
    );
    assert_eq!(
        o.component_class(user, &Token::new("b"))?,
        Some(ComponentName::new("com.example", "com.example.B"))
    );
    assert!(o.component_class(UserId(3), &Token::new("b"))?.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_callbacks_on_distinct_tasks() -> Result<()> {
    let h = Arc::new(Harness::new());
    let threads: Vec<_> = (0..8)
        .map(|task| {
            let h = h.clone();
            std::thread::spawn(move || {
                let desc = component(&format!("C{task}")).with_affinity(format!("aff{task}"));
                for i in 0..10 {
                    h.create(task, &desc, &format!("t{task}-{i}"));
                }
                let request = LaunchRequest::new(
                    desc.clone(),
                    NavigationRequest::to(&desc).with_flags(LaunchFlags::CLEAR_TOP),
                )
                .from_source(Token::new(format!("t{task}-0")));
                h.orchestrator.launch(UserId(0), request).unwrap();
                for i in 0..5 {
                    h.orchestrator
                        .on_component_destroyed(UserId(0), &Token::new(format!("t{task}-{i}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().expect("worker thread panicked");
    }

    let snapshots = h.orchestrator.snapshots()?;
    assert_eq!(snapshots.len(), 8);
    assert!(snapshots.iter().all(|s| s.screens.len() == 5));
    Ok(())
}

#[tokio::test]
async fn global_install_happens_once() {
    let h = Harness::new();
    assert!(global::install(h.orchestrator.clone()).is_ok());
    let err = global::install(h.orchestrator.clone()).unwrap_err();
    assert_eq!(err.code(), "E_ALREADY_INSTALLED");
    assert!(global::get().is_some());
}

#[tokio::test]
async fn process_manager_reuses_running_process() {
    let h = Harness::new();
    let first = h
        .processes
        .start_or_get_process("com.example", UserId(0), "com.example")
        .unwrap();
    let again = h
        .processes
        .start_or_get_process("com.example", UserId(0), "com.example")
        .unwrap();
    assert_eq!(first.pid, again.pid);
}
