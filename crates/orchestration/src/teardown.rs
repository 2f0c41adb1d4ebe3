//! Ordered, deferred teardown of marked screens.
//!
//! Marking happens under the task lock; the `finish` call into the guest is a
//! cross-process call, so it is posted here and run later by one worker.

use std::sync::Arc;

use guesthost_common::Token;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::GuestClient;
use crate::instances::ScreenInstance;

enum TeardownItem {
    Finish {
        token: Token,
        pid: u32,
        client: Arc<dyn GuestClient>,
    },
    Barrier(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct TeardownQueue {
    tx: mpsc::UnboundedSender<TeardownItem>,
}

impl TeardownQueue {
    /// Starts the worker on the current runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        Self::spawn_on(&Handle::current())
    }

    pub fn spawn_on(runtime: &Handle) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn(async move {
            teardown_loop(rx).await;
        });
        (Self { tx }, worker)
    }

    pub fn schedule(&self, instance: &ScreenInstance) {
        let item = TeardownItem::Finish {
            token: instance.token.clone(),
            pid: instance.process.pid,
            client: instance.process.client().clone(),
        };
        if self.tx.send(item).is_err() {
            warn!("teardown worker stopped, dropping finish for {}", instance.token);
        }
    }

    /// Waits until everything scheduled before this call has run.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(TeardownItem::Barrier(done)).is_err() {
            return;
        }
        let _ = wait.await;
    }
}

async fn teardown_loop(mut rx: mpsc::UnboundedReceiver<TeardownItem>) {
    debug!("teardown worker started");

    while let Some(item) = rx.recv().await {
        match item {
            TeardownItem::Finish { token, pid, client } => {
                let label = token.clone();
                let outcome = tokio::task::spawn_blocking(move || client.finish(&token)).await;
                match outcome {
                    Ok(Ok(())) => debug!("finished screen {} in process {}", label, pid),
                    Ok(Err(err)) => warn!("finish of {} in process {} failed: {}", label, pid, err),
                    Err(err) => warn!("finish of {} panicked: {}", label, err),
                }
            }
            TeardownItem::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("teardown worker stopped");
}
