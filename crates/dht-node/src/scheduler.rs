//! Tokio-backed `Scheduler` (SPEC_FULL §6): the production implementation
//! of the injected timer source `dht-core` depends on only as a trait.
//! Tests use a virtual clock instead (see `dht-core`'s `testing` module).

use std::time::Duration;

use dht_core::collab::{CancelHandle, Scheduler};
use tokio::task::JoinHandle;

pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> Box<dyn CancelHandle> {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        Box::new(TokioCancelHandle(handle))
    }
}

struct TokioCancelHandle(JoinHandle<()>);

impl CancelHandle for TokioCancelHandle {
    fn cancel(self: Box<Self>) {
        self.0.abort();
    }
}
