#![allow(dead_code)]

use std::time::Duration;

use timebox::store::RecordStore;
use timebox::types::{RunStatus, ScriptId};

pub use timebox_test_utils::builders::{
    fast_supervisor_options, wait_until, Harness, HarnessBuilder,
};
pub use timebox_test_utils::fake_launcher::{FailingLauncher, InlineLauncher};
pub use timebox_test_utils::{init_tracing, with_timeout, with_timeout_secs};

/// Wait until run `id` reaches `status` in `store`.
pub async fn wait_for_status(
    store: &dyn RecordStore,
    id: ScriptId,
    status: RunStatus,
    timeout: Duration,
) -> bool {
    wait_until(timeout, || {
        store.get(id).map(|r| r.status == status).unwrap_or(false)
    })
    .await
}
