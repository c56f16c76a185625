use kube::ResourceExt;
use serde_json::{Value, json};
use tracing::*;

use crate::{Result, crd::Scheduler, store::SchedulerStore};

pub static SCHEDULER_FINALIZER: &str = "cloud-run-events-scheduler-source-controller";

/// Merge patch replacing the finalizer list, guarded by `resource_version`.
pub fn finalizers_patch(finalizers: &[String], resource_version: &str) -> Value {
    json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": resource_version,
        }
    })
}

/// Patch appending our finalizer, `None` when it is already present.
pub fn add_finalizer_patch(scheduler: &Scheduler) -> Option<Value> {
    let finalizers = scheduler.finalizers();
    if finalizers.iter().any(|f| f == SCHEDULER_FINALIZER) {
        return None;
    }
    let mut updated = finalizers.to_vec();
    updated.push(SCHEDULER_FINALIZER.to_string());
    Some(finalizers_patch(
        &updated,
        &scheduler.resource_version().unwrap_or_default(),
    ))
}

/// Patch dropping our finalizer. Only acts while ours is first in line, so
/// finalizers of other controllers are never touched.
pub fn remove_finalizer_patch(scheduler: &Scheduler) -> Option<Value> {
    match scheduler.finalizers().split_first() {
        Some((first, rest)) if first == SCHEDULER_FINALIZER => Some(finalizers_patch(
            rest,
            &scheduler.resource_version().unwrap_or_default(),
        )),
        _ => None,
    }
}

/// Add the finalizer and carry the server's answer into `scheduler`, so a later
/// status write is made against the current resource version.
pub async fn ensure_finalizer(store: &dyn SchedulerStore, scheduler: &mut Scheduler) -> Result<()> {
    let Some(patch) = add_finalizer_patch(scheduler) else {
        return Ok(());
    };
    let ns = scheduler.namespace().unwrap_or_default();
    let patched = store
        .patch_metadata(&ns, &scheduler.name_any(), &patch)
        .await?;
    debug!("Added finalizer to Scheduler {}/{}", ns, scheduler.name_any());
    scheduler.metadata.finalizers = patched.metadata.finalizers;
    scheduler.metadata.resource_version = patched.metadata.resource_version;
    Ok(())
}

pub async fn remove_finalizer(store: &dyn SchedulerStore, scheduler: &Scheduler) -> Result<()> {
    let Some(patch) = remove_finalizer_patch(scheduler) else {
        return Ok(());
    };
    let ns = scheduler.namespace().unwrap_or_default();
    store
        .patch_metadata(&ns, &scheduler.name_any(), &patch)
        .await?;
    info!("Removed finalizer from Scheduler {}/{}", ns, scheduler.name_any());
    Ok(())
}
