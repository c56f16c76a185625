use std::{collections::BTreeMap, fmt::Debug};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::*;

use crate::{
    Error, Result,
    crd::{
        PropagationPolicy, PullSubscription, PullSubscriptionSpec, Scheduler, Topic, TopicSpec,
    },
    store::ResourceStore,
};

/// Label applied to every sub-resource so humans and tools can find what produced it
pub static RECEIVE_ADAPTER_LABEL: &str = "receive-adapter";
pub static RECEIVE_ADAPTER_NAME: &str = "scheduler.events.cloud.run";

/// Controller reference to `scheduler` that holds back its foreground deletion.
pub fn scheduler_owner_ref(scheduler: &Scheduler) -> Result<OwnerReference> {
    let oref = scheduler.controller_owner_ref(&()).ok_or_else(|| {
        Error::OtherError(format!("Scheduler {} has no uid", scheduler.name_any()))
    })?;
    Ok(OwnerReference {
        block_owner_deletion: Some(true),
        ..oref
    })
}

/// Metadata of a sub-resource: same name and namespace as the Scheduler, controlled by it.
fn owned_metadata(scheduler: &Scheduler) -> Result<ObjectMeta> {
    let oref = scheduler_owner_ref(scheduler)?;
    Ok(ObjectMeta {
        name: Some(scheduler.name_any()),
        namespace: scheduler.namespace(),
        labels: Some(BTreeMap::from([(
            RECEIVE_ADAPTER_LABEL.to_string(),
            RECEIVE_ADAPTER_NAME.to_string(),
        )])),
        owner_references: Some(vec![oref]),
        ..ObjectMeta::default()
    })
}

pub fn make_topic(scheduler: &Scheduler, topic: &str) -> Result<Topic> {
    Ok(Topic {
        metadata: owned_metadata(scheduler)?,
        spec: TopicSpec {
            secret: Some(scheduler.spec.secret_or_default()),
            project: scheduler.spec.project.clone(),
            topic: topic.to_string(),
            propagation_policy: PropagationPolicy::CreateDelete,
        },
        status: None,
    })
}

pub fn make_pull_subscription(scheduler: &Scheduler, topic: &str) -> Result<PullSubscription> {
    Ok(PullSubscription {
        metadata: owned_metadata(scheduler)?,
        spec: PullSubscriptionSpec {
            secret: Some(scheduler.spec.secret_or_default()),
            project: scheduler.spec.project.clone(),
            topic: topic.to_string(),
            sink: scheduler.spec.sink.clone(),
            ce_overrides: scheduler.spec.ce_overrides.clone(),
        },
        status: None,
    })
}

/// Get `name`, creating it from `desired` when absent. An existing object is returned
/// as is, drift in the sub-resource is left alone.
pub async fn ensure<K, F>(
    store: &dyn ResourceStore<K>,
    namespace: &str,
    name: &str,
    desired: F,
) -> Result<K>
where
    K: Resource<DynamicType = ()> + Debug + Send + Sync,
    F: FnOnce() -> Result<K> + Send,
{
    if let Some(existing) = store.get(namespace, name).await? {
        debug!("Found existing {} {}/{}", K::kind(&()), namespace, name);
        return Ok(existing);
    }
    let obj = desired()?;
    info!("Creating {} {}/{}", K::kind(&()), namespace, name);
    store.create(namespace, &obj).await
}
