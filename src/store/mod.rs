//! Narrow views of the API server used by the reconciler.
//!
//! Reads of the primary object go through the controller's reflector cache, every
//! write goes straight to the API server. The in-memory implementation in [`fake`]
//! backs the reconciler tests.

use std::{fmt::Debug, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use k8s_openapi::{NamespaceResourceScope, api::core::v1::Pod};
use kube::{
    Client, Resource, ResourceExt,
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    runtime::reflector::{ObjectRef, Store},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::*;

use crate::{Error, Result, crd::Scheduler};

#[cfg(test)]
pub mod fake;

/// Access to the primary objects.
#[async_trait]
pub trait SchedulerStore: Send + Sync {
    /// Read from the shared cache; `None` when the object is gone.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<Scheduler>>>;

    /// Apply a JSON merge patch to the object's metadata.
    async fn patch_metadata(&self, namespace: &str, name: &str, patch: &Value) -> Result<Scheduler>;

    /// Persist `scheduler.status`, guarded by `scheduler.metadata.resourceVersion`.
    async fn update_status(&self, scheduler: &Scheduler) -> Result<Scheduler>;
}

/// Get, create and delete for a namespaced dependent resource.
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Fails with [`Error::AlreadyExists`] when an object with the same name exists.
    async fn create(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;
}

#[async_trait]
pub trait PodLister: Send + Sync {
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;
}

pub struct KubeSchedulerStore {
    client: Client,
    cache: Store<Scheduler>,
}

impl KubeSchedulerStore {
    pub fn new(client: Client, cache: Store<Scheduler>) -> Self {
        Self { client, cache }
    }
}

#[async_trait]
impl SchedulerStore for KubeSchedulerStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<Scheduler>>> {
        Ok(self
            .cache
            .get(&ObjectRef::new(name).within(namespace)))
    }

    async fn patch_metadata(&self, namespace: &str, name: &str, patch: &Value) -> Result<Scheduler> {
        let api: Api<Scheduler> = Api::namespaced(self.client.clone(), namespace);
        debug!("Patching Scheduler {}/{} with {}", namespace, name, patch);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(Error::KubeError)
    }

    async fn update_status(&self, scheduler: &Scheduler) -> Result<Scheduler> {
        let namespace = scheduler.namespace().unwrap_or_default();
        let api: Api<Scheduler> = Api::namespaced(self.client.clone(), &namespace);
        let patch = json!({
            "metadata": { "resourceVersion": scheduler.resource_version() },
            "status": scheduler.status,
        });
        api.patch_status(&scheduler.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(Error::KubeError)
    }
}

/// [`ResourceStore`] backed by a namespaced [`Api`].
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(Error::KubeError)
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), obj).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::AlreadyExists(format!(
                "{} {}/{}",
                K::kind(&()),
                namespace,
                obj.name_any()
            ))),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}

pub struct KubePodLister {
    client: Client,
}

impl KubePodLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodLister for KubePodLister {
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(Error::KubeError)?;
        Ok(pods.items)
    }
}
