//! In-memory stores that record every write in order.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Resource, ResourceExt};
use serde_json::Value;

use super::{PodLister, ResourceStore, SchedulerStore};
use crate::{Error, Result, crd::Scheduler};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Create { kind: String, name: String },
    Delete { kind: String, name: String },
    Patch { name: String, body: Value },
    UpdateStatus { name: String },
    ListPods { selector: String },
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    pub fn creates_of(&self, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create { kind: k, .. } if k == kind))
            .count()
    }

    pub fn status_updates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::UpdateStatus { .. }))
            .count()
    }

    pub fn patches(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Patch { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }
}

type Key = (String, String);

fn key_of<K: Resource>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

fn bump(resource_version: Option<&String>) -> String {
    let current: u64 = resource_version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (current + 1).to_string()
}

pub struct FakeStore<K> {
    kind: &'static str,
    objects: Mutex<BTreeMap<Key, K>>,
    fail_creates: Mutex<bool>,
    fail_deletes: Mutex<bool>,
    log: CallLog,
}

impl<K: Resource + Clone> FakeStore<K> {
    pub fn new(kind: &'static str, log: CallLog) -> Self {
        Self {
            kind,
            objects: Mutex::new(BTreeMap::new()),
            fail_creates: Mutex::new(false),
            fail_deletes: Mutex::new(false),
            log,
        }
    }

    pub fn insert(&self, obj: K) {
        self.objects.lock().unwrap().insert(key_of(&obj), obj);
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_creates(&self) {
        *self.fail_creates.lock().unwrap() = true;
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }
}

#[async_trait]
impl<K> ResourceStore<K> for FakeStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.object(namespace, name))
    }

    async fn create(&self, _namespace: &str, obj: &K) -> Result<K> {
        let key = key_of(obj);
        self.log.push(Call::Create {
            kind: self.kind.to_string(),
            name: key.1.clone(),
        });
        if *self.fail_creates.lock().unwrap() {
            return Err(Error::OtherError("injected create failure".into()));
        }
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists(format!("{} {}/{}", self.kind, key.0, key.1)));
        }
        objects.insert(key, obj.clone());
        Ok(obj.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        self.log.push(Call::Delete {
            kind: self.kind.to_string(),
            name: name.to_string(),
        });
        if *self.fail_deletes.lock().unwrap() {
            return Err(Error::OtherError("injected delete failure".into()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some())
    }
}

/// Cache and API server in one: `get` hands out what the last write left behind.
pub struct FakeSchedulerStore {
    objects: Mutex<BTreeMap<Key, Scheduler>>,
    fail_patches: Mutex<bool>,
    log: CallLog,
}

impl FakeSchedulerStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            fail_patches: Mutex::new(false),
            log,
        }
    }

    pub fn fail_patches(&self) {
        *self.fail_patches.lock().unwrap() = true;
    }

    pub fn insert(&self, obj: Scheduler) {
        self.objects.lock().unwrap().insert(key_of(&obj), obj);
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<Scheduler> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl SchedulerStore for FakeSchedulerStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<Scheduler>>> {
        Ok(self.object(namespace, name).map(Arc::new))
    }

    async fn patch_metadata(&self, namespace: &str, name: &str, patch: &Value) -> Result<Scheduler> {
        self.log.push(Call::Patch {
            name: name.to_string(),
            body: patch.clone(),
        });
        if *self.fail_patches.lock().unwrap() {
            return Err(Error::OtherError("injected patch failure".into()));
        }
        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| Error::OtherError(format!("{namespace}/{name} not found")))?;
        if let Some(finalizers) = patch["metadata"]["finalizers"].as_array() {
            obj.metadata.finalizers = Some(
                finalizers
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect(),
            );
        }
        obj.metadata.resource_version = Some(bump(obj.metadata.resource_version.as_ref()));
        Ok(obj.clone())
    }

    async fn update_status(&self, scheduler: &Scheduler) -> Result<Scheduler> {
        self.log.push(Call::UpdateStatus {
            name: scheduler.name_any(),
        });
        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(&key_of(scheduler))
            .ok_or_else(|| Error::OtherError(format!("{} not found", scheduler.name_any())))?;
        if obj.metadata.resource_version != scheduler.metadata.resource_version {
            return Err(Error::OtherError("resourceVersion conflict".into()));
        }
        obj.status = scheduler.status.clone();
        obj.metadata.resource_version = Some(bump(obj.metadata.resource_version.as_ref()));
        Ok(obj.clone())
    }
}

pub struct FakePods {
    pods: Mutex<Vec<Pod>>,
    log: CallLog,
}

impl FakePods {
    pub fn new(log: CallLog) -> Self {
        Self {
            pods: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn insert(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }
}

#[async_trait]
impl PodLister for FakePods {
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        self.log.push(Call::ListPods {
            selector: label_selector.to_string(),
        });
        let wanted: Vec<(&str, &str)> = label_selector
            .split(',')
            .filter_map(|kv| kv.split_once('='))
            .collect();
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|pod| pod.namespace().as_deref() == Some(namespace))
            .filter(|pod| {
                let labels = pod.labels();
                wanted
                    .iter()
                    .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
            })
            .cloned()
            .collect())
    }
}
