use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Recorder, Reporter},
        reflector::Store,
        watcher,
    },
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::*;

use super::{Reconciler, SCHEDULER_CONTROLLER_NAME};
use crate::{
    Error, Result,
    config::Settings,
    crd::{PullSubscription, Scheduler, Topic},
    operations::RESOURCE_UID_LABEL,
    store::{KubePodLister, KubeSchedulerStore, KubeStore},
};

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub reconciler: Arc<Reconciler>,
    pub settings: Settings,
}

async fn reconcile_scheduler(scheduler: Arc<Scheduler>, ctx: Arc<Context>) -> Result<Action> {
    let key = match scheduler.namespace() {
        Some(ns) => format!("{}/{}", ns, scheduler.name_any()),
        None => scheduler.name_any(),
    };
    info!("Reconciling Scheduler \"{}\"", key);
    {
        // A status write comes back as a watch event, so the trigger object is current enough
        let ready = scheduler.metadata.deletion_timestamp.is_none()
            && scheduler.status.as_ref().is_some_and(|s| s.is_ready());
        let mut diagnostics = ctx.diagnostics.write().await;
        diagnostics.last_event = Utc::now();
        diagnostics.observe(&key, ready);
    }
    ctx.reconciler.reconcile(&key).await?;
    Ok(Action::await_change())
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    #[serde(deserialize_with = "from_ts")]
    pub last_event: DateTime<Utc>,
    /// Schedulers last seen ready
    pub ready: usize,
    #[serde(skip)]
    ready_keys: std::collections::BTreeSet<String>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            ready: 0,
            ready_keys: Default::default(),
            reporter: SCHEDULER_CONTROLLER_NAME.into(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }

    fn observe(&mut self, key: &str, ready: bool) {
        if ready {
            self.ready_keys.insert(key.to_string());
        } else {
            self.ready_keys.remove(key);
        }
        self.ready = self.ready_keys.len();
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl State {
    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub async fn to_context(
        &self,
        client: Client,
        cache: Store<Scheduler>,
        settings: Settings,
    ) -> Arc<Context> {
        let recorder = self.diagnostics.read().await.recorder(client.clone());
        let reconciler = Reconciler {
            schedulers: Arc::new(KubeSchedulerStore::new(client.clone(), cache)),
            topics: Arc::new(KubeStore::<Topic>::new(client.clone())),
            pull_subscriptions: Arc::new(KubeStore::<PullSubscription>::new(client.clone())),
            jobs: Arc::new(KubeStore::<Job>::new(client.clone())),
            pods: Arc::new(KubePodLister::new(client.clone())),
            job_image: settings.job_image.clone(),
            job_backoff_limit: settings.job_backoff_limit,
            recorder: Some(recorder),
        };
        Arc::new(Context {
            client,
            diagnostics: self.diagnostics.clone(),
            reconciler: Arc::new(reconciler),
            settings,
        })
    }
}

/// Dependencies still converging come back soon, everything else backs off.
fn scheduler_error_policy(_: Arc<Scheduler>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_not_ready() {
        debug!("Scheduler not ready yet: {}", error);
        Action::requeue(ctx.settings.pending_requeue())
    } else {
        warn!("reconcile failed: {:?}", error);
        Action::requeue(ctx.settings.error_requeue())
    }
}

pub async fn run_scheduler(state: State, settings: Settings) {
    let client = Client::try_default()
        .await
        .expect("Expected a valid KUBECONFIG environment variable");
    let api_scheduler = Api::<Scheduler>::all(client.clone());
    if let Err(e) = api_scheduler.list(&ListParams::default().limit(1)).await {
        error!("Scheduler CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin gencrd -- -o crds && kubectl apply -f crds");
        std::process::exit(1);
    }
    let controller = Controller::new(api_scheduler, watcher::Config::default().any_semantic());
    let cache = controller.store();
    let ctx = state.to_context(client.clone(), cache, settings).await;
    controller
        .owns(Api::<Topic>::all(client.clone()), watcher::Config::default())
        .owns(
            Api::<PullSubscription>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Job>::all(client.clone()),
            watcher::Config::default().labels(RESOURCE_UID_LABEL),
        )
        .shutdown_on_signal()
        .run(reconcile_scheduler, scheduler_error_policy, ctx)
        .filter_map(async |x| std::result::Result::ok(x))
        .for_each(|_| futures::future::ready(()))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_count_tracks_distinct_schedulers() {
        let mut d = Diagnostics::default();
        d.observe("ns/a", true);
        d.observe("ns/a", true);
        d.observe("ns/b", true);
        assert_eq!(d.ready, 2);
        d.observe("ns/a", false);
        assert_eq!(d.ready, 1);
    }
}
