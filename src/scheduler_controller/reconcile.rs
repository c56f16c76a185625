use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::batch::v1::Job;
use kube::{Resource, ResourceExt, runtime::events::Recorder};
use tracing::*;
use url::Url;

use super::{
    finalizer::{ensure_finalizer, remove_finalizer},
    resources::{ensure, make_pull_subscription, make_topic, scheduler_owner_ref},
};
use crate::{
    Error, Result,
    conditions::Conditions,
    crd::{PullSubscription, Scheduler, SchedulerStatus, Topic},
    events_helper::{emit_info, emit_warning},
    operations::{
        JobAction, JobPhase, JobResult, NotificationArgs, decode_pod_result, job_phase,
        job_pod_selector, make_notification_job, notification_job_name, select_job_pod,
    },
    store::{PodLister, ResourceStore, SchedulerStore},
};

pub static REASON_TOPIC_NOT_READY: &str = "TopicNotReady";
pub static REASON_PULL_SUBSCRIPTION_NOT_READY: &str = "PullSubscriptionNotReady";
pub static REASON_INVALID_SINK_URI: &str = "InvalidSinkURI";
pub static REASON_NOTIFICATION_JOB_PENDING: &str = "NotificationJobPending";
pub static REASON_NOTIFICATION_JOB_FAILED: &str = "NotificationJobFailed";
pub static REASON_NOTIFICATION_NOT_READY: &str = "NotificationNotReady";
pub static REASON_NOTIFICATION_DELETE_FAILED: &str = "NotificationDeleteFailed";

/// How one pass of the business logic ended, when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    /// Desired state reached for a live object; status is written if it changed
    Converged,
    /// Teardown done and finalizer released; the object is on its way out
    Finalized,
}

/// Split a `namespace/name` work key. A bare name is cluster scoped.
pub fn split_key(key: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok((String::new(), name.to_string())),
        [ns, name] if !name.is_empty() => Ok((ns.to_string(), name.to_string())),
        _ => Err(Error::InvalidKey(key.to_string())),
    }
}

fn reason_for(error: &Error) -> &'static str {
    match error {
        Error::JobNotCompleted(_) => REASON_NOTIFICATION_JOB_PENDING,
        Error::JobFailed { .. } => REASON_NOTIFICATION_JOB_FAILED,
        _ => REASON_NOTIFICATION_NOT_READY,
    }
}

/// Drives a Scheduler towards its Topic, PullSubscription and notification,
/// and tears them down in order once it is deleted.
pub struct Reconciler {
    pub schedulers: Arc<dyn SchedulerStore>,
    pub topics: Arc<dyn ResourceStore<Topic>>,
    pub pull_subscriptions: Arc<dyn ResourceStore<PullSubscription>>,
    pub jobs: Arc<dyn ResourceStore<Job>>,
    pub pods: Arc<dyn PodLister>,
    /// Image of the notification job
    pub job_image: String,
    pub job_backoff_limit: i32,
    pub recorder: Option<Recorder>,
}

impl Reconciler {
    /// Reconcile the Scheduler behind `key`.
    ///
    /// The business logic always runs on a copy of the cached object. Its status
    /// is written back only when it differs from the cached one, and the error of
    /// the business logic wins over a successful write.
    pub async fn reconcile(&self, key: &str) -> Result<()> {
        let (namespace, name) = match split_key(key) {
            Ok(parts) => parts,
            Err(e) => {
                error!("{e}");
                return Ok(());
            }
        };
        let Some(original) = self.schedulers.get(&namespace, &name).await? else {
            info!("Scheduler {:?} in work queue no longer exists", key);
            return Ok(());
        };

        let mut scheduler = (*original).clone();
        let result = self.reconcile_scheduler(&mut scheduler).await;

        if let Ok(Pass::Finalized) = result {
            return Ok(());
        }

        if original.status == scheduler.status && original.metadata == scheduler.metadata {
            // A stale cache must not overwrite a newer status with the same content
            debug!("Scheduler {:?} status unchanged", key);
        } else if let Err(e) = self.update_status(&original, &scheduler).await {
            warn!("Failed to update Scheduler {:?} status: {}", key, e);
            if let Some(recorder) = &self.recorder {
                emit_warning(
                    recorder,
                    &scheduler,
                    "UpdateFailed",
                    "UpdateStatus",
                    Some(format!("Failed to update status: {e}")),
                )
                .await;
            }
            return Err(e);
        }
        result.map(|_| ())
    }

    async fn update_status(&self, original: &Scheduler, desired: &Scheduler) -> Result<()> {
        let was_ready = original.status.as_ref().is_some_and(SchedulerStatus::is_ready);
        let is_ready = desired.status.as_ref().is_some_and(SchedulerStatus::is_ready);
        let updated = self.schedulers.update_status(desired).await?;
        if is_ready && !was_ready {
            let elapsed = updated
                .creation_timestamp()
                .and_then(|t| (Utc::now() - t.0).to_std().ok())
                .unwrap_or_default();
            info!(
                "Scheduler {:?} became ready after {:?}",
                updated.name_any(),
                elapsed
            );
            if let Some(recorder) = &self.recorder {
                emit_info(
                    recorder,
                    &updated,
                    "SchedulerReady",
                    "Reconciled",
                    Some(format!("Scheduler {} is ready", updated.name_any())),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn reconcile_scheduler(&self, scheduler: &mut Scheduler) -> Result<Pass> {
        let deleting = scheduler.meta().deletion_timestamp.is_some();
        if !deleting {
            // Nothing was re-validated yet, so a failure here leaves the status as it was
            ensure_finalizer(self.schedulers.as_ref(), scheduler)
                .await
                .inspect_err(|e| warn!("Failed to add finalizer: {}", e))?;
        }

        let mut status = scheduler.status.clone().unwrap_or_default();
        let previous = status.conditions.clone();
        // Identifiers already recorded survive the reset
        status.initialize_conditions();
        status.reset_conditions();

        let result = if deleting {
            self.teardown(scheduler, &mut status).await
        } else {
            self.converge(scheduler, &mut status)
                .await
                .map(|_| Pass::Converged)
        };
        // Conditions that ended where they started keep their transition time
        status.restore_transition_times(&previous);
        scheduler.status = Some(status);
        result
    }

    async fn converge(&self, scheduler: &Scheduler, status: &mut SchedulerStatus) -> Result<()> {
        let ns = scheduler.namespace().unwrap_or_default();
        let name = scheduler.name_any();
        let topic_name = status
            .topic_id
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("scheduler-{}", scheduler.uid().unwrap_or_default()));

        // Topic
        let topic = match ensure(self.topics.as_ref(), &ns, &name, || {
            make_topic(scheduler, &topic_name)
        })
        .await
        {
            Ok(topic) => topic,
            Err(e) => {
                info!("Failed to reconcile Topic {}/{}: {}", ns, name, e);
                status.mark_topic_not_ready(
                    REASON_TOPIC_NOT_READY,
                    &format!("Failed to reconcile Topic: {e}"),
                );
                return Err(e);
            }
        };
        let (topic_id, project_id) = match validate_topic(&topic, &topic_name) {
            Ok(ids) => ids,
            Err((e, message)) => {
                info!("{}", message);
                status.mark_topic_not_ready(REASON_TOPIC_NOT_READY, &message);
                return Err(e);
            }
        };
        status.topic_id = Some(topic_id);
        status.project_id = Some(project_id);
        status.mark_topic_ready();

        // PullSubscription
        let ps = match ensure(self.pull_subscriptions.as_ref(), &ns, &name, || {
            make_pull_subscription(scheduler, &topic_name)
        })
        .await
        {
            Ok(ps) => ps,
            Err(e) => {
                info!("Failed to reconcile PullSubscription {}/{}: {}", ns, name, e);
                status.mark_pull_subscription_not_ready(
                    REASON_PULL_SUBSCRIPTION_NOT_READY,
                    &format!("Failed to reconcile PullSubscription Source: {e}"),
                );
                return Err(e);
            }
        };
        if !ps.is_ready() {
            info!("PullSubscription {}/{} not ready", ns, name);
            status.mark_pull_subscription_not_ready(
                REASON_PULL_SUBSCRIPTION_NOT_READY,
                &format!("PullSubscription {ns}/{name} not ready"),
            );
            return Err(Error::PullSubscriptionNotReady);
        }
        let sink_uri = ps
            .status
            .as_ref()
            .and_then(|s| s.sink_uri.clone())
            .unwrap_or_default();
        // Parsed for validation only; the URI is recorded as the PullSubscription reports it
        match Url::parse(&sink_uri) {
            Ok(_) => {
                status.sink_uri = Some(sink_uri);
                status.mark_pull_subscription_ready();
            }
            Err(source) => {
                status.mark_pull_subscription_not_ready(
                    REASON_INVALID_SINK_URI,
                    &format!("Sink URI {sink_uri:?} is invalid: {source}"),
                );
                return Err(Error::InvalidSinkUri {
                    uri: sink_uri,
                    source,
                });
            }
        }

        // Notification
        match self.reconcile_notification(scheduler, status).await {
            Ok(result) => {
                status.notification_id = Some(result.notification_id);
                if !result.project_id.is_empty() {
                    status.project_id = Some(result.project_id);
                }
                status.mark_notification_ready();
                Ok(())
            }
            Err(e) => {
                info!("Failed to reconcile Scheduler notification: {}", e);
                status.mark_notification_not_ready(
                    reason_for(&e),
                    &format!("Failed to create Scheduler notification: {e}"),
                );
                Err(e)
            }
        }
    }

    async fn reconcile_notification(
        &self,
        scheduler: &Scheduler,
        status: &SchedulerStatus,
    ) -> Result<JobResult> {
        let args = self.notification_args(
            scheduler,
            JobAction::Create,
            status.project_id.clone().unwrap_or_default(),
            status.topic_id.clone(),
            None,
        )?;
        self.run_job(&args).await
    }

    /// Undo everything `converge` did, newest first: notification, Topic,
    /// PullSubscription, then the finalizer.
    async fn teardown(&self, scheduler: &Scheduler, status: &mut SchedulerStatus) -> Result<Pass> {
        let ns = scheduler.namespace().unwrap_or_default();
        let name = scheduler.name_any();
        if let Some(recorder) = &self.recorder {
            emit_info(
                recorder,
                scheduler,
                "DeleteRequested",
                "Deleting",
                Some(format!("Delete `{name}`")),
            )
            .await;
        }

        if let Err(e) = self.delete_notification(scheduler, status).await {
            info!("Unable to delete the Notification: {}", e);
            status.mark_notification_not_ready(
                REASON_NOTIFICATION_DELETE_FAILED,
                &format!("Failed to delete Scheduler notification: {e}"),
            );
            return Err(e);
        }

        if self.topics.delete(&ns, &name).await.inspect_err(|e| {
            info!("Unable to delete the Topic: {}", e);
        })? {
            info!("Deleted Topic {}/{}", ns, name);
        }
        status.topic_id = None;

        if self
            .pull_subscriptions
            .delete(&ns, &name)
            .await
            .inspect_err(|e| info!("Unable to delete the PullSubscription: {}", e))?
        {
            info!("Deleted PullSubscription {}/{}", ns, name);
        }

        remove_finalizer(self.schedulers.as_ref(), scheduler).await?;
        Ok(Pass::Finalized)
    }

    async fn delete_notification(
        &self,
        scheduler: &Scheduler,
        status: &mut SchedulerStatus,
    ) -> Result<()> {
        let Some(notification_id) = status.notification_id.clone().filter(|n| !n.is_empty())
        else {
            return Ok(());
        };
        let project_id = scheduler
            .spec
            .project
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| status.project_id.clone())
            .unwrap_or_default();
        let args = self.notification_args(
            scheduler,
            JobAction::Delete,
            project_id,
            None,
            Some(notification_id.clone()),
        )?;
        self.run_job(&args).await?;
        info!("Deleted Notification: {:?}", notification_id);
        status.notification_id = None;
        Ok(())
    }

    fn notification_args(
        &self,
        scheduler: &Scheduler,
        action: JobAction,
        project_id: String,
        topic_id: Option<String>,
        notification_id: Option<String>,
    ) -> Result<NotificationArgs> {
        let owner = scheduler_owner_ref(scheduler)?;
        Ok(NotificationArgs {
            uid: owner.uid.clone(),
            namespace: scheduler.namespace().unwrap_or_default(),
            owner,
            image: self.job_image.clone(),
            action,
            project_id,
            bucket: scheduler.spec.bucket.clone(),
            topic_id,
            notification_id,
            secret: scheduler.spec.secret_or_default(),
            backoff_limit: self.job_backoff_limit,
        })
    }

    /// Make sure the job for `args` exists and, once it succeeded, read its result.
    async fn run_job(&self, args: &NotificationArgs) -> Result<JobResult> {
        let job_name = notification_job_name(&args.uid, args.action);
        self.ensure_job(args).await.into_result(&job_name)?;

        let selector = job_pod_selector(&args.uid, args.action);
        let pods = self.pods.list(&args.namespace, &selector).await?;
        let pod = select_job_pod(pods)?;
        decode_pod_result(&pod)?.into_outcome()
    }

    /// Get the job, creating it when absent. Never errors: failures are phases.
    pub async fn ensure_job(&self, args: &NotificationArgs) -> JobPhase {
        let name = notification_job_name(&args.uid, args.action);
        match self.jobs.get(&args.namespace, &name).await {
            Err(e) => {
                debug!("Failed to get Job {}/{}: {}", args.namespace, name, e);
                JobPhase::GetFailed(e.to_string())
            }
            Ok(Some(job)) => {
                let phase = job_phase(&job);
                debug!("Job {}/{} is {:?}", args.namespace, name, phase);
                phase
            }
            Ok(None) => {
                debug!("Job {}/{} not found, creating", args.namespace, name);
                match self
                    .jobs
                    .create(&args.namespace, &make_notification_job(args))
                    .await
                {
                    Ok(_) => JobPhase::Created,
                    Err(Error::AlreadyExists(_)) => JobPhase::AlreadyCreated,
                    Err(e) => JobPhase::CreateFailed(e.to_string()),
                }
            }
        }
    }
}

/// Topic and project id of a ready topic that carries the expected topic name.
fn validate_topic(topic: &Topic, expected: &str) -> std::result::Result<(String, String), (Error, String)> {
    let topic_ref = format!("{}/{}", topic.namespace().unwrap_or_default(), topic.name_any());
    if !topic.is_ready() {
        return Err((Error::TopicNotReady, format!("Topic {topic_ref} not ready")));
    }
    let status = topic.status.clone().unwrap_or_default();
    let Some(project_id) = status.project_id.filter(|p| !p.is_empty()) else {
        return Err((
            Error::TopicMissingProjectId,
            format!("Topic {topic_ref} did not expose projectid"),
        ));
    };
    let Some(topic_id) = status.topic_id.filter(|t| !t.is_empty()) else {
        return Err((
            Error::TopicMissingTopicId,
            format!("Topic {topic_ref} did not expose topicid"),
        ));
    };
    if topic_id != expected {
        return Err((
            Error::TopicMismatch {
                expected: expected.to_string(),
                actual: topic_id.clone(),
            },
            format!("Topic {topic_ref} topic mismatch expected {expected:?} got {topic_id:?}"),
        ));
    }
    Ok((topic_id, project_id))
}
