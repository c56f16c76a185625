//! One-shot jobs that mutate external state on behalf of a Scheduler.

use std::fmt;

use k8s_openapi::api::{batch::v1::Job, core::v1::Pod};
use kube::ResourceExt;

use crate::{Error, Result};

pub mod notification;
pub mod result;

pub use notification::{NotificationArgs, make_notification_job, notification_job_name};
pub use result::JobResult;

/// Pod label carrying the UID of the object a job works for
pub static RESOURCE_UID_LABEL: &str = "resource-uid";
/// Pod label carrying the [`JobAction`]
pub static ACTION_LABEL: &str = "action";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobAction {
    Create,
    Delete,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Create => "create",
            JobAction::Delete => "delete",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a job stands after one `ensure` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobPhase {
    /// No job existed and one was created by this call
    Created,
    /// Creation raced with an existing job of the same name
    AlreadyCreated,
    Ongoing,
    CompletedSuccessful,
    CompletedFailed(String),
    CreateFailed(String),
    GetFailed(String),
}

impl JobPhase {
    /// Map a phase onto the outcome the reconciler acts on: `Ok(())` only once
    /// the job completed successfully.
    pub fn into_result(self, job_name: &str) -> Result<()> {
        match self {
            JobPhase::CompletedSuccessful => Ok(()),
            JobPhase::Created | JobPhase::AlreadyCreated | JobPhase::Ongoing => {
                Err(Error::JobNotCompleted(job_name.to_string()))
            }
            JobPhase::CompletedFailed(message) | JobPhase::CreateFailed(message) => {
                Err(Error::JobFailed {
                    name: job_name.to_string(),
                    message,
                })
            }
            JobPhase::GetFailed(message) => Err(Error::OtherError(message)),
        }
    }
}

fn has_condition(job: &Job, type_: &str) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == type_ && c.status == "True")
        })
}

/// A job is finished once it is either Complete or Failed.
pub fn is_job_finished(job: &Job) -> bool {
    has_condition(job, "Complete") || has_condition(job, "Failed")
}

pub fn is_job_failed(job: &Job) -> bool {
    has_condition(job, "Failed")
}

/// `[<reason>] <message>` of the Failed condition.
pub fn job_failed_message(job: &Job) -> String {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| {
            conds
                .iter()
                .find(|c| c.type_ == "Failed" && c.status == "True")
        })
        .map(|c| {
            format!(
                "[{}] {}",
                c.reason.clone().unwrap_or_default(),
                c.message.clone().unwrap_or_default()
            )
        })
        .unwrap_or_else(|| "job failed".to_string())
}

/// Phase of an existing job.
pub fn job_phase(job: &Job) -> JobPhase {
    if !is_job_finished(job) {
        JobPhase::Ongoing
    } else if is_job_failed(job) {
        JobPhase::CompletedFailed(job_failed_message(job))
    } else {
        JobPhase::CompletedSuccessful
    }
}

/// Label selector matching the pods of the job working on `uid` for `action`.
pub fn job_pod_selector(uid: &str, action: JobAction) -> String {
    format!("{RESOURCE_UID_LABEL}={uid},{ACTION_LABEL}={action}")
}

/// Pick the pod that ran the job to completion; with retries there may be several.
pub fn select_job_pod(pods: Vec<Pod>) -> Result<Pod> {
    let succeeded = pods.iter().position(|p| {
        p.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Succeeded")
    });
    pods.into_iter()
        .nth(succeeded.unwrap_or(0))
        .ok_or(Error::PodNotFound)
}

/// Termination message of the first container, empty when it has not terminated.
pub fn first_termination_message(pod: &Pod) -> String {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .and_then(|cs| cs.state.as_ref())
        .and_then(|state| state.terminated.as_ref())
        .and_then(|t| t.message.clone())
        .unwrap_or_default()
}

/// Decode the result a job pod left in its termination message.
pub fn decode_pod_result(pod: &Pod) -> Result<JobResult> {
    let message = first_termination_message(pod);
    if message.is_empty() {
        return Err(Error::TerminationMessageMissing(pod.name_any()));
    }
    JobResult::from_termination_message(&message)
}
