use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("IO Error: {0}")]
    IoError(#[source] std::io::Error),

    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("topic not ready")]
    TopicNotReady,

    #[error("topic did not expose projectid")]
    TopicMissingProjectId,

    #[error("topic did not expose topicid")]
    TopicMissingTopicId,

    #[error("topic did not match expected: {expected:?} got: {actual:?}")]
    TopicMismatch { expected: String, actual: String },

    #[error("PullSubscription not ready")]
    PullSubscriptionNotReady,

    #[error("failed to parse url {uri:?} : {source}")]
    InvalidSinkUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Job {0:?} has not completed yet")]
    JobNotCompleted(String),

    #[error("Job {name:?} failed to create or job failed: {message}")]
    JobFailed { name: String, message: String },

    #[error("Pod not found")]
    PodNotFound,

    #[error("did not find termination message for pod {0:?}")]
    TerminationMessageMissing(String),

    #[error("failed to unmarshal terminationmessage: {0:?}")]
    MalformedResult(String),

    #[error("termination message is {0} bytes, limit is {1}")]
    ResultTooLarge(usize, usize),

    /// Failure reported by the job itself through its result payload
    #[error("{0}")]
    JobReported(String),

    /// NB: this is a catch-all for any other errors
    #[error("Other Error: {0}")]
    OtherError(String),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Errors that mean "a dependency is still converging" rather than "something broke".
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Error::TopicNotReady | Error::PullSubscriptionNotReady | Error::JobNotCompleted(_)
        )
    }
}

pub mod conditions;
pub mod config;
pub mod crd;
pub mod events_helper;
pub mod operations;
pub mod scheduler_controller;
pub mod store;

/// Log and trace integrations
pub mod telemetry;
