use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

pub mod pubsub;
pub mod scheduler;

pub use pubsub::{PropagationPolicy, PullSubscription, PullSubscriptionSpec, PullSubscriptionStatus, Topic, TopicSpec, TopicStatus};
pub use scheduler::{Scheduler, SchedulerSpec, SchedulerStatus};

pub static DEFAULT_SECRET_NAME: &str = "google-cloud-key";
pub static DEFAULT_SECRET_KEY: &str = "key.json";

/// Reference to a key inside a Secret in the object's namespace.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

impl Default for SecretKeySelector {
    fn default() -> Self {
        Self {
            name: DEFAULT_SECRET_NAME.to_string(),
            key: DEFAULT_SECRET_KEY.to_string(),
        }
    }
}

/// Where events are delivered: either an addressable object or a literal URI.
#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(rename = "ref")]
    pub reference: Option<SinkReference>,
    pub uri: Option<String>,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SinkReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

/// Extra CloudEvent attributes stamped on every event emitted for the source.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudEventOverrides {
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

/// A readiness condition as exposed on every status in this API group.
#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// One of `True`, `False`, `Unknown`
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    /// RFC 3339 timestamp of the last status flip
    pub last_transition_time: Option<String>,
}
