//! Result protocol between a notification job and the reconciler.
//!
//! The job writes exactly one JSON document to its termination message, which the
//! kubelet copies into the terminated state of the container:
//!
//! ```json
//! {"result": true, "error": "", "notificationId": "135", "projectId": "my-project"}
//! ```
//!
//! `result` is always written and required when decoding; the string fields are
//! omitted when empty. This is revision [`PROTOCOL_VERSION`] of the contract.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const PROTOCOL_VERSION: u32 = 1;

/// Default `terminationMessagePath` of a container.
pub static TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";

/// The kubelet truncates termination messages beyond this size.
pub const MAX_TERMINATION_MESSAGE_BYTES: usize = 4096;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(rename = "result")]
    pub success: bool,
    #[serde(rename = "error", default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notification_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
}

impl JobResult {
    pub fn succeeded(notification_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            success: true,
            notification_id: notification_id.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn failed(error_message: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: error_message.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn from_termination_message(message: &str) -> Result<Self> {
        serde_json::from_str(message).map_err(|e| Error::MalformedResult(e.to_string()))
    }

    /// Turn a reported failure into the error the job gave.
    pub fn into_outcome(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::JobReported(self.error_message))
        }
    }

    pub fn to_termination_message(&self) -> Result<String> {
        let message = serde_json::to_string(self).map_err(Error::SerializationError)?;
        if message.len() > MAX_TERMINATION_MESSAGE_BYTES {
            return Err(Error::ResultTooLarge(
                message.len(),
                MAX_TERMINATION_MESSAGE_BYTES,
            ));
        }
        Ok(message)
    }

    /// Used by the job executable, normally with [`TERMINATION_MESSAGE_PATH`].
    pub fn write_termination_message(&self, path: impl AsRef<Path>) -> Result<()> {
        let message = self.to_termination_message()?;
        std::fs::write(path, message).map_err(Error::IoError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_round_trips_through_termination_message() {
        let sent = JobResult::succeeded("135", "test-project-id");
        let message = sent.to_termination_message().unwrap();
        assert_eq!(
            message,
            r#"{"result":true,"notificationId":"135","projectId":"test-project-id"}"#
        );
        let received = JobResult::from_termination_message(&message)
            .unwrap()
            .into_outcome()
            .unwrap();
        assert_eq!(received.notification_id, "135");
        assert_eq!(received.project_id, "test-project-id");
    }

    #[test]
    fn failure_keeps_result_field() {
        let message = JobResult::failed("test induced failure", "p")
            .to_termination_message()
            .unwrap();
        assert!(message.contains(r#""result":false"#));
        let err = JobResult::from_termination_message(&message)
            .unwrap()
            .into_outcome()
            .unwrap_err();
        assert_eq!(err.to_string(), "test induced failure");
    }

    #[test]
    fn result_field_is_required() {
        let err = JobResult::from_termination_message(r#"{"notificationId":"1"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResult(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = JobResult::from_termination_message("invalid msg").unwrap_err();
        assert!(
            err.to_string()
                .starts_with("failed to unmarshal terminationmessage:")
        );
    }

    #[test]
    fn oversized_result_is_rejected() {
        let huge = JobResult::failed("x".repeat(MAX_TERMINATION_MESSAGE_BYTES), "");
        assert!(matches!(
            huge.to_termination_message(),
            Err(Error::ResultTooLarge(_, MAX_TERMINATION_MESSAGE_BYTES))
        ));
    }
}
