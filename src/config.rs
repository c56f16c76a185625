use std::time::Duration;

use clap::{Parser, ValueEnum};
use duration_string::DurationString;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Settings of the controller process, from flags or the environment.
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Settings {
    /// Image of the job that creates and deletes notifications
    #[arg(long, env = "SCHEDULER_JOB_IMAGE")]
    pub job_image: String,

    /// Requeue delay while a dependency is still converging
    #[arg(long, env = "SCHEDULER_PENDING_REQUEUE", default_value = "10s")]
    pub pending_requeue: DurationString,

    /// Requeue delay after any other failure
    #[arg(long, env = "SCHEDULER_ERROR_REQUEUE", default_value = "5m")]
    pub error_requeue: DurationString,

    /// Retries of a failing notification job before it is marked failed
    #[arg(long, env = "SCHEDULER_JOB_BACKOFF_LIMIT", default_value_t = 3)]
    pub job_backoff_limit: i32,

    /// Address of the health and diagnostics server
    #[arg(long, env = "SCHEDULER_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl Settings {
    pub fn pending_requeue(&self) -> Duration {
        self.pending_requeue.into()
    }

    pub fn error_requeue(&self) -> Duration {
        self.error_requeue.into()
    }
}
