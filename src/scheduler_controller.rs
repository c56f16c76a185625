//! Controller for [`Scheduler`](crate::crd::Scheduler) objects.

pub mod finalizer;
mod main;
pub mod reconcile;
pub mod resources;

pub use finalizer::SCHEDULER_FINALIZER;
pub use main::*;
pub use reconcile::{Pass, Reconciler, split_key};

/// Name the controller reports events under
pub static SCHEDULER_CONTROLLER_NAME: &str = "cloud-run-events-scheduler-source-controller";
