//! The long-running worker: configuration, the scheduling loop and its status endpoint.

pub mod config;
pub mod http;
pub mod scheduler;

pub use config::{ConfigError, WorkerConfig};
pub use http::{create_status_router, StatusState};
pub use scheduler::{CycleReport, Scheduler, SchedulerOptions, SchedulerStats};
