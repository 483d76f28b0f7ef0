pub mod dashboard;
pub mod health_probe;
pub mod poll_scheduler;

pub use dashboard::{Dashboard, DashboardHandle, DashboardSettings, RefreshOutcome};
pub use health_probe::{HealthProbe, HealthStatus};
pub use poll_scheduler::{Feed, PollScheduler, SchedulerState};
