mod cancellation;
mod config;
mod error;
mod events;
mod outcome;
mod scheduler;

pub use cancellation::CancellationRegistry;
pub use config::RuntimeConfig;
pub use error::SchedulerError;
pub use outcome::{RunOutcome, RunStatus};
pub use scheduler::Scheduler;
