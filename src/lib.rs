//! Artist Stats Harvester Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod archive;
pub mod auth;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod store;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use errors::HarvestError;
pub use pipeline::HarvestPipeline;
pub use scheduler::{ScheduleConfig, Scheduler};
