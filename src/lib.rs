pub mod bake;
pub mod config;
pub mod error;
pub mod math;
pub mod protocol;
pub mod scheduler;
pub mod transport;
pub mod worker;

pub use bake::{BakeJob, CookieImage, CpuKernel, SampleKernel};
pub use config::WorkerConfig;
pub use error::{CookieBakerError, InvalidWorkload};
pub use protocol::{Message, WorkloadId, WorkloadRequest};
pub use scheduler::{FinishedBake, Scheduler, TickOutcome};
pub use worker::Worker;
