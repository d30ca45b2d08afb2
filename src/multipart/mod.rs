//! Concurrent multipart upload / 并发分片上传

pub mod coordinator;
pub mod planner;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{UploadCoordinator, UploadOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};
pub use planner::{
    determine_part_size, plan_parts, PartLimits, PartPlan, PartTask, DEFAULT_PART_SIZE, MAX_PART_COUNT,
    MAX_PART_SIZE, MIN_PART_SIZE,
};
pub use session::{PartOutcome, PartResult, SessionStatus, UploadSession};
pub use source::{BytesSource, FileSource, PartSource};
