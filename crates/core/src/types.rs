use uuid::Uuid;

/// Identifier assigned to every admitted generation job.
pub type JobId = Uuid;

/// Allocate a fresh job identifier.
pub fn new_job_id() -> JobId {
    Uuid::new_v4()
}
