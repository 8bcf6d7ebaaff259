/// Errors a generation request can end with.
///
/// Every variant is a terminal outcome for its request; nothing in the
/// pipeline retries.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The request body does not satisfy the request schema.
    #[error("{0}")]
    Validation(String),

    /// The job queue already holds `max` jobs.
    #[error("Job queue is full ({max} jobs). Try again later.")]
    QueueFull { max: usize },

    /// The backend ran the workflow and reported failure. Carries the
    /// backend's error output verbatim.
    #[error("{0}")]
    Backend(String),

    /// The backend finished but no output file showed up in time.
    #[error("Image not generated in time (waited {waited_ms}ms)")]
    GenerationTimeout { waited_ms: u64 },

    /// The workflow template does not have the expected shape.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Filesystem or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
