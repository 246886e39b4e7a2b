/// Errors surfaced by the scheduler.
///
/// Data-path faults (corrupt words, credit exhaustion, tile contention) are
/// never errors; they are masked, dropped and counted. Only construction,
/// configuration and caller misuse end up here.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A round was driven with the wrong number of lane inputs.
    #[error("expected {expected} lane inputs, got {got}")]
    LaneCount { expected: usize, got: usize },

    /// Storage primitive error.
    #[error("ring error: {0}")]
    Ring(#[from] pktsched_ring::RingError),

    /// Word stream error.
    #[error("record error: {0}")]
    Record(#[from] pktsched_record::RecordError),

    /// Configuration file could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver gave up before the pipeline settled.
    #[error("pipeline did not settle within {0} rounds")]
    RoundLimit(u64),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
