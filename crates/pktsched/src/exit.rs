use std::fmt;
use std::io;

use pktsched_core::SchedulerError;
use pktsched_record::RecordError;

// Exit code constants aligned with sysexits semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// The run was interrupted before the pipeline settled.
pub const INTERRUPTED: i32 = 130;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn record_error(context: &str, err: RecordError) -> CliError {
    match err {
        RecordError::Io(source) => io_error(context, source),
        RecordError::InvalidMagic | RecordError::InvalidFlags(_) | RecordError::StreamClosed => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn scheduler_error(context: &str, err: SchedulerError) -> CliError {
    match err {
        SchedulerError::Io(source) => io_error(context, source),
        SchedulerError::Record(err) => record_error(context, err),
        SchedulerError::InvalidConfig(_) | SchedulerError::Json(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        SchedulerError::LaneCount { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        SchedulerError::RoundLimit(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_usage_errors() {
        let err = scheduler_error(
            "load config",
            SchedulerError::InvalidConfig("tiles must be at least 2".into()),
        );
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("load config: "));
    }

    #[test]
    fn corrupt_streams_are_data_errors() {
        let err = scheduler_error("read lane 0", SchedulerError::Record(RecordError::InvalidMagic));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn missing_files_are_usage_errors() {
        let err = record_error(
            "open",
            RecordError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")),
        );
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn settle_timeout_maps_to_124() {
        assert_eq!(scheduler_error("run", SchedulerError::RoundLimit(9)).code, TIMEOUT);
    }
}
