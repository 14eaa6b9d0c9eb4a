//! Shared status-kind vocabulary and error type used across every Dive crate.
//!
//! There is no cross-component exception channel: every fallible operation in
//! this workspace returns `dive_proto::Result<T>`, and every failure carries
//! one of the [`StatusCode`] kinds below.

use std::fmt;

/// The status-code vocabulary shared by every component in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    OutOfRange,
    ResourceExhausted,
    Unavailable,
    Aborted,
    PermissionDenied,
    DataLoss,
    Internal,
    Unimplemented,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Ok => "ok",
            StatusCode::Cancelled => "cancelled",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::OutOfRange => "out_of_range",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::Unavailable => "unavailable",
            StatusCode::Aborted => "aborted",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::DataLoss => "data_loss",
            StatusCode::Internal => "internal",
            StatusCode::Unimplemented => "unimplemented",
        };
        f.write_str(s)
    }
}

/// The one error type returned by every fallible operation in the core.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct DiveError {
    pub code: StatusCode,
    pub message: String,
}

impl DiveError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }
}

macro_rules! status_ctor {
    ($name:ident, $code:ident) => {
        pub fn $name(message: impl Into<String>) -> Self {
            Self::new(StatusCode::$code, message)
        }
    };
}

impl DiveError {
    status_ctor!(cancelled, Cancelled);
    status_ctor!(invalid_argument, InvalidArgument);
    status_ctor!(deadline_exceeded, DeadlineExceeded);
    status_ctor!(not_found, NotFound);
    status_ctor!(already_exists, AlreadyExists);
    status_ctor!(failed_precondition, FailedPrecondition);
    status_ctor!(out_of_range, OutOfRange);
    status_ctor!(resource_exhausted, ResourceExhausted);
    status_ctor!(unavailable, Unavailable);
    status_ctor!(aborted, Aborted);
    status_ctor!(permission_denied, PermissionDenied);
    status_ctor!(data_loss, DataLoss);
    status_ctor!(internal, Internal);
    status_ctor!(unimplemented, Unimplemented);
}

impl From<std::io::Error> for DiveError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::NotFound => StatusCode::NotFound,
            ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
            ErrorKind::WouldBlock => StatusCode::Unavailable,
            ErrorKind::TimedOut => StatusCode::DeadlineExceeded,
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted => {
                StatusCode::Aborted
            }
            ErrorKind::UnexpectedEof => StatusCode::OutOfRange,
            ErrorKind::AlreadyExists => StatusCode::AlreadyExists,
            _ => StatusCode::Internal,
        };
        DiveError::new(code, err.to_string())
    }
}

impl From<std::num::ParseIntError> for DiveError {
    fn from(err: std::num::ParseIntError) -> Self {
        DiveError::invalid_argument(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for DiveError {
    fn from(err: std::num::ParseFloatError) -> Self {
        DiveError::invalid_argument(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for DiveError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DiveError::invalid_argument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_snake_case_name() {
        assert_eq!(StatusCode::OutOfRange.to_string(), "out_of_range");
        assert_eq!(StatusCode::Ok.to_string(), "ok");
    }

    #[test]
    fn io_would_block_maps_to_unavailable() {
        let io_err = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        let err: DiveError = io_err.into();
        assert_eq!(err.code(), StatusCode::Unavailable);
    }

    #[test]
    fn io_unexpected_eof_maps_to_out_of_range() {
        let io_err = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        let err: DiveError = io_err.into();
        assert_eq!(err.code(), StatusCode::OutOfRange);
    }
}
