//! Operation outcomes.
//!
//! Every public operation of the manager reports through a [`Status`]
//! rather than a `Result`: expected failures (conflicts, refusals, timeouts)
//! are values the caller inspects, not errors to propagate.

use std::fmt;

/// Outcome category of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    /// Identity collision or nothing installable.
    Conflict,
    /// Invalid request content.
    BadRequest,
    /// Refused by current manager state.
    NotAcceptable,
    /// A distributed request did not complete in time.
    Timeout,
    InternalError,
    NotFound,
    /// No status was produced.
    Undefined,
    /// The device removed the entry on its own.
    Gone,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusCode::Success => "Success",
            StatusCode::Conflict => "Conflict",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotAcceptable => "Not Acceptable",
            StatusCode::Timeout => "Request Timeout",
            StatusCode::InternalError => "Internal Error",
            StatusCode::NotFound => "Not Found",
            StatusCode::Undefined => "Undefined Error",
            StatusCode::Gone => "Resource Gone",
        };
        f.write_str(text)
    }
}

/// Result of a flow operation, with the device request id when one was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    description: Option<String>,
    request_id: u64,
}

impl Status {
    pub fn new(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
            request_id: 0,
        }
    }

    pub fn success() -> Self {
        Self::from(StatusCode::Success)
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// The description, or the code's name when none was given.
    pub fn description(&self) -> String {
        match &self.description {
            Some(d) => d.clone(),
            None => self.code.to_string(),
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Self {
            code,
            description: None,
            request_id: 0,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "{}: {}", self.code, d),
            None => write!(f, "{}", self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_falls_back_to_code() {
        assert_eq!(Status::success().description(), "Success");
        assert_eq!(
            Status::new(StatusCode::Conflict, "taken").to_string(),
            "Conflict: taken"
        );
    }

    #[test]
    fn test_request_id_carried() {
        let status = Status::success().with_request_id(42);
        assert!(status.is_success());
        assert_eq!(status.request_id(), 42);
    }
}
