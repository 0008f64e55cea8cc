use serde::Serialize;
use std::fmt;

/// Machine-readable error identifier, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    BadRequest,
    NotFound,
    Conflict,
    StoreUnavailable,
    Config,
    Protocol,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorCode::Config => "CONFIG",
            ErrorCode::Protocol => "PROTOCOL",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ErrorCode::Validation => 1001,
            ErrorCode::BadRequest => 1002,
            ErrorCode::NotFound => 1003,
            ErrorCode::Conflict => 1004,
            ErrorCode::StoreUnavailable => 2001,
            ErrorCode::Config => 3001,
            ErrorCode::Protocol => 4001,
            ErrorCode::Internal => 9001,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::StoreUnavailable.code(), 2001);
        assert_eq!(ErrorCode::NotFound.as_str(), "NOT_FOUND");
    }
}
