use std::fmt;

use crate::ErrorKind;

/// Whether running again with the same input could succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorStatus {
    #[default]
    Permanent,
    /// A flaky read or write.
    Temporary,
}

impl ErrorStatus {
    pub fn of(kind: ErrorKind) -> Self {
        if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        }
    }

    pub fn is_retryable(&self) -> bool {
        *self == ErrorStatus::Temporary
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of_kind() {
        assert_eq!(ErrorStatus::of(ErrorKind::IoFailed), ErrorStatus::Temporary);
        assert_eq!(ErrorStatus::of(ErrorKind::SyntaxError), ErrorStatus::Permanent);
        assert_eq!(ErrorStatus::Temporary.to_string(), "temporary");
    }
}
