//! Error kinds for flowcc operations

use strum_macros::{Display, IntoStaticStr};

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, Display)]
#[non_exhaustive]
pub enum ErrorKind {
    // Input
    /// The parser could not produce a tree
    ParseFailed,
    /// The tree contains syntax errors
    SyntaxError,
    /// Source is not valid UTF-8
    EncodingError,

    // Caller supplied options
    /// Config file or value that cannot be used
    ConfigInvalid,
    /// Entry selection missing a name it needs
    InvalidArgument,
    /// Requested entry function, class or method does not exist
    EntryNotFound,

    // Files
    FileNotFound,
    PermissionDenied,
    IoFailed,

    // Output
    SerializationFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// Only plain I/O failures may go away on a second try; everything else
    /// is a property of the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::IoFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::ParseFailed.to_string(), "ParseFailed");
        assert_eq!(ErrorKind::EntryNotFound.as_str(), "EntryNotFound");
    }

    #[test]
    fn test_only_io_retries() {
        assert!(ErrorKind::IoFailed.is_retryable());
        assert!(!ErrorKind::SyntaxError.is_retryable());
        assert!(!ErrorKind::FileNotFound.is_retryable());
    }
}
