//! Error types for the sockets facility

use core::fmt;

/// Result type for socket operations
pub type SockResult<T> = Result<T, SockError>;

/// Errors that can occur in socket operations.
///
/// Read failures observed inside the reactor worker never surface here;
/// they are delivered to callbacks as zero-length payloads instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockError {
    /// Operation requires a connected socket
    NotConnected,

    /// Hostname/port resolution failed
    Resolve(String),

    /// Resolution succeeded but no address matched the requested family
    NoMatchingAddress,

    /// The peer closed the connection
    Closed,

    /// OS-level error (raw errno)
    Os(i32),
}

impl SockError {
    /// Capture the calling thread's last OS error.
    pub fn last_os() -> Self {
        SockError::Os(std::io::Error::last_os_error().raw_os_error().unwrap_or(-1))
    }

    /// The raw errno, if this is an OS-level error.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            SockError::Os(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for SockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SockError::NotConnected => write!(f, "socket not connected"),
            SockError::Resolve(what) => write!(f, "failed to resolve {}", what),
            SockError::NoMatchingAddress => write!(f, "no address matched the requested family"),
            SockError::Closed => write!(f, "connection closed by peer"),
            SockError::Os(code) => {
                write!(f, "os error {}: {}", code, std::io::Error::from_raw_os_error(*code))
            }
        }
    }
}

impl std::error::Error for SockError {}

impl From<std::io::Error> for SockError {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => SockError::Os(code),
            None => SockError::Os(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SockError::NotConnected.to_string(), "socket not connected");
        assert_eq!(
            SockError::Resolve("example.invalid:80".into()).to_string(),
            "failed to resolve example.invalid:80"
        );
        assert!(SockError::Os(111).to_string().starts_with("os error 111"));
    }

    #[test]
    fn test_os_code() {
        assert_eq!(SockError::Os(11).os_code(), Some(11));
        assert_eq!(SockError::Closed.os_code(), None);
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::from_raw_os_error(111);
        assert_eq!(SockError::from(io), SockError::Os(111));
    }
}
