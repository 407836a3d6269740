//! Error types for conntrack netlink operations.

use std::io;

/// Result type for conntrack netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading the connection tracking table.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on an already open channel.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The netlink channel could not be opened, or the kernel refused the
    /// dump request before sending any data.
    ///
    /// Opening the socket needs no privilege; a missing `CAP_NET_ADMIN` or an
    /// unloaded `nf_conntrack_netlink` only shows up as the error reply to
    /// the first request.
    #[error("netlink transport unavailable: {0}")]
    TransportUnavailable(#[source] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// A length or width field does not describe the buffer it sits in.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An attribute declares more payload than the buffer holds.
    #[error("truncated attribute: type {kind} declares {declared} bytes, {remaining} remaining")]
    TruncatedAttribute {
        /// Attribute type tag (flags masked).
        kind: u16,
        /// Length declared in the attribute header.
        declared: usize,
        /// Bytes actually left in the buffer.
        remaining: usize,
    },

    /// A mandatory attribute group is missing from a conntrack message.
    #[error("incomplete record: missing {0}")]
    IncompleteRecord(&'static str),

    /// The dump was cancelled before the kernel finished it.
    #[error("dump cancelled")]
    Cancelled,
}

impl Error {
    /// Create a kernel error from an errno value as found in `nlmsgerr`.
    ///
    /// The kernel reports negative errno values; the sign is normalized.
    pub fn from_errno(errno: i32) -> Self {
        let errno = errno.abs();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel { errno, message }
    }

    /// Classify an error reply that arrived before any data message.
    ///
    /// Permission errors and the codes nfnetlink returns for a subsystem it
    /// does not know become [`Error::TransportUnavailable`]; any other code
    /// is a plain kernel error.
    pub fn refused(errno: i32) -> Self {
        let errno = errno.abs();
        match errno {
            libc::EPERM | libc::EACCES | libc::EOPNOTSUPP | libc::EINVAL | libc::ENOENT => {
                Self::TransportUnavailable(io::Error::from_raw_os_error(errno))
            }
            _ => Self::from_errno(errno),
        }
    }

    /// Whether this error is confined to a single record.
    ///
    /// Record errors are skipped by the table enumerator; everything else
    /// fails the whole dump.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage(_) | Self::TruncatedAttribute { .. } | Self::IncompleteRecord(_)
        )
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, 1 | 13),
            Self::TransportUnavailable(e) | Self::Io(e) => {
                e.kind() == io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-1); // EPERM
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(1));
    }

    #[test]
    fn test_from_positive_errno() {
        let err = Error::from_errno(2); // ENOENT
        assert_eq!(err.errno(), Some(2));
        assert!(err.to_string().contains("No such file or directory"));
    }

    #[test]
    fn test_record_errors() {
        assert!(Error::MalformedMessage("x".into()).is_record_error());
        assert!(Error::IncompleteRecord("reply tuple").is_record_error());
        assert!(
            Error::TruncatedAttribute {
                kind: 1,
                declared: 12,
                remaining: 4
            }
            .is_record_error()
        );
        assert!(!Error::from_errno(-16).is_record_error());
        assert!(!Error::Cancelled.is_record_error());
        assert!(
            !Error::TransportUnavailable(io::Error::from(io::ErrorKind::PermissionDenied))
                .is_record_error()
        );
    }

    #[test]
    fn test_transport_permission() {
        let err = Error::TransportUnavailable(io::Error::from_raw_os_error(libc::EPERM));
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), None);
    }

    #[test]
    fn test_refused_request() {
        let err = Error::refused(-libc::EPERM);
        assert!(matches!(err, Error::TransportUnavailable(_)));
        assert!(err.is_permission_denied());

        for errno in [libc::EOPNOTSUPP, libc::EINVAL, libc::ENOENT] {
            assert!(matches!(Error::refused(-errno), Error::TransportUnavailable(_)));
        }
        assert_eq!(Error::refused(-libc::ENOMEM).errno(), Some(libc::ENOMEM));
    }

    #[test]
    fn test_error_messages() {
        let err = Error::IncompleteRecord("counters");
        assert_eq!(err.to_string(), "incomplete record: missing counters");

        let err = Error::TruncatedAttribute {
            kind: 2,
            declared: 20,
            remaining: 8,
        };
        assert_eq!(
            err.to_string(),
            "truncated attribute: type 2 declares 20 bytes, 8 remaining"
        );
    }
}
