//! Error types.

use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while monitoring bonds.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code on the netlink channel.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid netlink message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid netlink attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Interface does not exist.
    #[error("interface not found: {name}")]
    InterfaceNotFound {
        /// The interface name that was not found.
        name: String,
    },

    /// Interface exists but is not a monitorable bond.
    #[error("Invalid interface type: {name}: {reason}")]
    InvalidInterfaceType {
        /// The offending interface.
        name: String,
        /// Which qualification check failed.
        reason: String,
    },

    /// Auto-detection found nothing to monitor.
    #[error("No usable bonds detected")]
    NoUsableBonds,

    /// A message type the link multicast group never carries.
    #[error("unexpected message type {msg_type} on the link event channel")]
    UnexpectedEvent {
        /// The offending nlmsg_type.
        msg_type: u16,
    },

    /// No process holds the write lock on the ovs-vswitchd pid file.
    #[error("ovs-vswitchd is not running (no write lock on {path})")]
    OvsNotRunning {
        /// The pid file that was checked.
        path: String,
    },

    /// The OVS control daemon reported an error or broke the connection.
    #[error("OVS control request failed: {0}")]
    OvsRpc(String),

    /// A JSON-RPC reply grew past the receive buffer.
    #[error("OVS reply exceeds {limit} bytes")]
    OvsReplyTooLarge {
        /// The buffer limit that was hit.
        limit: usize,
    },

    /// The OVS daemon replied with text this crate cannot interpret.
    #[error("malformed OVS reply: {0}")]
    OvsParse(String),

    /// JSON (de)serialization error on the OVS control socket.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a kernel error from a (negative) errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, libc::ENOENT | libc::ENODEV),
            Self::InterfaceNotFound { .. } => true,
            _ => false,
        }
    }

    /// Errors that must end the process even when raised inside a
    /// per-bond recovery run. The OVS control plane is shared state;
    /// once it misbehaves, every subsequent recovery would too.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OvsNotRunning { .. }
                | Self::OvsRpc(_)
                | Self::OvsReplyTooLarge { .. }
                | Self::OvsParse(_)
                | Self::Json(_)
                | Self::UnexpectedEvent { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-libc::ENODEV);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("errno 19"));
    }

    #[test]
    fn test_invalid_type_message() {
        let err = Error::InvalidInterfaceType {
            name: "eth0".into(),
            reason: "not a bond".into(),
        };
        assert!(err.to_string().starts_with("Invalid interface type"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::OvsParse("junk".into()).is_fatal());
        assert!(!Error::from_errno(-libc::EAGAIN).is_fatal());
        assert!(!Error::Io(io::Error::other("transient")).is_fatal());
    }
}
