//! Error types for IIO operations.
//!
//! Every fallible operation in the workspace returns [`IioError`]. The
//! variants follow the failure taxonomy of the local backend:
//!
//! - **Resource**: the OS refused a descriptor, mapping or file
//!   ([`IioError::Io`], [`IioError::Attribute`], [`IioError::Busy`]).
//! - **Protocol**: sysfs content did not match the expected naming or format
//!   conventions ([`IioError::Protocol`], [`IioError::FileTooBig`]).
//! - **Transport**: waits that did not complete ([`IioError::WouldBlock`],
//!   [`IioError::TimedOut`], [`IioError::Cancelled`]).
//! - **Unsupported**: the kernel lacks a feature ([`IioError::NotSupported`],
//!   [`IioError::NotImplemented`]).
//!
//! Use [`IioError::kind`] when the category matters more than the detail.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for IIO operations.
pub type Result<T> = std::result::Result<T, IioError>;

/// Errors that can occur while discovering or streaming from IIO devices.
#[derive(Error, Debug)]
pub enum IioError {
    /// The kernel does not provide the requested facility.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// What was attempted.
        operation: String,
    },

    /// No strategy at all is available for the requested operation.
    #[error("Not implemented: {message}")]
    NotImplemented {
        /// What is missing.
        message: String,
    },

    /// Non-blocking operation found nothing ready.
    #[error("Operation would block")]
    WouldBlock,

    /// Blocking operation reached its deadline.
    #[error("Operation timed out after {timeout_ms} ms")]
    TimedOut {
        /// Timeout that expired, `0` when the kernel reported it.
        timeout_ms: u32,
    },

    /// The buffer was cancelled while waiting.
    #[error("Operation cancelled")]
    Cancelled,

    /// The descriptor is closed or invalid.
    #[error("Bad file descriptor")]
    BadDescriptor,

    /// Sysfs content violated the naming or format conventions.
    #[error("Protocol error in '{context}': {message}")]
    Protocol {
        /// Device, channel or file the content came from.
        context: String,
        /// What was wrong with it.
        message: String,
    },

    /// Something looked up by name does not exist.
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing item.
        what: String,
    },

    /// A directory or reference names a device that is not in the context.
    #[error("No such device: {id}")]
    NoSuchDevice {
        /// The unknown device reference.
        id: String,
    },

    /// Caller supplied an argument inconsistent with the current state.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Why the argument was rejected.
        message: String,
    },

    /// Resource is in use (e.g. buffer already opened by another process).
    #[error("Resource busy: {what}")]
    Busy {
        /// The contended resource.
        what: String,
    },

    /// Attribute file does not fit in the read buffer.
    #[error("Attribute '{path}' exceeds the {limit} byte read limit")]
    FileTooBig {
        /// Attribute file.
        path: PathBuf,
        /// Read limit in bytes.
        limit: usize,
    },

    /// Directory listing or entry metadata could not be read.
    #[error("Failed to scan directory '{path}': {source}")]
    Directory {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Attribute read or write failed.
    #[error("Attribute I/O on '{path}' failed: {source}")]
    Attribute {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// Loader message.
        message: String,
    },

    /// I/O error from the operating system
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse category of an [`IioError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The OS refused a descriptor, mapping or file.
    Resource,
    /// Sysfs content broke the naming or format conventions.
    Protocol,
    /// A wait did not complete.
    Transport,
    /// The kernel lacks a feature.
    Unsupported,
    /// The caller asked for something inconsistent or missing.
    Usage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Resource => "resource",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Transport => "transport",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Usage => "usage",
        };
        write!(f, "{}", label)
    }
}

impl IioError {
    /// Build a protocol error for the given device/channel context.
    pub fn protocol(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Build an unsupported-operation error.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Build an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Map a raw OS error into the taxonomy.
    ///
    /// Errors with a dedicated variant are converted; anything else stays an
    /// [`IioError::Io`].
    pub fn from_os(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EAGAIN) => Self::WouldBlock,
            Some(libc::ETIMEDOUT) => Self::TimedOut { timeout_ms: 0 },
            Some(libc::EBADF) => Self::BadDescriptor,
            Some(libc::ENOSYS) | Some(libc::ENOTTY) | Some(libc::EOPNOTSUPP) => {
                Self::NotSupported {
                    operation: err.to_string(),
                }
            }
            Some(libc::EBUSY) => Self::Busy {
                what: err.to_string(),
            },
            _ => Self::Io(err),
        }
    }

    /// Wrap an attribute I/O failure with its path.
    pub fn attribute(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Attribute {
            path: path.into(),
            source,
        }
    }

    /// The coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupported { .. } | Self::NotImplemented { .. } => ErrorKind::Unsupported,
            Self::WouldBlock | Self::TimedOut { .. } | Self::Cancelled => ErrorKind::Transport,
            Self::Protocol { .. } | Self::FileTooBig { .. } | Self::NoSuchDevice { .. } => {
                ErrorKind::Protocol
            }
            Self::InvalidArgument { .. } | Self::NotFound { .. } | Self::Config { .. } => {
                ErrorKind::Usage
            }
            Self::BadDescriptor
            | Self::Busy { .. }
            | Self::Directory { .. }
            | Self::Attribute { .. }
            | Self::Io(_) => ErrorKind::Resource,
        }
    }

    /// Whether the operation may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WouldBlock | Self::TimedOut { .. } | Self::Cancelled
        )
    }

    /// Whether the kernel lacks the requested facility.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }

    /// Whether this is a naming/format violation.
    pub fn is_protocol(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    /// Whether a file, attribute or device is missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::NoSuchDevice { .. } => true,
            Self::Attribute { source, .. } | Self::Directory { source, .. } | Self::Io(source) => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    /// Whether the OS denied access.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Attribute { source, .. } | Self::Directory { source, .. } | Self::Io(source) => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}
