use std::fmt;
use std::io;

/// TFTP error codes.
///
/// Codes 0-7 are the RFC 1350 set; 8-10 are the server's own codes for
/// request validation failures, reported to the peer like any other.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileExists = 6,
    NoSuchUser = 7,
    FilenameTooLong = 8,
    FormatError = 9,
    UnknownMode = 10,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Canonical message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::NotDefined => "",
            Self::FileNotFound => "file not found",
            Self::AccessViolation => "access violation",
            Self::DiskFull => "disk full",
            Self::IllegalOperation => "illegal TFTP operation",
            Self::UnknownTransferId => "unknown transfer ID",
            Self::FileExists => "file already exists",
            Self::NoSuchUser => "no such user",
            Self::FilenameTooLong => "file name too long",
            Self::FormatError => "format error",
            Self::UnknownMode => "unknown mode",
        }
    }
}

/// A protocol-level error, as carried by an ERROR packet.
///
/// Emitting one of these on the wire is always terminal for the transfer
/// it belongs to. Handler errors that are not already a `ProtocolError`
/// are coerced to the not-defined code with the original error's text.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    code: ErrorCode,
    message: String,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build an error carrying the canonical message for `code`.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }

    /// Wrap an arbitrary message under the not-defined code.
    pub fn not_defined(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotDefined, message)
    }

    pub fn file_not_found() -> Self {
        Self::from_code(ErrorCode::FileNotFound)
    }

    pub fn access_violation() -> Self {
        Self::from_code(ErrorCode::AccessViolation)
    }

    pub fn disk_full() -> Self {
        Self::from_code(ErrorCode::DiskFull)
    }

    pub fn illegal_operation() -> Self {
        Self::from_code(ErrorCode::IllegalOperation)
    }

    pub fn unknown_transfer_id() -> Self {
        Self::from_code(ErrorCode::UnknownTransferId)
    }

    pub fn file_exists() -> Self {
        Self::from_code(ErrorCode::FileExists)
    }

    pub fn no_such_user() -> Self {
        Self::from_code(ErrorCode::NoSuchUser)
    }

    pub fn filename_too_long() -> Self {
        Self::from_code(ErrorCode::FilenameTooLong)
    }

    pub fn format_error() -> Self {
        Self::from_code(ErrorCode::FormatError)
    }

    pub fn unknown_mode() -> Self {
        Self::from_code(ErrorCode::UnknownMode)
    }

    /// Wire error code.
    pub fn code(&self) -> u16 {
        self.code.as_u16()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Map a storage-layer failure onto the protocol error set.
    ///
    /// Used by file-serving handlers; the engine itself never calls this.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(),
            io::ErrorKind::PermissionDenied => Self::access_violation(),
            _ => Self::not_defined(err.to_string()),
        }
    }

    /// Coerce an arbitrary handler error into a `ProtocolError`.
    ///
    /// The first `ProtocolError` anywhere in the chain wins; anything
    /// else becomes not-defined carrying the error's text. The peer sees
    /// that text verbatim, matching the original behavior.
    ///
    /// `io::Error` hides its custom payload from `source()`, so each
    /// link is also inspected as an `io::Error` wrapper.
    pub fn coerce(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| {
                cause.downcast_ref::<ProtocolError>().or_else(|| {
                    cause
                        .downcast_ref::<io::Error>()
                        .and_then(|e| e.get_ref())
                        .and_then(|inner| inner.downcast_ref::<ProtocolError>())
                })
            })
            .cloned()
            .unwrap_or_else(|| Self::not_defined(err.to_string()))
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TFTP error {}: {}", self.code.as_u16(), self.message)
    }
}

impl std::error::Error for ProtocolError {}

impl From<ProtocolError> for io::Error {
    fn from(err: ProtocolError) -> Self {
        io::Error::other(err)
    }
}
