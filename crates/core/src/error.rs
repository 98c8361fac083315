use std::fmt;

/// The canonical error kinds the engine raises, independent of any transport.
///
/// Mirrors the mapping a router sits on top of: each kind carries its own HTTP status,
/// but the core never constructs an HTTP response itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Schema mismatch, malformed TAI string, unknown transport-file type, unknown
    /// parameter key in a patch.
    Validation,
    /// Unknown transceiver id.
    NotFound,
    /// The transceiver's transport is not exposed under the requested API version.
    NotSupportedForVersion,
    /// A write was attempted while the transceiver (or one if its targets) is armed.
    StagedLocked,
    /// `add_sender`/`add_receiver` called with an id that is already registered.
    DuplicateRegistration,
    /// The driver's `activate` callback failed; `active` has been rolled back.
    CallbackFailure,
    /// An activation is already armed and the caller didn't first send `mode=null`.
    Conflict,
}

impl ErrorKind {
    /// The HTTP status an external router should map this kind to.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::NotSupportedForVersion => 409,
            ErrorKind::StagedLocked => 423,
            ErrorKind::DuplicateRegistration => 409,
            ErrorKind::CallbackFailure => 500,
            ErrorKind::Conflict => 409,
        }
    }
}

/// An error carrying the information needed to render a response, without depending on
/// any particular HTTP stack.
///
/// Modelled after the `{status, error}` pair used in larger collaborators: a status-bearing
/// wrapper around an optional lower-level cause.
#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ErrorKind,
    pub message: String,
    /// For `NotSupportedForVersion`: the highest API version that does support the
    /// transceiver's transport, so the caller can build a `Location` header.
    pub redirect_version: Option<&'static str>,
}

impl ConnectionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            redirect_version: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn staged_locked() -> Self {
        Self::new(ErrorKind::StagedLocked, "staged parameters are locked")
    }

    pub fn duplicate_registration(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::DuplicateRegistration,
            format!("transceiver '{id}' is already registered"),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn not_supported_for_version(message: impl Into<String>, redirect: &'static str) -> Self {
        Self {
            kind: ErrorKind::NotSupportedForVersion,
            message: message.into(),
            redirect_version: Some(redirect),
        }
    }

    pub fn callback_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CallbackFailure, message)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConnectionError {}

pub type Result<T> = std::result::Result<T, ConnectionError>;
