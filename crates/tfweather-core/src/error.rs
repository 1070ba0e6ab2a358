// ── Core error types ──
//
// Errors surfaced by tfweather-core. Consumers never match on raw
// transport variants; the `From<tfweather_api::Error>` impl folds them
// into connection, timeout and device failures.

use thiserror::Error;

use crate::model::Role;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to bus at {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("Bus not connected")]
    NotConnected,

    #[error("Bus request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Failed to bind {role} {uid}: {source}")]
    Bind {
        role: Role,
        uid: String,
        #[source]
        source: Box<CoreError>,
    },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap a failure that happened while binding `role`.
    pub(crate) fn bind(role: Role, uid: &str, source: CoreError) -> Self {
        Self::Bind {
            role,
            uid: uid.to_owned(),
            source: Box::new(source),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tfweather_api::Error> for CoreError {
    fn from(err: tfweather_api::Error) -> Self {
        use tfweather_api::Error as Api;

        match err {
            Api::Io(e) => CoreError::ConnectionFailed {
                addr: String::new(),
                reason: e.to_string(),
            },
            Api::NotConnected => CoreError::NotConnected,
            Api::AlreadyConnected => CoreError::Internal("connect called twice".into()),
            Api::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            Api::MalformedPacket(message) => CoreError::ConnectionFailed {
                addr: String::new(),
                reason: format!("malformed packet: {message}"),
            },
            e @ (Api::PayloadTooLarge { .. }
            | Api::InvalidUid(_)
            | Api::InvalidParameter { .. }
            | Api::FunctionNotSupported { .. }
            | Api::DeviceError { .. }) => CoreError::Device { message: e.to_string() },
        }
    }
}
