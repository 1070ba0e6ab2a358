use thiserror::Error;

/// Top-level error type for the `tfweather-api` crate.
///
/// Covers every failure mode of the brickd transport: socket I/O,
/// framing, request timeouts, and error codes reported by a bricklet.
/// `tfweather-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Socket-level failure (connection refused, reset, DNS, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No socket is open (never connected, or the link just dropped).
    #[error("Not connected to brickd")]
    NotConnected,

    /// `connect()` called while a connection is already up.
    #[error("Already connected to brickd")]
    AlreadyConnected,

    /// No response arrived within the request timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Framing ─────────────────────────────────────────────────────
    /// Header or payload could not be decoded.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Request payload exceeds what fits in a single packet.
    #[error("Payload too large: {len} bytes")]
    PayloadTooLarge { len: usize },

    // ── Device ──────────────────────────────────────────────────────
    /// UID string is not valid base58 or decodes to zero.
    #[error("Invalid UID '{0}'")]
    InvalidUid(String),

    /// The bricklet rejected a parameter (error code 1).
    #[error("Invalid parameter for function {function_id} on {uid}")]
    InvalidParameter { uid: String, function_id: u8 },

    /// The bricklet does not implement the function (error code 2).
    #[error("Function {function_id} not supported by {uid}")]
    FunctionNotSupported { uid: String, function_id: u8 },

    /// Any other non-zero error code.
    #[error("Device {uid} returned error code {code}")]
    DeviceError { uid: String, code: u8 },
}

impl Error {
    /// Returns `true` if this is a transient link failure worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::NotConnected | Self::Timeout { .. })
    }

    /// Returns `true` if the error was reported by the device itself
    /// rather than the transport.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. } | Self::FunctionNotSupported { .. } | Self::DeviceError { .. }
        )
    }
}
