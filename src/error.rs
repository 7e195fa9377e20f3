use thiserror::Error;

/// Errors surfaced by device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Non-blocking read against an empty buffer. A control-flow signal,
    /// not a failure.
    #[error("no sample available")]
    WouldBlock,

    #[error("device closed")]
    Closed,

    #[error("timed out waiting for a sample")]
    TimedOut,

    /// The sample was popped but could not be handed to the consumer; it
    /// is lost.
    #[error("sample transfer failed: {0}")]
    TransferFault(#[source] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device {0} not found")]
    NotFound(u32),

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("attribute {0} is read-only")]
    PermissionDenied(String),

    #[error("no free device slots")]
    NoSpace,

    #[error("failed to start sample timer: {0}")]
    Timer(#[source] std::io::Error),
}

impl DeviceError {
    /// Short stable identifier used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::Validation(_) => "validation",
            DeviceError::WouldBlock => "would_block",
            DeviceError::Closed => "closed",
            DeviceError::TimedOut => "timed_out",
            DeviceError::TransferFault(_) => "transfer_fault",
            DeviceError::InvalidArgument(_) => "invalid_argument",
            DeviceError::NotFound(_) => "not_found",
            DeviceError::UnknownAttribute(_) => "unknown_attribute",
            DeviceError::PermissionDenied(_) => "permission_denied",
            DeviceError::NoSpace => "no_space",
            DeviceError::Timer(_) => "timer",
        }
    }
}

/// Errors loading an initial configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}
