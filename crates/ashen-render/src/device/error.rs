use thiserror::Error;

/// Failure reported by a [`Device`](super::Device) backend.
///
/// Backends keep their reasons short; callers add resource context
/// (kind + name) when surfacing these as [`RenderError`](crate::RenderError).
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DeviceError {
    /// Allocation failed (commonly OOM or an injected fault).
    #[error("out of device memory")]
    OutOfMemory,

    /// The backend refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Handle was released or never belonged to this device.
    #[error("invalid or stale {0} handle")]
    InvalidHandle(&'static str),

    /// A copy touched bytes outside the source or destination.
    #[error("copy range {offset}..{end} exceeds {size} bytes")]
    OutOfRange { offset: u64, end: u64, size: u64 },

    /// Commands were recorded in an order the backend cannot execute.
    #[error("invalid command order: {0}")]
    InvalidCommand(&'static str),
}
