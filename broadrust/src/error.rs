//! High-level error types

use broadrust_api::ApiError;
use broadrust_types::MacAddr;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transient network failure during setup; the host should mark the
    /// device "not ready" and retry later.
    #[error("Device not ready: {0}")]
    NotReady(#[source] ApiError),

    /// The device denied authentication. Manual unlock through the
    /// vendor app is required before setup can continue.
    #[error("The device is locked; complete re-authentication first")]
    Locked,

    /// Non-transient failure; retrying blindly will not help.
    #[error("Setup failed: {0}")]
    Setup(#[source] ApiError),

    /// No persisted record exists for this device.
    #[error("Unknown device: {0}")]
    UnknownDevice(MacAddr),

    /// A flow step that needs a selected device ran before one was
    /// chosen.
    #[error("No device selected in this flow")]
    NoDeviceSelected,

    #[error(transparent)]
    Core(#[from] broadrust_core::Error),

    #[error(transparent)]
    Types(#[from] broadrust_types::Error),
}

impl Error {
    /// Stable error code for user-facing reporting; details travel in
    /// the `Display` output, never as a backtrace.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotReady(_) => "cannot_connect",
            Self::Locked => "invalid_auth",
            Self::Setup(_) => "unknown",
            Self::UnknownDevice(_) => "unknown_device",
            Self::NoDeviceSelected => "unknown",
            Self::Core(err) => err.code(),
            Self::Types(broadrust_types::Error::UnsupportedType(_)) => "not_supported",
            Self::Types(_) => "unknown",
        }
    }
}
