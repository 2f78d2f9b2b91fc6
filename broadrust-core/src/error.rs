//! Core orchestration errors

use broadrust_types::MacAddr;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Api(#[from] broadrust_api::ApiError),

    #[error("Type error: {0}")]
    Types(#[from] broadrust_types::Error),

    #[error("No devices found")]
    NoDevicesFound,

    #[error("A device with MAC {0} is already registered")]
    AlreadyRegistered(MacAddr),
}

impl Error {
    /// Stable error code for user-facing reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Api(err) => err.code(),
            Self::Types(_) => "unknown",
            Self::NoDevicesFound => "no_devices_found",
            Self::AlreadyRegistered(_) => "already_configured",
        }
    }
}
