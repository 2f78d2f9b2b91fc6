//! Device command surface

use bytes::Bytes;

/// Commands dispatched through [`crate::DeviceApi::send_command`].
///
/// Code payloads are opaque blobs in the device's own format; this
/// layer never interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Transmit a previously learned IR/RF code.
    SendCode(Bytes),

    /// Put a remote into IR learning mode.
    EnterLearning,

    /// Start an RF frequency sweep (precedes RF learning).
    SweepFrequency,

    /// Read back the code captured during learning, if any.
    CheckData,

    /// Switch an outlet. `outlet` is `None` for single-socket devices
    /// and a zero-based index on multi-outlet strips.
    SetPower { outlet: Option<u8>, on: bool },
}

impl Command {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendCode(_) => "send_code",
            Self::EnterLearning => "enter_learning",
            Self::SweepFrequency => "sweep_frequency",
            Self::CheckData => "check_data",
            Self::SetPower { .. } => "set_power",
        }
    }
}
