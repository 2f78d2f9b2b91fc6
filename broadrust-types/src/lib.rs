//! Type definitions for broadrust

pub mod descriptor;
pub mod error;
pub mod kind;
pub mod mac;
pub mod poll;
pub mod record;

pub use descriptor::DeviceDescriptor;
pub use error::{Error, Result};
pub use kind::{Capability, DeviceKind};
pub use mac::MacAddr;
pub use poll::{PollData, PollResult};
pub use record::{DeviceRecord, RecordStore};
