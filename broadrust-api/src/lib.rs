//! Protocol seam for broadrust
//!
//! The proprietary wire protocol (packet framing, encryption, socket
//! I/O) lives behind these traits. The orchestration crates only ever
//! talk to [`ProtocolClient`] and [`DeviceApi`]; tests substitute mocks
//! (enable the `mock` feature) or scripted fakes.

pub mod command;
pub mod error;

pub use command::Command;
pub use error::{ApiError, Result};

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use broadrust_types::{DeviceDescriptor, PollData};

/// Handle to one device, produced by [`ProtocolClient::gen_device`].
///
/// Every call applies the descriptor's per-device timeout. Methods take
/// `&self`: implementations keep their session key behind interior
/// mutability so one handle can be shared across poller and command
/// paths.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Run the key-exchange handshake, establishing a session key.
    async fn auth(&self) -> Result<()>;

    /// Set the device lock flag (`false` re-enables authentication).
    async fn set_lock(&self, locked: bool) -> Result<()>;

    /// Read the firmware version.
    async fn get_fwversion(&self) -> Result<u16>;

    /// Fetch the device-specific status metrics.
    async fn fetch_status(&self) -> Result<PollData>;

    /// Execute a command; some commands (code learning) return data.
    async fn send_command(&self, command: Command) -> Result<Option<Bytes>>;
}

/// Entry points of the protocol library that are not tied to an
/// authenticated device.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Unicast probe of a single host.
    async fn hello(
        &self,
        host: Ipv4Addr,
        port: u16,
        timeout: Duration,
    ) -> Result<DeviceDescriptor>;

    /// Broadcast probe of one network; collects responses until the
    /// timeout elapses.
    async fn discover(
        &self,
        broadcast_addr: Ipv4Addr,
        timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>>;

    /// Build a device handle from a descriptor.
    fn gen_device(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn DeviceApi>>;

    /// Send a fire-and-forget keep-alive datagram. No response is read.
    async fn keep_alive(&self, addr: Ipv4Addr) -> Result<()>;
}
