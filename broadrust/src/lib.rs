//! # broadrust
//!
//! Lifecycle manager for Broadlink IR/RF remotes, smart plugs and
//! sensors on the local network: discovery, authentication, periodic
//! status polling and a keep-alive watchdog.
//!
//! The wire protocol itself is not part of this workspace; callers
//! supply an implementation of the [`ProtocolClient`] seam (and the
//! [`DeviceApi`] handles it produces).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use broadrust::{Hub, ProtocolClient, RecordStore};
//!
//! async fn run(client: Arc<dyn ProtocolClient>) -> broadrust::Result<()> {
//!     let hub = Hub::new(client, RecordStore::new("devices.json"));
//!
//!     // Bring up every persisted device; "not ready" devices are
//!     // reported per-MAC and can be retried later.
//!     for (mac, result) in hub.setup_all().await {
//!         if let Err(err) = result {
//!             eprintln!("{mac}: {err}");
//!         }
//!     }
//!
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod flow;
pub mod hub;

// Re-exports
pub use error::{Error, Result};
pub use flow::{FlowStep, SetupFlow};
pub use hub::Hub;

// Re-export the seam and the core vocabulary
pub use broadrust_api::{ApiError, Command, DeviceApi, ProtocolClient};
pub use broadrust_core::{
    AuthOutcome, Authorized, DeviceSession, Event, EventBus, Outcome, Registry, Subscription,
    Target,
};
pub use broadrust_types::{
    Capability, DeviceDescriptor, DeviceKind, DeviceRecord, MacAddr, PollData, PollResult,
    RecordStore,
};
