//! # broadrust-core
//!
//! Device lifecycle orchestration for Broadlink devices.
//!
//! This crate owns everything between the protocol seam and the hosting
//! application:
//! - Session state machine (authentication, lock handling, bounded
//!   re-auth retry)
//! - MAC-keyed session registry
//! - Discovery sweeps over local broadcast domains
//! - Per-device status pollers with debounced manual refresh
//! - The keep-alive watchdog

pub mod constants;
pub mod debounce;
pub mod discovery;
pub mod error;
pub mod events;
pub mod netif;
pub mod poller;
pub mod registry;
pub mod session;
pub mod watchdog;

pub use debounce::Debouncer;
pub use discovery::{Discovery, Outcome, Scout, ScoutHandle, Target};
pub use error::{Error, Result};
pub use events::{Event, EventBus, Subscription};
pub use poller::PollerHandle;
pub use registry::Registry;
pub use session::{AuthOutcome, Authorized, DeviceSession};
pub use watchdog::{Watchdog, WatchdogHandle};
