//! Orchestration constants

use std::net::Ipv4Addr;
use std::time::Duration;

/// Probing this address means "every local broadcast domain".
pub const ALL_NETWORKS: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Keep-alive tick of the watchdog.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(120);

/// Cooldown of the watchdog's manual refresh.
pub const WATCHDOG_COOLDOWN: Duration = Duration::from_secs(30);

/// Background re-discovery sweep interval.
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(900);

/// Default timeout of a single discovery probe (shorter than device
/// operation timeouts; supplied separately by callers).
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Missed poll intervals before a silent device counts as unavailable.
pub const POLL_FAILURE_GRACE_INTERVALS: u32 = 3;

/// Consecutive poll failures before scheduled polling suspends.
/// Manual refreshes still go through and a success resumes the
/// schedule.
pub const POLL_SUSPEND_FAILURES: u32 = 10;
