//! Keep-alive watchdog
//!
//! Broadlink devices drop off the network when nobody talks to them.
//! Every tick the watchdog fires one keep-alive datagram at each local
//! broadcast domain, plus one at every registered device host living on
//! a network no broadcast covers. Nothing is awaited back; failures are
//! logged and the remaining sends continue.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use broadrust_api::ProtocolClient;

use crate::constants::{WATCHDOG_COOLDOWN, WATCHDOG_INTERVAL};
use crate::debounce::Debouncer;
use crate::netif;
use crate::registry::Registry;

type AddrSource = Box<dyn Fn() -> Vec<Ipv4Addr> + Send>;

/// Addresses one tick sends to: each distinct broadcast address once,
/// then each host whose /24 prefix none of them covers.
pub fn send_targets(broadcasts: &[Ipv4Addr], hosts: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let mut targets = Vec::new();
    for addr in broadcasts {
        if !targets.contains(addr) {
            targets.push(*addr);
        }
    }
    targets.extend(netif::uncovered_hosts(hosts, broadcasts));
    targets
}

/// Running watchdog task.
pub struct WatchdogHandle {
    refresh: Arc<Debouncer>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    /// Debounced out-of-schedule keep-alive round.
    pub fn request_refresh(&self) {
        self.refresh.request();
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

pub struct Watchdog;

impl Watchdog {
    pub fn spawn(client: Arc<dyn ProtocolClient>, registry: Arc<Registry>) -> WatchdogHandle {
        Self::spawn_with(
            client,
            registry,
            WATCHDOG_INTERVAL,
            WATCHDOG_COOLDOWN,
            Box::new(netif::broadcast_addrs),
        )
    }

    pub fn spawn_with(
        client: Arc<dyn ProtocolClient>,
        registry: Arc<Registry>,
        interval: Duration,
        cooldown: Duration,
        broadcasts: AddrSource,
    ) -> WatchdogHandle {
        let refresh = Arc::new(Debouncer::new(cooldown));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let refresh_task = Arc::clone(&refresh);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = refresh_task.triggered() => {}
                    _ = shutdown_rx.changed() => break,
                }
                // Interfaces are re-enumerated on every tick; broadcast
                // domains change at runtime.
                keep_alive_once(&*client, &broadcasts(), &registry.hosts()).await;
            }
            debug!("watchdog stopped");
        });

        WatchdogHandle {
            refresh,
            shutdown: shutdown_tx,
            task,
        }
    }
}

async fn keep_alive_once(client: &dyn ProtocolClient, broadcasts: &[Ipv4Addr], hosts: &[Ipv4Addr]) {
    for addr in send_targets(broadcasts, hosts) {
        match client.keep_alive(addr).await {
            Ok(()) => debug!("watchdog packet sent to {}", addr),
            Err(err) => debug!("failed to send watchdog packet to {}: {}", addr, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadrust_api::{ApiError, MockProtocolClient};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn addr(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    #[test]
    fn test_send_targets_spec_example() {
        // Host 10.0.5.7 is outside the 10.0.0.x broadcast domain, so it
        // gets its own keep-alive.
        let targets = send_targets(&[addr(10, 0, 0, 255)], &[addr(10, 0, 5, 7)]);
        assert_eq!(targets, vec![addr(10, 0, 0, 255), addr(10, 0, 5, 7)]);
    }

    #[test]
    fn test_send_targets_covered_host_is_not_repeated() {
        let targets = send_targets(&[addr(10, 0, 0, 255)], &[addr(10, 0, 0, 7)]);
        assert_eq!(targets, vec![addr(10, 0, 0, 255)]);
    }

    #[test]
    fn test_send_targets_deduplicates_broadcasts_and_hosts() {
        let targets = send_targets(
            &[addr(10, 0, 0, 255), addr(10, 0, 0, 255)],
            &[addr(10, 0, 5, 7), addr(10, 0, 5, 7)],
        );
        assert_eq!(targets, vec![addr(10, 0, 0, 255), addr(10, 0, 5, 7)]);
    }

    proptest! {
        #[test]
        fn prop_send_targets_unique_and_complete(
            broadcast_nets in prop::collection::vec((0u8..4, 0u8..4), 0..4),
            host_tails in prop::collection::vec((0u8..4, 0u8..4, 1u8..10), 0..6),
        ) {
            let broadcasts: Vec<Ipv4Addr> = broadcast_nets
                .iter()
                .map(|(b, c)| addr(10, *b, *c, 255))
                .collect();
            let hosts: Vec<Ipv4Addr> = host_tails
                .iter()
                .map(|(b, c, d)| addr(10, *b, *c, *d))
                .collect();

            let targets = send_targets(&broadcasts, &hosts);

            // Never more than one keep-alive per distinct address.
            let unique: std::collections::HashSet<_> = targets.iter().collect();
            prop_assert_eq!(unique.len(), targets.len());

            // Every distinct broadcast address is covered.
            for b in &broadcasts {
                prop_assert!(targets.contains(b));
            }

            // A host is targeted iff its /24 is uncovered.
            let covered: std::collections::HashSet<_> =
                broadcasts.iter().map(|a| netif::prefix24(*a)).collect();
            for h in &hosts {
                let expected = !covered.contains(&netif::prefix24(*h));
                prop_assert_eq!(targets.contains(h), expected);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_sends_on_every_tick() {
        let sent: Arc<Mutex<Vec<Ipv4Addr>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);

        let mut client = MockProtocolClient::new();
        client.expect_keep_alive().returning(move |a| {
            log.lock().push(a);
            Ok(())
        });

        let handle = Watchdog::spawn_with(
            Arc::new(client),
            Arc::new(Registry::new()),
            Duration::from_secs(120),
            Duration::from_secs(30),
            Box::new(|| vec![addr(192, 168, 0, 255)]),
        );

        // First round is immediate; wait out one more interval.
        time::sleep(Duration::from_secs(121)).await;
        handle.shutdown().await;

        assert_eq!(
            sent.lock().clone(),
            vec![addr(192, 168, 0, 255), addr(192, 168, 0, 255)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_failures_do_not_abort_remaining_sends() {
        let sent: Arc<Mutex<Vec<Ipv4Addr>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);

        let mut client = MockProtocolClient::new();
        client.expect_keep_alive().returning(move |a| {
            log.lock().push(a);
            if a == addr(192, 168, 0, 255) {
                Err(ApiError::NetworkUnreachable)
            } else {
                Ok(())
            }
        });

        let registry = Arc::new(Registry::new());
        let handle = Watchdog::spawn_with(
            Arc::new(client),
            registry,
            Duration::from_secs(120),
            Duration::from_secs(30),
            Box::new(|| vec![addr(192, 168, 0, 255), addr(192, 168, 1, 255)]),
        );

        time::sleep(Duration::from_secs(1)).await;
        handle.shutdown().await;

        assert_eq!(
            sent.lock().clone(),
            vec![addr(192, 168, 0, 255), addr(192, 168, 1, 255)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_sends_out_of_schedule() {
        let sent: Arc<Mutex<Vec<Ipv4Addr>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);

        let mut client = MockProtocolClient::new();
        client.expect_keep_alive().returning(move |a| {
            log.lock().push(a);
            Ok(())
        });

        let handle = Watchdog::spawn_with(
            Arc::new(client),
            Arc::new(Registry::new()),
            Duration::from_secs(120),
            Duration::from_secs(30),
            Box::new(|| vec![addr(192, 168, 0, 255)]),
        );

        time::sleep(Duration::from_secs(1)).await; // initial round
        handle.request_refresh();
        time::sleep(Duration::from_secs(31)).await; // past the cooldown

        handle.shutdown().await;
        assert_eq!(sent.lock().len(), 2);
    }
}
