//! Network scan for devices already listening in TCP/IP mode.
//!
//! Probes the address ranges home routers usually hand out on the host's /24
//! with `adb connect`, and disconnects again from every hit.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adb::DeviceBridge;

/// Host octets probed on the local /24
const PROBE_RANGES: [(u8, u8); 3] = [(1, 20), (100, 120), (200, 220)];

const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// The host's LAN address, found by routing a UDP socket (nothing is sent)
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;

    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Addresses to probe on `local`'s /24, excluding `local` itself
pub fn candidate_hosts(local: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, own] = local.octets();

    PROBE_RANGES
        .iter()
        .flat_map(|&(start, end)| start..=end)
        .filter(|&host| host != own)
        .map(|host| Ipv4Addr::new(a, b, c, host))
        .collect()
}

pub struct NetworkScanner {
    bridge: Arc<dyn DeviceBridge>,
    port: u16,
    timeout: Duration,
    concurrency: usize,
}

impl NetworkScanner {
    pub fn new(bridge: Arc<dyn DeviceBridge>, port: u16, timeout: Duration, concurrency: usize) -> Self {
        Self {
            bridge,
            port,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Probe every candidate host, returning the endpoints that accepted a
    /// connection. Stops early, keeping what was found, when `cancel` fires.
    pub async fn scan(&self, hosts: Vec<Ipv4Addr>, cancel: CancellationToken) -> Vec<String> {
        info!("Scanning {} address(es) on port {}", hosts.len(), self.port);

        let probes = stream::iter(hosts)
            .map(|host| self.probe(format!("{}:{}", host, self.port)))
            .buffer_unordered(self.concurrency)
            .take_until(cancel.cancelled());
        tokio::pin!(probes);

        let mut found = Vec::new();
        while let Some(hit) = probes.next().await {
            if let Some(endpoint) = hit {
                found.push(endpoint);
            }
        }

        if cancel.is_cancelled() {
            warn!("Network scan cancelled after {} hit(s)", found.len());
        }
        found.sort();
        found
    }

    async fn probe(&self, endpoint: String) -> Option<String> {
        let message = match tokio::time::timeout(self.timeout, self.bridge.connect(&endpoint)).await {
            Ok(Ok(message)) => message,
            _ => return None,
        };

        if !message.contains("connected") {
            return None;
        }
        debug!("Found device at {}", endpoint);

        if tokio::time::timeout(DISCONNECT_TIMEOUT, self.bridge.disconnect(&endpoint))
            .await
            .is_err()
        {
            debug!("Disconnect from {} timed out", endpoint);
        }
        Some(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::AdbError;
    use crate::device::Device;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FakeLan {
        listening: Vec<String>,
        disconnected: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeviceBridge for FakeLan {
        async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
            Ok(Vec::new())
        }

        async fn connect(&self, endpoint: &str) -> Result<String, AdbError> {
            if self.listening.iter().any(|l| l == endpoint) {
                Ok(format!("connected to {}", endpoint))
            } else {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(AdbError::CommandFailed("no route".into()))
            }
        }

        async fn disconnect(&self, endpoint: &str) -> Result<(), AdbError> {
            self.disconnected.lock().push(endpoint.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_candidate_hosts() {
        let hosts = candidate_hosts(Ipv4Addr::new(192, 168, 1, 105));
        assert_eq!(hosts.len(), 20 + 20 + 21);
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 105)));
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 220)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_finds_and_disconnects() {
        let lan = Arc::new(FakeLan {
            listening: vec!["192.168.1.12:5555".into(), "192.168.1.201:5555".into()],
            disconnected: Mutex::new(Vec::new()),
        });
        let scanner = NetworkScanner::new(lan.clone(), 5555, Duration::from_millis(1500), 16);

        let hosts = candidate_hosts(Ipv4Addr::new(192, 168, 1, 50));
        let found = scanner.scan(hosts, CancellationToken::new()).await;

        assert_eq!(found, vec!["192.168.1.12:5555", "192.168.1.201:5555"]);
        let mut disconnected = lan.disconnected.lock().clone();
        disconnected.sort();
        assert_eq!(disconnected, found);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scan_stops() {
        let lan = Arc::new(FakeLan {
            listening: Vec::new(),
            disconnected: Mutex::new(Vec::new()),
        });
        let scanner = NetworkScanner::new(lan, 5555, Duration::from_secs(10), 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let found = scanner.scan(candidate_hosts(Ipv4Addr::new(10, 0, 0, 2)), cancel).await;
        assert!(found.is_empty());
    }
}
