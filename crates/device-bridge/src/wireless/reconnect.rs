//! Reconnect saved wireless devices
//!
//! Every saved endpoint gets exactly one `adb connect` attempt. Attempts run
//! concurrently, each under its own timeout, and the batch only completes once
//! every attempt has settled.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use droid_lite_core::{Event, EventBus};

use crate::adb::DeviceBridge;
use super::store::WirelessStore;

/// Outcome of one reconnect batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectReport {
    pub attempted: usize,
    pub succeeded: Vec<String>,
    /// Endpoint and reason
    pub failed: Vec<(String, String)>,
}

pub struct Reconnector {
    bridge: Arc<dyn DeviceBridge>,
    store: WirelessStore,
    events: Arc<EventBus>,
    timeout: Duration,
}

impl Reconnector {
    pub fn new(
        bridge: Arc<dyn DeviceBridge>,
        store: WirelessStore,
        events: Arc<EventBus>,
        timeout: Duration,
    ) -> Self {
        Self {
            bridge,
            store,
            events,
            timeout,
        }
    }

    /// Try to reconnect every saved device, then emit one change event
    pub async fn reconnect_all(&self) -> ReconnectReport {
        let saved = self.store.load().await;
        info!("Reconnecting {} saved wireless device(s)", saved.len());

        let attempts = saved.iter().map(|device| {
            let endpoint = device.endpoint();
            async move {
                let result = tokio::time::timeout(self.timeout, self.bridge.connect(&endpoint)).await;
                let outcome = match result {
                    Ok(Ok(message)) => Ok(message),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {:?}", self.timeout)),
                };
                (endpoint, outcome)
            }
        });

        let mut report = ReconnectReport {
            attempted: saved.len(),
            ..Default::default()
        };

        for (endpoint, outcome) in join_all(attempts).await {
            match outcome {
                Ok(message) => {
                    debug!("Reconnected {}: {}", endpoint, message);
                    report.succeeded.push(endpoint);
                }
                Err(reason) => {
                    warn!("Could not reconnect {}: {}", endpoint, reason);
                    report.failed.push((endpoint, reason));
                }
            }
        }

        self.events.emit(Event::WirelessDevicesChanged);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::AdbError;
    use crate::device::{Device, DeviceState};
    use crate::registry::DeviceRegistry;
    use async_trait::async_trait;
    use droid_lite_core::StateStore;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    /// Endpoints listed in `reachable` connect at once; everything else hangs
    #[derive(Default)]
    struct FakeNetwork {
        reachable: Vec<String>,
        attempts: Mutex<Vec<String>>,
        connected: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeviceBridge for FakeNetwork {
        async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
            Ok(self
                .connected
                .lock()
                .iter()
                .map(|id| Device::new(id.clone(), DeviceState::Ready))
                .collect())
        }

        async fn connect(&self, endpoint: &str) -> Result<String, AdbError> {
            self.attempts.lock().push(endpoint.to_string());
            if self.reachable.iter().any(|r| r == endpoint) {
                self.connected.lock().push(endpoint.to_string());
                Ok(format!("connected to {}", endpoint))
            } else {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(AdbError::CommandFailed("unreachable".into()))
            }
        }

        async fn disconnect(&self, _endpoint: &str) -> Result<(), AdbError> {
            Ok(())
        }
    }

    async fn seeded_store(dir: &std::path::Path, ids: &[&str]) -> WirelessStore {
        let store = WirelessStore::new(Arc::new(StateStore::global(dir)));
        for id in ids {
            store.save(&Device::new(*id, DeviceState::Ready)).await;
        }
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_run_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path(), &["10.0.0.2:5555", "10.0.0.3:5555"]).await;
        let network = Arc::new(FakeNetwork {
            reachable: vec!["10.0.0.2:5555".into()],
            ..Default::default()
        });
        let events = Arc::new(EventBus::new());
        let reconnector = Reconnector::new(network.clone(), store, events.clone(), Duration::from_secs(2));

        let start = Instant::now();
        let report = reconnector.reconnect_all().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, vec!["10.0.0.2:5555".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "10.0.0.3:5555");

        // Only the reachable endpoint shows up after the next refresh
        let registry = DeviceRegistry::new(network, events);
        let devices = registry.refresh().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "10.0.0.2:5555");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_attempt_per_endpoint_and_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let ids = ["10.0.0.2:5555", "10.0.0.3:40001", "10.0.0.4:5555"];
        let store = seeded_store(dir.path(), &ids).await;
        let network = Arc::new(FakeNetwork::default());
        let events = Arc::new(EventBus::new());
        let sub = events.subscribe();

        let reconnector = Reconnector::new(network.clone(), store, events, Duration::from_secs(5));
        let report = reconnector.reconnect_all().await;

        assert_eq!(report.failed.len(), 3);
        let mut attempts = network.attempts.lock().clone();
        attempts.sort();
        assert_eq!(attempts, ids.to_vec());
        assert_eq!(sub.drain(), vec![Event::WirelessDevicesChanged]);
    }

    #[tokio::test]
    async fn test_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path(), &[]).await;
        let events = Arc::new(EventBus::new());
        let sub = events.subscribe();

        let reconnector = Reconnector::new(
            Arc::new(FakeNetwork::default()),
            store,
            events,
            Duration::from_secs(5),
        );

        assert_eq!(reconnector.reconnect_all().await, ReconnectReport::default());
        assert_eq!(sub.drain(), vec![Event::WirelessDevicesChanged]);
    }
}
