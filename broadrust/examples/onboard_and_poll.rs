//! Onboarding + polling walkthrough against a simulated device.
//!
//! Real deployments plug in a `ProtocolClient` backed by the Broadlink
//! wire protocol; this example wires a tiny in-memory one so the
//! lifecycle can be watched without hardware.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use broadrust::{
    ApiError, Command, DeviceApi, DeviceDescriptor, Hub, MacAddr, PollData, ProtocolClient,
    RecordStore,
};

struct SimulatedClient {
    device: DeviceDescriptor,
}

#[async_trait]
impl ProtocolClient for SimulatedClient {
    async fn hello(
        &self,
        host: Ipv4Addr,
        _port: u16,
        _timeout: Duration,
    ) -> Result<DeviceDescriptor, ApiError> {
        if host == self.device.host {
            Ok(self.device.clone())
        } else {
            Err(ApiError::NetworkTimeout)
        }
    }

    async fn discover(
        &self,
        _broadcast_addr: Ipv4Addr,
        _timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>, ApiError> {
        Ok(vec![self.device.clone()])
    }

    fn gen_device(&self, _descriptor: &DeviceDescriptor) -> Result<Box<dyn DeviceApi>, ApiError> {
        Ok(Box::new(SimulatedDevice))
    }

    async fn keep_alive(&self, addr: Ipv4Addr) -> Result<(), ApiError> {
        println!("  keep-alive -> {addr}");
        Ok(())
    }
}

struct SimulatedDevice;

#[async_trait]
impl DeviceApi for SimulatedDevice {
    async fn auth(&self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn set_lock(&self, _locked: bool) -> Result<(), ApiError> {
        Ok(())
    }

    async fn get_fwversion(&self) -> Result<u16, ApiError> {
        Ok(0x62)
    }

    async fn fetch_status(&self) -> Result<PollData, ApiError> {
        let mut data = PollData::new();
        data.insert("temperature".to_string(), serde_json::json!(22.5));
        Ok(data)
    }

    async fn send_command(&self, _command: Command) -> Result<Option<Bytes>, ApiError> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mac = MacAddr::parse("34ea34b43b5a")?;
    let descriptor = DeviceDescriptor {
        name: "Living Room".to_string(),
        model: "RM mini 3".to_string(),
        ..DeviceDescriptor::new(Ipv4Addr::new(192, 168, 0, 10), mac, 0x2737)
    };

    let client = Arc::new(SimulatedClient { device: descriptor });
    let store = RecordStore::new(std::env::temp_dir().join("broadrust-example.json"));
    let hub = Hub::new(client, store);

    // Guided onboarding: probe the host, authenticate, confirm a name.
    let mut flow = hub.flow()?;
    flow.user(Some(Ipv4Addr::new(192, 168, 0, 10)), None).await?;
    let record = flow.finish("Living Room")?;

    hub.setup(record.clone()).await?;
    println!("✓ Device {} set up", record.mac);

    let results = hub
        .poll_results(record.mac)
        .expect("device was just set up");
    let latest = results.borrow().clone();
    println!("✓ First poll: {:?}", latest.data);

    hub.remove(record.mac).await?;
    println!("✓ Device removed");

    Ok(())
}
