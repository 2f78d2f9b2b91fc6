//! Device descriptors

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::mac::MacAddr;

/// Default port the devices listen on.
pub const DEFAULT_PORT: u16 = 80;

/// Default per-device network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a device reports about itself during discovery or `hello`.
///
/// The host and name can change over a device's lifetime; identity is
/// the MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// IPv4 address the device answered from
    pub host: Ipv4Addr,

    /// UDP port (devices answer on 80)
    pub port: u16,

    /// Hardware address
    pub mac: MacAddr,

    /// Raw device-type code
    pub devtype: u16,

    /// User-assigned display name
    pub name: String,

    /// Model string, if the probe response carried one
    pub model: String,

    /// Manufacturer string
    pub manufacturer: String,

    /// Whether the device is locked against new authentications
    pub is_locked: bool,

    /// Timeout applied to every network operation on this device
    pub timeout: Duration,
}

impl DeviceDescriptor {
    pub fn new(host: Ipv4Addr, mac: MacAddr, devtype: u16) -> Self {
        Self {
            host,
            port: DEFAULT_PORT,
            mac,
            devtype,
            name: String::new(),
            model: String::new(),
            manufacturer: String::new(),
            is_locked: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }

    /// Unique id of the device (bare-hex MAC).
    pub fn unique_id(&self) -> String {
        self.mac.unique_id()
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} at {})", self.name, self.model, self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DeviceDescriptor {
        let mac = MacAddr::new([0x34, 0xea, 0x34, 0x01, 0x02, 0x03]);
        DeviceDescriptor {
            name: "Office".to_string(),
            model: "RM mini 3".to_string(),
            ..DeviceDescriptor::new(Ipv4Addr::new(192, 168, 0, 10), mac, 0x2737)
        }
    }

    #[test]
    fn test_addr_uses_default_port() {
        assert_eq!(descriptor().addr().to_string(), "192.168.0.10:80");
    }

    #[test]
    fn test_unique_id_is_hex_mac() {
        assert_eq!(descriptor().unique_id(), "34ea34010203");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            descriptor().to_string(),
            "Office (RM mini 3 at 192.168.0.10)"
        );
    }
}
