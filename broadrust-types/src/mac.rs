//! Hardware (MAC) addresses
//!
//! The MAC is the immutable identity of a device: host and display name
//! may change between discoveries, the MAC never does. Persisted records
//! and registry keys use the bare lowercase hex form.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};

/// Hardware address of a device (6 octets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Bare lowercase hex form, used as the unique id of a device.
    pub fn unique_id(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from bare hex (`"34ea34b43b5a"`) or colon-separated form.
    pub fn parse(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(&compact).map_err(|_| Error::InvalidMac(s.to_string()))?;
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| Error::InvalidMac(s.to_string()))?;
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Serialized as the bare hex string to match the persisted record format.
impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.unique_id())
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MacVisitor;

        impl Visitor<'_> for MacVisitor {
            type Value = MacAddr;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a MAC address in hex form")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<MacAddr, E> {
                MacAddr::parse(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(MacVisitor)
    }
}
