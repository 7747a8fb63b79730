//! Device identity.
//!
//! The client identifier doubles as the topic prefix for the dataset, so it
//! must be stable across boots: it is derived from the interface MAC.

use core::fmt::{self, Write};

use heapless::String;

/// Maximum length of a client identifier.
pub const MAX_CLIENT_ID_LEN: usize = 32;

/// Identifier used when no hardware address can be read.
pub const FALLBACK_CLIENT_ID: &str = "esp32_default";

const CLIENT_ID_PREFIX: &str = "esp32-";

/// Source of the primary interface's hardware address.
pub trait NetworkInterface {
    /// Returns the 6-byte MAC, or `None` when it cannot be read.
    fn hardware_address(&self) -> Option<[u8; 6]>;
}

impl NetworkInterface for [u8; 6] {
    fn hardware_address(&self) -> Option<[u8; 6]> {
        Some(*self)
    }
}

impl NetworkInterface for embassy_net::Stack<'_> {
    fn hardware_address(&self) -> Option<[u8; 6]> {
        match embassy_net::Stack::hardware_address(self) {
            embassy_net::HardwareAddress::Ethernet(mac) => Some(mac.0),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

/// Stable identifier for the MQTT session and topic naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String<MAX_CLIENT_ID_LEN>);

impl ClientIdentity {
    /// Formats `esp32-` followed by the MAC as 12 lowercase hex digits.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut id = String::new();
        let formatted = id.push_str(CLIENT_ID_PREFIX).is_ok()
            && mac.iter().all(|byte| write!(id, "{byte:02x}").is_ok());
        if formatted { Self(id) } else { Self::fallback() }
    }

    /// The fixed [`FALLBACK_CLIENT_ID`].
    pub fn fallback() -> Self {
        let mut id = String::new();
        // The literal is far shorter than the capacity.
        let _ = id.push_str(FALLBACK_CLIENT_ID);
        Self(id)
    }

    /// The identifier as presented to the broker.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether this is the fallback identifier rather than a MAC-derived one.
    pub fn is_fallback(&self) -> bool {
        self.0.as_str() == FALLBACK_CLIENT_ID
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the client identity from `netif`, falling back to
/// [`FALLBACK_CLIENT_ID`] when there is no interface or no address.
pub fn resolve_identity<N>(netif: Option<&N>) -> ClientIdentity
where
    N: NetworkInterface + ?Sized,
{
    match netif.and_then(|n| n.hardware_address()) {
        Some(mac) => {
            let identity = ClientIdentity::from_mac(mac);
            info!("MAC-based client id: {}", identity.as_str());
            identity
        }
        None => {
            warn!(
                "Could not read the interface hardware address, using fallback client id {}",
                FALLBACK_CLIENT_ID
            );
            ClientIdentity::fallback()
        }
    }
}
