//! # Broker Transport Abstraction
//!
//! The agent does not speak MQTT on the wire. Framing, TLS and the socket live
//! in the board's MQTT client library; this module defines the narrow surface
//! the agent needs from it:
//!
//! - [`BrokerTransport`] creates and starts a session.
//! - [`BrokerClient`] is the cheap, cloneable session handle used to publish,
//!   subscribe and unsubscribe.
//! - [`EventSource`] delivers lifecycle and protocol events, one at a time,
//!   to a single consumer.
//!
//! With the Rust 2024 Edition these traits use native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use crate::error::ConnectReasonCode;

/// Message identifier assigned by the client library. QoS 0 publishes report `0`.
pub type MessageId = u16;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// Connection parameters handed to [`BrokerTransport::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig<'a> {
    /// Broker URI, e.g. `mqtt://mqtt.eclipseprojects.io`.
    pub broker_url: &'a str,
    /// Client identifier presented to the broker.
    pub client_id: &'a str,
}

/// A handle to a live broker session.
///
/// Calls only enqueue work in the client library and return the assigned
/// message id; delivery is reported later through [`MqttEvent`].
pub trait BrokerClient {
    /// The error type returned when the client library rejects a request.
    type Error: core::fmt::Debug;

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, Self::Error>;

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<MessageId, Self::Error>;

    fn unsubscribe(&self, topic: &str) -> Result<MessageId, Self::Error>;
}

/// The MQTT client library as seen at start-up.
pub trait BrokerTransport {
    /// Session handle produced by [`init`](Self::init).
    type Client: BrokerClient + Clone;
    /// Event stream for the session.
    type Events: EventSource<Self::Client>;
    /// The error type returned by the library.
    type Error: core::fmt::Debug;

    /// Creates the session and registers the returned event source as the
    /// only consumer of its events.
    fn init(
        &mut self,
        config: &SessionConfig<'_>,
    ) -> Result<(Self::Client, Self::Events), Self::Error>;

    /// Begins connecting. Connection progress arrives as events.
    fn start(&mut self, client: &Self::Client) -> Result<(), Self::Error>;
}

/// A serialized stream of session events.
#[allow(async_fn_in_trait)]
pub trait EventSource<C> {
    /// Waits for the next event. `None` means the session was torn down.
    async fn next_event(&mut self) -> Option<MqttEvent<'_, C>>;
}

/// Events delivered by the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent<'a, C> {
    /// The session is (re)connected; carries the live handle.
    Connected(C),
    Disconnected,
    Subscribed { msg_id: MessageId },
    Unsubscribed { msg_id: MessageId },
    Published { msg_id: MessageId },
    /// An inbound application message.
    Data { topic: &'a str, payload: &'a [u8] },
    Error(ErrorReport),
    /// Any event the agent does not model, by raw id.
    Other(i32),
}

/// Error union reported by the client library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReport {
    /// The TCP/TLS transport failed.
    Transport(TransportFault),
    /// The broker refused the connection.
    ConnectionRefused(ConnectReasonCode),
    /// Any other failure the library reports without detail.
    Unknown,
}

/// Sub-error codes of a transport failure. Zero means "not applicable".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportFault {
    /// Last error reported by the TLS layer.
    pub tls_last_err: i32,
    /// Error reported by the underlying TLS stack.
    pub tls_stack_err: i32,
    /// Socket errno captured by the transport.
    pub sock_errno: i32,
}

impl TransportFault {
    /// Human-readable description of the socket errno (newlib numbering).
    pub fn sock_errno_description(&self) -> &'static str {
        errno_description(self.sock_errno)
    }
}

fn errno_description(errno: i32) -> &'static str {
    match errno {
        0 => "Success",
        1 => "Not owner",
        2 => "No such file or directory",
        4 => "Interrupted system call",
        5 => "I/O error",
        9 => "Bad file number",
        11 => "No more processes",
        12 => "Not enough space",
        13 => "Permission denied",
        22 => "Invalid argument",
        32 => "Broken pipe",
        104 => "Connection reset by peer",
        105 => "No buffer space available",
        111 => "Connection refused",
        112 => "Address already in use",
        113 => "Software caused connection abort",
        114 => "Network is unreachable",
        115 => "Network interface is not configured",
        116 => "Connection timed out",
        117 => "Host is down",
        118 => "Host is unreachable",
        119 => "Connection already in progress",
        120 => "Socket already connected",
        127 => "Socket is already connected",
        128 => "Socket is not connected",
        _ => "Unknown error",
    }
}
