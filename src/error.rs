//! # Error Types
//!
//! Errors surfaced by the agent. Almost every failure in this crate is logged
//! where it happens and never leaves the module; the types here cover the few
//! paths that do reach a caller: session start-up and configuration.

/// The primary error enum for starting the agent.
///
/// It is generic over the transport error type `T`, so the board crate keeps
/// the concrete error reported by its MQTT client library.
#[derive(Debug)]
pub enum Error<T> {
    /// The MQTT client library failed to initialize or start the session.
    Transport(T),
    /// The agent configuration could not be turned into a session configuration.
    Config(ConfigError),
    /// `Controller::start` was called more than once.
    AlreadyStarted,
}

impl<T> From<ConfigError> for Error<T> {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Configuration problems detected while building the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The firmware expects an interactive broker URL but the static URL is not
    /// the `FROM_STDIN` placeholder, or no console was supplied.
    Mismatch,
    /// The broker URL does not fit into the session buffer.
    UrlTooLong,
}

/// Reason codes carried by a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success = 0,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not valid.
    IdentifierRejected = 2,
    /// The broker is unavailable.
    ServerUnavailable = 3,
    /// The username or password is not valid.
    BadUserNameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}
