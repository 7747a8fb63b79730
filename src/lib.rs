//! # Flash-to-MQTT Agent for Embedded Systems
//!
//! `flash-mqtt` is a `no_std` agent that keeps one MQTT session alive and,
//! once per boot, drains a line-oriented dataset from on-board flash to the
//! broker: every line of the file becomes one message on `<client-id>/data`.
//!
//! ## Core Features
//!
//! - **Stable identity:** the client id is derived from the interface MAC
//!   (`esp32-aabbccddeeff`), with a fixed fallback when no address is readable.
//! - **Single-flight publisher:** the dataset publisher is launched on the
//!   first `Connected` event only. Reconnects refresh the broker handle but
//!   never start a second publisher, and a finished publisher never restarts.
//! - **Best-effort streaming:** a rejected publish is logged and the next line
//!   is sent anyway; lines are paced so the worker does not hog the executor.
//! - **Transport agnostic:** the MQTT client library, the filesystem and the
//!   network interface are reached through small traits, so the agent runs on
//!   top of whatever stack the board provides.
//!
//! ## Architecture
//!
//! ```text
//! identity ──► controller ──(first Connected)──► guard ──► publisher
//!                  ▲                                          │
//!            transport events                         storage lines
//! ```
//!
//! [`agent::run`] composes the boot sequence. Boards that spawn their own
//! tasks can drive [`Controller::dispatch`](controller::Controller::dispatch)
//! and [`FilePublisher::run`](publisher::FilePublisher::run) separately,
//! sharing a `&'static Controller`.
//!
//! ```ignore
//! let mut transport = EspMqtt::new();
//! let mut storage = Spiffs::mount()?;
//! let exit = flash_mqtt::agent::run(
//!     flash_mqtt::config::AGENT,
//!     Some(&stack),
//!     &mut transport,
//!     &mut storage,
//!     Some(&mut uart),
//! )
//! .await?;
//! ```

#![cfg_attr(not(test), no_std)]

// This must go first so the logging macros are visible to every module.
mod fmt;

pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod identity;
pub mod publisher;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod mock;

// Re-export key types for easier access at the crate root.
pub use controller::{ConnectionState, Controller};
pub use identity::{ClientIdentity, resolve_identity};
pub use publisher::{FilePublisher, WorkerExit};
pub use transport::{BrokerClient, BrokerTransport, EventSource, MqttEvent, QoS};
