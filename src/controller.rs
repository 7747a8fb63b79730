//! # Connection Lifecycle Controller
//!
//! The controller is the only consumer of session events. It keeps the live
//! broker handle, tracks the connection state, and on the first `Connected`
//! event releases the dataset publisher through the [`LaunchGuard`].
//! Reconnects refresh the handle but never launch a second publisher.
//!
//! Every event branch logs and carries on. The only fatal path is a broker
//! URL configuration mismatch detected in [`Controller::start`].

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_io_async::Read;

use crate::config::{AgentConfig, resolve_broker_url};
use crate::error::{ConfigError, Error};
use crate::guard::LaunchGuard;
use crate::identity::ClientIdentity;
use crate::transport::{
    BrokerClient, BrokerTransport, ErrorReport, EventSource, MessageId, MqttEvent, QoS,
    SessionConfig,
};

/// Demo topic subscribed at QoS 0.
pub const DIAG_QOS0_TOPIC: &str = "/topic/qos0";
/// Demo topic published and subscribed at QoS 1, then unsubscribed.
pub const DIAG_QOS1_TOPIC: &str = "/topic/qos1";

/// Broker connection state as observed through events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// `start` has not been called yet.
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Owns the broker handle, the connection state and the launch guard for one
/// session. `C` is the client library's session handle.
pub struct Controller<C> {
    identity: ClientIdentity,
    config: AgentConfig,
    started: AtomicBool,
    client: Mutex<CriticalSectionRawMutex, RefCell<Option<C>>>,
    state: Mutex<CriticalSectionRawMutex, Cell<ConnectionState>>,
    guard: LaunchGuard,
}

impl<C> Controller<C>
where
    C: BrokerClient + Clone,
{
    /// Creates an idle controller; nothing talks to the broker until
    /// [`start`](Self::start).
    pub fn new(identity: ClientIdentity, config: AgentConfig) -> Self {
        Self {
            identity,
            config,
            started: AtomicBool::new(false),
            client: Mutex::new(RefCell::new(None)),
            state: Mutex::new(Cell::new(ConnectionState::Idle)),
            guard: LaunchGuard::new(),
        }
    }

    /// The client identity the session was started with.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// The agent configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Connection state as of the last event.
    pub fn state(&self) -> ConnectionState {
        self.state.lock(Cell::get)
    }

    /// The most recently recorded broker handle.
    pub fn client(&self) -> Option<C> {
        self.client.lock(|client| client.borrow().clone())
    }

    /// The guard that releases the dataset publisher.
    pub fn guard(&self) -> &LaunchGuard {
        &self.guard
    }

    /// Initializes and starts the broker session.
    ///
    /// Returns the session's event source; feed it to
    /// [`dispatch`](Self::dispatch). May only be called once.
    ///
    /// # Panics
    ///
    /// When the firmware is configured to read the broker URL from the console
    /// but the static URL is not the placeholder, or no console is given.
    pub async fn start<T, R>(
        &self,
        transport: &mut T,
        console: Option<&mut R>,
    ) -> Result<T::Events, Error<T::Error>>
    where
        T: BrokerTransport<Client = C>,
        R: Read + ?Sized,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let broker_url = match resolve_broker_url(&self.config, console).await {
            Ok(url) => url,
            Err(ConfigError::Mismatch) => {
                error!("Configuration mismatch: wrong broker url");
                panic!("configuration mismatch: wrong broker url");
            }
            Err(err) => return Err(err.into()),
        };

        let session = SessionConfig {
            broker_url: broker_url.as_str(),
            client_id: self.identity.as_str(),
        };
        let (client, events) = transport.init(&session).map_err(Error::Transport)?;
        self.set_client(client.clone());
        transport.start(&client).map_err(Error::Transport)?;
        self.set_state(ConnectionState::Connecting);

        info!(
            "Connecting to {} as {}",
            session.broker_url, session.client_id
        );
        Ok(events)
    }

    /// Drains `events` into [`on_event`](Self::on_event) until the source closes.
    pub async fn dispatch<E>(&self, events: &mut E)
    where
        E: EventSource<C>,
    {
        while let Some(event) = events.next_event().await {
            self.on_event(event);
        }
        warn!("MQTT event source closed");
    }

    /// Handles one session event.
    pub fn on_event(&self, event: MqttEvent<'_, C>) {
        match event {
            MqttEvent::Connected(client) => self.on_connected(client),
            MqttEvent::Disconnected => {
                info!("MQTT disconnected");
                self.set_state(ConnectionState::Disconnected);
            }
            MqttEvent::Subscribed { msg_id } => {
                info!("MQTT subscribed, msg_id={}", msg_id);
                if self.config.diagnostics
                    && let Some(client) = self.client()
                {
                    log_request(
                        "publish",
                        client.publish(DIAG_QOS0_TOPIC, b"data", QoS::AtMostOnce, false),
                    );
                }
            }
            MqttEvent::Unsubscribed { msg_id } => info!("MQTT unsubscribed, msg_id={}", msg_id),
            MqttEvent::Published { msg_id } => info!("MQTT published, msg_id={}", msg_id),
            MqttEvent::Data { topic, payload } => on_data(topic, payload),
            MqttEvent::Error(report) => log_error_report(&report),
            MqttEvent::Other(id) => info!("Other event id: {}", id),
        }
    }

    fn on_connected(&self, client: C) {
        info!("MQTT connected");
        self.set_client(client.clone());
        self.set_state(ConnectionState::Connected);

        if self.guard.try_launch() {
            info!("Launching dataset publisher for {}", self.identity.as_str());
        } else {
            debug!("Dataset publisher already launched, not starting another");
        }

        if self.config.diagnostics {
            send_diagnostics(&client);
        }
    }

    fn set_client(&self, client: C) {
        self.client.lock(|slot| *slot.borrow_mut() = Some(client));
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.lock(|cell| cell.set(state));
    }
}

fn send_diagnostics<C: BrokerClient>(client: &C) {
    log_request(
        "publish",
        client.publish(DIAG_QOS1_TOPIC, b"data_3", QoS::AtLeastOnce, false),
    );
    log_request(
        "subscribe",
        client.subscribe(DIAG_QOS0_TOPIC, QoS::AtMostOnce),
    );
    log_request(
        "subscribe",
        client.subscribe(DIAG_QOS1_TOPIC, QoS::AtLeastOnce),
    );
    log_request("unsubscribe", client.unsubscribe(DIAG_QOS1_TOPIC));
}

fn log_request<E: core::fmt::Debug>(kind: &str, result: Result<MessageId, E>) {
    match result {
        Ok(msg_id) => info!("sent {} successful, msg_id={}", kind, msg_id),
        Err(err) => error!("{} request rejected: {:?}", kind, err),
    }
}

fn on_data(topic: &str, payload: &[u8]) {
    let data = core::str::from_utf8(payload).unwrap_or("<binary payload>");

    #[cfg(feature = "esp32-log")]
    {
        esp_println::println!("TOPIC={}\r", topic);
        esp_println::println!("DATA={}\r", data);
    }
    #[cfg(not(feature = "esp32-log"))]
    info!("MQTT data on {}: {}", topic, data);
}

fn log_error_report(report: &ErrorReport) {
    match report {
        ErrorReport::Transport(fault) => {
            error!("MQTT transport error");
            log_error_if_nonzero("reported from tls layer", fault.tls_last_err);
            log_error_if_nonzero("reported from tls stack", fault.tls_stack_err);
            log_error_if_nonzero("captured as transport's socket errno", fault.sock_errno);
            info!("Last errno string ({})", fault.sock_errno_description());
        }
        ErrorReport::ConnectionRefused(code) => {
            error!("Connection refused by broker: {:?}", code);
        }
        ErrorReport::Unknown => error!("MQTT error without details"),
    }
}

fn log_error_if_nonzero(message: &str, code: i32) {
    if code != 0 {
        error!("Last error {}: 0x{:x}", message, code);
    }
}
