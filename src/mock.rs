//! In-memory broker, transport and filesystem used by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_io_async::{ErrorKind, ErrorType, Read};

use crate::storage::Storage;
use crate::transport::{
    BrokerClient, BrokerTransport, EventSource, MessageId, MqttEvent, QoS, SessionConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    Subscribe {
        topic: String,
        qos: QoS,
    },
    Unsubscribe {
        topic: String,
    },
}

impl Call {
    pub fn publish(topic: &str, payload: &[u8], qos: QoS) -> Self {
        Call::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain: false,
        }
    }

    pub fn subscribe(topic: &str, qos: QoS) -> Self {
        Call::Subscribe {
            topic: topic.to_string(),
            qos,
        }
    }

    pub fn unsubscribe(topic: &str) -> Self {
        Call::Unsubscribe {
            topic: topic.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected;

#[derive(Default)]
struct Broker {
    calls: RefCell<Vec<Call>>,
    rejected_payloads: RefCell<Vec<Vec<u8>>>,
    reject_all: Cell<bool>,
    next_id: Cell<MessageId>,
}

/// A client handle. Clones share the same recorded calls; `session` tells
/// handles from different connects apart.
#[derive(Clone, Default)]
pub struct MockClient {
    broker: Rc<Broker>,
    session: u32,
}

impl PartialEq for MockClient {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.broker, &other.broker) && self.session == other.session
    }
}

impl core::fmt::Debug for MockClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockClient")
            .field("session", &self.session)
            .finish()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for a later connect on the same broker.
    pub fn reconnected(&self, session: u32) -> Self {
        Self {
            broker: Rc::clone(&self.broker),
            session,
        }
    }

    pub fn session(&self) -> u32 {
        self.session
    }

    pub fn rejecting_all(self) -> Self {
        self.broker.reject_all.set(true);
        self
    }

    /// Makes publishes of exactly `payload` fail.
    pub fn rejecting_payload(self, payload: &[u8]) -> Self {
        self.broker
            .rejected_payloads
            .borrow_mut()
            .push(payload.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.broker.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.broker.calls.borrow_mut().clear();
    }

    /// Payloads published to `topic`, in order, including rejected attempts.
    pub fn payloads_to(&self, topic: &str) -> Vec<Vec<u8>> {
        self.broker
            .calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Publish { topic: t, payload, .. } if t == topic => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call, rejected: bool) -> Result<MessageId, Rejected> {
        self.broker.calls.borrow_mut().push(call);
        if rejected || self.broker.reject_all.get() {
            return Err(Rejected);
        }
        let id = self.broker.next_id.get().wrapping_add(1);
        self.broker.next_id.set(id);
        Ok(id)
    }
}

impl BrokerClient for MockClient {
    type Error = Rejected;

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, Self::Error> {
        let rejected = self
            .broker
            .rejected_payloads
            .borrow()
            .iter()
            .any(|p| p == payload);
        self.record(
            Call::Publish {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
            },
            rejected,
        )
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<MessageId, Self::Error> {
        self.record(Call::subscribe(topic, qos), false)
    }

    fn unsubscribe(&self, topic: &str) -> Result<MessageId, Self::Error> {
        self.record(Call::unsubscribe(topic), false)
    }
}

/// Replays a fixed list of events, yielding to the executor before each one
/// so that concurrently polled futures make progress in between.
pub struct ScriptedEvents {
    events: VecDeque<MqttEvent<'static, MockClient>>,
}

impl EventSource<MockClient> for ScriptedEvents {
    async fn next_event(&mut self) -> Option<MqttEvent<'_, MockClient>> {
        embassy_futures::yield_now().await;
        self.events.pop_front()
    }
}

pub struct MockTransport {
    client: MockClient,
    events: Option<Vec<MqttEvent<'static, MockClient>>>,
    session: Option<(String, String)>,
    started: bool,
    fail_init: bool,
}

impl MockTransport {
    pub fn new(events: Vec<MqttEvent<'static, MockClient>>) -> Self {
        Self::with_client(MockClient::new(), events)
    }

    pub fn with_client(client: MockClient, events: Vec<MqttEvent<'static, MockClient>>) -> Self {
        Self {
            client,
            events: Some(events),
            session: None,
            started: false,
            fail_init: false,
        }
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn broker_url(&self) -> Option<String> {
        self.session.as_ref().map(|(url, _)| url.clone())
    }

    pub fn client_id(&self) -> Option<String> {
        self.session.as_ref().map(|(_, id)| id.clone())
    }

    pub fn started(&self) -> bool {
        self.started
    }
}

impl BrokerTransport for MockTransport {
    type Client = MockClient;
    type Events = ScriptedEvents;
    type Error = Rejected;

    fn init(
        &mut self,
        config: &SessionConfig<'_>,
    ) -> Result<(Self::Client, Self::Events), Self::Error> {
        if self.fail_init {
            return Err(Rejected);
        }
        self.session = Some((config.broker_url.to_string(), config.client_id.to_string()));
        let events = self.events.take().unwrap_or_default();
        Ok((
            self.client.clone(),
            ScriptedEvents {
                events: events.into(),
            },
        ))
    }

    fn start(&mut self, _client: &Self::Client) -> Result<(), Self::Error> {
        self.started = true;
        Ok(())
    }
}

/// A file backed by a static byte string.
pub struct MemFile {
    data: &'static [u8],
    fail_at_end: bool,
}

impl ErrorType for MemFile {
    type Error = ErrorKind;
}

impl Read for MemFile {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.data.is_empty() && self.fail_at_end {
            return Err(ErrorKind::Other);
        }
        let n = self.data.len().min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound;

#[derive(Default)]
pub struct MemStorage {
    files: Vec<(&'static str, &'static [u8], bool)>,
    opened: Vec<String>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &'static str, data: &'static [u8]) -> Self {
        self.files.push((path, data, false));
        self
    }

    /// A file whose read fails once `data` has been consumed.
    pub fn with_broken_file(mut self, path: &'static str, data: &'static [u8]) -> Self {
        self.files.push((path, data, true));
        self
    }

    pub fn opened(&self) -> &[String] {
        &self.opened
    }
}

impl Storage for MemStorage {
    type File = MemFile;
    type Error = NotFound;

    async fn open(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        self.opened.push(path.to_string());
        self.files
            .iter()
            .find(|(p, _, _)| *p == path)
            .map(|&(_, data, fail_at_end)| MemFile { data, fail_at_end })
            .ok_or(NotFound)
    }
}

/// Log records captured on the current test thread.
#[cfg(feature = "log")]
pub mod logs {
    use std::cell::RefCell;
    use std::string::{String, ToString};
    use std::vec::Vec;

    use log::{Level, LevelFilter, Log, Metadata, Record};

    std::thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    struct Capture;

    impl Log for Capture {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            RECORDS.with(|records| {
                records
                    .borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture;

    /// Runs `f` and returns everything it logged on this thread.
    pub fn capture(f: impl FnOnce()) -> Vec<(Level, String)> {
        // Only the first call installs the logger; later ones are no-ops.
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(LevelFilter::Trace);
        RECORDS.with(|records| records.borrow_mut().clear());
        f();
        RECORDS.with(|records| records.take())
    }

    /// Whether any captured record at `level` contains `needle`.
    pub fn contains(records: &[(Level, String)], level: Level, needle: &str) -> bool {
        records
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}
