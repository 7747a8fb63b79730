//! # Dataset Publisher
//!
//! The publisher drains the dataset file to `<client-id>/data`, one MQTT
//! message per line, exactly once per boot. It is launched by the controller
//! on the first `Connected` event and never restarts; a reboot is the only way
//! to publish the dataset again.
//!
//! Delivery is best effort. A publish the client library rejects is logged and
//! the next line is sent anyway, so one bad line cannot hold back the rest of
//! the batch. Between lines the worker pauses for the configured pacing
//! interval to leave the scheduler and the task watchdog some room.

use embassy_futures::yield_now;
use embassy_time::Timer;
use heapless::String;

use crate::controller::Controller;
use crate::identity::{ClientIdentity, MAX_CLIENT_ID_LEN};
use crate::storage::{LineReader, MAX_LINE_LEN, Storage};
use crate::transport::{BrokerClient, QoS};

/// Suffix appended to the client id to form the dataset topic.
pub const DATA_TOPIC_SUFFIX: &str = "/data";

/// Maximum length of the dataset topic.
pub const MAX_TOPIC_LEN: usize = 64;

/// Dataset lines are published at least once, never retained.
pub const DATA_QOS: QoS = QoS::AtLeastOnce;

const _: () = assert!(MAX_CLIENT_ID_LEN + DATA_TOPIC_SUFFIX.len() <= MAX_TOPIC_LEN);

/// Builds `"<client-id>/data"`.
pub fn data_topic(identity: &ClientIdentity) -> String<MAX_TOPIC_LEN> {
    let mut topic = String::new();
    // Cannot overflow, see the assertion above.
    let _ = topic.push_str(identity.as_str());
    let _ = topic.push_str(DATA_TOPIC_SUFFIX);
    topic
}

/// Counts for one streaming run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Lines read from the file.
    pub lines: u32,
    /// Lines the client library accepted.
    pub published: u32,
    /// Lines the client library rejected.
    pub failed: u32,
    /// Lines dropped because no broker handle was recorded.
    pub skipped: u32,
}

/// How the worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The dataset could not be opened; nothing was published.
    OpenFailed,
    /// Reading failed part-way; lines before the failure were handled.
    ReadFailed(PublishReport),
    /// End of file reached.
    Completed(PublishReport),
    /// Another publisher already took the launch; nothing was published.
    AlreadyClaimed,
}

/// The single background worker that streams the dataset to the broker.
pub struct FilePublisher<'a, C, S> {
    controller: &'a Controller<C>,
    storage: &'a mut S,
}

impl<'a, C, S> FilePublisher<'a, C, S>
where
    C: BrokerClient + Clone,
    S: Storage,
{
    /// Creates a publisher over `controller`'s session and `storage`.
    pub fn new(controller: &'a Controller<C>, storage: &'a mut S) -> Self {
        Self {
            controller,
            storage,
        }
    }

    /// Waits until the controller launches the publisher, then streams the
    /// dataset once.
    ///
    /// Only the first publisher created over a controller ever streams; any
    /// later one returns [`WorkerExit::AlreadyClaimed`] straight away.
    pub async fn run(self) -> WorkerExit {
        let guard = self.controller.guard();
        if !guard.claim_worker() {
            warn!("Dataset publisher already claimed, not streaming again");
            return WorkerExit::AlreadyClaimed;
        }
        guard.launched().await;
        info!("Dataset publisher started");
        self.stream().await
    }

    async fn stream(self) -> WorkerExit {
        let Self {
            controller,
            storage,
        } = self;
        let topic = data_topic(controller.identity());
        let path = controller.config().data_path;

        let file = match storage.open(path).await {
            Ok(file) => file,
            Err(err) => {
                error!("Failed to open {}: {:?}", path, err);
                return WorkerExit::OpenFailed;
            }
        };

        let mut reader: LineReader<_, MAX_LINE_LEN> = LineReader::new(file);
        let mut report = PublishReport::default();
        loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    error!(
                        "Reading {} failed after {} lines: {:?}",
                        path, report.lines, err
                    );
                    return WorkerExit::ReadFailed(report);
                }
            };
            report.lines += 1;
            publish_line(controller, &topic, line, &mut report);
            pace(controller).await;
        }
        drop(reader);

        info!(
            "All lines from {} published: {} sent, {} failed, {} skipped",
            path, report.published, report.failed, report.skipped
        );
        WorkerExit::Completed(report)
    }
}

fn publish_line<C>(
    controller: &Controller<C>,
    topic: &str,
    line: &[u8],
    report: &mut PublishReport,
) where
    C: BrokerClient + Clone,
{
    let text = core::str::from_utf8(line).unwrap_or("<non-utf8 line>");

    let Some(client) = controller.client() else {
        warn!("No broker session recorded, skipping line: {}", text);
        report.skipped += 1;
        return;
    };

    match client.publish(topic, line, DATA_QOS, false) {
        Ok(msg_id) => {
            info!("Published from file: {} (msg_id={})", text, msg_id);
            report.published += 1;
        }
        Err(err) => {
            error!("Failed to publish line {}: {:?}", text, err);
            report.failed += 1;
        }
    }
}

/// Pause between lines. Pacing policy only; line delivery does not depend on it.
async fn pace<C>(controller: &Controller<C>)
where
    C: BrokerClient + Clone,
{
    match controller.config().line_pacing {
        Some(delay) => Timer::after(delay).await,
        None => yield_now().await,
    }
}
