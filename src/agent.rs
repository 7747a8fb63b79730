//! Boot sequence.
//!
//! Wires the pieces together the way the firmware runs them: resolve the
//! identity, probe the dataset, start the session, then poll the event
//! dispatch loop and the dataset publisher side by side. The publisher is
//! polled as its own future so a long file never delays event delivery.

use embassy_futures::join::join;
use embedded_io_async::Read;

use crate::config::AgentConfig;
use crate::controller::Controller;
use crate::error::Error;
use crate::identity::{NetworkInterface, resolve_identity};
use crate::publisher::{FilePublisher, WorkerExit};
use crate::storage::{self, Storage};
use crate::transport::BrokerTransport;

/// Runs the agent until the session's event source closes and the publisher
/// has finished.
///
/// On a device the event source never closes, so this future runs for the
/// whole process lifetime. If the source closes before any `Connected` event
/// the publisher is never launched and this future does not complete.
pub async fn run<N, T, S, R>(
    config: AgentConfig,
    netif: Option<&N>,
    transport: &mut T,
    storage: &mut S,
    console: Option<&mut R>,
) -> Result<WorkerExit, Error<T::Error>>
where
    N: NetworkInterface + ?Sized,
    T: BrokerTransport,
    S: Storage,
    R: Read + ?Sized,
{
    info!("Startup..");

    let identity = resolve_identity(netif);
    storage::probe(storage, config.data_path).await;

    let controller: Controller<T::Client> = Controller::new(identity, config);
    let mut events = controller.start(transport, console).await?;

    let (_, exit) = join(
        controller.dispatch(&mut events),
        FilePublisher::new(&controller, storage).run(),
    )
    .await;
    Ok(exit)
}
