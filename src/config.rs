//! Agent configuration.
//!
//! Everything is fixed at build time. The broker URL comes from the
//! `BROKER_URL` environment variable when the firmware is compiled, or from
//! the console at boot when the `broker-url-from-stdin` feature is enabled.

use embassy_time::{Duration, Timer};
use embedded_io_async::Read;
use heapless::String;

use crate::error::ConfigError;

/// Maximum length of a broker URL.
pub const MAX_BROKER_URL_LEN: usize = 128;

/// Placeholder URL that tells the firmware to ask for the broker on the console.
pub const BROKER_URL_FROM_STDIN: &str = "FROM_STDIN";

/// A broker URL held inline.
pub type BrokerUrl = String<MAX_BROKER_URL_LEN>;

const DEFAULT_BROKER_URL: &str = "mqtt://mqtt.eclipseprojects.io";

const CONSOLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Static broker URL, or [`BROKER_URL_FROM_STDIN`].
    pub broker_url: &'static str,
    /// Read the broker URL from the console instead of using `broker_url`.
    pub broker_from_console: bool,
    /// Dataset drained to the broker once per boot.
    pub data_path: &'static str,
    /// Delay between published lines. `None` only yields to the executor.
    ///
    /// This is scheduler and watchdog courtesy, not a protocol requirement.
    pub line_pacing: Option<Duration>,
    /// Send the demo publish/subscribe/unsubscribe traffic after connecting.
    pub diagnostics: bool,
}

/// The firmware configuration.
pub const AGENT: AgentConfig = AgentConfig {
    broker_url: match option_env!("BROKER_URL") {
        Some(url) => url,
        None => DEFAULT_BROKER_URL,
    },
    broker_from_console: cfg!(feature = "broker-url-from-stdin"),
    data_path: "/spiffs/data.txt",
    line_pacing: Some(Duration::from_millis(200)),
    diagnostics: cfg!(feature = "demo-handshake"),
};

impl Default for AgentConfig {
    fn default() -> Self {
        AGENT
    }
}

/// Produces the broker URL for the session.
///
/// With `broker_from_console` set, the static URL must be the
/// [`BROKER_URL_FROM_STDIN`] placeholder and a console must be supplied;
/// anything else is a [`ConfigError::Mismatch`].
pub async fn resolve_broker_url<R>(
    config: &AgentConfig,
    console: Option<&mut R>,
) -> Result<BrokerUrl, ConfigError>
where
    R: Read + ?Sized,
{
    if !config.broker_from_console {
        let mut url = BrokerUrl::new();
        url.push_str(config.broker_url)
            .map_err(|_| ConfigError::UrlTooLong)?;
        return Ok(url);
    }

    match console {
        Some(console) if config.broker_url == BROKER_URL_FROM_STDIN => {
            Ok(read_broker_url(console).await)
        }
        _ => Err(ConfigError::Mismatch),
    }
}

/// Prompts for a broker URL and reads it up to the first newline.
///
/// Only printable 7-bit bytes are kept. Reading stops at a newline, when the
/// buffer is full, or when the console reports an error.
pub async fn read_broker_url<R>(console: &mut R) -> BrokerUrl
where
    R: Read + ?Sized,
{
    info!("Please enter url of mqtt broker");

    let mut url = BrokerUrl::new();
    let mut byte = [0u8; 1];
    while url.len() < url.capacity() {
        match console.read(&mut byte).await {
            Ok(0) => Timer::after(CONSOLE_POLL_INTERVAL).await,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) if byte[0] > 0 && byte[0] < 127 => {
                let _ = url.push(char::from(byte[0]));
            }
            Ok(_) => {}
            Err(_) => {
                error!("Console read failed while reading the broker url");
                break;
            }
        }
    }

    info!("Broker url: {}", url.as_str());
    url
}
