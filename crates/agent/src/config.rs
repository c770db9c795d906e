//! Agent configuration.
//!
//! Values come from three layers: command line (or the matching `EDGEWIRE_*`
//! environment variable), then the optional YAML file, then built-in
//! defaults.
//!
//! ```yaml
//! entry:
//!   host: acs.example.net
//!   port: 443
//!   path: /iface/v1/cpe
//!   enableSSL: true
//!   pingPeriod: 30
//! log:
//!   filter: info
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use edgewire_session::KeepaliveConfig;
use edgewire_transport::{Target, TlsConfig};
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 443;
const DEFAULT_PATH: &str = "/iface/v1/cpe";
const DEFAULT_PING_PERIOD_SECS: u64 = 30;
const DEFAULT_ACK_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;
const DEFAULT_LOG_FILTER: &str = "info";

/// Files tried in order when `--config` is not given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["conf/edgewire-agent.yaml", "/etc/edgewire-agent.yaml"];

/// Command-line arguments.
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "EDGEWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server host name
    #[arg(long, env = "EDGEWIRE_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "EDGEWIRE_PORT")]
    pub port: Option<u16>,

    /// WebSocket request path
    #[arg(long, env = "EDGEWIRE_PATH")]
    pub path: Option<String>,

    /// Connect over TLS
    #[arg(long, env = "EDGEWIRE_ENABLE_SSL")]
    pub enable_ssl: Option<bool>,

    /// Verify the server certificate against the bundled web PKI roots
    #[arg(long, env = "EDGEWIRE_VERIFY_TLS")]
    pub verify_tls: bool,

    /// Seconds between keepalive probes
    #[arg(long, env = "EDGEWIRE_PING_PERIOD")]
    pub ping_period: Option<u64>,

    /// Seconds to wait for a keepalive reply
    #[arg(long, env = "EDGEWIRE_ACK_TIMEOUT")]
    pub ack_timeout: Option<u64>,

    /// Seconds between connection attempts
    #[arg(long, env = "EDGEWIRE_RECONNECT_DELAY")]
    pub reconnect_delay: Option<u64>,

    /// Use sample hardware information instead of querying the bus
    #[arg(short, long, env = "EDGEWIRE_STANDALONE")]
    pub standalone: bool,

    /// Log filter directive, overridden by `RUST_LOG`
    #[arg(long, env = "EDGEWIRE_LOG_FILTER")]
    pub log_filter: Option<String>,
}

/// Contents of the YAML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Connection settings.
    pub entry: EntrySection,
    /// Logging settings.
    pub log: LogSection,
}

/// `entry` section of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntrySection {
    /// Server host name.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// WebSocket request path.
    pub path: Option<String>,
    /// Connect over TLS.
    #[serde(rename = "enableSSL")]
    pub enable_ssl: Option<bool>,
    /// Verify the server certificate.
    #[serde(rename = "verifyTLS")]
    pub verify_tls: Option<bool>,
    /// Seconds between keepalive probes.
    pub ping_period: Option<u64>,
    /// Seconds to wait for a keepalive reply.
    pub ack_timeout: Option<u64>,
    /// Seconds between connection attempts.
    pub reconnect_delay: Option<u64>,
}

/// `log` section of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log filter directive.
    pub filter: Option<String>,
}

impl FileConfig {
    /// Parses a configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid YAML.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Io("failed to read configuration file", e))?;
        serde_yaml::from_str(&text).map_err(|e| Error::Config(path.to_path_buf(), e))
    }
}

/// Resolved agent configuration.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AgentConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// WebSocket request path.
    pub path: String,
    /// Connect over TLS.
    pub enable_ssl: bool,
    /// Verify the server certificate.
    pub verify_tls: bool,
    /// Interval between keepalive probes.
    pub ping_period: Duration,
    /// How long a keepalive probe waits for its reply.
    pub ack_timeout: Duration,
    /// Pause between connection attempts.
    pub reconnect_delay: Duration,
    /// Use sample hardware information.
    pub standalone: bool,
    /// Default log filter directive.
    pub log_filter: String,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::resolve(Args::default(), FileConfig::default(), None)
    }
}

impl AgentConfig {
    /// Loads the configuration file named by `args`, or the first default
    /// file that exists, and merges it with `args`.
    ///
    /// # Errors
    ///
    /// Fails if an explicitly named file is missing, or any chosen file is
    /// unreadable or malformed.
    pub fn load(args: Args) -> Result<Self> {
        let source = args.config.clone().or_else(|| {
            DEFAULT_CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.is_file())
        });

        let file = match &source {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };

        Ok(Self::resolve(args, file, source))
    }

    /// Merges the layers. `args` wins over `file`, which wins over defaults.
    #[must_use]
    pub fn resolve(args: Args, file: FileConfig, source: Option<PathBuf>) -> Self {
        let entry = file.entry;
        let seconds = |arg: Option<u64>, file: Option<u64>, default: u64| {
            Duration::from_secs(arg.or(file).unwrap_or(default))
        };

        Self {
            host: args
                .host
                .or(entry.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.or(entry.port).unwrap_or(DEFAULT_PORT),
            path: args
                .path
                .or(entry.path)
                .unwrap_or_else(|| DEFAULT_PATH.to_string()),
            enable_ssl: args.enable_ssl.or(entry.enable_ssl).unwrap_or(true),
            verify_tls: args.verify_tls || entry.verify_tls.unwrap_or(false),
            ping_period: seconds(
                args.ping_period,
                entry.ping_period,
                DEFAULT_PING_PERIOD_SECS,
            ),
            ack_timeout: seconds(
                args.ack_timeout,
                entry.ack_timeout,
                DEFAULT_ACK_TIMEOUT_SECS,
            ),
            reconnect_delay: seconds(
                args.reconnect_delay,
                entry.reconnect_delay,
                DEFAULT_RECONNECT_DELAY_SECS,
            ),
            standalone: args.standalone,
            log_filter: args
                .log_filter
                .or(file.log.filter)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            source,
        }
    }

    /// Where the session connects. `tls` is attached when TLS is enabled.
    #[must_use]
    pub fn target(&self, tls: Option<TlsConfig>) -> Target {
        let target = Target::new(self.host.clone(), self.port, self.path.clone());
        match tls {
            Some(tls) if self.enable_ssl => target.with_tls(tls),
            _ => target,
        }
    }

    /// Keepalive timing for the session.
    #[must_use]
    pub const fn keepalive(&self) -> KeepaliveConfig {
        KeepaliveConfig::new(self.ping_period).with_ack_timeout(self.ack_timeout)
    }
}
