//! Client-driven liveness probing.

use std::time::Duration;

use edgewire_packet::Datagram;
use edgewire_transport::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ClientSession;
use crate::error::Error;
use crate::session::Session;

/// Timing of the `F_PING` probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeepaliveConfig {
    /// Pause between the end of one probe and the start of the next.
    pub interval: Duration,
    /// How long a probe waits for its reply.
    pub ack_timeout: Duration,
}

impl KeepaliveConfig {
    /// Reply timeout used unless overridden.
    pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(15);

    /// Probes every `interval` with the default reply timeout.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            ack_timeout: Self::DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Overrides the reply timeout.
    #[must_use]
    pub const fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }
}

impl From<Duration> for KeepaliveConfig {
    fn from(interval: Duration) -> Self {
        Self::new(interval)
    }
}

/// What to do after a probe outcome.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StrikeVerdict {
    /// Schedule the next probe.
    Continue,
    /// Give up on the connection.
    Close,
}

/// Two-strike policy: one failed probe is forgiven, two in a row are not.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KeepaliveStrikes {
    retry: bool,
}

impl KeepaliveStrikes {
    /// A probe succeeded; forget earlier failures.
    pub const fn record_success(&mut self) {
        self.retry = false;
    }

    /// A probe failed or timed out.
    pub const fn record_failure(&mut self) -> StrikeVerdict {
        if self.retry {
            StrikeVerdict::Close
        } else {
            self.retry = true;
            StrikeVerdict::Continue
        }
    }

    /// Whether the last probe failed.
    #[must_use]
    pub const fn is_retrying(&self) -> bool {
        self.retry
    }
}

pub(crate) async fn run(session: ClientSession, config: KeepaliveConfig, stop: CancellationToken) {
    let mut strikes = KeepaliveStrikes::default();

    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(config.interval) => {}
        }

        let outcome = tokio::select! {
            () = stop.cancelled() => return,
            outcome = session.call(Datagram::ping(), config.ack_timeout) => outcome,
        };

        let reason = match outcome {
            Ok(_) => {
                debug!(session_id = %session.id(), "PING SUCCESS");
                strikes.record_success();
                continue;
            }
            Err(Error::Timeout(_)) => "PING TIMEOUT",
            Err(Error::NotReady | Error::Cancelled | Error::Closed) => return,
            Err(e) => {
                debug!(session_id = %session.id(), "PING ERROR: {}", e);
                "PING ERROR"
            }
        };

        if strikes.record_failure() == StrikeVerdict::Close {
            warn!(session_id = %session.id(), reason, "keepalive failed twice, closing");
            let _ = session.close(CloseCode::NORMAL, reason).await;
            return;
        }
        debug!(session_id = %session.id(), reason, "keepalive failed once, retrying");
    }
}
