use std::sync::{Arc, OnceLock};

use edgewire_session::{ClientSession, ClientSessionFactory, Session, SessionConfig};
use edgewire_transport::{CloseCode, Dialer, Target, TlsConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::BusCaller;
use crate::config::AgentConfig;
use crate::handler::CpeSessionHandler;
use crate::hardware::SystemHardware;

/// Close reason sent when the process is asked to stop.
pub const SHUTDOWN_REASON: &str = "PROCESS INTERRUPTED";

/// Keeps one client session connected until shut down.
pub struct Agent {
    config: AgentConfig,
    bus: Arc<dyn BusCaller>,
    hardware: Arc<OnceLock<SystemHardware>>,
    session: ClientSession,
    target: Target,
    shutdown: CancellationToken,
}

impl Agent {
    /// Creates an agent that reaches the server through `dialer`.
    pub fn new(
        config: AgentConfig,
        dialer: Arc<dyn Dialer>,
        bus: Arc<dyn BusCaller>,
        tls: Option<TlsConfig>,
    ) -> Self {
        let hardware = Arc::new(OnceLock::new());
        let factory = ClientSessionFactory::new(dialer, SessionConfig::default());
        let session = factory.create(Arc::new(CpeSessionHandler::new(
            Arc::clone(&bus),
            Arc::clone(&hardware),
        )));
        let target = config.target(tls);

        Self {
            config,
            bus,
            hardware,
            session,
            target,
            shutdown: CancellationToken::new(),
        }
    }

    /// The agent's session.
    #[must_use]
    pub const fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Hardware information, once known.
    #[must_use]
    pub fn hardware(&self) -> Option<&SystemHardware> {
        self.hardware.get()
    }

    /// Loads hardware information if it is not known yet. Returns whether it
    /// is known afterwards.
    pub async fn ensure_hardware(&self) -> bool {
        if self.hardware.get().is_some() {
            return true;
        }

        let loaded = if self.config.standalone {
            Ok(SystemHardware::sample())
        } else {
            SystemHardware::query(self.bus.as_ref()).await
        };

        match loaded {
            Ok(hardware) => {
                info!(
                    serial_number = %hardware.serial_number,
                    mac = %hardware.mac,
                    model = %hardware.model,
                    software_version = %hardware.software_version,
                    "hardware information loaded"
                );
                let _ = self.hardware.set(hardware);
                true
            }
            Err(e) => {
                error!("unable to load hardware information: {}", e);
                false
            }
        }
    }

    /// Connects, serves and reconnects every `reconnect_delay` until
    /// [`Agent::shutdown`] is called.
    pub async fn run(&self) {
        while !self.shutdown.is_cancelled() {
            if self.ensure_hardware().await {
                info!(url = %self.target, "connecting");

                let open = self.session.open(&self.target, self.config.keepalive());
                tokio::pin!(open);

                let outcome = tokio::select! {
                    outcome = &mut open => outcome,
                    () = self.shutdown.cancelled() => {
                        let _ = self.session.close(CloseCode::NORMAL, SHUTDOWN_REASON).await;
                        open.await
                    }
                };

                match outcome {
                    Ok(()) => info!("session ended"),
                    Err(e) => error!("session failed: {}", e),
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        let _ = self.session.close(CloseCode::NORMAL, SHUTDOWN_REASON).await;
        info!("agent stopped");
    }

    /// Stops [`Agent::run`], closing the session with [`SHUTDOWN_REASON`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
