use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use edgewire_packet::{Datagram, ErrorCondition, Function, Value};
use edgewire_session::{ClientSession, ClientSessionHandler, Error as SessionError, Session};
use tracing::{info, warn};

use crate::bus::BusCaller;
use crate::hardware::SystemHardware;

/// How long the server has to acknowledge identification.
pub const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Answers server requests on behalf of the device.
///
/// Identifies the device as soon as a session comes up, forwards `F_UBUS`
/// calls to the local bus and rejects the functions the device cannot
/// perform.
pub struct CpeSessionHandler {
    bus: Arc<dyn BusCaller>,
    hardware: Arc<OnceLock<SystemHardware>>,
}

impl CpeSessionHandler {
    /// Creates a handler. `hardware` is read when a session is created.
    pub fn new(bus: Arc<dyn BusCaller>, hardware: Arc<OnceLock<SystemHardware>>) -> Self {
        Self { bus, hardware }
    }
}

#[async_trait]
impl ClientSessionHandler for CpeSessionHandler {
    async fn on_session_created(&self, session: &ClientSession) {
        info!(session_id = %session.id(), "session created");

        let Some(hardware) = self.hardware.get().cloned() else {
            warn!(session_id = %session.id(), "hardware unknown, skipping identification");
            return;
        };

        let session = session.clone();
        tokio::spawn(async move { identify(&session, &hardware).await });
    }

    async fn on_session_destroyed(&self, session: &ClientSession) {
        info!(session_id = %session.id(), "session destroyed");
    }

    async fn on_message_received(&self, session: &ClientSession, datagram: Datagram) {
        info!(
            session_id = %session.id(),
            datagram_id = %datagram.id,
            function = %datagram.function,
            "request received"
        );

        let bus = Arc::clone(&self.bus);
        let session = session.clone();
        tokio::spawn(async move {
            let reply = respond(bus.as_ref(), &datagram).await;
            if let Err(e) = session.send(reply).await {
                warn!(datagram_id = %datagram.id, "cannot deliver reply: {}", e);
            }
        });
    }
}

async fn identify(session: &ClientSession, hardware: &SystemHardware) {
    let mut request = Datagram::request(&Function::Identify);
    for field in hardware.identification() {
        request.push(field);
    }

    match session.call(request, IDENTIFY_TIMEOUT).await {
        Ok(_) => info!(session_id = %session.id(), "identification succeeded"),
        Err(SessionError::Remote { condition, message }) => {
            warn!(session_id = %session.id(), %condition, message = %message, "identification rejected");
        }
        Err(SessionError::Timeout(interval)) => {
            warn!(session_id = %session.id(), ?interval, "identification timed out");
        }
        Err(e) => warn!(session_id = %session.id(), "identification failed: {}", e),
    }
}

/// Builds the reply to a server request.
pub async fn respond(bus: &dyn BusCaller, request: &Datagram) -> Datagram {
    match request.function() {
        Function::Ping => Datagram::result(request.id.clone(), request.function.clone()),
        Function::BusCall => bus_call(bus, request).await,
        function @ (Function::Reboot | Function::Upgrade | Function::Identify) => {
            Datagram::error(
                request.id.clone(),
                request.function.clone(),
                ErrorCondition::FeatureNotImplemented,
                format!("{function} IS NOT SUPPORTED"),
            )
        }
        Function::None | Function::Unknown(_) => Datagram::error(
            request.id.clone(),
            request.function.clone(),
            ErrorCondition::FeatureNotImplemented,
            "UNKNOWN FUNCTION",
        ),
    }
}

async fn bus_call(bus: &dyn BusCaller, request: &Datagram) -> Datagram {
    let method = request.string_argument_or(0, "");
    let path = request.string_argument_or(1, "");
    let payload = request.string_argument_or(2, "");

    let failure = |message: String| {
        Datagram::error(
            request.id.clone(),
            Function::BusCall.as_str(),
            ErrorCondition::RemoteServerNotAvailable,
            message,
        )
    };

    match bus.call(method, path, payload).await {
        Err(e) => failure(e.to_string()),
        Ok(response) if response.trim().is_empty() => {
            failure("BLANK RESPONSE FROM UBUS".to_string())
        }
        Ok(response) => match serde_json::from_str::<Value>(&response) {
            Ok(value) => {
                Datagram::result(request.id.clone(), Function::BusCall.as_str()).with_argument(value)
            }
            Err(e) => failure(e.to_string()),
        },
    }
}
