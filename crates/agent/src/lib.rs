//! Edge agent: keeps a device connected to its management server.
//!
//! The agent reads the device's hardware description from the local bus,
//! opens a client session, identifies itself and then answers server
//! requests, forwarding `F_UBUS` calls to the bus.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Local bus bridge.
pub mod bus;
pub mod config;
mod error;
/// Session handler answering server requests.
pub mod handler;
pub mod hardware;
/// Reconnect loop.
pub mod runner;
pub mod tls;

pub use bus::{BusCaller, UbusCaller};
pub use config::{AgentConfig, Args};
pub use error::{Error, Result};
pub use handler::CpeSessionHandler;
pub use hardware::SystemHardware;
pub use runner::{Agent, SHUTDOWN_REASON};
