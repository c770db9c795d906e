//! Session layer for edgewire.
//!
//! A session owns one duplex [`Connection`](edgewire_transport::Connection)
//! and turns it into correlated request/result/error exchanges:
//!
//! - [`CallLedger`] tracks in-flight requests and their timeouts.
//! - [`ClientSession`] dials, keeps the link alive with `F_PING` requests and
//!   can be reopened after it closes.
//! - [`ServerSession`] wraps an accepted connection and carries per-session
//!   properties.
//!
//! Both variants implement [`Session`], so replies and outbound requests are
//! written the same way regardless of which side opened the connection.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod base;
mod client;
mod config;
mod error;
mod handler;
mod keepalive;
mod ledger;
mod server;
mod session;
mod state;

pub use client::{ClientSession, ClientSessionFactory};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use handler::{ClientSessionHandler, ServerSessionHandler};
pub use keepalive::{KeepaliveConfig, KeepaliveStrikes, StrikeVerdict};
pub use ledger::{CallLedger, Callbacks};
pub use server::ServerSession;
pub use session::Session;
pub use state::SessionState;
