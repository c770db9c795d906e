//! Wire envelope shared by both ends of an edgewire session.
//!
//! Every frame on the wire is one JSON object:
//!
//! ```text
//! {"id":"<string>","type":"T_REQUEST|T_RESULT|T_ERROR","function":"<string>","arguments":[...]}
//! ```
//!
//! This crate owns that envelope ([`Datagram`]) and the closed vocabularies it
//! carries: the datagram type, the RPC function names and the error condition
//! codes used in `T_ERROR` replies.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod condition;
mod datagram;
mod error;
mod function;
mod kind;

pub use condition::ErrorCondition;
pub use datagram::Datagram;
pub use error::{Error, Result};
pub use function::Function;
pub use kind::DatagramType;

/// Re-exported so callers can build argument lists without naming `serde_json`.
pub use serde_json::Value;
