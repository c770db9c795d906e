use std::fmt;

use serde::{Deserialize, Serialize};

/// The `type` field of a datagram.
///
/// Values outside the known set decode to [`DatagramType::Unknown`] instead of
/// failing, so the read loop can answer them with a `T_ERROR` rejection. The
/// raw string is kept so the datagram still encodes byte-for-byte.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum DatagramType {
    /// A call that expects a `Result` or `Error` with the same id.
    Request,

    /// Successful answer to a request.
    Result,

    /// Failed answer to a request; arguments are `[condition, message]`.
    Error,

    /// Anything else, including an empty or missing type.
    Unknown(String),
}

impl DatagramType {
    /// Wire representation of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Request => "T_REQUEST",
            Self::Result => "T_RESULT",
            Self::Error => "T_ERROR",
            Self::Unknown(raw) => raw,
        }
    }

    /// Parses a wire string. Never fails.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "T_REQUEST" => Self::Request,
            "T_RESULT" => Self::Result,
            "T_ERROR" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether this is one of the three types the protocol understands.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl Default for DatagramType {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<String> for DatagramType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "T_REQUEST" => Self::Request,
            "T_RESULT" => Self::Result,
            "T_ERROR" => Self::Error,
            _ => Self::Unknown(value),
        }
    }
}

impl From<DatagramType> for String {
    fn from(value: DatagramType) -> Self {
        match value {
            DatagramType::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for DatagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
