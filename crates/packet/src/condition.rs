use std::fmt;

use serde_json::Value;

/// Error condition code carried as the first argument of a `T_ERROR` datagram.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ErrorCondition {
    /// `E_BAD_REQUEST`
    BadRequest,
    /// `E_CONFLICT`
    Conflict,
    /// `E_FEATURE_NOT_IMPLEMENTED`
    FeatureNotImplemented,
    /// `E_FORBIDDEN`
    Forbidden,
    /// `E_INTERNAL_SERVER_ERROR`
    InternalServerError,
    /// `E_ITEM_NOT_FOUND`
    ItemNotFound,
    /// `E_NOT_ACCEPTABLE`
    NotAcceptable,
    /// `E_NOT_ALLOWED`
    NotAllowed,
    /// `E_NOT_AUTHORIZED`
    NotAuthorized,
    /// `E_REGISTRATION_REQUIRED`
    RegistrationRequired,
    /// `E_REMOTE_SERVER_NOT_AVAILABLE`
    RemoteServerNotAvailable,
    /// `E_REMOTE_SERVER_TIMEOUT`
    RemoteServerTimeout,
    /// `E_SERVICE_UNAVAILABLE`
    ServiceUnavailable,
    /// `E_UNEXPECTED_CONDITION`
    UnexpectedCondition,
    /// Unrecognised code. Encodes as an empty string.
    #[default]
    Invalid,
}

impl ErrorCondition {
    /// Every valid condition, in wire order.
    pub const ALL: [Self; 14] = [
        Self::BadRequest,
        Self::Conflict,
        Self::FeatureNotImplemented,
        Self::Forbidden,
        Self::InternalServerError,
        Self::ItemNotFound,
        Self::NotAcceptable,
        Self::NotAllowed,
        Self::NotAuthorized,
        Self::RegistrationRequired,
        Self::RemoteServerNotAvailable,
        Self::RemoteServerTimeout,
        Self::ServiceUnavailable,
        Self::UnexpectedCondition,
    ];

    /// Wire representation of this condition.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "E_BAD_REQUEST",
            Self::Conflict => "E_CONFLICT",
            Self::FeatureNotImplemented => "E_FEATURE_NOT_IMPLEMENTED",
            Self::Forbidden => "E_FORBIDDEN",
            Self::InternalServerError => "E_INTERNAL_SERVER_ERROR",
            Self::ItemNotFound => "E_ITEM_NOT_FOUND",
            Self::NotAcceptable => "E_NOT_ACCEPTABLE",
            Self::NotAllowed => "E_NOT_ALLOWED",
            Self::NotAuthorized => "E_NOT_AUTHORIZED",
            Self::RegistrationRequired => "E_REGISTRATION_REQUIRED",
            Self::RemoteServerNotAvailable => "E_REMOTE_SERVER_NOT_AVAILABLE",
            Self::RemoteServerTimeout => "E_REMOTE_SERVER_TIMEOUT",
            Self::ServiceUnavailable => "E_SERVICE_UNAVAILABLE",
            Self::UnexpectedCondition => "E_UNEXPECTED_CONDITION",
            Self::Invalid => "",
        }
    }

    /// Parses a wire string. Unknown codes yield [`ErrorCondition::Invalid`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|condition| condition.as_str() == value)
            .unwrap_or(Self::Invalid)
    }
}

impl From<&str> for ErrorCondition {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<ErrorCondition> for Value {
    fn from(value: ErrorCondition) -> Self {
        Self::String(value.as_str().to_string())
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
