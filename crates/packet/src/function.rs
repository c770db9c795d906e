use std::fmt;

/// RPC operation named by a request's `function` field.
///
/// An empty string ([`Function::None`]) and an unrecognised name
/// ([`Function::Unknown`]) are kept apart so a dispatcher can tell "nothing was
/// requested" from "something we do not implement was requested".
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Function {
    /// No function was named.
    None,

    /// Liveness probe.
    Ping,

    /// Device identification.
    Identify,

    /// Device reboot.
    Reboot,

    /// Firmware upgrade.
    Upgrade,

    /// Call forwarded to the device's local message bus.
    BusCall,

    /// A name outside the known set.
    Unknown(String),
}

impl Function {
    /// Wire representation of this function.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "",
            Self::Ping => "F_PING",
            Self::Identify => "F_IDENTIFY",
            Self::Reboot => "F_REBOOT",
            Self::Upgrade => "F_UPGRADE",
            Self::BusCall => "F_UBUS",
            Self::Unknown(raw) => raw,
        }
    }

    /// Parses a wire string. Never fails.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "" => Self::None,
            "F_PING" => Self::Ping,
            "F_IDENTIFY" => Self::Identify,
            "F_REBOOT" => Self::Reboot,
            "F_UPGRADE" => Self::Upgrade,
            "F_UBUS" => Self::BusCall,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<&str> for Function {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_functions_round_trip() {
        for function in [
            Function::Ping,
            Function::Identify,
            Function::Reboot,
            Function::Upgrade,
            Function::BusCall,
        ] {
            assert_eq!(Function::parse(function.as_str()), function);
        }
    }

    #[test]
    fn test_empty_and_unknown_are_distinct() {
        assert_eq!(Function::parse(""), Function::None);
        assert_eq!(
            Function::parse("F_SELF_DESTRUCT"),
            Function::Unknown("F_SELF_DESTRUCT".to_string())
        );
        assert_ne!(Function::parse(""), Function::parse("F_SELF_DESTRUCT"));
    }
}
