use std::time::Duration;

/// Tunables shared by client and server sessions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionConfig {
    /// How long a close control frame may take to write.
    pub close_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            close_deadline: Duration::from_millis(3000),
        }
    }
}
