//! Error types for the room coordinator.

/// Reasons a room refuses a connection or a command.
///
/// The `Display` text is what the offending client receives in its
/// `error` payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Host already exists in this room.")]
    HostExists,

    #[error("Only the host can start the game.")]
    NotHostStart,

    #[error("Only the host can close the game.")]
    NotHostClose,

    #[error("Invalid game parameters.")]
    InvalidParameters,

    #[error("Game already in progress.")]
    AlreadyStarted,

    #[error("Room not in waiting state.")]
    NotWaiting,

    /// The room task has shut down (closed by its host).
    #[error("room {0} is unavailable")]
    Unavailable(String),
}

/// Failures while loading configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid PORT value {0:?}")]
    Port(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_messages_match_wire_text() {
        assert_eq!(RoomError::HostExists.to_string(), "Host already exists in this room.");
        assert_eq!(RoomError::InvalidParameters.to_string(), "Invalid game parameters.");
        assert_eq!(RoomError::NotWaiting.to_string(), "Room not in waiting state.");
    }

    #[test]
    fn config_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ConfigError::Parse {
            path: "config/game.json".into(),
            source,
        };
        assert!(err.to_string().contains("config/game.json"));
    }
}
