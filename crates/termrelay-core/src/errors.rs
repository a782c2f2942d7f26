use std::error::Error;

/// Base trait for bridge errors, mirroring the error-code convention used
/// across the workspace for structured logging.
pub trait BridgeErrorCode: Error + Send + Sync + 'static {
    fn error_code(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required value '{field}' (set {env_var} or pass {flag})")]
    Missing {
        field: &'static str,
        env_var: &'static str,
        flag: &'static str,
    },

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },

    #[error("refusing to read '{path}': not owner-only (mode {mode:o})")]
    InsecurePermissions { path: String, mode: u32 },

    #[error("io error reading config: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BridgeErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::Missing { .. } => "CONFIG_MISSING",
            ConfigError::Invalid { .. } => "CONFIG_INVALID",
            ConfigError::InsecurePermissions { .. } => "CONFIG_INSECURE_PERMISSIONS",
            ConfigError::Io { .. } => "CONFIG_IO_ERROR",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("program '{program}' not found on PATH or as a relative path")]
    NotFound { program: String },

    #[error("argument at index {index} contains a NUL byte")]
    NulArgument { index: usize },

    #[error("openpty failed: {source}")]
    OpenPty {
        #[source]
        source: nix::Error,
    },

    #[error("fork failed: {source}")]
    Fork {
        #[source]
        source: nix::Error,
    },

    #[error("exec of '{program}' failed: {source}")]
    Exec {
        program: String,
        #[source]
        source: nix::Error,
    },
}

impl BridgeErrorCode for SpawnError {
    fn error_code(&self) -> &'static str {
        match self {
            SpawnError::NotFound { .. } => "SPAWN_NOT_FOUND",
            SpawnError::NulArgument { .. } => "SPAWN_NUL_ARGUMENT",
            SpawnError::OpenPty { .. } => "SPAWN_OPENPTY_FAILED",
            SpawnError::Fork { .. } => "SPAWN_FORK_FAILED",
            SpawnError::Exec { .. } => "SPAWN_EXEC_FAILED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("pty read failed: {source}")]
    Read {
        #[source]
        source: std::io::Error,
    },

    #[error("pty write failed: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set window size: {source}")]
    ResizeFailed {
        #[source]
        source: nix::Error,
    },

    #[error("failed to enter raw mode: {source}")]
    RawModeFailed {
        #[source]
        source: nix::Error,
    },

    #[error("child process wait failed: {source}")]
    Wait {
        #[source]
        source: nix::Error,
    },

    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

impl BridgeErrorCode for PtyError {
    fn error_code(&self) -> &'static str {
        match self {
            PtyError::Read { .. } => "PTY_READ_FAILED",
            PtyError::Write { .. } => "PTY_WRITE_FAILED",
            PtyError::ResizeFailed { .. } => "PTY_RESIZE_FAILED",
            PtyError::RawModeFailed { .. } => "PTY_RAW_MODE_FAILED",
            PtyError::Wait { .. } => "PTY_WAIT_FAILED",
            PtyError::Spawn(inner) => inner.error_code(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message rejected by transport: {message}")]
    Rejected { message: String },

    #[error("transport request failed: {message}")]
    RequestFailed { message: String },

    #[error("sender {chat_id} is not the authorized peer")]
    Unauthorized { chat_id: i64 },
}

impl BridgeErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            ChatError::Rejected { .. } => "CHAT_REJECTED",
            ChatError::RequestFailed { .. } => "CHAT_REQUEST_FAILED",
            ChatError::Unauthorized { .. } => "CHAT_UNAUTHORIZED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("signal handling failed: {source}")]
    Signal {
        #[source]
        source: std::io::Error,
    },
}

impl BridgeErrorCode for BridgeError {
    fn error_code(&self) -> &'static str {
        match self {
            BridgeError::Config(inner) => inner.error_code(),
            BridgeError::Spawn(inner) => inner.error_code(),
            BridgeError::Pty(inner) => inner.error_code(),
            BridgeError::Chat(inner) => inner.error_code(),
            BridgeError::Signal { .. } => "SIGNAL_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_codes() {
        let err = ConfigError::Missing {
            field: "chat_id",
            env_var: "TERMRELAY_CHAT_ID",
            flag: "--chat-id",
        };
        assert_eq!(err.error_code(), "CONFIG_MISSING");
    }

    #[test]
    fn bridge_error_delegates_code() {
        let err = BridgeError::from(SpawnError::NotFound {
            program: "doesnotexist".to_string(),
        });
        assert_eq!(err.error_code(), "SPAWN_NOT_FOUND");
    }

    #[test]
    fn chat_unauthorized_message() {
        let err = ChatError::Unauthorized { chat_id: 42 };
        assert_eq!(err.to_string(), "sender 42 is not the authorized peer");
    }
}
