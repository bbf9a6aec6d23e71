use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] sniper_core::ValidationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Broker(#[from] sniper_core::BrokerError),

    #[error(transparent)]
    Session(#[from] sniper_core::SessionError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stream(#[from] sniper_core::StreamError),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Command(_) => 2,
            Self::Broker(_) => 3,
            Self::Session(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
            Self::Stream(_) => 6,
        }
    }
}
