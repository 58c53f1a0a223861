use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Invalid length: expected at least {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid value handle")]
    InvalidHandle,

    #[error("Duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Socket setup failed during {stage}: {source}")]
    SocketInit {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Fatal I/O error during {op}: {source}")]
    FatalIo {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn socket_init(stage: &'static str, source: impl Into<io::Error>) -> Self {
        Error::SocketInit {
            stage,
            source: source.into(),
        }
    }

    /// True for the errors that end the event loop rather than a single client.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalIo { .. })
    }
}
