use std::{sync::Arc, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Couldn't connect to the database: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("The subscription client is not connected")]
    NotConnected,

    #[error("The subscription client has been closed")]
    SubscriptionClosed,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Channel name must not be empty")]
    EmptyChannel,

    #[error("{0} is required")]
    MissingEnv(&'static str),

    #[error("Couldn't decode notification payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Event field '{0}' must be a non-empty string")]
    EmptyField(&'static str),

    #[error("Context deadline exceeded")]
    DeadlineExceeded,

    #[error("Context aborted: {0}")]
    Aborted(Arc<str>),

    #[error("Error external to gossippg occured: {0}")]
    External(Arc<str>),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Connection driver join error: {0}")]
    DriverJoinError(#[from] tokio::task::JoinError),
}

impl Error {
    /// Wrap any displayable error raised outside of the crate, typically by a handler.
    pub fn external<M: ToString>(msg: M) -> Self {
        Error::External(msg.to_string().into())
    }
}
