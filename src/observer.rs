use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

use tracing::{error, info, warn};

use crate::Error;

/// Connection lifecycle transitions reported by a subscription client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Reconnected,
    ConnectionAttemptFailed,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Connected => write!(f, "connected"),
            ConnectionEvent::Disconnected => write!(f, "disconnected"),
            ConnectionEvent::Reconnected => write!(f, "reconnected"),
            ConnectionEvent::ConnectionAttemptFailed => write!(f, "connection_attempt_failed"),
        }
    }
}

/// Receives connection lifecycle callbacks from the subscription client.
///
/// Called from the client's own task, possibly while the listener loop is
/// busy with an event. Implementations must return quickly and must not
/// block. Every method defaults to a no-op.
pub trait ConnectionObserver: Send + Sync + 'static {
    fn on_connected(&self) {}

    /// `err` is the error that ended the connection, if there was one.
    fn on_disconnected(&self, err: Option<&Error>) {
        let _e = err;
    }

    fn on_reconnected(&self) {}

    fn on_connection_attempt_failed(&self, err: &Error) {
        let _e = err;
    }
}

/// Dispatch a [`ConnectionEvent`] to the matching observer method.
/// A panicking observer is logged and otherwise ignored.
pub(crate) fn notify(
    observer: &dyn ConnectionObserver,
    event: ConnectionEvent,
    err: Option<&Error>,
) {
    let result = catch_unwind(AssertUnwindSafe(|| match (event, err) {
        (ConnectionEvent::Connected, _) => observer.on_connected(),
        (ConnectionEvent::Disconnected, err) => observer.on_disconnected(err),
        (ConnectionEvent::Reconnected, _) => observer.on_reconnected(),
        (ConnectionEvent::ConnectionAttemptFailed, Some(err)) => {
            observer.on_connection_attempt_failed(err)
        }
        (ConnectionEvent::ConnectionAttemptFailed, None) => {
            observer.on_connection_attempt_failed(&Error::NotConnected)
        }
    }));
    if result.is_err() {
        error!(kind = %event, "connection observer panicked");
    }
}

/// Default observer. Logs each transition by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ConnectionObserver for LogObserver {
    fn on_connected(&self) {
        info!(kind = %ConnectionEvent::Connected, "connection event");
    }

    fn on_disconnected(&self, err: Option<&Error>) {
        match err {
            Some(err) => warn!(kind = %ConnectionEvent::Disconnected, error = %err, "connection event"),
            None => warn!(kind = %ConnectionEvent::Disconnected, "connection event"),
        }
    }

    fn on_reconnected(&self) {
        info!(kind = %ConnectionEvent::Reconnected, "connection event");
    }

    fn on_connection_attempt_failed(&self, err: &Error) {
        error!(kind = %ConnectionEvent::ConnectionAttemptFailed, error = %err, "connection event");
    }
}
