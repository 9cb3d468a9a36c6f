use std::{future::Future, sync::Arc};

use crate::{ConnectionObserver, Result};

/// Raw notification as delivered by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
    /// Process id of the backend that sent the notification.
    pub process_id: i32,
}

impl Notification {
    pub fn new<C, P>(channel: C, payload: P) -> Self
    where
        C: Into<String>,
        P: Into<String>,
    {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            process_id: 0,
        }
    }
}

impl From<tokio_postgres::Notification> for Notification {
    fn from(n: tokio_postgres::Notification) -> Self {
        Self {
            channel: n.channel().to_string(),
            payload: n.payload().to_string(),
            process_id: n.process_id(),
        }
    }
}

/// Entry of a subscription's incoming queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Notification(Notification),
    /// Carries nothing. Emitted around reconnects so consumers know
    /// notifications may have been missed.
    Placeholder,
}

/// A live `LISTEN` session, exclusively owned by one listener loop.
///
/// Implementations own the connection and whatever it takes to keep it
/// alive: reconnecting, re-subscribing and reporting lifecycle transitions
/// to the [`ConnectionObserver`] given to [`Connector::open`].
pub trait Subscription: Send {
    /// Start listening on `channel`.
    fn listen(&mut self, channel: &str) -> impl Future<Output = Result<()>> + Send;

    /// Next entry of the incoming queue, or `None` once the subscription
    /// is closed for good.
    ///
    /// Must be cancel safe; the listener calls it inside `select!`.
    fn recv(&mut self) -> impl Future<Output = Option<Incoming>> + Send;

    /// No-op round trip used to detect a silently dead link.
    /// The result is advisory.
    fn ping(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Stop listening on every channel. Best effort, idempotent.
    fn unlisten_all(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection. Best effort, idempotent.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens [`Subscription`]s.
pub trait Connector: Send + Sync + 'static {
    type Subscription: Subscription;

    /// Connect to `target`. Fails if the database can't be reached.
    fn open(
        &self,
        target: &str,
        observer: Arc<dyn ConnectionObserver>,
    ) -> impl Future<Output = Result<Self::Subscription>> + Send;
}
