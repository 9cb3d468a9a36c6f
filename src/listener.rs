use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures_util::FutureExt;
use tokio::{
    select,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, error, info};

use crate::{
    Config, ConnectionObserver, Connector, Context, Error, Event, Handler, Incoming, LogHandler,
    LogObserver, Notification, PgConnector, Result, Subscription,
};

/// Subscribes to one notification channel and dispatches every decoded
/// [`Event`] to a [`Handler`].
///
/// - `new(config)` builds a listener with the [`LogHandler`], the
///   [`LogObserver`] and a [`PgConnector`] configured from `config`.
/// - `with_handler`, `with_observer` and `with_connector` replace them.
/// - `start(ctx)` runs until `ctx` is cancelled.
///
/// # Examples
///
/// ```rust,no_run
/// use gossippg::{Config, Context, Event, Listener, Result, handler_fn};
///
/// # async fn run() -> Result<()> {
/// let ctx = Context::new();
/// let listener = Listener::new(Config::new("postgres://localhost/app").with_channel("orders"))
///     .with_handler(handler_fn(|event: Event| async move {
///         println!("{} {}", event.kind, event.id);
///         Ok(())
///     }));
/// listener.start(&ctx).await
/// # }
/// ```
pub struct Listener<H: Handler = LogHandler, C: Connector = PgConnector> {
    config: Config,
    handler: H,
    connector: C,
    observer: Arc<dyn ConnectionObserver>,
}

impl Listener {
    pub fn new(config: Config) -> Self {
        let connector = PgConnector::new(&config);
        Self {
            config,
            handler: LogHandler,
            connector,
            observer: Arc::new(LogObserver),
        }
    }
}

impl<H: Handler, C: Connector> Listener<H, C> {
    pub fn with_handler<H2: Handler>(self, handler: H2) -> Listener<H2, C> {
        Listener {
            config: self.config,
            handler,
            connector: self.connector,
            observer: self.observer,
        }
    }

    pub fn with_connector<C2: Connector>(self, connector: C2) -> Listener<H, C2> {
        Listener {
            config: self.config,
            handler: self.handler,
            connector,
            observer: self.observer,
        }
    }

    /// Receive connection lifecycle callbacks instead of logging them.
    pub fn with_observer<O: ConnectionObserver>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the subscription and dispatch notifications until `ctx` is done.
    ///
    /// # Returns
    ///
    /// - `Ok(())` once `ctx` is cancelled with [`Context::cancel`]
    /// - `Err(_)` right away if the connection can't be opened or the
    ///   channel can't be subscribed to
    /// - `Err(Error::DeadlineExceeded)` or `Err(Error::Aborted(_))` when
    ///   `ctx` ends for any other reason
    /// - `Err(Error::SubscriptionClosed)` if the client's queue closes
    ///
    /// Undecodable payloads and handler failures are logged and never end
    /// the loop. Once opened, the subscription is unsubscribed and closed
    /// on every exit path.
    pub async fn start(&self, ctx: &Context) -> Result<()> {
        self.config.validate()?;
        info!(channel = %self.config.channel, "starting postgres listener");

        let mut subscription = self
            .connector
            .open(&self.config.database_url, self.observer.clone())
            .await?;

        let result = self.listen(&mut subscription, ctx).await;

        let _ = subscription.unlisten_all().await;
        let _ = subscription.close().await;
        info!(channel = %self.config.channel, "postgres listener stopped");

        result
    }

    async fn listen(&self, subscription: &mut C::Subscription, ctx: &Context) -> Result<()> {
        subscription.listen(&self.config.channel).await?;

        let period = self.config.ping_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                cause = ctx.done() => {
                    return cause.into_result();
                }
                incoming = subscription.recv() => {
                    match incoming {
                        Some(Incoming::Notification(n)) => self.dispatch(ctx, n).await,
                        Some(Incoming::Placeholder) => {}
                        None => return Err(Error::SubscriptionClosed),
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = subscription.ping().await {
                        debug!(error = %e, "liveness probe failed");
                    }
                }
            }
        }
    }

    async fn dispatch(&self, ctx: &Context, notification: Notification) {
        if notification.payload.is_empty() {
            return;
        }

        let event = match Event::decode(&notification.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    error = %e,
                    payload = %notification.payload,
                    "failed to decode notification payload"
                );
                return;
            }
        };

        let outcome = AssertUnwindSafe(self.handler.process(ctx, &event))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(
                    error = %e,
                    event_type = %event.kind,
                    event_id = %event.id,
                    "listener handler error"
                );
            }
            Err(_) => {
                error!(
                    event_type = %event.kind,
                    event_id = %event.id,
                    "listener handler panicked"
                );
            }
        }
    }
}
