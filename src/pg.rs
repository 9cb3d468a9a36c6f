use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::{
    sync::{
        mpsc::{self, Receiver, Sender},
        oneshot,
    },
    task::JoinHandle,
};
use tokio_postgres::Config as PgConfig;
use tokio_util::sync::CancellationToken;

use crate::{
    Config, ConnectionEvent, ConnectionObserver, Connector, Error, Incoming, Result, Subscription,
    internal::{Command, Driver, Link, connect},
    observer::notify,
};

const COMMAND_BUFFER: usize = 8;

/// [`Connector`] for PostgreSQL `LISTEN`/`NOTIFY` built on `tokio-postgres`.
///
/// The target is anything `tokio_postgres::Config` parses: a
/// `postgres://` URL or a `key=value` connection string.
///
/// Each opened [`PgSubscription`] runs a background task that owns the
/// connection. When the connection drops, that task reports
/// `disconnected`, retries (immediately, then after
/// `min_reconnect_interval`, doubling up to `max_reconnect_interval`),
/// re-issues `LISTEN` for every channel and reports `reconnected`,
/// followed by an [`Incoming::Placeholder`] in the notification queue.
/// Notifications sent while the connection was down are lost.
///
/// The connection is read even while the queue is full; the overflow
/// waits in memory until the consumer catches up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConnector {
    min_reconnect_interval: Duration,
    max_reconnect_interval: Duration,
    connect_timeout: Duration,
    probe_timeout: Duration,
    notification_buffer: usize,
}

impl PgConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            min_reconnect_interval: config.min_reconnect_interval,
            max_reconnect_interval: config.max_reconnect_interval,
            connect_timeout: config.connect_timeout,
            probe_timeout: config.probe_timeout,
            notification_buffer: config.notification_buffer,
        }
    }
}

impl Default for PgConnector {
    fn default() -> Self {
        Self::new(&Config::new(String::new()))
    }
}

impl Connector for PgConnector {
    type Subscription = PgSubscription;

    async fn open(
        &self,
        target: &str,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<PgSubscription> {
        let mut pg_config: PgConfig = target.parse().map_err(Error::Connect)?;
        if pg_config.get_connect_timeout().is_none() {
            pg_config.connect_timeout(self.connect_timeout);
        }

        let (notify_tx, notify_rx) = mpsc::channel(self.notification_buffer.max(1));
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (client, connection) = connect(&pg_config, &inbox_tx).await?;
        notify(observer.as_ref(), ConnectionEvent::Connected, None);

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel_token = CancellationToken::new();
        let driver = Driver {
            pg_config,
            commands: cmd_rx,
            notifications: notify_tx,
            inbox,
            inbox_tx,
            backlog: VecDeque::new(),
            observer,
            cancel_token: cancel_token.clone(),
            min_reconnect_interval: self.min_reconnect_interval,
            max_reconnect_interval: self.max_reconnect_interval,
            probe_timeout: self.probe_timeout,
            link: Link::Up { client, connection },
            channels: Vec::new(),
        };

        Ok(PgSubscription {
            commands: cmd_tx,
            notifications: notify_rx,
            cancel_token,
            driver: Some(tokio::spawn(driver.run())),
        })
    }
}

/// Handle to a live PostgreSQL subscription opened by [`PgConnector`].
///
/// Dropping the handle stops its background task, [`Subscription::close`]
/// does the same and waits for the task to finish.
#[derive(Debug)]
pub struct PgSubscription {
    commands: Sender<Command>,
    notifications: Receiver<Incoming>,
    cancel_token: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl PgSubscription {
    fn is_closed(&self) -> bool {
        self.driver.is_none() || self.cancel_token.is_cancelled()
    }
}

async fn request<F>(commands: &Sender<Command>, make: F) -> Result<()>
where
    F: FnOnce(oneshot::Sender<Result<()>>) -> Command,
{
    let (tx, rx) = oneshot::channel();
    commands
        .send(make(tx))
        .await
        .map_err(|_| Error::SubscriptionClosed)?;
    rx.await.map_err(|_| Error::SubscriptionClosed)?
}

impl Subscription for PgSubscription {
    async fn listen(&mut self, channel: &str) -> Result<()> {
        if channel.is_empty() {
            return Err(Error::EmptyChannel);
        }
        let channel = channel.to_string();
        request(&self.commands, |tx| Command::Listen(channel, tx)).await
    }

    async fn recv(&mut self) -> Option<Incoming> {
        self.notifications.recv().await
    }

    async fn ping(&mut self) -> Result<()> {
        request(&self.commands, Command::Ping).await
    }

    async fn unlisten_all(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        request(&self.commands, Command::UnlistenAll).await
    }

    async fn close(&mut self) -> Result<()> {
        self.cancel_token.cancel();
        if let Some(driver) = self.driver.take() {
            driver.await?;
        }
        Ok(())
    }
}

impl Drop for PgSubscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
