use std::{collections::VecDeque, future::poll_fn, sync::Arc, time::Duration};

use tokio::{
    select,
    sync::{
        mpsc::{Receiver, Sender, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::JoinHandle,
    time::{Instant, sleep_until, timeout},
};
use tokio_postgres::{
    AsyncMessage, Client, Config as PgConfig, Connection, NoTls, Socket, tls::NoTlsStream,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{ConnectionEvent, ConnectionObserver, Error, Incoming, Result, observer::notify};

pub(crate) type ConnectionTask = JoinHandle<std::result::Result<(), tokio_postgres::Error>>;

/// Upper bound for `UNLISTEN *` at teardown.
const UNLISTEN_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) enum Command {
    Listen(String, oneshot::Sender<Result<()>>),
    UnlistenAll(oneshot::Sender<Result<()>>),
    Ping(oneshot::Sender<Result<()>>),
}

pub(crate) enum Link {
    Up {
        client: Client,
        connection: ConnectionTask,
    },
    Down {
        retry_at: Instant,
        backoff: Duration,
    },
}

/// Owns the database connection for one subscription.
///
/// Serves commands from the subscription handle, notices when the
/// connection goes away and reconnects with exponential backoff,
/// re-issuing `LISTEN` for every tracked channel.
///
/// The connection task never waits for the consumer: it forwards into
/// `inbox`, and the driver moves entries from `backlog` into the bounded
/// `notifications` queue as room frees up.
pub(crate) struct Driver {
    pub(crate) pg_config: PgConfig,
    pub(crate) commands: Receiver<Command>,
    pub(crate) notifications: Sender<Incoming>,
    pub(crate) inbox: UnboundedReceiver<Incoming>,
    pub(crate) inbox_tx: UnboundedSender<Incoming>,
    pub(crate) backlog: VecDeque<Incoming>,
    pub(crate) observer: Arc<dyn ConnectionObserver>,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) min_reconnect_interval: Duration,
    pub(crate) max_reconnect_interval: Duration,
    pub(crate) probe_timeout: Duration,
    pub(crate) link: Link,
    pub(crate) channels: Vec<String>,
}

impl Driver {
    pub async fn run(mut self) {
        loop {
            let retry_at = match &self.link {
                Link::Down { retry_at, .. } => Some(*retry_at),
                Link::Up { .. } => None,
            };
            select! {
                _ = self.cancel_token.cancelled() => break,
                Some(cmd) = self.commands.recv() => {
                    self.handle_command(cmd).await;
                },
                Some(incoming) = self.inbox.recv() => {
                    self.backlog.push_back(incoming);
                },
                Ok(permit) = self.notifications.clone().reserve_owned(), if !self.backlog.is_empty() => {
                    if let Some(incoming) = self.backlog.pop_front() {
                        permit.send(incoming);
                    }
                },
                err = connection_closed(&mut self.link) => {
                    self.link_lost(err.as_ref());
                },
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.reconnect().await;
                },
                else => break
            }
        }
        if let Link::Up { connection, .. } = &self.link {
            connection.abort();
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Listen(channel, resp) => {
                let result = self
                    .execute(&listen_statement(&channel), self.probe_timeout)
                    .await;
                if result.is_ok() && !self.channels.contains(&channel) {
                    self.channels.push(channel);
                }
                let _ = resp.send(result);
            }
            Command::UnlistenAll(resp) => {
                self.channels.clear();
                let result = match &self.link {
                    Link::Up { client, .. } if !client.is_closed() => {
                        let bound = self.probe_timeout.min(UNLISTEN_TIMEOUT);
                        self.execute("UNLISTEN *", bound).await
                    }
                    // Server-side subscriptions end with the session.
                    _ => Ok(()),
                };
                let _ = resp.send(result);
            }
            Command::Ping(resp) => {
                let result = self.execute("SELECT 1", self.probe_timeout).await;
                if let Err(err) = &result {
                    if self.is_link_dead(err) {
                        self.link_lost(Some(err));
                    }
                }
                let _ = resp.send(result);
            }
        }
    }

    async fn execute(&self, query: &str, bound: Duration) -> Result<()> {
        let Link::Up { client, .. } = &self.link else {
            return Err(Error::NotConnected);
        };
        timeout(bound, client.batch_execute(query))
            .await
            .map_err(|_| Error::Timeout(bound))??;
        Ok(())
    }

    fn is_link_dead(&self, err: &Error) -> bool {
        match &self.link {
            Link::Up { client, .. } => matches!(err, Error::Timeout(_)) || client.is_closed(),
            Link::Down { .. } => false,
        }
    }

    fn link_lost(&mut self, err: Option<&Error>) {
        if let Link::Up { connection, .. } = &self.link {
            connection.abort();
        }
        notify(self.observer.as_ref(), ConnectionEvent::Disconnected, err);
        self.link = Link::Down {
            retry_at: Instant::now(),
            backoff: self.min_reconnect_interval,
        };
    }

    async fn reconnect(&mut self) {
        let Link::Down { backoff, .. } = self.link else {
            return;
        };

        let result = select! {
            biased;
            _ = self.cancel_token.cancelled() => return,
            result = self.establish() => result,
        };

        match result {
            Ok((client, connection)) => {
                self.link = Link::Up { client, connection };
                notify(self.observer.as_ref(), ConnectionEvent::Reconnected, None);
                // Queued behind whatever the previous connection forwarded.
                let _ = self.inbox_tx.send(Incoming::Placeholder);
            }
            Err(err) => {
                notify(
                    self.observer.as_ref(),
                    ConnectionEvent::ConnectionAttemptFailed,
                    Some(&err),
                );
                self.link = Link::Down {
                    retry_at: Instant::now() + backoff,
                    backoff: next_backoff(backoff, self.max_reconnect_interval),
                };
            }
        }
    }

    async fn establish(&self) -> Result<(Client, ConnectionTask)> {
        let (client, connection) = connect(&self.pg_config, &self.inbox_tx).await?;
        for channel in &self.channels {
            if let Err(err) = client.batch_execute(&listen_statement(channel)).await {
                connection.abort();
                return Err(err.into());
            }
        }
        Ok((client, connection))
    }
}

/// Resolves when the connection task of a live link finishes.
/// Never resolves for a link that is down.
async fn connection_closed(link: &mut Link) -> Option<Error> {
    match link {
        Link::Up { connection, .. } => match connection.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Error::Postgres(err)),
            Err(err) => Some(Error::DriverJoinError(err)),
        },
        Link::Down { .. } => std::future::pending().await,
    }
}

/// Open a connection and spawn the task that drives it, forwarding
/// notifications to `inbox`.
pub(crate) async fn connect(
    pg_config: &PgConfig,
    inbox: &UnboundedSender<Incoming>,
) -> Result<(Client, ConnectionTask)> {
    let (client, connection) = pg_config.connect(NoTls).await.map_err(Error::Connect)?;
    let task = tokio::spawn(forward(connection, inbox.clone()));
    Ok((client, task))
}

async fn forward(
    mut connection: Connection<Socket, NoTlsStream>,
    inbox: UnboundedSender<Incoming>,
) -> std::result::Result<(), tokio_postgres::Error> {
    while let Some(message) = poll_fn(|cx| connection.poll_message(cx)).await {
        match message? {
            AsyncMessage::Notification(n) => {
                if inbox.send(Incoming::Notification(n.into())).is_err() {
                    break;
                }
            }
            AsyncMessage::Notice(notice) => debug!(notice = %notice, "postgres notice"),
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn listen_statement(channel: &str) -> String {
    format!("LISTEN {}", quote_identifier(channel))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
