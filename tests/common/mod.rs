//! Fake subscription client and recording handlers shared by the integration tests.
#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use gossippg::{
    ConnectionEvent, ConnectionObserver, Connector, Context, Error, Event, Handler, Incoming,
    Notification, Result, Subscription,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::{Duration, timeout},
};

#[derive(Debug, Default)]
pub struct Calls {
    pub open: AtomicUsize,
    pub listen: AtomicUsize,
    pub ping: AtomicUsize,
    pub unlisten_all: AtomicUsize,
    pub close: AtomicUsize,
}

impl Calls {
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
    pub fn listen(&self) -> usize {
        self.listen.load(Ordering::SeqCst)
    }
    pub fn ping(&self) -> usize {
        self.ping.load(Ordering::SeqCst)
    }
    pub fn unlisten_all(&self) -> usize {
        self.unlisten_all.load(Ordering::SeqCst)
    }
    pub fn close(&self) -> usize {
        self.close.load(Ordering::SeqCst)
    }
}

/// Connector whose single subscription is fed by the test through an
/// unbounded channel.
pub struct FakeConnector {
    pub calls: Arc<Calls>,
    pub channels: Arc<Mutex<Vec<String>>>,
    incoming: Mutex<Option<UnboundedReceiver<Incoming>>>,
    fail_open: bool,
    fail_listen: bool,
    fail_ping: bool,
}

impl FakeConnector {
    pub fn new() -> (Self, UnboundedSender<Incoming>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            calls: Arc::new(Calls::default()),
            channels: Arc::new(Mutex::new(Vec::new())),
            incoming: Mutex::new(Some(rx)),
            fail_open: false,
            fail_listen: false,
            fail_ping: false,
        };
        (connector, tx)
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_listen(mut self) -> Self {
        self.fail_listen = true;
        self
    }

    pub fn failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }
}

impl Connector for FakeConnector {
    type Subscription = FakeSubscription;

    async fn open(
        &self,
        _target: &str,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<FakeSubscription> {
        self.calls.open.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(Error::NotConnected);
        }
        let incoming = self
            .incoming
            .lock()
            .unwrap()
            .take()
            .ok_or(Error::SubscriptionClosed)?;
        observer.on_connected();
        Ok(FakeSubscription {
            calls: self.calls.clone(),
            channels: self.channels.clone(),
            incoming,
            fail_listen: self.fail_listen,
            fail_ping: self.fail_ping,
        })
    }
}

pub struct FakeSubscription {
    calls: Arc<Calls>,
    channels: Arc<Mutex<Vec<String>>>,
    incoming: UnboundedReceiver<Incoming>,
    fail_listen: bool,
    fail_ping: bool,
}

impl Subscription for FakeSubscription {
    async fn listen(&mut self, channel: &str) -> Result<()> {
        self.calls.listen.fetch_add(1, Ordering::SeqCst);
        if self.fail_listen {
            return Err(Error::external("listen refused"));
        }
        self.channels.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Incoming> {
        self.incoming.recv().await
    }

    async fn ping(&mut self) -> Result<()> {
        self.calls.ping.fetch_add(1, Ordering::SeqCst);
        if self.fail_ping {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn unlisten_all(&mut self) -> Result<()> {
        self.calls.unlisten_all.fetch_add(1, Ordering::SeqCst);
        self.channels.lock().unwrap().clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.calls.close.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn notification(payload: &str) -> Incoming {
    Incoming::Notification(Notification::new("events", payload))
}

/// Forwards every event it gets to the test, then succeeds or fails.
pub struct RecordingHandler {
    events: UnboundedSender<Event>,
    pub calls: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingHandler {
    pub fn new() -> (Self, UnboundedReceiver<Event>) {
        Self::build(false)
    }

    pub fn failing() -> (Self, UnboundedReceiver<Event>) {
        Self::build(true)
    }

    fn build(fail: bool) -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Self {
            events: tx,
            calls: Arc::new(AtomicUsize::new(0)),
            fail,
        };
        (handler, rx)
    }
}

impl Handler for RecordingHandler {
    async fn process(&self, _ctx: &Context, event: &Event) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if event.id == "panic" {
            panic!("handler bug");
        }
        let _ = self.events.send(event.clone());
        if self.fail {
            return Err(Error::external("handler failed"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver(pub Arc<Mutex<Vec<ConnectionEvent>>>);

impl ConnectionObserver for RecordingObserver {
    fn on_connected(&self) {
        self.0.lock().unwrap().push(ConnectionEvent::Connected);
    }
    fn on_disconnected(&self, _err: Option<&Error>) {
        self.0.lock().unwrap().push(ConnectionEvent::Disconnected);
    }
    fn on_reconnected(&self) {
        self.0.lock().unwrap().push(ConnectionEvent::Reconnected);
    }
    fn on_connection_attempt_failed(&self, _err: &Error) {
        self.0
            .lock()
            .unwrap()
            .push(ConnectionEvent::ConnectionAttemptFailed);
    }
}

pub async fn next_event(events: &mut UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event within 5s")
        .expect("handler dropped")
}
