//! gossippg - PostgreSQL notifications as events
//!
//! Listens on a `LISTEN`/`NOTIFY` channel, decodes every notification
//! payload as a JSON [`Event`] and hands it to a [`Handler`]. The listener
//! keeps the subscription alive across dropped connections and never lets
//! a bad payload or a failing handler end it.
//!
//! ```rust,no_run
//! use gossippg::{Config, Context, Listener, LogHandler, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::new();
//!     let listener = Listener::new(Config::from_env()?).with_handler(LogHandler);
//!     listener.start(&ctx).await
//! }
//! ```
//!
//! Delivery is best effort: notifications sent while the connection is
//! down are not replayed.

mod config;
mod context;
mod error;
mod event;
mod handler;
mod listener;
mod observer;
mod pg;
mod subscription;

mod internal;

pub use config::{CHANNEL_ENV, Config, DATABASE_URL_ENV, DEFAULT_CHANNEL};
pub use context::{Cause, Context};
pub use error::Error;
pub use event::Event;
pub use handler::{FnHandler, Handler, LogHandler, handler_fn};
pub use listener::Listener;
pub use observer::{ConnectionEvent, ConnectionObserver, LogObserver};
pub use pg::{PgConnector, PgSubscription};
pub use subscription::{Connector, Incoming, Notification, Subscription};

pub type Result<T = ()> = std::result::Result<T, Error>;
