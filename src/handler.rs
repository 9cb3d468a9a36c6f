use std::future::Future;

use tracing::info;

use crate::{Context, Event, Result};

/// Caller-supplied side effect run once per received event.
///
/// Equivalent to:
///
/// ```ignore
/// async fn process(&self, ctx: &Context, event: &Event) -> Result<()>;
/// ```
///
/// The listener logs every error (and panic) raised here together with the
/// event's type and id, then carries on with the next notification. A
/// handler has no way to stop the listener through its return value; use
/// the [`Context`] for that.
///
/// Handlers run inline on the listener task, so a slow handler delays both
/// notification processing and liveness probes.
///
/// No `#[async_trait]` is required, implement it with `async fn`:
///
/// ```rust
/// use gossippg::{Context, Event, Handler, Result};
///
/// struct Audit;
///
/// impl Handler for Audit {
///     async fn process(&self, _ctx: &Context, event: &Event) -> Result<()> {
///         println!("{} {}", event.kind, event.id);
///         Ok(())
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn process(&self, ctx: &Context, event: &Event) -> impl Future<Output = Result<()>> + Send;
}

/// Default handler. Logs the event and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl Handler for LogHandler {
    async fn process(&self, _ctx: &Context, event: &Event) -> Result<()> {
        info!(
            event_type = %event.kind,
            event_id = %event.id,
            data = ?event.data,
            "received event"
        );
        Ok(())
    }
}

/// Adapts an async closure taking an owned [`Event`] into a [`Handler`].
///
/// ```rust
/// use gossippg::{Event, Result, handler_fn};
///
/// let handler = handler_fn(|event: Event| async move {
///     println!("got {}", event.id);
///     Result::Ok(())
/// });
/// ```
#[derive(Debug, Clone)]
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    FnHandler { f }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    fn process(&self, _ctx: &Context, event: &Event) -> impl Future<Output = Result<()>> + Send {
        (self.f)(event.clone())
    }
}
