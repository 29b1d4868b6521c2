//! EventHandler - subscriber abstraction
//!
//! Handlers may be synchronous or asynchronous; the dispatch loop awaits each
//! one before moving on, so a handler sees its category in publish order.

use std::future::Future;
use std::pin::Pin;

use contracts::Event;

use crate::error::HandlerError;

/// Boxed future returned by a handler
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// A bus subscriber
pub trait EventHandler: Send + Sync + 'static {
    /// Handler name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Process one event
    fn handle<'a>(&'a self, event: &'a Event) -> HandlerFuture<'a>;
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(&'a self, event: &'a Event) -> HandlerFuture<'a> {
        Box::pin((self.f)(event.clone()))
    }
}

/// Wrap an async closure as a handler
///
/// # Example
///
/// ```ignore
/// bus.subscribe(EventCategory::PostureResult, handler_fn("printer", |event| async move {
///     println!("{:?}", event.payload());
///     Ok(())
/// }));
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler {
        name: name.into(),
        f,
    }
}
