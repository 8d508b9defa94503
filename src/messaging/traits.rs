//! Messaging trait and dynamic dispatch companion.

use crate::error::Result;
use crate::{InboundMessage, OutboundResponse, StatusUpdate};

use futures::Stream;
use std::future::Future;
use std::pin::Pin;

/// Inbound message stream produced by an adapter.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chat platform front end.
pub trait Messaging: Send + Sync + 'static {
    /// Unique adapter name, matched against `InboundMessage::source`.
    fn name(&self) -> &str;

    /// Connect and return the stream of commands addressed to the bot.
    fn start(&self) -> impl Future<Output = Result<InboundStream>> + Send;

    /// Reply to a message.
    fn respond(
        &self,
        message: &InboundMessage,
        response: OutboundResponse,
    ) -> impl Future<Output = Result<()>> + Send;

    fn send_status(
        &self,
        _message: &InboundMessage,
        _status: StatusUpdate,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    fn health_check(&self) -> impl Future<Output = Result<()>> + Send;

    fn shutdown(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Object-safe mirror of [`Messaging`] so adapters can live behind
/// `Arc<dyn MessagingDyn>`.
pub trait MessagingDyn: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn start<'a>(&'a self) -> BoxFuture<'a, Result<InboundStream>>;

    fn respond<'a>(
        &'a self,
        message: &'a InboundMessage,
        response: OutboundResponse,
    ) -> BoxFuture<'a, Result<()>>;

    fn send_status<'a>(
        &'a self,
        message: &'a InboundMessage,
        status: StatusUpdate,
    ) -> BoxFuture<'a, Result<()>>;

    fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>>;

    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}

impl<T: Messaging> MessagingDyn for T {
    fn name(&self) -> &str {
        Messaging::name(self)
    }

    fn start<'a>(&'a self) -> BoxFuture<'a, Result<InboundStream>> {
        Box::pin(Messaging::start(self))
    }

    fn respond<'a>(
        &'a self,
        message: &'a InboundMessage,
        response: OutboundResponse,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Messaging::respond(self, message, response))
    }

    fn send_status<'a>(
        &'a self,
        message: &'a InboundMessage,
        status: StatusUpdate,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Messaging::send_status(self, message, status))
    }

    fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(Messaging::health_check(self))
    }

    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(Messaging::shutdown(self))
    }
}
