//! Synchronization primitives bridging callback-based bindings and futures.
//!
//! - [`ResponseSender`] and [`ResponseReceiver`] carry the outcome of a method call from the
//!   binding's response callback to whoever awaits it.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// Creates a connected pair of [`ResponseSender`] and [`ResponseReceiver`].
///
/// A response can be sent from the [`ResponseSender`], using either the `ok` or `err` functions,
/// and received by the [`ResponseReceiver`] by awaiting it or with a call to `blocking_get`.
pub fn response_channels<T, E>() -> (ResponseSender<T, E>, ResponseReceiver<T, E>)
where
    T: Send,
    E: Send,
{
    let (sender, receiver) = oneshot::channel();
    (ResponseSender::new(sender), ResponseReceiver::new(receiver))
}

/// Receives a response from the associated [`ResponseSender`].
///
/// Resolves to [`None`] if the sender is dropped before sending the response.
#[derive(Debug)]
pub struct ResponseReceiver<T, E> {
    inner: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> ResponseReceiver<T, E> {
    fn new(inner: oneshot::Receiver<Result<T, E>>) -> Self {
        Self { inner }
    }

    /// Gets the response, blocking the current thread until it arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_get(self) -> Option<Result<T, E>> {
        self.inner.blocking_recv().ok()
    }
}

impl<T, E> Future for ResponseReceiver<T, E> {
    type Output = Option<Result<T, E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(Result::ok)
    }
}

/// Sends a response to the associated [`ResponseReceiver`].
#[derive(Debug)]
pub struct ResponseSender<T, E> {
    inner: oneshot::Sender<Result<T, E>>,
}

impl<T, E> ResponseSender<T, E> {
    fn new(inner: oneshot::Sender<Result<T, E>>) -> Self {
        Self { inner }
    }

    /// Sends the given [`Result`] to the [`ResponseReceiver`].
    pub fn send(self, result: Result<T, E>) {
        let _ = self.inner.send(result);
    }

    /// Sends an [`Ok`] response with the given value to the [`ResponseReceiver`].
    pub fn ok(self, value: T) {
        self.send(Ok(value));
    }

    /// Sends an [`Err`] response with the given error to the [`ResponseReceiver`].
    pub fn err(self, error: E) {
        self.send(Err(error));
    }
}
