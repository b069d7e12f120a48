//! Typed methods.
//!
//! Arguments travel as a tuple, serialized by concatenating the encoding of every element, so each
//! element must be self-delimiting or of fixed size. Methods without a return value use `()`.

use crate::{
    binding::{ProxyMethodBinding, SkeletonMethodBinding},
    serialization::{deserialize, serialize, Deserialize, Serialize},
    support::sync::{response_channels, ResponseReceiver},
    ComErrc, Result,
};
use bytes::Bytes;
use std::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

/// Outcome of a method call.
///
/// Await it from asynchronous code, or block on it with [`MethodFuture::get`].
///
/// ```rust
/// use ara_com::{ComErrc, MethodFuture};
/// # tokio_test::block_on(async {
/// assert_eq!(MethodFuture::ready(Ok(7u8)).await, Ok(7));
/// let failed: MethodFuture<()> = MethodFuture::ready(Err(ComErrc::PeerUnreachable));
/// assert_eq!(failed.await, Err(ComErrc::PeerUnreachable));
/// # })
/// ```
#[derive(Debug)]
pub struct MethodFuture<R> {
    state: FutureState<R>,
}

#[derive(Debug)]
enum FutureState<R> {
    Ready(Option<Result<R>>),
    Pending(ResponseReceiver<R, ComErrc>),
}

impl<R> MethodFuture<R> {
    /// Creates a future that is already resolved.
    pub fn ready(result: Result<R>) -> Self {
        Self {
            state: FutureState::Ready(Some(result)),
        }
    }

    fn pending(receiver: ResponseReceiver<R, ComErrc>) -> Self {
        Self {
            state: FutureState::Pending(receiver),
        }
    }

    /// Blocks the current thread until the call resolves.
    ///
    /// # Errors
    ///
    /// Returns the error the call resolved with, or [`ComErrc::CommunicationLinkError`] if the
    /// binding went away without answering.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn get(self) -> Result<R> {
        match self.state {
            FutureState::Ready(result) => result.unwrap_or(Err(ComErrc::CommunicationLinkError)),
            FutureState::Pending(receiver) => receiver
                .blocking_get()
                .unwrap_or(Err(ComErrc::CommunicationLinkError)),
        }
    }
}

// Neither state is structurally pinned.
impl<R> Unpin for MethodFuture<R> {}

impl<R> Future for MethodFuture<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            FutureState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(ComErrc::CommunicationLinkError)))
            }
            FutureState::Pending(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|response| response.unwrap_or(Err(ComErrc::CommunicationLinkError))),
        }
    }
}

/// Calls a remote method taking `Args` and returning `R`.
pub struct ProxyMethod<Args, R> {
    binding: Option<Box<dyn ProxyMethodBinding>>,
    _marker: PhantomData<fn(Args) -> R>,
}

impl<Args, R> ProxyMethod<Args, R> {
    /// Creates a new [`ProxyMethod`] on top of the given binding.
    pub fn new(binding: Box<dyn ProxyMethodBinding>) -> Self {
        Self {
            binding: Some(binding),
            _marker: PhantomData,
        }
    }

    /// Creates a [`ProxyMethod`] without a binding.
    ///
    /// Every call resolves with [`ComErrc::ServiceNotAvailable`].
    pub fn unbound() -> Self {
        Self {
            binding: None,
            _marker: PhantomData,
        }
    }

    /// Returns whether the method has a binding.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

impl<Args, R> ProxyMethod<Args, R>
where
    Args: Serialize,
    R: Deserialize + Send + 'static,
{
    /// Calls the method.
    ///
    /// The returned future resolves with the decoded response, or with the error reported by the
    /// binding.
    pub fn call(&self, args: &Args) -> MethodFuture<R> {
        let Some(binding) = &self.binding else {
            return MethodFuture::ready(Err(ComErrc::ServiceNotAvailable));
        };
        let request = match serialize(args) {
            Ok(request) => request,
            Err(error) => return MethodFuture::ready(Err(error)),
        };
        let (sender, receiver) = response_channels();
        binding.call(
            request,
            Box::new(move |response| {
                match response.and_then(|payload| deserialize::<R>(&payload)) {
                    Ok(value) => sender.ok(value),
                    Err(error) => sender.err(error),
                }
            }),
        );
        MethodFuture::pending(receiver)
    }
}

/// Serves a method taking `Args` and returning `R`.
pub struct SkeletonMethod<Args, R> {
    binding: Box<dyn SkeletonMethodBinding>,
    _marker: PhantomData<fn(Args) -> R>,
}

impl<Args, R> SkeletonMethod<Args, R>
where
    Args: Deserialize + 'static,
    R: Serialize + 'static,
{
    /// Creates a new [`SkeletonMethod`] on top of the given binding.
    pub fn new(binding: Box<dyn SkeletonMethodBinding>) -> Self {
        Self {
            binding,
            _marker: PhantomData,
        }
    }

    /// Registers the handler serving the method, replacing any previous one.
    ///
    /// Requests that cannot be decoded are answered with [`ComErrc::FieldValueIsNotValid`].
    ///
    /// # Errors
    ///
    /// Returns the binding's error if the handler could not be registered.
    pub fn register<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Args) -> Result<R> + Send + Sync + 'static,
    {
        self.binding.register(Arc::new(move |request: Bytes| {
            let args = deserialize::<Args>(&request)?;
            serialize(&handler(args)?)
        }))
    }

    /// Unregisters the handler.
    pub fn unregister(&self) {
        self.binding.unregister();
    }

    /// Returns whether a handler is registered.
    pub fn is_registered(&self) -> bool {
        self.binding.is_registered()
    }
}
