//! Transport-agnostic capability contracts.
//!
//! Each transport implements one type per capability:
//!
//! - [`ProxyEventBinding`] receives event samples.
//! - [`SkeletonEventBinding`] publishes event samples.
//! - [`ProxyMethodBinding`] issues method calls.
//! - [`SkeletonMethodBinding`] serves method calls.
//!
//! The typed wrappers of this crate only ever talk to these traits, so any binding can be swapped
//! for another or wrapped in a decorator, such as the ones in [`crate::e2e`].

use crate::{
    types::{EventReceiveHandler, SubscriptionState, SubscriptionStateChangeHandler},
    ComErrc, Result, SampleStorage,
};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;

pub mod factory;
pub(crate) mod queue;

/// Handler invoked exactly once with the outcome of a method call.
pub type ResponseHandler = Box<dyn FnOnce(Result<Bytes>) + Send>;

/// Maps a request payload to a response payload.
pub type RequestHandler = Arc<dyn Fn(Bytes) -> Result<Bytes> + Send + Sync>;

/// Largest payload a single allocation may request.
pub const MAX_ALLOCATION_SIZE: usize = u32::MAX as usize;

/// Receives event samples on the proxy side.
pub trait ProxyEventBinding: Send + Sync {
    /// Subscribes to the event, queueing at most `max_samples` samples. A bound of zero selects
    /// the binding's default.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::FieldValueIsNotValid`] if the event is already subscribed.
    fn subscribe(&self, max_samples: usize) -> Result<()>;

    /// Unsubscribes from the event and discards queued samples.
    ///
    /// Calling this on an event that is not subscribed does nothing.
    fn unsubscribe(&self);

    /// Returns the current subscription state.
    fn subscription_state(&self) -> SubscriptionState;

    /// Passes up to `max_samples` queued samples to the handler, oldest first.
    ///
    /// Returns the number of samples taken from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotAvailable`] if the event is not subscribed.
    fn get_new_samples(&self, handler: &mut dyn FnMut(&[u8]), max_samples: usize)
        -> Result<usize>;

    /// Sets the handler called whenever a new sample is queued.
    fn set_receive_handler(&self, handler: EventReceiveHandler);

    /// Removes the receive handler.
    fn unset_receive_handler(&self);

    /// Sets the handler called whenever the subscription state changes.
    fn set_subscription_state_handler(&self, handler: SubscriptionStateChangeHandler);

    /// Removes the subscription state handler.
    fn unset_subscription_state_handler(&self);

    /// Returns how many more samples fit in the queue.
    fn free_sample_count(&self) -> usize;
}

/// Publishes event samples on the skeleton side.
pub trait SkeletonEventBinding: Send + Sync {
    /// Starts offering the event.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::FieldValueIsNotValid`] if the event is already offered, or a transport
    /// error if the event could not be offered.
    fn offer(&self) -> Result<()>;

    /// Stops offering the event.
    ///
    /// Calling this on an event that is not offered does nothing.
    fn stop_offer(&self);

    /// Returns whether the event is offered.
    fn is_offered(&self) -> bool;

    /// Sends a payload to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotOffered`] if the event is not offered.
    fn send(&self, payload: &[u8]) -> Result<()>;

    /// Allocates storage for a sample of `size` bytes.
    ///
    /// The default implementation allocates heap memory.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::IllegalUseOfAllocate`] if `size` is zero or too large.
    fn allocate(&self, size: usize) -> Result<SampleStorage> {
        allocate_storage(size).map(SampleStorage::Heap)
    }

    /// Sends a sample previously obtained from [`SkeletonEventBinding::allocate`].
    ///
    /// The default implementation sends a copy of the storage's contents.
    ///
    /// # Errors
    ///
    /// Same as [`SkeletonEventBinding::send`].
    fn send_allocated(&self, sample: SampleStorage) -> Result<()> {
        self.send(&sample)
    }
}

/// Issues method calls on the proxy side.
pub trait ProxyMethodBinding: Send + Sync {
    /// Sends a request.
    ///
    /// The handler is called exactly once, either with the response payload or with an error.
    fn call(&self, request: Bytes, on_response: ResponseHandler);
}

/// Serves method calls on the skeleton side.
pub trait SkeletonMethodBinding: Send + Sync {
    /// Registers the handler serving requests, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the handler could not be registered.
    fn register(&self, handler: RequestHandler) -> Result<()>;

    /// Unregisters the handler.
    fn unregister(&self);

    /// Returns whether a handler is registered.
    fn is_registered(&self) -> bool;
}

/// Allocates heap storage for an outgoing sample.
pub(crate) fn allocate_storage(size: usize) -> Result<BytesMut> {
    if size == 0 || size > MAX_ALLOCATION_SIZE {
        return Err(ComErrc::IllegalUseOfAllocate);
    }
    Ok(BytesMut::with_capacity(size))
}

/// Invokes a subscription state handler, if any.
pub(crate) fn notify_state(
    handler: Option<SubscriptionStateChangeHandler>,
    state: SubscriptionState,
) {
    if let Some(handler) = handler {
        handler(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_storage_bounds() {
        assert_eq!(allocate_storage(0), Err(ComErrc::IllegalUseOfAllocate));
        let storage = allocate_storage(16).expect("should allocate the storage");
        assert!(storage.capacity() >= 16);
        assert!(storage.is_empty());
    }
}
