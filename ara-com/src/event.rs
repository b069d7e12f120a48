//! Typed events.
//!
//! [`ProxyEvent`] and [`SkeletonEvent`] wrap an event binding and convert between values and
//! payloads with the codec of [`crate::serialization`].

use crate::{
    binding::{ProxyEventBinding, SkeletonEventBinding},
    serialization::{deserialize, serialize, Deserialize, Serialize},
    types::{EventReceiveHandler, SubscriptionStateChangeHandler},
    ComErrc, Result, SampleAllocateePtr, SamplePtr, SubscriptionState,
};
use std::marker::PhantomData;

/// Receives the samples of one event as values of type `T`.
pub struct ProxyEvent<T> {
    binding: Option<Box<dyn ProxyEventBinding>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ProxyEvent<T> {
    /// Creates a new [`ProxyEvent`] on top of the given binding.
    pub fn new(binding: Box<dyn ProxyEventBinding>) -> Self {
        Self {
            binding: Some(binding),
            _marker: PhantomData,
        }
    }

    /// Creates a [`ProxyEvent`] without a binding.
    ///
    /// Every operation reports the event as unavailable.
    pub fn unbound() -> Self {
        Self {
            binding: None,
            _marker: PhantomData,
        }
    }

    fn binding(&self) -> Result<&dyn ProxyEventBinding> {
        self.binding.as_deref().ok_or(ComErrc::ServiceNotAvailable)
    }

    /// Subscribes to the event, queueing at most `max_samples` samples. A bound of zero selects
    /// the binding's default.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotAvailable`] without a binding, and
    /// [`ComErrc::FieldValueIsNotValid`] if the event is already subscribed.
    pub fn subscribe(&self, max_samples: usize) -> Result<()> {
        self.binding()?.subscribe(max_samples)
    }

    /// Unsubscribes from the event.
    pub fn unsubscribe(&self) {
        if let Some(binding) = &self.binding {
            binding.unsubscribe();
        }
    }

    /// Returns the subscription state.
    pub fn subscription_state(&self) -> SubscriptionState {
        self.binding
            .as_ref()
            .map_or(SubscriptionState::NotSubscribed, |binding| {
                binding.subscription_state()
            })
    }

    /// Sets the handler called whenever a new sample is queued.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotAvailable`] without a binding.
    pub fn set_receive_handler(&self, handler: EventReceiveHandler) -> Result<()> {
        self.binding()?.set_receive_handler(handler);
        Ok(())
    }

    /// Removes the receive handler.
    pub fn unset_receive_handler(&self) {
        if let Some(binding) = &self.binding {
            binding.unset_receive_handler();
        }
    }

    /// Sets the handler called whenever the subscription state changes.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotAvailable`] without a binding.
    pub fn set_subscription_state_handler(
        &self,
        handler: SubscriptionStateChangeHandler,
    ) -> Result<()> {
        self.binding()?.set_subscription_state_handler(handler);
        Ok(())
    }

    /// Removes the subscription state handler.
    pub fn unset_subscription_state_handler(&self) {
        if let Some(binding) = &self.binding {
            binding.unset_subscription_state_handler();
        }
    }

    /// Returns how many more samples fit in the queue.
    pub fn free_sample_count(&self) -> usize {
        self.binding
            .as_ref()
            .map_or(0, |binding| binding.free_sample_count())
    }
}

impl<T: Deserialize> ProxyEvent<T> {
    /// Passes up to `max_samples` queued samples to the handler, oldest first.
    ///
    /// Samples that cannot be decoded are skipped. Returns the number of samples taken from the
    /// queue, which includes the skipped ones.
    ///
    /// # Errors
    ///
    /// - [`ComErrc::ServiceNotAvailable`] without a binding or subscription.
    /// - [`ComErrc::FieldValueIsNotValid`] if any sample could not be decoded. The handler has
    ///   still seen every sample that could.
    pub fn get_new_samples<F>(&self, mut handler: F, max_samples: usize) -> Result<usize>
    where
        F: FnMut(SamplePtr<T>),
    {
        let mut invalid = 0usize;
        let taken = self.binding()?.get_new_samples(
            &mut |payload| match deserialize::<T>(payload) {
                Ok(value) => handler(SamplePtr::new(value)),
                Err(_) => invalid += 1,
            },
            max_samples,
        )?;
        if invalid > 0 {
            tracing::warn!(invalid, taken, "dropped samples that could not be decoded");
            return Err(ComErrc::FieldValueIsNotValid);
        }
        Ok(taken)
    }
}

/// Publishes the samples of one event from values of type `T`.
pub struct SkeletonEvent<T> {
    binding: Option<Box<dyn SkeletonEventBinding>>,
    _marker: PhantomData<fn(T)>,
}

impl<T> SkeletonEvent<T> {
    /// Creates a new [`SkeletonEvent`] on top of the given binding.
    pub fn new(binding: Box<dyn SkeletonEventBinding>) -> Self {
        Self {
            binding: Some(binding),
            _marker: PhantomData,
        }
    }

    /// Creates a [`SkeletonEvent`] without a binding.
    ///
    /// Every operation reports the event as not offered.
    pub fn unbound() -> Self {
        Self {
            binding: None,
            _marker: PhantomData,
        }
    }

    fn binding(&self) -> Result<&dyn SkeletonEventBinding> {
        self.binding.as_deref().ok_or(ComErrc::ServiceNotOffered)
    }

    /// Starts offering the event.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotOffered`] without a binding, or the binding's error.
    pub fn offer(&self) -> Result<()> {
        self.binding()?.offer()
    }

    /// Stops offering the event.
    pub fn stop_offer(&self) {
        if let Some(binding) = &self.binding {
            binding.stop_offer();
        }
    }

    /// Returns whether the event is offered.
    pub fn is_offered(&self) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|binding| binding.is_offered())
    }
}

impl<T: Serialize> SkeletonEvent<T> {
    /// Serializes the value and sends it to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotOffered`] without a binding or offer.
    pub fn send(&self, value: &T) -> Result<()> {
        let binding = self.binding()?;
        let payload = serialize(value)?;
        binding.send(&payload)
    }

    /// Sends a sample obtained from [`SkeletonEvent::allocate`].
    ///
    /// The value is serialized into the storage the binding provided for it.
    ///
    /// # Errors
    ///
    /// Same as [`SkeletonEvent::send`].
    pub fn send_allocated(&self, sample: SampleAllocateePtr<T>) -> Result<()> {
        let binding = self.binding()?;
        let (value, mut storage) = sample.release();
        if !storage.fits(value.size_hint()) {
            tracing::debug!(
                capacity = storage.capacity(),
                "sample outgrew its storage, sending a copy"
            );
            drop(storage);
            return binding.send(&serialize(&value)?);
        }
        let buffer = storage
            .buffer_mut()
            .ok_or(ComErrc::IllegalUseOfAllocate)?;
        buffer.clear();
        value.serialize(buffer)?;
        drop(value);
        binding.send_allocated(storage)
    }
}

impl<T: Serialize + Default> SkeletonEvent<T> {
    /// Allocates a sample in binding-provided storage, initialized to the default value.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotOffered`] without a binding, or the binding's allocation
    /// error.
    pub fn allocate(&self) -> Result<SampleAllocateePtr<T>> {
        let binding = self.binding()?;
        let value = T::default();
        let storage = binding.allocate(value.size_hint().max(1))?;
        Ok(SampleAllocateePtr::new(value, storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProxyEventBinding, MockSkeletonEventBinding};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn collect<T: Deserialize + Copy>(event: &ProxyEvent<T>, max_samples: usize) -> Vec<T> {
        let mut values = vec![];
        event
            .get_new_samples(|sample| values.push(*sample), max_samples)
            .expect("should get the samples");
        values
    }

    #[test]
    fn queue_keeps_newest_samples() {
        let binding = MockProxyEventBinding::new();
        let event = ProxyEvent::<u8>::new(Box::new(binding.clone()));
        event.subscribe(2).expect("should subscribe");
        for value in [b'A', b'B', b'C'] {
            binding.inject_sample(&[value]);
        }
        assert_eq!(collect(&event, 10), vec![b'B', b'C']);
    }

    #[test]
    fn undecodable_samples_are_reported_once() {
        let binding = MockProxyEventBinding::new();
        let event = ProxyEvent::<u32>::new(Box::new(binding.clone()));
        event.subscribe(8).expect("should subscribe");
        binding.inject_sample(&1u32.to_ne_bytes());
        binding.inject_sample(&[1, 2]);
        binding.inject_sample(&3u32.to_ne_bytes());

        let mut values = vec![];
        let result = event.get_new_samples(|sample| values.push(*sample), 8);
        assert_eq!(result, Err(ComErrc::FieldValueIsNotValid));
        assert_eq!(values, vec![1, 3]);
        assert_eq!(binding.free_sample_count(), 8);
    }

    #[test]
    fn handlers_reach_the_binding() {
        let binding = MockProxyEventBinding::new();
        let event = ProxyEvent::<u8>::new(Box::new(binding.clone()));
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        event
            .set_receive_handler(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("should set the handler");
        event.subscribe(4).expect("should subscribe");
        binding.inject_sample(&[1]);
        assert_eq!(received.load(Ordering::SeqCst), 1);

        event.unset_receive_handler();
        binding.inject_sample(&[2]);
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(event.free_sample_count(), 2);
    }

    #[test]
    fn unbound_proxy_event() {
        let event = ProxyEvent::<u8>::unbound();
        assert_eq!(event.subscribe(1), Err(ComErrc::ServiceNotAvailable));
        assert_eq!(event.subscription_state(), SubscriptionState::NotSubscribed);
        assert_eq!(event.free_sample_count(), 0);
        assert_eq!(
            event.get_new_samples(|_| {}, 1),
            Err(ComErrc::ServiceNotAvailable)
        );
        assert_eq!(
            event.set_receive_handler(Arc::new(|| {})),
            Err(ComErrc::ServiceNotAvailable)
        );
        event.unsubscribe();
    }

    #[test]
    fn send_serializes_the_value() {
        let binding = MockSkeletonEventBinding::new();
        let event = SkeletonEvent::<(u16, bool)>::new(Box::new(binding.clone()));
        event.offer().expect("should offer");
        event.send(&(7, true)).expect("should send");
        let mut expected = 7u16.to_ne_bytes().to_vec();
        expected.push(1);
        assert_eq!(binding.sent_payloads(), vec![expected]);
    }

    #[test]
    fn allocated_sample_is_sent() {
        let binding = MockSkeletonEventBinding::new();
        let event = SkeletonEvent::<u32>::new(Box::new(binding.clone()));
        event.offer().expect("should offer");
        let mut sample = event.allocate().expect("should allocate");
        assert_eq!(*sample, 0);
        assert!(sample.capacity() >= 4);
        *sample = 42;
        event.send_allocated(sample).expect("should send");
        assert_eq!(binding.sent_payloads(), vec![42u32.to_ne_bytes().to_vec()]);
    }

    #[test]
    fn allocated_sample_uses_loaned_memory() {
        use crate::{
            testing::LoopbackShm,
            zerocopy::{PortOptions, ZeroCopyProxyEventBinding, ZeroCopySkeletonEventBinding},
            EventBindingConfig,
        };

        let config = EventBindingConfig::new(0x1234, 0x0001, 0x8001, 0x0001);
        let runtime = Arc::new(LoopbackShm::new());
        let proxy = ProxyEvent::<u64>::new(Box::new(ZeroCopyProxyEventBinding::new(
            runtime.clone(),
            &config,
            PortOptions::default(),
        )));
        let skeleton = SkeletonEvent::<u64>::new(Box::new(ZeroCopySkeletonEventBinding::new(
            runtime.clone(),
            &config,
            PortOptions::default(),
        )));
        proxy.subscribe(4).expect("should subscribe");
        skeleton.offer().expect("should offer");

        let mut sample = skeleton.allocate().expect("should allocate");
        assert_eq!(runtime.outstanding_loans(), 1);
        *sample = 0xDEAD_BEEF;
        skeleton.send_allocated(sample).expect("should send");
        assert_eq!(runtime.outstanding_loans(), 0);
        assert_eq!(collect(&proxy, 4), vec![0xDEAD_BEEF]);
    }

    #[test]
    fn grown_sample_is_sent_as_copy() {
        use crate::{
            testing::LoopbackShm,
            zerocopy::{PortOptions, ZeroCopySkeletonEventBinding},
            EventBindingConfig,
        };

        let config = EventBindingConfig::new(0x1234, 0x0001, 0x8002, 0x0001);
        let runtime = Arc::new(LoopbackShm::new());
        let skeleton = SkeletonEvent::<String>::new(Box::new(ZeroCopySkeletonEventBinding::new(
            runtime.clone(),
            &config,
            PortOptions::default(),
        )));
        skeleton.offer().expect("should offer");
        let mut sample = skeleton.allocate().expect("should allocate");
        sample.push_str("longer than the loaned chunk");
        skeleton.send_allocated(sample).expect("should send");
        assert_eq!(runtime.outstanding_loans(), 0);
    }

    #[test]
    fn unbound_skeleton_event() {
        let event = SkeletonEvent::<u8>::unbound();
        assert_eq!(event.offer(), Err(ComErrc::ServiceNotOffered));
        assert_eq!(event.send(&1), Err(ComErrc::ServiceNotOffered));
        assert!(matches!(event.allocate(), Err(ComErrc::ServiceNotOffered)));
        assert!(!event.is_offered());
        event.stop_offer();
    }

    #[test]
    fn send_requires_offer() {
        let binding = MockSkeletonEventBinding::new();
        let event = SkeletonEvent::<u8>::new(Box::new(binding.clone()));
        assert_eq!(event.send(&1), Err(ComErrc::ServiceNotOffered));
        assert!(binding.sent_payloads().is_empty());
    }
}
