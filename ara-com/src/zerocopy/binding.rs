use super::{ChannelDescriptor, PortOptions, ShmRuntime, ZeroCopyPublisher, ZeroCopySubscriber};
use crate::{
    binding::{notify_state, queue::EventReceiver, ProxyEventBinding, SkeletonEventBinding},
    types::{EventReceiveHandler, SubscriptionStateChangeHandler},
    ComErrc, EventBindingConfig, Result, SampleStorage, SubscriptionState,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives the samples of one event from a zero-copy channel.
///
/// Samples stay in shared memory until they are handed to the caller of
/// [`ProxyEventBinding::get_new_samples`], and are released right after.
pub struct ZeroCopyProxyEventBinding {
    runtime: Arc<dyn ShmRuntime>,
    channel: ChannelDescriptor,
    options: PortOptions,
    subscriber: Mutex<Option<ZeroCopySubscriber>>,
    receiver: Mutex<EventReceiver>,
}

impl ZeroCopyProxyEventBinding {
    /// Creates a new [`ZeroCopyProxyEventBinding`].
    pub fn new(
        runtime: Arc<dyn ShmRuntime>,
        config: &EventBindingConfig,
        options: PortOptions,
    ) -> Self {
        Self {
            runtime,
            channel: ChannelDescriptor::from_event_config(config),
            options,
            subscriber: Mutex::new(None),
            receiver: Mutex::new(EventReceiver::new()),
        }
    }

    /// Sets the queue bound of subscriptions that request a bound of zero.
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.receiver = Mutex::new(EventReceiver::with_default_max_samples(max_samples));
        self
    }

    /// Returns the channel.
    pub fn channel(&self) -> &ChannelDescriptor {
        &self.channel
    }

    /// Opens the subscriber port unless the subscription was cancelled meanwhile.
    ///
    /// Returns the handler to notify if a pending subscription completed.
    fn connect(&self) -> Result<Option<SubscriptionStateChangeHandler>> {
        let mut subscriber = self.subscriber.lock();
        if self.receiver.lock().state() == SubscriptionState::NotSubscribed {
            return Ok(None);
        }
        if subscriber.is_none() {
            let created =
                ZeroCopySubscriber::new(self.runtime.as_ref(), self.channel.clone(), &self.options);
            if !created.is_binding_active() {
                return Err(ComErrc::NetworkBindingFailure);
            }
            created.set_receive_handler(self.receiver.lock().receive_handler());
            *subscriber = Some(created);
            tracing::debug!(channel = %self.channel, "subscribed to channel");
        }
        Ok(self.receiver.lock().complete_subscribe())
    }
}

impl ProxyEventBinding for ZeroCopyProxyEventBinding {
    fn subscribe(&self, max_samples: usize) -> Result<()> {
        let handler = self.receiver.lock().begin_subscribe(max_samples)?;
        notify_state(handler, SubscriptionState::SubscriptionPending);
        match self.connect() {
            Ok(handler) => {
                notify_state(handler, SubscriptionState::Subscribed);
                Ok(())
            }
            Err(error) => {
                let (_, handler) = self.receiver.lock().reset();
                notify_state(handler, SubscriptionState::NotSubscribed);
                Err(error)
            }
        }
    }

    fn unsubscribe(&self) {
        let (previous, handler) = self.receiver.lock().reset();
        let subscriber = self.subscriber.lock().take();
        if subscriber.is_some() {
            tracing::debug!(channel = %self.channel, "unsubscribed from channel");
        }
        drop(subscriber);
        if previous != SubscriptionState::NotSubscribed {
            notify_state(handler, SubscriptionState::NotSubscribed);
        }
    }

    fn subscription_state(&self) -> SubscriptionState {
        self.receiver.lock().state()
    }

    fn get_new_samples(
        &self,
        handler: &mut dyn FnMut(&[u8]),
        max_samples: usize,
    ) -> Result<usize> {
        let bound = {
            let receiver = self.receiver.lock();
            if receiver.state() == SubscriptionState::NotSubscribed {
                return Err(ComErrc::ServiceNotAvailable);
            }
            receiver.max_samples()
        };
        let mut samples = vec![];
        {
            let subscriber = self.subscriber.lock();
            let Some(subscriber) = subscriber.as_ref() else {
                return Err(ComErrc::ServiceNotAvailable);
            };
            // Keep only the newest `bound` samples.
            let excess = subscriber.pending().saturating_sub(bound);
            for _ in 0..excess {
                drop(subscriber.try_take()?);
            }
            while samples.len() < max_samples {
                match subscriber.try_take()? {
                    Some(sample) => samples.push(sample),
                    None => break,
                }
            }
        }
        for sample in &samples {
            handler(sample);
        }
        Ok(samples.len())
    }

    fn set_receive_handler(&self, handler: EventReceiveHandler) {
        self.receiver
            .lock()
            .set_receive_handler(Some(handler.clone()));
        if let Some(subscriber) = self.subscriber.lock().as_ref() {
            subscriber.set_receive_handler(Some(handler));
        }
    }

    fn unset_receive_handler(&self) {
        self.receiver.lock().set_receive_handler(None);
        if let Some(subscriber) = self.subscriber.lock().as_ref() {
            subscriber.set_receive_handler(None);
        }
    }

    fn set_subscription_state_handler(&self, handler: SubscriptionStateChangeHandler) {
        self.receiver.lock().set_state_handler(Some(handler));
    }

    fn unset_subscription_state_handler(&self) {
        self.receiver.lock().set_state_handler(None);
    }

    fn free_sample_count(&self) -> usize {
        let pending = self
            .subscriber
            .lock()
            .as_ref()
            .map_or(0, ZeroCopySubscriber::pending);
        let receiver = self.receiver.lock();
        if receiver.state() == SubscriptionState::NotSubscribed {
            return 0;
        }
        receiver.max_samples().saturating_sub(pending)
    }
}

impl Drop for ZeroCopyProxyEventBinding {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Publishes the samples of one event to a zero-copy channel.
pub struct ZeroCopySkeletonEventBinding {
    runtime: Arc<dyn ShmRuntime>,
    channel: ChannelDescriptor,
    options: PortOptions,
    publisher: Mutex<Option<ZeroCopyPublisher>>,
}

impl ZeroCopySkeletonEventBinding {
    /// Creates a new [`ZeroCopySkeletonEventBinding`].
    pub fn new(
        runtime: Arc<dyn ShmRuntime>,
        config: &EventBindingConfig,
        options: PortOptions,
    ) -> Self {
        Self {
            runtime,
            channel: ChannelDescriptor::from_event_config(config),
            options,
            publisher: Mutex::new(None),
        }
    }

    /// Returns the channel.
    pub fn channel(&self) -> &ChannelDescriptor {
        &self.channel
    }

    /// Returns whether any subscriber is connected.
    pub fn has_subscribers(&self) -> bool {
        self.publisher
            .lock()
            .as_ref()
            .is_some_and(ZeroCopyPublisher::has_subscribers)
    }
}

impl SkeletonEventBinding for ZeroCopySkeletonEventBinding {
    fn offer(&self) -> Result<()> {
        let mut publisher = self.publisher.lock();
        if publisher.is_some() {
            return Err(ComErrc::FieldValueIsNotValid);
        }
        let created =
            ZeroCopyPublisher::new(self.runtime.as_ref(), self.channel.clone(), &self.options);
        if !created.is_binding_active() {
            return Err(ComErrc::NetworkBindingFailure);
        }
        *publisher = Some(created);
        tracing::debug!(channel = %self.channel, "offered channel");
        Ok(())
    }

    fn stop_offer(&self) {
        self.publisher.lock().take();
    }

    fn is_offered(&self) -> bool {
        self.publisher.lock().is_some()
    }

    fn send(&self, payload: &[u8]) -> Result<()> {
        let publisher = self.publisher.lock();
        let publisher = publisher.as_ref().ok_or(ComErrc::ServiceNotOffered)?;
        publisher.publish_copy(payload)
    }

    /// Loans the storage from the channel's shared memory.
    fn allocate(&self, size: usize) -> Result<SampleStorage> {
        let publisher = self.publisher.lock();
        let publisher = publisher.as_ref().ok_or(ComErrc::ServiceNotOffered)?;
        publisher.loan(size, 1).map(SampleStorage::Loaned)
    }

    /// Publishes loaned storage by reference. Heap storage is copied into a fresh loan.
    fn send_allocated(&self, sample: SampleStorage) -> Result<()> {
        let publisher = self.publisher.lock();
        let publisher = publisher.as_ref().ok_or(ComErrc::ServiceNotOffered)?;
        match sample {
            SampleStorage::Loaned(sample) => publisher.publish(sample),
            SampleStorage::Heap(buffer) => publisher.publish_copy(&buffer),
        }
    }
}
