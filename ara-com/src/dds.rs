//! DDS transport binding.
//!
//! Events are mapped onto DDS topics named after their identifiers. Payloads travel as opaque
//! byte sequences prefixed with the CDR encapsulation header, so they can be read by any DDS
//! participant that understands the encapsulation.
//!
//! DDS has no explicit subscription handshake. The proxy side derives its
//! [`SubscriptionState`] from the number of matched publications instead: a subscription without
//! any matched writer reads as [`SubscriptionState::SubscriptionPending`].

use crate::{
    binding::{notify_state, queue::EventReceiver, ProxyEventBinding, SkeletonEventBinding},
    types::{EventReceiveHandler, SubscriptionStateChangeHandler},
    ComErrc, EventBindingConfig, Result, SubscriptionState,
};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;

/// CDR encapsulation header prepended to every payload.
pub const CDR_ENCAPSULATION: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

/// Writes samples to a DDS topic.
pub trait DdsWriter: Send + Sync {
    /// Writes one sample.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the sample could not be written.
    fn write(&self, payload: &[u8]) -> Result<()>;

    /// Returns the number of readers matched with this writer.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the status could not be read.
    fn matched_subscription_count(&self) -> Result<usize>;
}

/// Reads samples from a DDS topic.
pub trait DdsReader: Send + Sync {
    /// Takes up to `max_samples` samples, passing each one to the handler.
    ///
    /// Returns the number of samples taken.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the samples could not be taken.
    fn take(&self, max_samples: usize, handler: &mut dyn FnMut(&[u8])) -> Result<usize>;

    /// Returns the number of writers matched with this reader.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the status could not be read.
    fn matched_publication_count(&self) -> Result<usize>;

    /// Sets the listener called whenever new data is available.
    fn set_data_listener(&self, listener: Option<EventReceiveHandler>);
}

/// Participant factory of an external DDS implementation.
pub trait DdsRuntime: Send + Sync {
    /// Creates a writer for the topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the writer could not be created.
    fn create_writer(&self, topic: &str, domain_id: u32) -> Result<Box<dyn DdsWriter>>;

    /// Creates a reader for the topic.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the reader could not be created.
    fn create_reader(&self, topic: &str, domain_id: u32) -> Result<Box<dyn DdsReader>>;
}

/// Returns the name of the topic carrying an event.
///
/// # Examples
///
/// ```rust
/// use ara_com::{dds::topic_name, EventBindingConfig};
/// let config = EventBindingConfig::new(0x1234, 0x0001, 0x8001, 0x0001);
/// assert_eq!(topic_name(&config), "ara_com/1234/0001/8001");
/// ```
pub fn topic_name(config: &EventBindingConfig) -> String {
    format!(
        "ara_com/{:04x}/{:04x}/{:04x}",
        config.service_id, config.instance_id, config.event_id
    )
}

/// Prepends the CDR encapsulation header to a payload.
pub fn encapsulate(payload: &[u8]) -> Bytes {
    let mut buffer = BytesMut::with_capacity(CDR_ENCAPSULATION.len() + payload.len());
    buffer.put_slice(&CDR_ENCAPSULATION);
    buffer.put_slice(payload);
    buffer.freeze()
}

/// Strips the CDR encapsulation header from a payload.
///
/// Returns [`None`] if the header is missing.
pub fn decapsulate(data: &[u8]) -> Option<&[u8]> {
    data.strip_prefix(&CDR_ENCAPSULATION[..])
}

/// Receives the samples of one event from a DDS topic.
pub struct DdsProxyEventBinding {
    runtime: Arc<dyn DdsRuntime>,
    topic: String,
    domain_id: u32,
    reader: Mutex<Option<Box<dyn DdsReader>>>,
    receiver: Mutex<EventReceiver>,
}

impl DdsProxyEventBinding {
    /// Creates a new [`DdsProxyEventBinding`].
    pub fn new(runtime: Arc<dyn DdsRuntime>, config: &EventBindingConfig, domain_id: u32) -> Self {
        Self {
            runtime,
            topic: topic_name(config),
            domain_id,
            reader: Mutex::new(None),
            receiver: Mutex::new(EventReceiver::new()),
        }
    }

    /// Sets the queue bound of subscriptions that request a bound of zero.
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.receiver = Mutex::new(EventReceiver::with_default_max_samples(max_samples));
        self
    }

    /// Returns the topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Re-evaluates the subscription state from the matched publication count.
    fn poll_state(&self) -> SubscriptionState {
        let matched = {
            let reader = self.reader.lock();
            match reader.as_ref() {
                Some(reader) => reader.matched_publication_count().unwrap_or(0),
                None => return SubscriptionState::NotSubscribed,
            }
        };
        let target = if matched > 0 {
            SubscriptionState::Subscribed
        } else {
            SubscriptionState::SubscriptionPending
        };
        let handler = {
            let mut receiver = self.receiver.lock();
            if receiver.state() == SubscriptionState::NotSubscribed {
                return SubscriptionState::NotSubscribed;
            }
            receiver.set_state(target)
        };
        notify_state(handler, target);
        target
    }

    /// Moves everything the reader holds into the bounded queue.
    fn drain_reader(&self) -> Result<()> {
        let mut taken = vec![];
        {
            let reader = self.reader.lock();
            let Some(reader) = reader.as_ref() else {
                return Err(ComErrc::ServiceNotAvailable);
            };
            reader.take(usize::MAX, &mut |data| match decapsulate(data) {
                Some(payload) => taken.push(Bytes::copy_from_slice(payload)),
                None => tracing::debug!("dropping sample without encapsulation header"),
            })?;
        }
        let mut receiver = self.receiver.lock();
        for sample in taken {
            receiver.push(sample);
        }
        Ok(())
    }
}

impl ProxyEventBinding for DdsProxyEventBinding {
    fn subscribe(&self, max_samples: usize) -> Result<()> {
        let handler = self.receiver.lock().begin_subscribe(max_samples)?;
        let reader = match self.runtime.create_reader(&self.topic, self.domain_id) {
            Ok(reader) => reader,
            Err(error) => {
                self.receiver.lock().reset();
                tracing::warn!(topic = %self.topic, %error, "could not create reader");
                return Err(ComErrc::NetworkBindingFailure);
            }
        };
        let listener = self.receiver.lock().receive_handler();
        reader.set_data_listener(listener);
        *self.reader.lock() = Some(reader);
        notify_state(handler, SubscriptionState::SubscriptionPending);
        tracing::debug!(topic = %self.topic, max_samples, "subscribed to topic");
        self.poll_state();
        Ok(())
    }

    fn unsubscribe(&self) {
        let (previous, handler) = self.receiver.lock().reset();
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.set_data_listener(None);
        }
        if previous != SubscriptionState::NotSubscribed {
            notify_state(handler, SubscriptionState::NotSubscribed);
            tracing::debug!(topic = %self.topic, "unsubscribed from topic");
        }
    }

    fn subscription_state(&self) -> SubscriptionState {
        self.poll_state()
    }

    fn get_new_samples(
        &self,
        handler: &mut dyn FnMut(&[u8]),
        max_samples: usize,
    ) -> Result<usize> {
        if self.poll_state() == SubscriptionState::NotSubscribed {
            return Err(ComErrc::ServiceNotAvailable);
        }
        self.drain_reader()?;
        let samples = self.receiver.lock().take(max_samples)?;
        for sample in &samples {
            handler(sample);
        }
        Ok(samples.len())
    }

    fn set_receive_handler(&self, handler: EventReceiveHandler) {
        self.receiver.lock().set_receive_handler(Some(handler.clone()));
        if let Some(reader) = self.reader.lock().as_ref() {
            reader.set_data_listener(Some(handler));
        }
    }

    fn unset_receive_handler(&self) {
        self.receiver.lock().set_receive_handler(None);
        if let Some(reader) = self.reader.lock().as_ref() {
            reader.set_data_listener(None);
        }
    }

    fn set_subscription_state_handler(&self, handler: SubscriptionStateChangeHandler) {
        self.receiver.lock().set_state_handler(Some(handler));
    }

    fn unset_subscription_state_handler(&self) {
        self.receiver.lock().set_state_handler(None);
    }

    fn free_sample_count(&self) -> usize {
        // Samples still held by the reader count against the queue bound.
        if let Err(error) = self.drain_reader() {
            tracing::trace!(topic = %self.topic, %error, "no reader to drain");
        }
        self.receiver.lock().free_sample_count()
    }
}

impl Drop for DdsProxyEventBinding {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Publishes the samples of one event to a DDS topic.
pub struct DdsSkeletonEventBinding {
    runtime: Arc<dyn DdsRuntime>,
    topic: String,
    domain_id: u32,
    writer: Mutex<Option<Box<dyn DdsWriter>>>,
}

impl DdsSkeletonEventBinding {
    /// Creates a new [`DdsSkeletonEventBinding`].
    pub fn new(runtime: Arc<dyn DdsRuntime>, config: &EventBindingConfig, domain_id: u32) -> Self {
        Self {
            runtime,
            topic: topic_name(config),
            domain_id,
            writer: Mutex::new(None),
        }
    }

    /// Returns the topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns whether any reader is matched with the topic.
    pub fn has_subscribers(&self) -> bool {
        self.writer
            .lock()
            .as_ref()
            .and_then(|writer| writer.matched_subscription_count().ok())
            .is_some_and(|count| count > 0)
    }
}

impl SkeletonEventBinding for DdsSkeletonEventBinding {
    fn offer(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.is_some() {
            return Err(ComErrc::FieldValueIsNotValid);
        }
        let created = self
            .runtime
            .create_writer(&self.topic, self.domain_id)
            .map_err(|error| {
                tracing::warn!(topic = %self.topic, %error, "could not create writer");
                ComErrc::NetworkBindingFailure
            })?;
        *writer = Some(created);
        tracing::debug!(topic = %self.topic, "offered topic");
        Ok(())
    }

    fn stop_offer(&self) {
        self.writer.lock().take();
    }

    fn is_offered(&self) -> bool {
        self.writer.lock().is_some()
    }

    fn send(&self, payload: &[u8]) -> Result<()> {
        let writer = self.writer.lock();
        let writer = writer.as_ref().ok_or(ComErrc::ServiceNotOffered)?;
        writer.write(&encapsulate(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackDds;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> EventBindingConfig {
        EventBindingConfig::new(0x1234, 0x0001, 0x8001, 0x0001)
    }

    fn collect(proxy: &DdsProxyEventBinding, max_samples: usize) -> Vec<Vec<u8>> {
        let mut samples = vec![];
        proxy
            .get_new_samples(&mut |sample| samples.push(sample.to_vec()), max_samples)
            .expect("should get the samples");
        samples
    }

    #[test]
    fn encapsulation() {
        let data = encapsulate(&[9, 9]);
        assert_eq!(&data[..], &[0, 1, 0, 0, 9, 9]);
        assert_eq!(decapsulate(&data), Some(&[9u8, 9][..]));
        assert_eq!(decapsulate(&[0, 1, 0]), None);
        assert_eq!(decapsulate(&[1, 1, 0, 0, 9]), None);
    }

    #[test]
    fn subscription_follows_matching() {
        let runtime = Arc::new(LoopbackDds::new());
        let proxy = DdsProxyEventBinding::new(runtime.clone(), &config(), 0);
        let skeleton = DdsSkeletonEventBinding::new(runtime, &config(), 0);
        let states = Arc::new(Mutex::new(vec![]));
        let observed = states.clone();
        proxy.set_subscription_state_handler(Arc::new(move |state| observed.lock().push(state)));

        assert_eq!(proxy.subscription_state(), SubscriptionState::NotSubscribed);
        proxy.subscribe(4).expect("should subscribe");
        assert_eq!(
            proxy.subscription_state(),
            SubscriptionState::SubscriptionPending
        );
        assert!(!skeleton.has_subscribers());
        skeleton.offer().expect("should offer");
        assert_eq!(proxy.subscription_state(), SubscriptionState::Subscribed);
        assert!(skeleton.has_subscribers());
        proxy.unsubscribe();
        assert_eq!(proxy.subscription_state(), SubscriptionState::NotSubscribed);
        assert_eq!(
            *states.lock(),
            vec![
                SubscriptionState::SubscriptionPending,
                SubscriptionState::Subscribed,
                SubscriptionState::NotSubscribed,
            ]
        );
    }

    #[test]
    fn subscribe_twice_fails() {
        let runtime = Arc::new(LoopbackDds::new());
        let proxy = DdsProxyEventBinding::new(runtime, &config(), 0);
        proxy.subscribe(4).expect("should subscribe");
        assert_eq!(proxy.subscribe(4), Err(ComErrc::FieldValueIsNotValid));
    }

    #[test]
    fn samples_travel_with_encapsulation() {
        let runtime = Arc::new(LoopbackDds::new());
        let proxy = DdsProxyEventBinding::new(runtime.clone(), &config(), 0);
        let skeleton = DdsSkeletonEventBinding::new(runtime.clone(), &config(), 0);
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        proxy.set_receive_handler(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        proxy.subscribe(2).expect("should subscribe");
        skeleton.offer().expect("should offer");
        for value in [1u8, 2, 3] {
            skeleton.send(&[value]).expect("should send");
        }
        assert_eq!(notified.load(Ordering::SeqCst), 3);
        assert_eq!(
            runtime.written(proxy.topic()).first().map(|data| data[..4].to_vec()),
            Some(CDR_ENCAPSULATION.to_vec())
        );
        assert_eq!(collect(&proxy, 10), vec![vec![2u8], vec![3u8]]);
    }

    #[test]
    fn foreign_samples_are_dropped() {
        let runtime = Arc::new(LoopbackDds::new());
        let proxy = DdsProxyEventBinding::new(runtime.clone(), &config(), 0);
        proxy.subscribe(4).expect("should subscribe");
        runtime.inject(proxy.topic(), &[7, 7]);
        runtime.inject(proxy.topic(), &encapsulate(&[8]));
        assert_eq!(collect(&proxy, 10), vec![vec![8u8]]);
    }

    #[test]
    fn reader_failure_is_reported() {
        let runtime = Arc::new(LoopbackDds::new());
        runtime.fail_endpoints(true);
        let proxy = DdsProxyEventBinding::new(runtime.clone(), &config(), 0);
        assert_eq!(proxy.subscribe(4), Err(ComErrc::NetworkBindingFailure));
        assert_eq!(proxy.subscription_state(), SubscriptionState::NotSubscribed);
        let skeleton = DdsSkeletonEventBinding::new(runtime, &config(), 0);
        assert_eq!(skeleton.offer(), Err(ComErrc::NetworkBindingFailure));
    }

    #[test]
    fn send_requires_offer() {
        let runtime = Arc::new(LoopbackDds::new());
        let skeleton = DdsSkeletonEventBinding::new(runtime, &config(), 0);
        assert_eq!(skeleton.send(&[1]), Err(ComErrc::ServiceNotOffered));
        skeleton.offer().expect("should offer");
        assert_eq!(skeleton.offer(), Err(ComErrc::FieldValueIsNotValid));
        skeleton.stop_offer();
        assert!(!skeleton.is_offered());
    }

    #[test]
    fn free_sample_count_includes_unread_samples() {
        let runtime = Arc::new(LoopbackDds::new());
        let proxy = DdsProxyEventBinding::new(runtime.clone(), &config(), 0);
        let skeleton = DdsSkeletonEventBinding::new(runtime, &config(), 0);
        assert_eq!(proxy.free_sample_count(), 0);
        proxy.subscribe(3).expect("should subscribe");
        skeleton.offer().expect("should offer");
        assert_eq!(proxy.free_sample_count(), 3);

        skeleton.send(&[1]).expect("should send");
        skeleton.send(&[2]).expect("should send");
        assert_eq!(proxy.free_sample_count(), 1);
        for value in [3u8, 4] {
            skeleton.send(&[value]).expect("should send");
        }
        assert_eq!(proxy.free_sample_count(), 0);
        assert_eq!(collect(&proxy, 1), vec![vec![2u8]]);
        assert_eq!(proxy.free_sample_count(), 1);
    }

    #[test]
    fn get_new_samples_requires_subscription() {
        let runtime = Arc::new(LoopbackDds::new());
        let proxy = DdsProxyEventBinding::new(runtime, &config(), 0);
        assert_eq!(
            proxy.get_new_samples(&mut |_| {}, 1),
            Err(ComErrc::ServiceNotAvailable)
        );
    }
}
