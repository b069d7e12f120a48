//! Shared-memory zero-copy transport.
//!
//! A [`ZeroCopyPublisher`] loans payload chunks directly from the transport's shared memory and
//! publishes them by reference. A [`ZeroCopySubscriber`] takes the chunks without copying them.
//! Both sides hand out RAII samples: a [`LoanedSample`] or [`ReceivedSample`] that is dropped
//! without being consumed returns its chunk to the owning port.
//!
//! The shared-memory middleware itself is reached through a [`ShmRuntime`], which creates the
//! publisher and subscriber ports of a channel.

use crate::{config::ComConfig, types::EventReceiveHandler, ComErrc, EventBindingConfig, Result};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Notify;

mod binding;
pub use binding::{ZeroCopyProxyEventBinding, ZeroCopySkeletonEventBinding};

/// Largest payload size or alignment a loan may request.
pub const MAX_LOAN: usize = u32::MAX as usize;

/// Identifies a zero-copy channel.
///
/// Endpoints created for a descriptor with any empty component are inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ChannelDescriptor {
    pub service: String,
    pub instance: String,
    pub event: String,
}

impl ChannelDescriptor {
    /// Creates a new [`ChannelDescriptor`].
    pub fn new(
        service: impl Into<String>,
        instance: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            instance: instance.into(),
            event: event.into(),
        }
    }

    /// Derives the channel carrying an event from its identifiers.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ara_com::{zerocopy::ChannelDescriptor, EventBindingConfig};
    /// let config = EventBindingConfig::new(0x1234, 0x0001, 0x8001, 0x0001);
    /// let channel = ChannelDescriptor::from_event_config(&config);
    /// assert_eq!(channel, ChannelDescriptor::new("1234", "0001", "8001"));
    /// ```
    pub fn from_event_config(config: &EventBindingConfig) -> Self {
        Self::new(
            format!("{:04x}", config.service_id),
            format!("{:04x}", config.instance_id),
            format!("{:04x}", config.event_id),
        )
    }

    /// Returns whether every component is set.
    pub fn is_valid(&self) -> bool {
        !self.service.is_empty() && !self.instance.is_empty() && !self.event.is_empty()
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.instance, self.event)
    }
}

/// Options passed to the shared-memory runtime when creating ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOptions {
    /// Name under which the process registers with the middleware.
    pub runtime_name: String,
    /// Samples a publisher keeps for late-joining subscribers.
    pub history_capacity: u64,
    /// Samples a subscriber queues before the oldest ones are overwritten.
    pub queue_capacity: u64,
    /// Historical samples a subscriber requests when connecting.
    pub history_request: u64,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self::from(&ComConfig::default())
    }
}

impl From<&ComConfig> for PortOptions {
    fn from(config: &ComConfig) -> Self {
        Self {
            runtime_name: config.runtime_name.clone(),
            history_capacity: config.history_capacity,
            queue_capacity: config.queue_capacity,
            history_request: config.history_request,
        }
    }
}

/// Publishing side of a shared-memory channel.
pub trait ShmPublisherPort: Send + Sync {
    /// Loans a chunk of exactly `size` bytes from shared memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the middleware has no chunk to spare.
    fn loan(&self, size: usize, alignment: usize) -> Result<BytesMut>;

    /// Publishes a loaned chunk.
    fn publish(&self, chunk: BytesMut);

    /// Returns a loaned chunk without publishing it.
    fn release(&self, chunk: BytesMut);

    /// Returns whether any subscriber is connected.
    fn has_subscribers(&self) -> bool;
}

/// Receiving side of a shared-memory channel.
pub trait ShmSubscriberPort: Send + Sync {
    /// Takes the oldest pending chunk, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber holds too many chunks already.
    fn take(&self) -> Result<Option<Bytes>>;

    /// Returns a taken chunk to the middleware.
    fn release(&self, chunk: Bytes);

    /// Returns the number of chunks waiting to be taken.
    fn pending(&self) -> usize;

    /// Sets the listener called whenever a chunk arrives.
    fn set_listener(&self, listener: Option<EventReceiveHandler>);
}

/// Port factory of an external shared-memory middleware.
pub trait ShmRuntime: Send + Sync {
    /// Creates a publisher port for the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the port could not be created.
    fn create_publisher(
        &self,
        channel: &ChannelDescriptor,
        options: &PortOptions,
    ) -> Result<Arc<dyn ShmPublisherPort>>;

    /// Creates a subscriber port for the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the port could not be created.
    fn create_subscriber(
        &self,
        channel: &ChannelDescriptor,
        options: &PortOptions,
    ) -> Result<Arc<dyn ShmSubscriberPort>>;
}

/// A chunk loaned from a [`ZeroCopyPublisher`].
///
/// The default value is an empty, invalid sample. Dropping a valid sample without publishing it
/// returns the chunk to the publisher.
#[derive(Default)]
pub struct LoanedSample {
    chunk: Option<(BytesMut, Arc<dyn ShmPublisherPort>)>,
}

impl LoanedSample {
    /// Returns whether the sample holds a chunk.
    pub fn is_valid(&self) -> bool {
        self.chunk.is_some()
    }

    /// Returns the payload size, or zero for an invalid sample.
    pub fn size(&self) -> usize {
        self.chunk.as_ref().map_or(0, |(chunk, _)| chunk.len())
    }

    /// Returns the size of the loaned chunk, or zero for an invalid sample.
    pub fn capacity(&self) -> usize {
        self.chunk.as_ref().map_or(0, |(chunk, _)| chunk.capacity())
    }

    /// Returns the chunk for writing a payload of a different length in place.
    ///
    /// Growing the buffer past [`LoanedSample::capacity`] moves it out of shared memory.
    pub fn buffer_mut(&mut self) -> Option<&mut BytesMut> {
        self.chunk.as_mut().map(|(chunk, _)| chunk)
    }
}

impl Deref for LoanedSample {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self.chunk.as_ref() {
            Some((chunk, _)) => &chunk[..],
            None => &[],
        }
    }
}

impl DerefMut for LoanedSample {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.chunk.as_mut() {
            Some((chunk, _)) => &mut chunk[..],
            None => &mut [],
        }
    }
}

impl Drop for LoanedSample {
    fn drop(&mut self) {
        if let Some((chunk, port)) = self.chunk.take() {
            port.release(chunk);
        }
    }
}

impl fmt::Debug for LoanedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoanedSample")
            .field("valid", &self.is_valid())
            .field("size", &self.size())
            .finish()
    }
}

/// A chunk taken by a [`ZeroCopySubscriber`].
///
/// Dropping the sample returns the chunk to the subscriber.
#[derive(Default)]
pub struct ReceivedSample {
    chunk: Option<(Bytes, Arc<dyn ShmSubscriberPort>)>,
}

impl ReceivedSample {
    /// Returns whether the sample holds a chunk.
    pub fn is_valid(&self) -> bool {
        self.chunk.is_some()
    }

    /// Returns the payload size, or zero for an invalid sample.
    pub fn size(&self) -> usize {
        self.chunk.as_ref().map_or(0, |(chunk, _)| chunk.len())
    }
}

impl Deref for ReceivedSample {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self.chunk.as_ref() {
            Some((chunk, _)) => &chunk[..],
            None => &[],
        }
    }
}

impl Drop for ReceivedSample {
    fn drop(&mut self) {
        if let Some((chunk, port)) = self.chunk.take() {
            port.release(chunk);
        }
    }
}

impl fmt::Debug for ReceivedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedSample")
            .field("valid", &self.is_valid())
            .field("size", &self.size())
            .finish()
    }
}

/// Publishes samples to a zero-copy channel.
pub struct ZeroCopyPublisher {
    channel: ChannelDescriptor,
    port: Option<Arc<dyn ShmPublisherPort>>,
}

impl ZeroCopyPublisher {
    /// Creates a new [`ZeroCopyPublisher`].
    ///
    /// The publisher is inactive if the channel is incomplete or the runtime refuses the port.
    pub fn new(runtime: &dyn ShmRuntime, channel: ChannelDescriptor, options: &PortOptions) -> Self {
        let port = if channel.is_valid() {
            runtime
                .create_publisher(&channel, options)
                .map_err(|error| {
                    tracing::warn!(%channel, %error, "could not create publisher port");
                })
                .ok()
        } else {
            tracing::debug!(%channel, "incomplete channel, publisher stays inactive");
            None
        };
        Self { channel, port }
    }

    /// Returns the channel.
    pub fn channel(&self) -> &ChannelDescriptor {
        &self.channel
    }

    /// Returns whether the publisher is connected to the middleware.
    pub fn is_binding_active(&self) -> bool {
        self.port.is_some()
    }

    /// Loans a chunk of `size` bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// - [`ComErrc::IllegalUseOfAllocate`] if `size` or `alignment` is zero or too large.
    /// - [`ComErrc::NetworkBindingFailure`] if the publisher is inactive.
    /// - [`ComErrc::SampleAllocationFailure`] if the middleware could not loan a chunk.
    pub fn loan(&self, size: usize, alignment: usize) -> Result<LoanedSample> {
        if !(1..=MAX_LOAN).contains(&size) || !(1..=MAX_LOAN).contains(&alignment) {
            return Err(ComErrc::IllegalUseOfAllocate);
        }
        let port = self.port.as_ref().ok_or(ComErrc::NetworkBindingFailure)?;
        let mut chunk = port.loan(size, alignment).map_err(|error| {
            tracing::debug!(channel = %self.channel, size, %error, "loan failed");
            ComErrc::SampleAllocationFailure
        })?;
        if chunk.len() < size {
            tracing::warn!(
                channel = %self.channel,
                size,
                loaned = chunk.len(),
                "middleware loaned a short chunk"
            );
            port.release(chunk);
            return Err(ComErrc::SampleAllocationFailure);
        }
        chunk.truncate(size);
        Ok(LoanedSample {
            chunk: Some((chunk, port.clone())),
        })
    }

    /// Publishes a loaned sample without copying it.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::IllegalUseOfAllocate`] if the sample is invalid, and
    /// [`ComErrc::NetworkBindingFailure`] if the publisher is inactive.
    pub fn publish(&self, mut sample: LoanedSample) -> Result<()> {
        let (chunk, port) = sample.chunk.take().ok_or(ComErrc::IllegalUseOfAllocate)?;
        if self.port.is_none() {
            port.release(chunk);
            return Err(ComErrc::NetworkBindingFailure);
        }
        port.publish(chunk);
        Ok(())
    }

    /// Loans a chunk, copies the payload into it and publishes it.
    ///
    /// # Errors
    ///
    /// Same as [`ZeroCopyPublisher::loan`].
    pub fn publish_copy(&self, payload: &[u8]) -> Result<()> {
        let mut sample = self.loan(payload.len(), 1)?;
        sample[..payload.len()].copy_from_slice(payload);
        self.publish(sample)
    }

    /// Returns whether any subscriber is connected.
    pub fn has_subscribers(&self) -> bool {
        self.port.as_ref().is_some_and(|port| port.has_subscribers())
    }
}

/// Takes samples from a zero-copy channel.
pub struct ZeroCopySubscriber {
    channel: ChannelDescriptor,
    port: Option<Arc<dyn ShmSubscriberPort>>,
    notify: Arc<Notify>,
    handler: Arc<Mutex<Option<EventReceiveHandler>>>,
}

impl ZeroCopySubscriber {
    /// Creates a new [`ZeroCopySubscriber`].
    ///
    /// The subscriber is inactive if the channel is incomplete or the runtime refuses the port.
    pub fn new(runtime: &dyn ShmRuntime, channel: ChannelDescriptor, options: &PortOptions) -> Self {
        let port = if channel.is_valid() {
            runtime
                .create_subscriber(&channel, options)
                .map_err(|error| {
                    tracing::warn!(%channel, %error, "could not create subscriber port");
                })
                .ok()
        } else {
            tracing::debug!(%channel, "incomplete channel, subscriber stays inactive");
            None
        };
        let subscriber = Self {
            channel,
            port,
            notify: Arc::new(Notify::new()),
            handler: Arc::default(),
        };
        if let Some(port) = &subscriber.port {
            port.set_listener(Some(subscriber.listener()));
        }
        subscriber
    }

    fn listener(&self) -> EventReceiveHandler {
        let notify = self.notify.clone();
        let handler = self.handler.clone();
        Arc::new(move || {
            notify.notify_one();
            let handler = handler.lock().clone();
            if let Some(handler) = handler {
                handler();
            }
        })
    }

    /// Returns the channel.
    pub fn channel(&self) -> &ChannelDescriptor {
        &self.channel
    }

    /// Returns whether the subscriber is connected to the middleware.
    pub fn is_binding_active(&self) -> bool {
        self.port.is_some()
    }

    /// Takes the oldest pending sample without blocking.
    ///
    /// Returns [`None`] if no sample is pending.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::NetworkBindingFailure`] if the subscriber is inactive, and
    /// [`ComErrc::MaxSamplesExceeded`] if the middleware refuses to hand out another sample.
    pub fn try_take(&self) -> Result<Option<ReceivedSample>> {
        let port = self.port.as_ref().ok_or(ComErrc::NetworkBindingFailure)?;
        let chunk = port.take().map_err(|error| {
            tracing::debug!(channel = %self.channel, %error, "take failed");
            ComErrc::MaxSamplesExceeded
        })?;
        Ok(chunk.map(|chunk| ReceivedSample {
            chunk: Some((chunk, port.clone())),
        }))
    }

    /// Returns the number of samples waiting to be taken.
    pub fn pending(&self) -> usize {
        self.port.as_ref().map_or(0, |port| port.pending())
    }

    /// Waits until a sample is pending or the timeout expires.
    ///
    /// Returns whether a sample is pending. Inactive subscribers return `false` right away.
    pub async fn wait_for_data(&self, timeout: Duration) -> bool {
        if !self.is_binding_active() {
            return false;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.pending() > 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return false;
            }
        }
    }

    /// Sets the handler called whenever a sample arrives.
    pub fn set_receive_handler(&self, handler: Option<EventReceiveHandler>) {
        *self.handler.lock() = handler;
    }
}

impl Drop for ZeroCopySubscriber {
    fn drop(&mut self) {
        if let Some(port) = &self.port {
            port.set_listener(None);
        }
    }
}
