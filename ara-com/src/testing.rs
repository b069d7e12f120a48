#![cfg(test)]

//! In-process stand-ins for the transport runtimes, and mock bindings.
//!
//! Every loopback invokes callbacks after releasing its own lock, like a real middleware calling
//! back from its dispatcher thread.

use crate::{
    binding::{
        queue::EventReceiver, ProxyEventBinding, ProxyMethodBinding, RequestHandler,
        ResponseHandler, SkeletonEventBinding,
    },
    dds::{DdsReader, DdsRuntime, DdsWriter},
    discovery::{AvailabilityHandler, AvailabilitySource},
    someip::{MessageHandler, ResponseMessageHandler, SomeIpRuntime, SubscriptionHandler},
    types::{EventReceiveHandler, SubscriptionStateChangeHandler, ANY_INSTANCE},
    zerocopy::{ChannelDescriptor, PortOptions, ShmPublisherPort, ShmRuntime, ShmSubscriberPort},
    ComErrc, Result, ServiceHandleType, SubscriptionState,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    sync::Arc,
};

/// Generates a random value in the given range.
pub fn gen_range<T, R>(range: R) -> T
where
    T: rand::distributions::uniform::SampleUniform,
    R: rand::distributions::uniform::SampleRange<T>,
{
    use rand::Rng;
    rand::thread_rng().gen_range(range)
}

type MemberKey = (ServiceHandleType, u16);

#[derive(Default)]
struct SomeIpState {
    offered: BTreeSet<ServiceHandleType>,
    requested: HashMap<ServiceHandleType, usize>,
    availability: HashMap<ServiceHandleType, AvailabilityHandler>,
    subscriptions: HashSet<MemberKey>,
    message_handlers: HashMap<MemberKey, MessageHandler>,
    offered_events: HashSet<MemberKey>,
    subscription_handlers: HashMap<MemberKey, SubscriptionHandler>,
    response_handlers: HashMap<MemberKey, ResponseMessageHandler>,
    request_handlers: HashMap<MemberKey, RequestHandler>,
    hold_requests: bool,
}

impl SomeIpState {
    /// Returns the availability handlers interested in an instance.
    fn watchers(&self, instance: ServiceHandleType) -> Vec<AvailabilityHandler> {
        let any = ServiceHandleType::new(instance.service_id(), ANY_INSTANCE);
        [instance, any]
            .iter()
            .filter_map(|key| self.availability.get(key).cloned())
            .collect()
    }
}

/// A SOME/IP runtime connecting skeletons and proxies of the same process.
#[derive(Default)]
pub struct LoopbackSomeIp {
    state: Mutex<SomeIpState>,
}

impl LoopbackSomeIp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the event group is subscribed.
    pub fn is_subscribed(&self, service: ServiceHandleType, event_group: u16) -> bool {
        self.state
            .lock()
            .subscriptions
            .contains(&(service, event_group))
    }

    /// Returns whether the instance is offered.
    pub fn is_offered(&self, service: ServiceHandleType) -> bool {
        self.state.lock().offered.contains(&service)
    }

    /// Swallows every request instead of serving it.
    pub fn hold_requests(&self, hold: bool) {
        self.state.lock().hold_requests = hold;
    }

    /// Returns the number of availability handlers registered for the key.
    pub fn availability_handlers(&self, service: ServiceHandleType) -> usize {
        usize::from(self.state.lock().availability.contains_key(&service))
    }

    /// Returns how many times the service is requested.
    pub fn requested(&self, service: ServiceHandleType) -> usize {
        self.state
            .lock()
            .requested
            .get(&service)
            .copied()
            .unwrap_or(0)
    }

    /// Reports the availability of an instance without changing the offers.
    pub fn announce(&self, instance: ServiceHandleType, available: bool) {
        let watchers = self.state.lock().watchers(instance);
        for watcher in watchers {
            watcher(instance.service_id(), instance.instance_id(), available);
        }
    }

    /// Simulates a client subscribing to an event group.
    ///
    /// Returns the decision of the subscription handler, if any.
    pub fn request_subscription(
        &self,
        service: ServiceHandleType,
        event_group: u16,
        client: u16,
        subscribed: bool,
    ) -> Option<bool> {
        let handler = self
            .state
            .lock()
            .subscription_handlers
            .get(&(service, event_group))
            .cloned()?;
        Some(handler(client, subscribed))
    }
}

impl AvailabilitySource for LoopbackSomeIp {
    fn request_service(&self, service: ServiceHandleType) {
        *self.state.lock().requested.entry(service).or_default() += 1;
    }

    fn release_service(&self, service: ServiceHandleType) {
        let mut state = self.state.lock();
        if let Some(count) = state.requested.get_mut(&service) {
            *count -= 1;
            if *count == 0 {
                state.requested.remove(&service);
            }
        }
    }

    fn register_availability_handler(
        &self,
        service: ServiceHandleType,
        handler: AvailabilityHandler,
    ) {
        let offered: Vec<ServiceHandleType> = {
            let mut state = self.state.lock();
            state.availability.insert(service, handler.clone());
            state
                .offered
                .iter()
                .filter(|instance| {
                    instance.service_id() == service.service_id()
                        && (service.instance_id() == ANY_INSTANCE
                            || instance.instance_id() == service.instance_id())
                })
                .copied()
                .collect()
        };
        for instance in offered {
            handler(instance.service_id(), instance.instance_id(), true);
        }
    }

    fn unregister_availability_handler(&self, service: ServiceHandleType) {
        self.state.lock().availability.remove(&service);
    }
}

impl SomeIpRuntime for LoopbackSomeIp {
    fn request_event(&self, _service: ServiceHandleType, _event_id: u16, _event_groups: &[u16]) {}

    fn release_event(&self, _service: ServiceHandleType, _event_id: u16) {}

    fn subscribe(&self, service: ServiceHandleType, event_group: u16, _major_version: u8) {
        self.state.lock().subscriptions.insert((service, event_group));
    }

    fn unsubscribe(&self, service: ServiceHandleType, event_group: u16) {
        self.state
            .lock()
            .subscriptions
            .remove(&(service, event_group));
    }

    fn register_message_handler(
        &self,
        service: ServiceHandleType,
        event_id: u16,
        handler: MessageHandler,
    ) {
        self.state
            .lock()
            .message_handlers
            .insert((service, event_id), handler);
    }

    fn unregister_message_handler(&self, service: ServiceHandleType, event_id: u16) {
        self.state
            .lock()
            .message_handlers
            .remove(&(service, event_id));
    }

    fn offer_service(&self, service: ServiceHandleType, _major_version: u8, _minor_version: u32) {
        let watchers = {
            let mut state = self.state.lock();
            state.offered.insert(service);
            state.watchers(service)
        };
        for watcher in watchers {
            watcher(service.service_id(), service.instance_id(), true);
        }
    }

    fn stop_offer_service(
        &self,
        service: ServiceHandleType,
        _major_version: u8,
        _minor_version: u32,
    ) {
        let watchers = {
            let mut state = self.state.lock();
            if !state.offered.remove(&service) {
                return;
            }
            state.watchers(service)
        };
        for watcher in watchers {
            watcher(service.service_id(), service.instance_id(), false);
        }
    }

    fn offer_event(&self, service: ServiceHandleType, event_id: u16, _event_groups: &[u16]) {
        self.state.lock().offered_events.insert((service, event_id));
    }

    fn stop_offer_event(&self, service: ServiceHandleType, event_id: u16) {
        self.state
            .lock()
            .offered_events
            .remove(&(service, event_id));
    }

    fn notify(&self, service: ServiceHandleType, event_id: u16, payload: Bytes) {
        let handler = {
            let state = self.state.lock();
            if !state.offered_events.contains(&(service, event_id)) {
                return;
            }
            state.message_handlers.get(&(service, event_id)).cloned()
        };
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    fn register_subscription_handler(
        &self,
        service: ServiceHandleType,
        event_group: u16,
        handler: SubscriptionHandler,
    ) {
        self.state
            .lock()
            .subscription_handlers
            .insert((service, event_group), handler);
    }

    fn unregister_subscription_handler(&self, service: ServiceHandleType, event_group: u16) {
        self.state
            .lock()
            .subscription_handlers
            .remove(&(service, event_group));
    }

    fn register_response_handler(
        &self,
        service: ServiceHandleType,
        method_id: u16,
        handler: ResponseMessageHandler,
    ) {
        self.state
            .lock()
            .response_handlers
            .insert((service, method_id), handler);
    }

    fn unregister_response_handler(&self, service: ServiceHandleType, method_id: u16) {
        self.state
            .lock()
            .response_handlers
            .remove(&(service, method_id));
    }

    fn send_request(
        &self,
        service: ServiceHandleType,
        method_id: u16,
        session: u16,
        payload: Bytes,
    ) -> Result<()> {
        let (request_handler, response_handler) = {
            let state = self.state.lock();
            if state.hold_requests {
                return Ok(());
            }
            let request_handler = state
                .request_handlers
                .get(&(service, method_id))
                .cloned()
                .ok_or(ComErrc::ServiceNotAvailable)?;
            let response_handler = state.response_handlers.get(&(service, method_id)).cloned();
            (request_handler, response_handler)
        };
        let response = request_handler(payload);
        if let Some(response_handler) = response_handler {
            response_handler(session, response);
        }
        Ok(())
    }

    fn register_request_handler(
        &self,
        service: ServiceHandleType,
        method_id: u16,
        handler: RequestHandler,
    ) -> Result<()> {
        self.state
            .lock()
            .request_handlers
            .insert((service, method_id), handler);
        Ok(())
    }

    fn unregister_request_handler(&self, service: ServiceHandleType, method_id: u16) {
        self.state
            .lock()
            .request_handlers
            .remove(&(service, method_id));
    }
}

#[derive(Default)]
struct DdsReaderQueue {
    samples: VecDeque<Bytes>,
    listener: Option<EventReceiveHandler>,
}

#[derive(Default)]
struct DdsBus {
    next_reader: u64,
    writers: HashMap<String, usize>,
    readers: HashMap<String, HashMap<u64, DdsReaderQueue>>,
    written: HashMap<String, Vec<Bytes>>,
    fail_endpoints: bool,
}

impl DdsBus {
    /// Queues data on every reader of the topic, returning the listeners to invoke.
    fn deliver(&mut self, topic: &str, data: &Bytes) -> Vec<EventReceiveHandler> {
        let Some(readers) = self.readers.get_mut(topic) else {
            return vec![];
        };
        readers
            .values_mut()
            .filter_map(|reader| {
                reader.samples.push_back(data.clone());
                reader.listener.clone()
            })
            .collect()
    }
}

/// A DDS runtime whose writers and readers meet in memory.
#[derive(Default)]
pub struct LoopbackDds {
    bus: Arc<Mutex<DdsBus>>,
}

impl LoopbackDds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every sample written to the topic, encapsulation included.
    pub fn written(&self, topic: &str) -> Vec<Bytes> {
        self.bus
            .lock()
            .written
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Delivers raw data to every reader of the topic, as a foreign writer would.
    pub fn inject(&self, topic: &str, data: &[u8]) {
        let listeners = self
            .bus
            .lock()
            .deliver(topic, &Bytes::copy_from_slice(data));
        for listener in listeners {
            listener();
        }
    }

    /// Makes endpoint creation fail.
    pub fn fail_endpoints(&self, fail: bool) {
        self.bus.lock().fail_endpoints = fail;
    }
}

impl DdsRuntime for LoopbackDds {
    fn create_writer(&self, topic: &str, _domain_id: u32) -> Result<Box<dyn DdsWriter>> {
        let mut bus = self.bus.lock();
        if bus.fail_endpoints {
            return Err(ComErrc::NetworkBindingFailure);
        }
        *bus.writers.entry(topic.to_owned()).or_default() += 1;
        Ok(Box::new(LoopbackDdsWriter {
            bus: self.bus.clone(),
            topic: topic.to_owned(),
        }))
    }

    fn create_reader(&self, topic: &str, _domain_id: u32) -> Result<Box<dyn DdsReader>> {
        let mut bus = self.bus.lock();
        if bus.fail_endpoints {
            return Err(ComErrc::NetworkBindingFailure);
        }
        let id = bus.next_reader;
        bus.next_reader += 1;
        bus.readers
            .entry(topic.to_owned())
            .or_default()
            .insert(id, DdsReaderQueue::default());
        Ok(Box::new(LoopbackDdsReader {
            bus: self.bus.clone(),
            topic: topic.to_owned(),
            id,
        }))
    }
}

struct LoopbackDdsWriter {
    bus: Arc<Mutex<DdsBus>>,
    topic: String,
}

impl DdsWriter for LoopbackDdsWriter {
    fn write(&self, payload: &[u8]) -> Result<()> {
        let data = Bytes::copy_from_slice(payload);
        let listeners = {
            let mut bus = self.bus.lock();
            bus.written
                .entry(self.topic.clone())
                .or_default()
                .push(data.clone());
            bus.deliver(&self.topic, &data)
        };
        for listener in listeners {
            listener();
        }
        Ok(())
    }

    fn matched_subscription_count(&self) -> Result<usize> {
        Ok(self.bus.lock().readers.get(&self.topic).map_or(0, HashMap::len))
    }
}

impl Drop for LoopbackDdsWriter {
    fn drop(&mut self) {
        let mut bus = self.bus.lock();
        if let Some(count) = bus.writers.get_mut(&self.topic) {
            *count = count.saturating_sub(1);
        }
    }
}

struct LoopbackDdsReader {
    bus: Arc<Mutex<DdsBus>>,
    topic: String,
    id: u64,
}

impl DdsReader for LoopbackDdsReader {
    fn take(&self, max_samples: usize, handler: &mut dyn FnMut(&[u8])) -> Result<usize> {
        let samples: Vec<Bytes> = {
            let mut bus = self.bus.lock();
            let Some(reader) = bus
                .readers
                .get_mut(&self.topic)
                .and_then(|readers| readers.get_mut(&self.id))
            else {
                return Ok(0);
            };
            let count = max_samples.min(reader.samples.len());
            reader.samples.drain(..count).collect()
        };
        for sample in &samples {
            handler(sample);
        }
        Ok(samples.len())
    }

    fn matched_publication_count(&self) -> Result<usize> {
        Ok(self.bus.lock().writers.get(&self.topic).copied().unwrap_or(0))
    }

    fn set_data_listener(&self, listener: Option<EventReceiveHandler>) {
        if let Some(reader) = self
            .bus
            .lock()
            .readers
            .get_mut(&self.topic)
            .and_then(|readers| readers.get_mut(&self.id))
        {
            reader.listener = listener;
        }
    }
}

impl Drop for LoopbackDdsReader {
    fn drop(&mut self) {
        if let Some(readers) = self.bus.lock().readers.get_mut(&self.topic) {
            readers.remove(&self.id);
        }
    }
}

struct ShmQueue {
    chunks: VecDeque<Bytes>,
    capacity: usize,
    listener: Option<EventReceiveHandler>,
}

#[derive(Default)]
struct ShmBus {
    next_subscriber: u64,
    subscribers: HashMap<String, HashMap<u64, ShmQueue>>,
    outstanding_loans: usize,
    outstanding_takes: usize,
    fail_loans: bool,
    fail_takes: bool,
    fail_ports: bool,
    loan_adjustment: isize,
}

/// A shared-memory runtime backed by heap buffers.
#[derive(Default)]
pub struct LoopbackShm {
    bus: Arc<Mutex<ShmBus>>,
}

impl LoopbackShm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of chunks loaned and not yet published or released.
    pub fn outstanding_loans(&self) -> usize {
        self.bus.lock().outstanding_loans
    }

    /// Returns the number of chunks taken and not yet released.
    pub fn outstanding_takes(&self) -> usize {
        self.bus.lock().outstanding_takes
    }

    pub fn fail_loans(&self, fail: bool) {
        self.bus.lock().fail_loans = fail;
    }

    pub fn fail_takes(&self, fail: bool) {
        self.bus.lock().fail_takes = fail;
    }

    pub fn fail_ports(&self, fail: bool) {
        self.bus.lock().fail_ports = fail;
    }

    /// Makes every loaned chunk longer or shorter than requested.
    pub fn adjust_loans(&self, adjustment: isize) {
        self.bus.lock().loan_adjustment = adjustment;
    }
}

impl ShmRuntime for LoopbackShm {
    fn create_publisher(
        &self,
        channel: &ChannelDescriptor,
        _options: &PortOptions,
    ) -> Result<Arc<dyn ShmPublisherPort>> {
        if self.bus.lock().fail_ports {
            return Err(ComErrc::NetworkBindingFailure);
        }
        Ok(Arc::new(LoopbackPublisherPort {
            bus: self.bus.clone(),
            channel: channel.to_string(),
        }))
    }

    fn create_subscriber(
        &self,
        channel: &ChannelDescriptor,
        options: &PortOptions,
    ) -> Result<Arc<dyn ShmSubscriberPort>> {
        let mut bus = self.bus.lock();
        if bus.fail_ports {
            return Err(ComErrc::NetworkBindingFailure);
        }
        let id = bus.next_subscriber;
        bus.next_subscriber += 1;
        bus.subscribers.entry(channel.to_string()).or_default().insert(
            id,
            ShmQueue {
                chunks: VecDeque::new(),
                capacity: usize::try_from(options.queue_capacity).unwrap_or(usize::MAX),
                listener: None,
            },
        );
        Ok(Arc::new(LoopbackSubscriberPort {
            bus: self.bus.clone(),
            channel: channel.to_string(),
            id,
        }))
    }
}

struct LoopbackPublisherPort {
    bus: Arc<Mutex<ShmBus>>,
    channel: String,
}

impl ShmPublisherPort for LoopbackPublisherPort {
    fn loan(&self, size: usize, _alignment: usize) -> Result<BytesMut> {
        let mut bus = self.bus.lock();
        if bus.fail_loans {
            return Err(ComErrc::SampleAllocationFailure);
        }
        bus.outstanding_loans += 1;
        Ok(BytesMut::zeroed(size.saturating_add_signed(bus.loan_adjustment)))
    }

    fn publish(&self, chunk: BytesMut) {
        let chunk = chunk.freeze();
        let listeners: Vec<EventReceiveHandler> = {
            let mut bus = self.bus.lock();
            bus.outstanding_loans -= 1;
            let Some(subscribers) = bus.subscribers.get_mut(&self.channel) else {
                return;
            };
            subscribers
                .values_mut()
                .filter_map(|queue| {
                    if queue.chunks.len() >= queue.capacity {
                        queue.chunks.pop_front();
                    }
                    queue.chunks.push_back(chunk.clone());
                    queue.listener.clone()
                })
                .collect()
        };
        for listener in listeners {
            listener();
        }
    }

    fn release(&self, _chunk: BytesMut) {
        self.bus.lock().outstanding_loans -= 1;
    }

    fn has_subscribers(&self) -> bool {
        self.bus
            .lock()
            .subscribers
            .get(&self.channel)
            .is_some_and(|subscribers| !subscribers.is_empty())
    }
}

struct LoopbackSubscriberPort {
    bus: Arc<Mutex<ShmBus>>,
    channel: String,
    id: u64,
}

impl LoopbackSubscriberPort {
    fn with_queue<R>(&self, f: impl FnOnce(&mut ShmQueue) -> R) -> Option<R> {
        self.bus
            .lock()
            .subscribers
            .get_mut(&self.channel)
            .and_then(|subscribers| subscribers.get_mut(&self.id))
            .map(f)
    }
}

impl ShmSubscriberPort for LoopbackSubscriberPort {
    fn take(&self) -> Result<Option<Bytes>> {
        let mut bus = self.bus.lock();
        if bus.fail_takes {
            return Err(ComErrc::MaxSamplesExceeded);
        }
        let chunk = bus
            .subscribers
            .get_mut(&self.channel)
            .and_then(|subscribers| subscribers.get_mut(&self.id))
            .and_then(|queue| queue.chunks.pop_front());
        if chunk.is_some() {
            bus.outstanding_takes += 1;
        }
        Ok(chunk)
    }

    fn release(&self, _chunk: Bytes) {
        self.bus.lock().outstanding_takes -= 1;
    }

    fn pending(&self) -> usize {
        self.with_queue(|queue| queue.chunks.len()).unwrap_or(0)
    }

    fn set_listener(&self, listener: Option<EventReceiveHandler>) {
        self.with_queue(|queue| queue.listener = listener);
    }
}

impl Drop for LoopbackSubscriberPort {
    fn drop(&mut self) {
        if let Some(subscribers) = self.bus.lock().subscribers.get_mut(&self.channel) {
            subscribers.remove(&self.id);
        }
    }
}

/// A proxy event binding fed by the test through [`MockProxyEventBinding::inject_sample`].
#[derive(Clone, Default)]
pub struct MockProxyEventBinding {
    receiver: Arc<Mutex<EventReceiver>>,
}

impl MockProxyEventBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw sample, as if it had arrived from the network.
    pub fn inject_sample(&self, data: &[u8]) {
        let handler = self.receiver.lock().push(Bytes::copy_from_slice(data));
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl ProxyEventBinding for MockProxyEventBinding {
    fn subscribe(&self, max_samples: usize) -> Result<()> {
        let pending = self.receiver.lock().begin_subscribe(max_samples)?;
        if let Some(handler) = pending {
            handler(SubscriptionState::SubscriptionPending);
        }
        let subscribed = self.receiver.lock().complete_subscribe();
        if let Some(handler) = subscribed {
            handler(SubscriptionState::Subscribed);
        }
        Ok(())
    }

    fn unsubscribe(&self) {
        let (_, handler) = self.receiver.lock().reset();
        if let Some(handler) = handler {
            handler(SubscriptionState::NotSubscribed);
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
        let samples = self.receiver.lock().take(max_samples)?;
        for sample in &samples {
            handler(sample);
        }
        Ok(samples.len())
    }

    fn set_receive_handler(&self, handler: EventReceiveHandler) {
        self.receiver.lock().set_receive_handler(Some(handler));
    }

    fn unset_receive_handler(&self) {
        self.receiver.lock().set_receive_handler(None);
    }

    fn set_subscription_state_handler(&self, handler: SubscriptionStateChangeHandler) {
        self.receiver.lock().set_state_handler(Some(handler));
    }

    fn unset_subscription_state_handler(&self) {
        self.receiver.lock().set_state_handler(None);
    }

    fn free_sample_count(&self) -> usize {
        self.receiver.lock().free_sample_count()
    }
}

#[derive(Default)]
struct MockSkeletonState {
    offered: bool,
    sent: Vec<Vec<u8>>,
}

/// A skeleton event binding recording every payload it sends.
#[derive(Clone, Default)]
pub struct MockSkeletonEventBinding {
    state: Arc<Mutex<MockSkeletonState>>,
}

impl MockSkeletonEventBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }
}

impl SkeletonEventBinding for MockSkeletonEventBinding {
    fn offer(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.offered {
            return Err(ComErrc::FieldValueIsNotValid);
        }
        state.offered = true;
        Ok(())
    }

    fn stop_offer(&self) {
        self.state.lock().offered = false;
    }

    fn is_offered(&self) -> bool {
        self.state.lock().offered
    }

    fn send(&self, payload: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.offered {
            return Err(ComErrc::ServiceNotOffered);
        }
        state.sent.push(payload.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct MockMethodState {
    response: Option<Result<Bytes>>,
    last_request: Option<Bytes>,
    drop_responses: bool,
}

/// A proxy method binding answering every call right away with a canned response.
///
/// Without a canned response, calls fail with [`ComErrc::ServiceNotAvailable`].
#[derive(Clone, Default)]
pub struct MockProxyMethodBinding {
    state: Arc<Mutex<MockMethodState>>,
}

impl MockProxyMethodBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, response: Result<Bytes>) {
        self.state.lock().response = Some(response);
    }

    pub fn last_request(&self) -> Option<Bytes> {
        self.state.lock().last_request.clone()
    }

    /// Drops response handlers without calling them.
    pub fn drop_responses(&self, drop_responses: bool) {
        self.state.lock().drop_responses = drop_responses;
    }
}

impl ProxyMethodBinding for MockProxyMethodBinding {
    fn call(&self, request: Bytes, on_response: ResponseHandler) {
        let response = {
            let mut state = self.state.lock();
            state.last_request = Some(request);
            if state.drop_responses {
                return;
            }
            state
                .response
                .clone()
                .unwrap_or(Err(ComErrc::ServiceNotAvailable))
        };
        on_response(response);
    }
}
