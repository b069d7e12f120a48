use super::{MessageHandler, SomeIpRuntime};
use crate::{
    binding::{notify_state, queue::EventReceiver, ProxyEventBinding, SkeletonEventBinding},
    types::{EventReceiveHandler, SubscriptionStateChangeHandler},
    ComErrc, EventBindingConfig, Result, ServiceHandleType, SubscriptionState,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Receives the notifications of one SOME/IP event.
pub struct SomeIpProxyEventBinding {
    runtime: Arc<dyn SomeIpRuntime>,
    config: EventBindingConfig,
    receiver: Arc<Mutex<EventReceiver>>,
    // Held while talking to the runtime; true while the transport is subscribed.
    transport_active: Mutex<bool>,
}

impl SomeIpProxyEventBinding {
    /// Creates a new [`SomeIpProxyEventBinding`].
    pub fn new(runtime: Arc<dyn SomeIpRuntime>, config: EventBindingConfig) -> Self {
        Self {
            runtime,
            config,
            receiver: Arc::new(Mutex::new(EventReceiver::new())),
            transport_active: Mutex::new(false),
        }
    }

    /// Sets the queue bound of subscriptions that request a bound of zero.
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.receiver = Arc::new(Mutex::new(EventReceiver::with_default_max_samples(max_samples)));
        self
    }

    /// Returns the identifiers of the event.
    pub fn config(&self) -> &EventBindingConfig {
        &self.config
    }

    fn service(&self) -> ServiceHandleType {
        ServiceHandleType::new(self.config.service_id, self.config.instance_id)
    }

    /// Subscribes or releases the transport to match the subscription state.
    ///
    /// Returns the handler to notify if a pending subscription completed.
    fn sync_transport(&self) -> Option<SubscriptionStateChangeHandler> {
        let mut active = self.transport_active.lock();
        let wanted = self.receiver.lock().state() != SubscriptionState::NotSubscribed;
        let service = self.service();
        if wanted && !*active {
            self.runtime.request_service(service);
            self.runtime
                .request_event(service, self.config.event_id, &[self.config.event_group_id]);
            self.runtime.register_message_handler(
                service,
                self.config.event_id,
                self.message_handler(),
            );
            self.runtime.subscribe(
                service,
                self.config.event_group_id,
                self.config.major_version,
            );
            *active = true;
            tracing::debug!(
                service = self.config.service_id,
                instance = self.config.instance_id,
                event = self.config.event_id,
                "subscribed to event"
            );
        } else if !wanted && *active {
            self.runtime
                .unsubscribe(service, self.config.event_group_id);
            self.runtime.release_event(service, self.config.event_id);
            self.runtime
                .unregister_message_handler(service, self.config.event_id);
            *active = false;
            tracing::debug!(
                service = self.config.service_id,
                instance = self.config.instance_id,
                event = self.config.event_id,
                "unsubscribed from event"
            );
        }
        if !wanted {
            return None;
        }
        self.receiver.lock().complete_subscribe()
    }

    fn message_handler(&self) -> MessageHandler {
        let receiver: Weak<Mutex<EventReceiver>> = Arc::downgrade(&self.receiver);
        Arc::new(move |payload: Bytes| {
            let Some(receiver) = receiver.upgrade() else {
                return;
            };
            let handler = receiver.lock().push(payload);
            if let Some(handler) = handler {
                handler();
            }
        })
    }
}

impl ProxyEventBinding for SomeIpProxyEventBinding {
    fn subscribe(&self, max_samples: usize) -> Result<()> {
        let handler = self.receiver.lock().begin_subscribe(max_samples)?;
        notify_state(handler, SubscriptionState::SubscriptionPending);
        let handler = self.sync_transport();
        notify_state(handler, SubscriptionState::Subscribed);
        Ok(())
    }

    fn unsubscribe(&self) {
        let (previous, handler) = self.receiver.lock().reset();
        if previous == SubscriptionState::NotSubscribed {
            return;
        }
        self.sync_transport();
        notify_state(handler, SubscriptionState::NotSubscribed);
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

impl Drop for SomeIpProxyEventBinding {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Sends the notifications of one SOME/IP event.
pub struct SomeIpSkeletonEventBinding {
    runtime: Arc<dyn SomeIpRuntime>,
    config: EventBindingConfig,
    offered: Mutex<bool>,
}

impl SomeIpSkeletonEventBinding {
    /// Creates a new [`SomeIpSkeletonEventBinding`].
    pub fn new(runtime: Arc<dyn SomeIpRuntime>, config: EventBindingConfig) -> Self {
        Self {
            runtime,
            config,
            offered: Mutex::new(false),
        }
    }

    /// Returns the identifiers of the event.
    pub fn config(&self) -> &EventBindingConfig {
        &self.config
    }

    fn service(&self) -> ServiceHandleType {
        ServiceHandleType::new(self.config.service_id, self.config.instance_id)
    }
}

impl SkeletonEventBinding for SomeIpSkeletonEventBinding {
    fn offer(&self) -> Result<()> {
        {
            let mut offered = self.offered.lock();
            if *offered {
                return Err(ComErrc::FieldValueIsNotValid);
            }
            *offered = true;
        }
        self.runtime.offer_event(
            self.service(),
            self.config.event_id,
            &[self.config.event_group_id],
        );
        tracing::debug!(
            service = self.config.service_id,
            instance = self.config.instance_id,
            event = self.config.event_id,
            "offered event"
        );
        Ok(())
    }

    fn stop_offer(&self) {
        let was_offered = std::mem::replace(&mut *self.offered.lock(), false);
        if was_offered {
            self.runtime
                .stop_offer_event(self.service(), self.config.event_id);
        }
    }

    fn is_offered(&self) -> bool {
        *self.offered.lock()
    }

    fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.is_offered() {
            return Err(ComErrc::ServiceNotOffered);
        }
        self.runtime.notify(
            self.service(),
            self.config.event_id,
            Bytes::copy_from_slice(payload),
        );
        Ok(())
    }
}

impl Drop for SomeIpSkeletonEventBinding {
    fn drop(&mut self) {
        self.stop_offer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackSomeIp;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CONFIG: EventBindingConfig = EventBindingConfig {
        service_id: 0x1234,
        instance_id: 0x0001,
        event_id: 0x8001,
        event_group_id: 0x0001,
        major_version: 1,
    };

    fn bindings() -> (
        Arc<LoopbackSomeIp>,
        SomeIpProxyEventBinding,
        SomeIpSkeletonEventBinding,
    ) {
        let runtime = Arc::new(LoopbackSomeIp::new());
        let proxy = SomeIpProxyEventBinding::new(runtime.clone(), CONFIG);
        let skeleton = SomeIpSkeletonEventBinding::new(runtime.clone(), CONFIG);
        (runtime, proxy, skeleton)
    }

    fn collect(proxy: &SomeIpProxyEventBinding, max_samples: usize) -> Vec<Vec<u8>> {
        let mut samples = vec![];
        proxy
            .get_new_samples(&mut |sample| samples.push(sample.to_vec()), max_samples)
            .expect("should get the samples");
        samples
    }

    #[test]
    fn subscribe_transitions_through_pending() {
        let (runtime, proxy, _) = bindings();
        let states = Arc::new(Mutex::new(vec![]));
        let observed = states.clone();
        proxy.set_subscription_state_handler(Arc::new(move |state| observed.lock().push(state)));

        proxy.subscribe(4).expect("should subscribe");
        assert_eq!(proxy.subscription_state(), SubscriptionState::Subscribed);
        assert_eq!(
            *states.lock(),
            vec![
                SubscriptionState::SubscriptionPending,
                SubscriptionState::Subscribed
            ]
        );
        assert!(runtime.is_subscribed(proxy.service(), CONFIG.event_group_id));
    }

    #[test]
    fn unsubscribe_while_pending_cancels_the_subscription() {
        let runtime = Arc::new(LoopbackSomeIp::new());
        let proxy = Arc::new(SomeIpProxyEventBinding::new(runtime.clone(), CONFIG));
        let states = Arc::new(Mutex::new(vec![]));
        let (weak, observed) = (Arc::downgrade(&proxy), states.clone());
        proxy.set_subscription_state_handler(Arc::new(move |state| {
            observed.lock().push(state);
            if state == SubscriptionState::SubscriptionPending {
                if let Some(proxy) = weak.upgrade() {
                    proxy.unsubscribe();
                }
            }
        }));

        assert_eq!(proxy.subscribe(4), Ok(()));
        assert_eq!(proxy.subscription_state(), SubscriptionState::NotSubscribed);
        assert!(!runtime.is_subscribed(proxy.service(), CONFIG.event_group_id));
        assert_eq!(
            *states.lock(),
            vec![
                SubscriptionState::SubscriptionPending,
                SubscriptionState::NotSubscribed
            ]
        );

        proxy.unset_subscription_state_handler();
        proxy.subscribe(4).expect("should subscribe again");
        assert_eq!(proxy.subscription_state(), SubscriptionState::Subscribed);
        assert!(runtime.is_subscribed(proxy.service(), CONFIG.event_group_id));
    }

    #[test]
    fn subscribe_twice_fails() {
        let (_, proxy, _) = bindings();
        proxy.subscribe(4).expect("should subscribe");
        assert_eq!(proxy.subscribe(4), Err(ComErrc::FieldValueIsNotValid));
        assert_eq!(proxy.subscription_state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let (runtime, proxy, _) = bindings();
        proxy.unsubscribe();
        assert_eq!(proxy.subscription_state(), SubscriptionState::NotSubscribed);
        proxy.subscribe(4).expect("should subscribe");
        proxy.unsubscribe();
        proxy.unsubscribe();
        assert_eq!(proxy.subscription_state(), SubscriptionState::NotSubscribed);
        assert!(!runtime.is_subscribed(proxy.service(), CONFIG.event_group_id));
    }

    #[test]
    fn notifications_reach_the_proxy() {
        let (_, proxy, skeleton) = bindings();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        proxy.set_receive_handler(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        proxy.subscribe(4).expect("should subscribe");
        skeleton.offer().expect("should offer");
        skeleton.send(&[1, 2, 3]).expect("should send");

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(proxy.free_sample_count(), 3);
        assert_eq!(collect(&proxy, 10), vec![vec![1u8, 2, 3]]);
        assert_eq!(proxy.free_sample_count(), 4);
    }

    #[test]
    fn queue_keeps_newest_samples() {
        let (_, proxy, skeleton) = bindings();
        proxy.subscribe(2).expect("should subscribe");
        skeleton.offer().expect("should offer");
        for value in [b'A', b'B', b'C'] {
            skeleton.send(&[value]).expect("should send");
        }
        assert_eq!(proxy.free_sample_count(), 0);
        assert_eq!(collect(&proxy, 10), vec![vec![b'B'], vec![b'C']]);
    }

    #[test]
    fn get_new_samples_requires_subscription() {
        let (_, proxy, _) = bindings();
        let result = proxy.get_new_samples(&mut |_| {}, 1);
        assert_eq!(result, Err(ComErrc::ServiceNotAvailable));
    }

    #[test]
    fn get_new_samples_respects_max() {
        let (_, proxy, skeleton) = bindings();
        proxy.subscribe(8).expect("should subscribe");
        skeleton.offer().expect("should offer");
        for value in 0..5u8 {
            skeleton.send(&[value]).expect("should send");
        }
        assert_eq!(collect(&proxy, 2), vec![vec![0u8], vec![1u8]]);
        assert_eq!(collect(&proxy, 10).len(), 3);
    }

    #[test]
    fn offer_twice_fails() {
        let (_, _, skeleton) = bindings();
        skeleton.offer().expect("should offer");
        assert_eq!(skeleton.offer(), Err(ComErrc::FieldValueIsNotValid));
        skeleton.stop_offer();
        skeleton.stop_offer();
        assert!(!skeleton.is_offered());
    }

    #[test]
    fn send_requires_offer() {
        let (_, _, skeleton) = bindings();
        assert_eq!(skeleton.send(&[1]), Err(ComErrc::ServiceNotOffered));
    }

    #[test]
    fn allocated_samples_are_sent() {
        let (_, proxy, skeleton) = bindings();
        proxy.subscribe(1).expect("should subscribe");
        skeleton.offer().expect("should offer");
        let mut sample = skeleton.allocate(2).expect("should allocate");
        sample
            .buffer_mut()
            .expect("should hold a buffer")
            .extend_from_slice(&[7, 8]);
        skeleton.send_allocated(sample).expect("should send");
        assert_eq!(collect(&proxy, 1), vec![vec![7u8, 8]]);
        assert!(matches!(
            skeleton.allocate(0),
            Err(ComErrc::IllegalUseOfAllocate)
        ));
    }

    #[test]
    fn receive_handler_may_reenter_the_binding() {
        let runtime = Arc::new(LoopbackSomeIp::new());
        let proxy = Arc::new(SomeIpProxyEventBinding::new(runtime.clone(), CONFIG));
        let skeleton = SomeIpSkeletonEventBinding::new(runtime, CONFIG);
        let taken = Arc::new(AtomicUsize::new(0));
        let (weak, counter) = (Arc::downgrade(&proxy), taken.clone());
        proxy.set_receive_handler(Arc::new(move || {
            if let Some(proxy) = weak.upgrade() {
                let count = proxy
                    .get_new_samples(&mut |_| {}, 1)
                    .expect("should get the sample");
                counter.fetch_add(count, Ordering::SeqCst);
            }
        }));
        proxy.subscribe(4).expect("should subscribe");
        skeleton.offer().expect("should offer");
        skeleton.send(&[1]).expect("should send");
        assert_eq!(taken.load(Ordering::SeqCst), 1);
    }
}
