//! Receive-side bookkeeping shared by the proxy event bindings.

use crate::{
    config::DEFAULT_MAX_SAMPLES,
    types::{EventReceiveHandler, SubscriptionState, SubscriptionStateChangeHandler},
    ComErrc, Result,
};
use bytes::Bytes;
use std::collections::VecDeque;

/// Subscription state, bounded sample queue and handlers of one proxy event.
///
/// Callers keep this behind their binding's mutex. Every method returning a handler expects the
/// caller to release the lock before invoking it.
pub(crate) struct EventReceiver {
    state: SubscriptionState,
    queue: VecDeque<Bytes>,
    max_samples: usize,
    default_max_samples: usize,
    receive_handler: Option<EventReceiveHandler>,
    state_handler: Option<SubscriptionStateChangeHandler>,
}

impl Default for EventReceiver {
    fn default() -> Self {
        Self::with_default_max_samples(DEFAULT_MAX_SAMPLES)
    }
}

impl EventReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a receiver whose subscriptions without an explicit bound queue
    /// `default_max_samples` samples.
    pub fn with_default_max_samples(default_max_samples: usize) -> Self {
        let default_max_samples = default_max_samples.max(1);
        Self {
            state: SubscriptionState::default(),
            queue: VecDeque::new(),
            max_samples: default_max_samples,
            default_max_samples,
            receive_handler: None,
            state_handler: None,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Starts a subscription, moving to [`SubscriptionState::SubscriptionPending`].
    ///
    /// A `max_samples` of zero selects the default bound.
    pub fn begin_subscribe(
        &mut self,
        max_samples: usize,
    ) -> Result<Option<SubscriptionStateChangeHandler>> {
        if self.state != SubscriptionState::NotSubscribed {
            return Err(ComErrc::FieldValueIsNotValid);
        }
        self.max_samples = match max_samples {
            0 => self.default_max_samples,
            bound => bound,
        };
        self.queue.clear();
        Ok(self.set_state(SubscriptionState::SubscriptionPending))
    }

    /// Finishes a pending subscription, moving to [`SubscriptionState::Subscribed`].
    ///
    /// Does nothing unless the subscription is still pending, so a subscription cancelled while
    /// pending stays cancelled.
    pub fn complete_subscribe(&mut self) -> Option<SubscriptionStateChangeHandler> {
        if self.state != SubscriptionState::SubscriptionPending {
            return None;
        }
        self.set_state(SubscriptionState::Subscribed)
    }

    /// Changes the state, returning the handler to notify if it actually changed.
    pub fn set_state(
        &mut self,
        state: SubscriptionState,
    ) -> Option<SubscriptionStateChangeHandler> {
        if self.state == state {
            return None;
        }
        self.state = state;
        self.state_handler.clone()
    }

    /// Ends the subscription and drops queued samples.
    ///
    /// Returns the previous state and the handler to notify.
    pub fn reset(&mut self) -> (SubscriptionState, Option<SubscriptionStateChangeHandler>) {
        let previous = self.state;
        let handler = self.set_state(SubscriptionState::NotSubscribed);
        self.queue.clear();
        self.receive_handler = None;
        (previous, handler)
    }

    /// Queues a sample, evicting the oldest one if the queue is full.
    ///
    /// Samples arriving while not subscribed are discarded. Returns the receive handler to
    /// invoke when the sample was queued.
    pub fn push(&mut self, sample: Bytes) -> Option<EventReceiveHandler> {
        if self.state == SubscriptionState::NotSubscribed {
            tracing::trace!("discarding sample received while not subscribed");
            return None;
        }
        if self.queue.len() >= self.max_samples {
            self.queue.pop_front();
            tracing::debug!(max_samples = self.max_samples, "sample queue full, dropped oldest");
        }
        self.queue.push_back(sample);
        self.receive_handler.clone()
    }

    /// Removes up to `max_samples` samples, oldest first.
    pub fn take(&mut self, max_samples: usize) -> Result<Vec<Bytes>> {
        if self.state == SubscriptionState::NotSubscribed {
            return Err(ComErrc::ServiceNotAvailable);
        }
        let count = max_samples.min(self.queue.len());
        Ok(self.queue.drain(..count).collect())
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns how many more samples fit in the queue, or zero while not subscribed.
    pub fn free_sample_count(&self) -> usize {
        if self.state == SubscriptionState::NotSubscribed {
            return 0;
        }
        self.max_samples.saturating_sub(self.queue.len())
    }

    pub fn set_receive_handler(&mut self, handler: Option<EventReceiveHandler>) {
        self.receive_handler = handler;
    }

    pub fn receive_handler(&self) -> Option<EventReceiveHandler> {
        self.receive_handler.clone()
    }

    pub fn set_state_handler(&mut self, handler: Option<SubscriptionStateChangeHandler>) {
        self.state_handler = handler;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn sample(value: u8) -> Bytes {
        Bytes::copy_from_slice(&[value])
    }

    #[test]
    fn subscribe_twice_fails() {
        let mut receiver = EventReceiver::new();
        receiver.begin_subscribe(2).expect("should subscribe");
        receiver.set_state(SubscriptionState::Subscribed);
        assert!(matches!(
            receiver.begin_subscribe(2),
            Err(ComErrc::FieldValueIsNotValid)
        ));
        assert_eq!(receiver.state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn cancelled_subscription_stays_cancelled() {
        let mut receiver = EventReceiver::new();
        receiver.set_state_handler(Some(Arc::new(|_| {})));
        receiver.begin_subscribe(2).expect("should subscribe");
        receiver.reset();
        assert!(receiver.complete_subscribe().is_none());
        assert_eq!(receiver.state(), SubscriptionState::NotSubscribed);

        receiver.begin_subscribe(2).expect("should subscribe again");
        assert!(receiver.complete_subscribe().is_some());
        assert_eq!(receiver.state(), SubscriptionState::Subscribed);
        assert!(receiver.complete_subscribe().is_none());
    }

    #[test]
    fn oldest_sample_is_evicted() {
        let mut receiver = EventReceiver::new();
        receiver.begin_subscribe(2).expect("should subscribe");
        for value in 0..5 {
            receiver.push(sample(value));
        }
        assert_eq!(receiver.free_sample_count(), 0);
        let samples = receiver.take(10).expect("should take the samples");
        assert_eq!(samples, vec![sample(3), sample(4)]);
        assert_eq!(receiver.free_sample_count(), 2);
    }

    #[test]
    fn zero_bound_selects_the_default() {
        let mut receiver = EventReceiver::new();
        assert_eq!(receiver.free_sample_count(), 0);
        receiver.begin_subscribe(0).expect("should subscribe");
        assert_eq!(receiver.max_samples(), DEFAULT_MAX_SAMPLES);

        let mut receiver = EventReceiver::with_default_max_samples(3);
        receiver.begin_subscribe(0).expect("should subscribe");
        for value in 0..5 {
            receiver.push(sample(value));
        }
        assert_eq!(receiver.queued(), 3);
        receiver.reset();
        receiver.begin_subscribe(5).expect("should subscribe");
        assert_eq!(receiver.free_sample_count(), 5);

        let mut receiver = EventReceiver::with_default_max_samples(0);
        receiver.begin_subscribe(0).expect("should subscribe");
        assert_eq!(receiver.free_sample_count(), 1);
    }

    #[test]
    fn samples_are_discarded_when_not_subscribed() {
        let mut receiver = EventReceiver::new();
        assert!(receiver.push(sample(1)).is_none());
        assert_eq!(receiver.queued(), 0);
        assert!(matches!(receiver.take(1), Err(ComErrc::ServiceNotAvailable)));
    }

    #[test]
    fn push_returns_receive_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut receiver = EventReceiver::new();
        let counter = calls.clone();
        receiver.set_receive_handler(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        receiver.begin_subscribe(4).expect("should subscribe");
        if let Some(handler) = receiver.push(sample(1)) {
            handler();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut receiver = EventReceiver::new();
        receiver.set_receive_handler(Some(Arc::new(|| {})));
        receiver.begin_subscribe(4).expect("should subscribe");
        receiver.push(sample(1));
        let (previous, _) = receiver.reset();
        assert_eq!(previous, SubscriptionState::SubscriptionPending);
        assert_eq!(receiver.state(), SubscriptionState::NotSubscribed);
        assert_eq!(receiver.queued(), 0);
        assert!(receiver.receive_handler().is_none());
    }
}
