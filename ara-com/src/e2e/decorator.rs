use super::{CheckStatus, Profile};
use crate::{
    binding::{ProxyEventBinding, SkeletonEventBinding},
    types::{EventReceiveHandler, SubscriptionStateChangeHandler},
    ComErrc, Result, SubscriptionState,
};
use parking_lot::Mutex;

/// Protects every payload sent through the wrapped binding.
pub struct E2eSkeletonEventBinding<P> {
    inner: Box<dyn SkeletonEventBinding>,
    profile: Mutex<P>,
}

impl<P: Profile> E2eSkeletonEventBinding<P> {
    /// Creates a new [`E2eSkeletonEventBinding`] wrapping `inner`.
    pub fn new(inner: Box<dyn SkeletonEventBinding>, profile: P) -> Self {
        Self {
            inner,
            profile: Mutex::new(profile),
        }
    }
}

impl<P: Profile> SkeletonEventBinding for E2eSkeletonEventBinding<P> {
    fn offer(&self) -> Result<()> {
        self.inner.offer()
    }

    fn stop_offer(&self) {
        self.inner.stop_offer();
    }

    fn is_offered(&self) -> bool {
        self.inner.is_offered()
    }

    fn send(&self, payload: &[u8]) -> Result<()> {
        let protected = self.profile.lock().try_protect(payload).map_err(|error| {
            tracing::warn!(%error, "failed to protect payload");
            ComErrc::CommunicationStackError
        })?;
        self.inner.send(&protected)
    }
}

/// Delivers only the payloads of the wrapped binding that pass the profile's check.
///
/// Rejected payloads are dropped silently, so the handler may be invoked fewer times than the
/// number of samples reported by [`ProxyEventBinding::get_new_samples`].
pub struct E2eProxyEventBinding<P> {
    inner: Box<dyn ProxyEventBinding>,
    profile: Mutex<P>,
}

impl<P: Profile> E2eProxyEventBinding<P> {
    /// Creates a new [`E2eProxyEventBinding`] wrapping `inner`.
    pub fn new(inner: Box<dyn ProxyEventBinding>, profile: P) -> Self {
        Self {
            inner,
            profile: Mutex::new(profile),
        }
    }
}

impl<P: Profile> ProxyEventBinding for E2eProxyEventBinding<P> {
    fn subscribe(&self, max_samples: usize) -> Result<()> {
        self.inner.subscribe(max_samples)
    }

    fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }

    fn subscription_state(&self) -> SubscriptionState {
        self.inner.subscription_state()
    }

    fn get_new_samples(
        &self,
        handler: &mut dyn FnMut(&[u8]),
        max_samples: usize,
    ) -> Result<usize> {
        let mut accepted = vec![];
        let count = {
            let mut profile = self.profile.lock();
            let header_len = profile.header_len();
            self.inner.get_new_samples(
                &mut |sample| match profile.check(sample) {
                    CheckStatus::Ok => accepted.push(sample[header_len..].to_vec()),
                    status => tracing::debug!(?status, "dropped sample failing the E2E check"),
                },
                max_samples,
            )?
        };
        for sample in &accepted {
            handler(sample);
        }
        Ok(count)
    }

    fn set_receive_handler(&self, handler: EventReceiveHandler) {
        self.inner.set_receive_handler(handler);
    }

    fn unset_receive_handler(&self) {
        self.inner.unset_receive_handler();
    }

    fn set_subscription_state_handler(&self, handler: SubscriptionStateChangeHandler) {
        self.inner.set_subscription_state_handler(handler);
    }

    fn unset_subscription_state_handler(&self) {
        self.inner.unset_subscription_state_handler();
    }

    fn free_sample_count(&self) -> usize {
        self.inner.free_sample_count()
    }
}
