//! Typed fields.
//!
//! A field combines a notifier event with optional getter and setter methods. Which of the three
//! a field provides is fixed by its [`FieldCapabilities`].

use crate::{
    binding::{ProxyEventBinding, ProxyMethodBinding, SkeletonEventBinding, SkeletonMethodBinding},
    serialization::{Deserialize, Serialize},
    types::{EventReceiveHandler, SubscriptionStateChangeHandler},
    ComErrc, MethodFuture, ProxyEvent, ProxyMethod, Result, SamplePtr, SkeletonEvent,
    SkeletonMethod, SubscriptionState,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Operations a field provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldCapabilities {
    pub getter: bool,
    pub setter: bool,
    pub notifier: bool,
}

impl Default for FieldCapabilities {
    fn default() -> Self {
        Self {
            getter: true,
            setter: true,
            notifier: true,
        }
    }
}

/// Accesses a remote field of type `T`.
///
/// Operations of a capability the field lacks fail with [`ComErrc::FieldValueIsNotValid`].
/// Operations of a capability the field has, but without a binding to carry it, fail with
/// [`ComErrc::ServiceNotAvailable`].
pub struct ProxyField<T> {
    capabilities: FieldCapabilities,
    notifier: ProxyEvent<T>,
    getter: ProxyMethod<(), T>,
    setter: ProxyMethod<T, ()>,
}

impl<T> ProxyField<T> {
    /// Creates a new [`ProxyField`] with the given capabilities and no bindings.
    pub fn new(capabilities: FieldCapabilities) -> Self {
        Self {
            capabilities,
            notifier: ProxyEvent::unbound(),
            getter: ProxyMethod::unbound(),
            setter: ProxyMethod::unbound(),
        }
    }

    /// Sets the binding of the notifier event.
    #[must_use]
    pub fn with_notifier(mut self, binding: Box<dyn ProxyEventBinding>) -> Self {
        self.notifier = ProxyEvent::new(binding);
        self
    }

    /// Sets the binding of the getter method.
    #[must_use]
    pub fn with_getter(mut self, binding: Box<dyn ProxyMethodBinding>) -> Self {
        self.getter = ProxyMethod::new(binding);
        self
    }

    /// Sets the binding of the setter method.
    #[must_use]
    pub fn with_setter(mut self, binding: Box<dyn ProxyMethodBinding>) -> Self {
        self.setter = ProxyMethod::new(binding);
        self
    }

    pub fn has_getter(&self) -> bool {
        self.capabilities.getter
    }

    pub fn has_setter(&self) -> bool {
        self.capabilities.setter
    }

    pub fn has_notifier(&self) -> bool {
        self.capabilities.notifier
    }

    fn notifier(&self) -> Result<&ProxyEvent<T>> {
        if self.capabilities.notifier {
            Ok(&self.notifier)
        } else {
            Err(ComErrc::FieldValueIsNotValid)
        }
    }

    /// Subscribes to value changes.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyEvent::subscribe`], or [`ComErrc::FieldValueIsNotValid`] without a
    /// notifier.
    pub fn subscribe(&self, max_samples: usize) -> Result<()> {
        self.notifier()?.subscribe(max_samples)
    }

    /// Unsubscribes from value changes.
    pub fn unsubscribe(&self) {
        if let Ok(notifier) = self.notifier() {
            notifier.unsubscribe();
        }
    }

    /// Returns the subscription state of the notifier.
    pub fn subscription_state(&self) -> SubscriptionState {
        self.notifier()
            .map_or(SubscriptionState::NotSubscribed, ProxyEvent::subscription_state)
    }

    /// Sets the handler called whenever a new value is queued.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyEvent::set_receive_handler`], or [`ComErrc::FieldValueIsNotValid`]
    /// without a notifier.
    pub fn set_receive_handler(&self, handler: EventReceiveHandler) -> Result<()> {
        self.notifier()?.set_receive_handler(handler)
    }

    /// Removes the receive handler.
    pub fn unset_receive_handler(&self) {
        if let Ok(notifier) = self.notifier() {
            notifier.unset_receive_handler();
        }
    }

    /// Sets the handler called whenever the subscription state changes.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyEvent::set_subscription_state_handler`], or
    /// [`ComErrc::FieldValueIsNotValid`] without a notifier.
    pub fn set_subscription_state_handler(
        &self,
        handler: SubscriptionStateChangeHandler,
    ) -> Result<()> {
        self.notifier()?.set_subscription_state_handler(handler)
    }

    /// Removes the subscription state handler.
    pub fn unset_subscription_state_handler(&self) {
        if let Ok(notifier) = self.notifier() {
            notifier.unset_subscription_state_handler();
        }
    }

    /// Returns how many more values fit in the notifier queue.
    pub fn free_sample_count(&self) -> usize {
        self.notifier().map_or(0, ProxyEvent::free_sample_count)
    }
}

impl<T: Deserialize> ProxyField<T> {
    /// Passes up to `max_samples` notified values to the handler, oldest first.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyEvent::get_new_samples`], or [`ComErrc::FieldValueIsNotValid`] without a
    /// notifier.
    pub fn get_new_samples<F>(&self, handler: F, max_samples: usize) -> Result<usize>
    where
        F: FnMut(SamplePtr<T>),
    {
        self.notifier()?.get_new_samples(handler, max_samples)
    }
}

impl<T: Deserialize + Send + 'static> ProxyField<T> {
    /// Reads the current value.
    pub fn get(&self) -> MethodFuture<T> {
        if !self.capabilities.getter {
            return MethodFuture::ready(Err(ComErrc::FieldValueIsNotValid));
        }
        self.getter.call(&())
    }
}

impl<T: Serialize> ProxyField<T> {
    /// Writes a new value.
    ///
    /// The future resolves once the remote side accepted the value, or with the error it
    /// reported.
    pub fn set(&self, value: &T) -> MethodFuture<()> {
        if !self.capabilities.setter {
            return MethodFuture::ready(Err(ComErrc::FieldValueIsNotValid));
        }
        self.setter.call(value)
    }
}

/// Provides a field of type `T`.
///
/// The field keeps its current value, starting at `T::default()`, and notifies subscribers
/// whenever it changes.
pub struct SkeletonField<T> {
    notifier: Arc<SkeletonEvent<T>>,
    value: Arc<Mutex<T>>,
    getter: Option<SkeletonMethod<(), T>>,
    setter: Option<SkeletonMethod<T, ()>>,
}

impl<T> SkeletonField<T>
where
    T: Serialize + Deserialize + Clone + Default + Send + 'static,
{
    /// Creates a new [`SkeletonField`] notifying through the given binding.
    pub fn new(notifier: Box<dyn SkeletonEventBinding>) -> Self {
        Self {
            notifier: Arc::new(SkeletonEvent::new(notifier)),
            value: Arc::default(),
            getter: None,
            setter: None,
        }
    }

    /// Stores a new value and sends it to every subscriber.
    ///
    /// The value is stored even if it could not be sent.
    ///
    /// # Errors
    ///
    /// Same as [`SkeletonEvent::send`].
    pub fn update(&self, value: T) -> Result<()> {
        *self.value.lock() = value.clone();
        self.notifier.send(&value)
    }

    /// Returns a copy of the current value.
    pub fn value(&self) -> T {
        self.value.lock().clone()
    }

    /// Starts offering the notifier event.
    ///
    /// # Errors
    ///
    /// Same as [`SkeletonEvent::offer`].
    pub fn offer(&self) -> Result<()> {
        self.notifier.offer()
    }

    /// Stops offering the notifier event.
    pub fn stop_offer(&self) {
        self.notifier.stop_offer();
    }

    /// Returns whether the notifier event is offered.
    pub fn is_offered(&self) -> bool {
        self.notifier.is_offered()
    }

    /// Returns whether getter requests are served.
    pub fn has_get_handler(&self) -> bool {
        self.getter.as_ref().is_some_and(SkeletonMethod::is_registered)
    }

    /// Returns whether setter requests are served.
    pub fn has_set_handler(&self) -> bool {
        self.setter.as_ref().is_some_and(SkeletonMethod::is_registered)
    }

    /// Serves getter requests with the current value.
    ///
    /// # Errors
    ///
    /// Returns the binding's error if the getter could not be registered.
    pub fn register_get_handler(&mut self, binding: Box<dyn SkeletonMethodBinding>) -> Result<()> {
        let method = SkeletonMethod::<(), T>::new(binding);
        let value = self.value.clone();
        method.register(move |()| Ok(value.lock().clone()))?;
        self.getter = Some(method);
        Ok(())
    }

    /// Serves setter requests.
    ///
    /// The handler receives the requested value and returns the value to store, or an error to
    /// reject the request. A stored value is sent to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns the binding's error if the setter could not be registered.
    pub fn register_set_handler<F>(
        &mut self,
        binding: Box<dyn SkeletonMethodBinding>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(T) -> Result<T> + Send + Sync + 'static,
    {
        let method = SkeletonMethod::<T, ()>::new(binding);
        let (value, notifier) = (self.value.clone(), self.notifier.clone());
        method.register(move |requested: T| {
            let accepted = handler(requested)?;
            *value.lock() = accepted.clone();
            if let Err(error) = notifier.send(&accepted) {
                tracing::debug!(%error, "field value set but not notified");
            }
            Ok(())
        })?;
        self.setter = Some(method);
        Ok(())
    }
}
