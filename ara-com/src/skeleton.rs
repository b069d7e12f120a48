//! Common part of every service skeleton.

use crate::{
    someip::{SomeIpRuntime, SubscriptionHandler},
    ComErrc, EventBindingConfig, MethodBindingConfig, MethodCallProcessingMode, Result,
    ServiceHandleType,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct OfferState {
    offered: bool,
    event_groups: Vec<u16>,
}

/// Offers one service instance over SOME/IP and tracks the subscription handlers of its event
/// groups.
///
/// Dropping the skeleton stops offering the instance.
pub struct ServiceSkeletonBase {
    runtime: Arc<dyn SomeIpRuntime>,
    service: ServiceHandleType,
    major_version: u8,
    minor_version: u32,
    processing_mode: MethodCallProcessingMode,
    state: Mutex<OfferState>,
}

impl ServiceSkeletonBase {
    /// Creates a new [`ServiceSkeletonBase`] with interface version 1.0.
    pub fn new(runtime: Arc<dyn SomeIpRuntime>, service_id: u16, instance_id: u16) -> Self {
        Self {
            runtime,
            service: ServiceHandleType::new(service_id, instance_id),
            major_version: 1,
            minor_version: 0,
            processing_mode: MethodCallProcessingMode::default(),
            state: Mutex::new(OfferState::default()),
        }
    }

    /// Sets the interface version.
    #[must_use]
    pub fn with_version(mut self, major_version: u8, minor_version: u32) -> Self {
        self.major_version = major_version;
        self.minor_version = minor_version;
        self
    }

    /// Sets how incoming method calls are processed.
    #[must_use]
    pub fn with_processing_mode(mut self, processing_mode: MethodCallProcessingMode) -> Self {
        self.processing_mode = processing_mode;
        self
    }

    /// Returns the handle of the offered instance.
    pub fn handle(&self) -> ServiceHandleType {
        self.service
    }

    /// Returns the service id of the offered instance.
    pub fn service_id(&self) -> u16 {
        self.service.service_id()
    }

    /// Returns the instance id of the offered instance.
    pub fn instance_id(&self) -> u16 {
        self.service.instance_id()
    }

    /// Returns the interface version as `(major, minor)`.
    pub fn version(&self) -> (u8, u32) {
        (self.major_version, self.minor_version)
    }

    /// Returns how incoming method calls are processed.
    pub fn processing_mode(&self) -> MethodCallProcessingMode {
        self.processing_mode
    }

    /// Addresses an event of the instance, with the skeleton's major version.
    pub fn event_config(&self, event_id: u16, event_group_id: u16) -> EventBindingConfig {
        EventBindingConfig::new(
            self.service.service_id(),
            self.service.instance_id(),
            event_id,
            event_group_id,
        )
        .with_major_version(self.major_version)
    }

    /// Addresses a method of the instance, with the skeleton's major version.
    pub fn method_config(&self, method_id: u16) -> MethodBindingConfig {
        MethodBindingConfig::new(
            self.service.service_id(),
            self.service.instance_id(),
            method_id,
        )
        .with_major_version(self.major_version)
    }

    /// Offers the instance. Offering an offered instance does nothing.
    ///
    /// # Errors
    ///
    /// Never fails with the runtime interface as it is; the signature leaves room for runtimes
    /// that can refuse an offer.
    pub fn offer_service(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.offered {
                return Ok(());
            }
            state.offered = true;
        }
        self.runtime
            .offer_service(self.service, self.major_version, self.minor_version);
        tracing::debug!(
            service_id = self.service.service_id(),
            instance_id = self.service.instance_id(),
            "offered service"
        );
        Ok(())
    }

    /// Stops offering the instance, removing every subscription handler first.
    ///
    /// Calling this on an instance that is not offered does nothing.
    pub fn stop_offer_service(&self) {
        let event_groups = {
            let mut state = self.state.lock();
            if !state.offered {
                return;
            }
            state.offered = false;
            std::mem::take(&mut state.event_groups)
        };
        for event_group in event_groups {
            self.runtime
                .unregister_subscription_handler(self.service, event_group);
        }
        self.runtime
            .stop_offer_service(self.service, self.major_version, self.minor_version);
        tracing::debug!(
            service_id = self.service.service_id(),
            instance_id = self.service.instance_id(),
            "stopped offering service"
        );
    }

    /// Returns whether the instance is offered.
    pub fn is_offered(&self) -> bool {
        self.state.lock().offered
    }

    /// Sets the handler deciding on client subscriptions to an event group.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotOffered`] if the instance is not offered, or
    /// [`ComErrc::FieldValueIsNotValid`] if the event group already has a handler.
    pub fn set_event_subscription_state_handler(
        &self,
        event_group: u16,
        handler: SubscriptionHandler,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.offered {
                return Err(ComErrc::ServiceNotOffered);
            }
            if state.event_groups.contains(&event_group) {
                return Err(ComErrc::FieldValueIsNotValid);
            }
            state.event_groups.push(event_group);
        }
        self.runtime
            .register_subscription_handler(self.service, event_group, handler);
        Ok(())
    }

    /// Removes the subscription handler of an event group, if any.
    pub fn unset_event_subscription_state_handler(&self, event_group: u16) {
        let registered = {
            let mut state = self.state.lock();
            let before = state.event_groups.len();
            state.event_groups.retain(|group| *group != event_group);
            state.event_groups.len() != before
        };
        if registered {
            self.runtime
                .unregister_subscription_handler(self.service, event_group);
        }
    }
}

impl Drop for ServiceSkeletonBase {
    fn drop(&mut self) {
        self.stop_offer_service();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackSomeIp;

    const SERVICE: ServiceHandleType = ServiceHandleType::new(0x1234, 0x0001);

    fn setup() -> (Arc<LoopbackSomeIp>, ServiceSkeletonBase) {
        let runtime = Arc::new(LoopbackSomeIp::new());
        let skeleton = ServiceSkeletonBase::new(runtime.clone(), 0x1234, 0x0001)
            .with_version(2, 7)
            .with_processing_mode(MethodCallProcessingMode::Poll);
        (runtime, skeleton)
    }

    #[test]
    fn offer_is_idempotent() {
        let (runtime, skeleton) = setup();
        assert!(!skeleton.is_offered());
        skeleton.offer_service().expect("should offer");
        skeleton.offer_service().expect("should offer again");
        assert!(skeleton.is_offered());
        assert!(runtime.is_offered(SERVICE));

        skeleton.stop_offer_service();
        skeleton.stop_offer_service();
        assert!(!skeleton.is_offered());
        assert!(!runtime.is_offered(SERVICE));
    }

    #[test]
    fn accessors() {
        let (_, skeleton) = setup();
        assert_eq!(skeleton.handle(), SERVICE);
        assert_eq!(skeleton.service_id(), 0x1234);
        assert_eq!(skeleton.instance_id(), 0x0001);
        assert_eq!(skeleton.version(), (2, 7));
        assert_eq!(skeleton.processing_mode(), MethodCallProcessingMode::Poll);
        assert_eq!(skeleton.event_config(0x8001, 1).major_version, 2);
        let method = skeleton.method_config(0x0010);
        assert_eq!(method.service_id, 0x1234);
        assert_eq!(method.major_version, 2);
    }

    #[test]
    fn subscription_handlers_need_an_offer() {
        let (runtime, skeleton) = setup();
        let accept_all: SubscriptionHandler = Arc::new(|_, _| true);
        assert_eq!(
            skeleton.set_event_subscription_state_handler(1, accept_all.clone()),
            Err(ComErrc::ServiceNotOffered)
        );

        skeleton.offer_service().expect("should offer");
        skeleton
            .set_event_subscription_state_handler(1, accept_all.clone())
            .expect("should set the handler");
        assert_eq!(
            skeleton.set_event_subscription_state_handler(1, accept_all),
            Err(ComErrc::FieldValueIsNotValid)
        );
        skeleton
            .set_event_subscription_state_handler(2, Arc::new(|client, _| client == 7))
            .expect("should set the handler");

        assert_eq!(runtime.request_subscription(SERVICE, 1, 3, true), Some(true));
        assert_eq!(runtime.request_subscription(SERVICE, 2, 3, true), Some(false));
        assert_eq!(runtime.request_subscription(SERVICE, 2, 7, true), Some(true));

        skeleton.unset_event_subscription_state_handler(2);
        skeleton.unset_event_subscription_state_handler(2);
        assert_eq!(runtime.request_subscription(SERVICE, 2, 7, true), None);
    }

    #[test]
    fn stop_offer_removes_subscription_handlers() {
        let (runtime, skeleton) = setup();
        skeleton.offer_service().expect("should offer");
        skeleton
            .set_event_subscription_state_handler(1, Arc::new(|_, _| true))
            .expect("should set the handler");
        skeleton.stop_offer_service();
        assert_eq!(runtime.request_subscription(SERVICE, 1, 3, true), None);

        skeleton.offer_service().expect("should offer");
        skeleton
            .set_event_subscription_state_handler(1, Arc::new(|_, _| true))
            .expect("should set the handler again");
    }

    #[test]
    fn drop_stops_offering() {
        let (runtime, skeleton) = setup();
        skeleton.offer_service().expect("should offer");
        drop(skeleton);
        assert!(!runtime.is_offered(SERVICE));
    }
}
