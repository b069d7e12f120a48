//! Common part of every service proxy.

use crate::{
    discovery::ServiceDiscovery,
    types::{FindServiceHandler, ServiceHandleContainer},
    EventBindingConfig, FindServiceHandle, MethodBindingConfig, Result, ServiceHandleType,
};

/// Ties a proxy to the service instance it talks to and to the discovery registry.
///
/// Generated proxies embed one and use [`ServiceProxyBase::event_config`] and
/// [`ServiceProxyBase::method_config`] to address their members.
#[derive(Clone)]
pub struct ServiceProxyBase {
    handle: ServiceHandleType,
    discovery: ServiceDiscovery,
}

impl ServiceProxyBase {
    /// Creates a new [`ServiceProxyBase`] for the instance behind `handle`.
    pub fn new(handle: ServiceHandleType, discovery: ServiceDiscovery) -> Self {
        Self { handle, discovery }
    }

    /// Returns the handle of the instance.
    pub fn handle(&self) -> ServiceHandleType {
        self.handle
    }

    /// Returns the discovery registry.
    pub fn discovery(&self) -> &ServiceDiscovery {
        &self.discovery
    }

    /// Addresses an event of the instance.
    pub fn event_config(&self, event_id: u16, event_group_id: u16) -> EventBindingConfig {
        EventBindingConfig::new(
            self.handle.service_id(),
            self.handle.instance_id(),
            event_id,
            event_group_id,
        )
    }

    /// Addresses a method of the instance.
    pub fn method_config(&self, method_id: u16) -> MethodBindingConfig {
        MethodBindingConfig::new(
            self.handle.service_id(),
            self.handle.instance_id(),
            method_id,
        )
    }

    /// See [`ServiceDiscovery::find_service`].
    ///
    /// # Errors
    ///
    /// Returns an error if the search could not be started.
    pub fn find_service(
        &self,
        service_id: u16,
        instance_id: u16,
    ) -> Result<ServiceHandleContainer> {
        self.discovery.find_service(service_id, instance_id)
    }

    /// See [`ServiceDiscovery::find_service_async`].
    ///
    /// # Errors
    ///
    /// Returns an error if the search could not be started.
    pub async fn find_service_async(
        &self,
        service_id: u16,
        instance_id: u16,
    ) -> Result<ServiceHandleContainer> {
        self.discovery
            .find_service_async(service_id, instance_id)
            .await
    }

    /// See [`ServiceDiscovery::start_find_service`].
    ///
    /// # Errors
    ///
    /// Returns an error if the search could not be started.
    pub fn start_find_service(
        &self,
        handler: FindServiceHandler,
        service_id: u16,
        instance_id: u16,
    ) -> Result<FindServiceHandle> {
        self.discovery
            .start_find_service(handler, service_id, instance_id)
    }

    /// See [`ServiceDiscovery::stop_find_service`].
    ///
    /// # Errors
    ///
    /// Returns an error if the handle does not belong to an active search.
    pub fn stop_find_service(&self, handle: FindServiceHandle) -> Result<()> {
        self.discovery.stop_find_service(handle)
    }

    /// See [`ServiceDiscovery::stop_all`].
    pub fn stop_all_find_services(&self) {
        self.discovery.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{someip::SomeIpRuntime, testing::LoopbackSomeIp, types::ANY_INSTANCE, ComErrc};
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};

    fn setup() -> (Arc<LoopbackSomeIp>, ServiceProxyBase) {
        let runtime = Arc::new(LoopbackSomeIp::new());
        let discovery =
            ServiceDiscovery::new(runtime.clone()).with_window(Duration::from_millis(10));
        let proxy = ServiceProxyBase::new(ServiceHandleType::new(0x1234, 0x0001), discovery);
        (runtime, proxy)
    }

    #[test]
    fn member_addressing() {
        let (_, proxy) = setup();
        let event = proxy.event_config(0x8001, 0x0002);
        assert_eq!(
            (event.service_id, event.instance_id, event.event_id, event.event_group_id),
            (0x1234, 0x0001, 0x8001, 0x0002)
        );
        let method = proxy.method_config(0x0010);
        assert_eq!(method.method_id, 0x0010);
        assert_eq!(method.instance_id, 0x0001);
    }

    #[test]
    fn searches_go_through_the_registry() {
        let (runtime, proxy) = setup();
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let handle = proxy
            .start_find_service(
                Arc::new(move |handles, _| *sink.lock() = handles),
                0x1234,
                ANY_INSTANCE,
            )
            .expect("should start the search");
        assert_eq!(proxy.discovery().active_searches(), 1);

        runtime.offer_service(ServiceHandleType::new(0x1234, 3), 1, 0);
        assert_eq!(*seen.lock(), vec![ServiceHandleType::new(0x1234, 3)]);

        proxy.stop_find_service(handle).expect("should stop the search");
        assert_eq!(
            proxy.stop_find_service(handle),
            Err(ComErrc::ServiceNotAvailable)
        );
    }

    #[test]
    fn blocking_search_sees_offered_instances() {
        let (runtime, proxy) = setup();
        runtime.offer_service(proxy.handle(), 1, 0);
        let found = proxy
            .find_service(0x1234, 0x0001)
            .expect("should search");
        assert_eq!(found, vec![proxy.handle()]);
        assert_eq!(proxy.discovery().active_searches(), 0);
    }

    #[tokio::test]
    async fn async_search_and_teardown() {
        let (_, proxy) = setup();
        let found = proxy
            .find_service_async(0x4321, ANY_INSTANCE)
            .await
            .expect("should search");
        assert!(found.is_empty());

        proxy
            .start_find_service(Arc::new(|_, _| {}), 0x4321, 1)
            .expect("should start the search");
        proxy
            .start_find_service(Arc::new(|_, _| {}), 0x4321, 2)
            .expect("should start the search");
        proxy.stop_all_find_services();
        assert_eq!(proxy.discovery().active_searches(), 0);
    }
}
