//! Creation of bindings for the selected transport.

use super::{ProxyEventBinding, ProxyMethodBinding, SkeletonEventBinding, SkeletonMethodBinding};
use crate::{
    config::{ComConfig, TransportBinding},
    dds::{DdsProxyEventBinding, DdsRuntime, DdsSkeletonEventBinding},
    discovery::{AvailabilitySource, ServiceDiscovery},
    someip::{
        SomeIpProxyEventBinding, SomeIpProxyMethodBinding, SomeIpRuntime,
        SomeIpSkeletonEventBinding, SomeIpSkeletonMethodBinding,
    },
    zerocopy::{PortOptions, ShmRuntime, ZeroCopyProxyEventBinding, ZeroCopySkeletonEventBinding},
    ComErrc, EventBindingConfig, MethodBindingConfig, Result,
};
use std::sync::Arc;

/// Outcome of a binding request.
pub enum Availability<T> {
    /// The transport created the binding.
    Available(T),
    /// The transport cannot provide the capability, or its runtime is not installed.
    Unavailable(TransportBinding),
}

impl<T> Availability<T> {
    /// Returns whether a binding was created.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Converts into a [`Result`].
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotAvailable`] if the binding is unavailable.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Available(binding) => Ok(binding),
            Self::Unavailable(transport) => {
                tracing::debug!(%transport, "binding unavailable");
                Err(ComErrc::ServiceNotAvailable)
            }
        }
    }

    /// Converts into an [`Option`].
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Available(binding) => Some(binding),
            Self::Unavailable(_) => None,
        }
    }
}

/// Creates bindings on the transport selected by a [`ComConfig`].
///
/// Runtimes are installed with the `with_*` methods. Requests for a transport whose runtime is
/// missing yield [`Availability::Unavailable`].
#[derive(Clone, Default)]
pub struct BindingFactory {
    config: ComConfig,
    someip: Option<Arc<dyn SomeIpRuntime>>,
    availability: Option<Arc<dyn AvailabilitySource>>,
    dds: Option<Arc<dyn DdsRuntime>>,
    zero_copy: Option<Arc<dyn ShmRuntime>>,
}

impl BindingFactory {
    /// Creates a new [`BindingFactory`] without any runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ComConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs the SOME/IP runtime.
    #[must_use]
    pub fn with_someip<R: SomeIpRuntime + 'static>(mut self, runtime: Arc<R>) -> Self {
        self.availability = Some(runtime.clone() as Arc<dyn AvailabilitySource>);
        self.someip = Some(runtime as Arc<dyn SomeIpRuntime>);
        self
    }

    /// Installs the DDS runtime.
    #[must_use]
    pub fn with_dds(mut self, runtime: Arc<dyn DdsRuntime>) -> Self {
        self.dds = Some(runtime);
        self
    }

    /// Installs the shared-memory runtime.
    #[must_use]
    pub fn with_zero_copy(mut self, runtime: Arc<dyn ShmRuntime>) -> Self {
        self.zero_copy = Some(runtime);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ComConfig {
        &self.config
    }

    /// Returns the selected transport.
    pub fn transport(&self) -> TransportBinding {
        self.config.transport
    }

    /// Creates a [`ServiceDiscovery`] on top of the SOME/IP runtime, using the configured window.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotAvailable`] if no SOME/IP runtime is installed.
    pub fn service_discovery(&self) -> Result<ServiceDiscovery> {
        let source = self.availability.clone().ok_or(ComErrc::ServiceNotAvailable)?;
        Ok(ServiceDiscovery::new(source).with_window(self.config.discovery_window))
    }

    /// Creates a proxy event binding.
    pub fn create_proxy_event(
        &self,
        config: &EventBindingConfig,
    ) -> Availability<Box<dyn ProxyEventBinding>> {
        let transport = self.transport();
        let max_samples = self.config.max_samples;
        let binding: Option<Box<dyn ProxyEventBinding>> = match transport {
            TransportBinding::SomeIp => self.someip.clone().map(|runtime| {
                Box::new(
                    SomeIpProxyEventBinding::new(runtime, *config).with_max_samples(max_samples),
                ) as Box<dyn ProxyEventBinding>
            }),
            TransportBinding::Dds => self.dds.clone().map(|runtime| {
                Box::new(
                    DdsProxyEventBinding::new(runtime, config, self.config.dds_domain_id)
                        .with_max_samples(max_samples),
                ) as Box<dyn ProxyEventBinding>
            }),
            TransportBinding::ZeroCopy => self.zero_copy.clone().map(|runtime| {
                Box::new(
                    ZeroCopyProxyEventBinding::new(runtime, config, PortOptions::from(&self.config))
                        .with_max_samples(max_samples),
                ) as Box<dyn ProxyEventBinding>
            }),
        };
        Self::resolve(binding, transport)
    }

    /// Creates a skeleton event binding.
    pub fn create_skeleton_event(
        &self,
        config: &EventBindingConfig,
    ) -> Availability<Box<dyn SkeletonEventBinding>> {
        let transport = self.transport();
        let binding: Option<Box<dyn SkeletonEventBinding>> = match transport {
            TransportBinding::SomeIp => self.someip.clone().map(|runtime| {
                Box::new(SomeIpSkeletonEventBinding::new(runtime, *config))
                    as Box<dyn SkeletonEventBinding>
            }),
            TransportBinding::Dds => self.dds.clone().map(|runtime| {
                Box::new(DdsSkeletonEventBinding::new(
                    runtime,
                    config,
                    self.config.dds_domain_id,
                )) as Box<dyn SkeletonEventBinding>
            }),
            TransportBinding::ZeroCopy => self.zero_copy.clone().map(|runtime| {
                Box::new(ZeroCopySkeletonEventBinding::new(
                    runtime,
                    config,
                    PortOptions::from(&self.config),
                )) as Box<dyn SkeletonEventBinding>
            }),
        };
        Self::resolve(binding, transport)
    }

    /// Creates a proxy method binding. Only SOME/IP carries methods.
    pub fn create_proxy_method(
        &self,
        config: &MethodBindingConfig,
    ) -> Availability<Box<dyn ProxyMethodBinding>> {
        let transport = self.transport();
        let binding = match transport {
            TransportBinding::SomeIp => self.someip.clone().map(|runtime| {
                Box::new(SomeIpProxyMethodBinding::new(runtime, *config))
                    as Box<dyn ProxyMethodBinding>
            }),
            TransportBinding::Dds | TransportBinding::ZeroCopy => None,
        };
        Self::resolve(binding, transport)
    }

    /// Creates a skeleton method binding. Only SOME/IP carries methods.
    pub fn create_skeleton_method(
        &self,
        config: &MethodBindingConfig,
    ) -> Availability<Box<dyn SkeletonMethodBinding>> {
        let transport = self.transport();
        let binding = match transport {
            TransportBinding::SomeIp => self.someip.clone().map(|runtime| {
                Box::new(SomeIpSkeletonMethodBinding::new(runtime, *config))
                    as Box<dyn SkeletonMethodBinding>
            }),
            TransportBinding::Dds | TransportBinding::ZeroCopy => None,
        };
        Self::resolve(binding, transport)
    }

    fn resolve<T>(binding: Option<T>, transport: TransportBinding) -> Availability<T> {
        match binding {
            Some(binding) => Availability::Available(binding),
            None => Availability::Unavailable(transport),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LoopbackDds, LoopbackShm, LoopbackSomeIp};

    fn event() -> EventBindingConfig {
        EventBindingConfig::new(0x1234, 0x0001, 0x8001, 0x0001)
    }

    fn method() -> MethodBindingConfig {
        MethodBindingConfig::new(0x1234, 0x0001, 0x0010)
    }

    fn factory(transport: TransportBinding) -> BindingFactory {
        BindingFactory::new()
            .with_config(ComConfig::new().with_transport(transport))
            .with_someip(Arc::new(LoopbackSomeIp::new()))
            .with_dds(Arc::new(LoopbackDds::new()))
            .with_zero_copy(Arc::new(LoopbackShm::new()))
    }

    #[test]
    fn someip_supports_every_capability() {
        let factory = factory(TransportBinding::SomeIp);
        assert!(factory.create_proxy_event(&event()).is_available());
        assert!(factory.create_skeleton_event(&event()).is_available());
        assert!(factory.create_proxy_method(&method()).is_available());
        assert!(factory.create_skeleton_method(&method()).is_available());
    }

    #[test]
    fn event_only_transports() {
        for transport in [TransportBinding::Dds, TransportBinding::ZeroCopy] {
            let factory = factory(transport);
            assert!(factory.create_proxy_event(&event()).is_available());
            assert!(factory.create_skeleton_event(&event()).is_available());
            assert!(matches!(
                factory.create_proxy_method(&method()),
                Availability::Unavailable(unavailable) if unavailable == transport
            ));
            assert!(matches!(
                factory.create_skeleton_method(&method()).into_result(),
                Err(ComErrc::ServiceNotAvailable)
            ));
        }
    }

    #[test]
    fn missing_runtime_is_unavailable() {
        let factory = BindingFactory::new()
            .with_config(ComConfig::new().with_transport(TransportBinding::Dds));
        assert!(factory.create_proxy_event(&event()).ok().is_none());
        assert!(!factory.create_skeleton_event(&event()).is_available());
        assert!(matches!(
            factory.service_discovery(),
            Err(ComErrc::ServiceNotAvailable)
        ));
    }

    #[test]
    fn created_bindings_talk_to_each_other() {
        let factory = factory(TransportBinding::Dds);
        let proxy = factory
            .create_proxy_event(&event())
            .into_result()
            .expect("should create the proxy binding");
        let skeleton = factory
            .create_skeleton_event(&event())
            .into_result()
            .expect("should create the skeleton binding");
        proxy.subscribe(4).expect("should subscribe");
        skeleton.offer().expect("should offer");
        skeleton.send(&[4, 2]).expect("should send");
        let mut received = vec![];
        proxy
            .get_new_samples(&mut |sample| received.push(sample.to_vec()), 4)
            .expect("should get the samples");
        assert_eq!(received, vec![vec![4u8, 2]]);
    }

    #[test]
    fn configured_max_samples_bounds_unbounded_subscriptions() {
        for transport in [
            TransportBinding::SomeIp,
            TransportBinding::Dds,
            TransportBinding::ZeroCopy,
        ] {
            let factory = factory(transport)
                .with_config(ComConfig::new().with_transport(transport).with_max_samples(2));
            let proxy = factory
                .create_proxy_event(&event())
                .into_result()
                .expect("should create the proxy binding");
            let skeleton = factory
                .create_skeleton_event(&event())
                .into_result()
                .expect("should create the skeleton binding");
            skeleton.offer().expect("should offer");
            proxy.subscribe(0).expect("should subscribe");
            for value in 0..5u8 {
                skeleton.send(&[value]).expect("should send");
            }
            let mut received = vec![];
            proxy
                .get_new_samples(&mut |sample| received.push(sample.to_vec()), 10)
                .expect("should get the samples");
            assert_eq!(received, vec![vec![3u8], vec![4]], "{transport:?}");
        }
    }
}
