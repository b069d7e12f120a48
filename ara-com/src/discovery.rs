//! Service discovery registry.
//!
//! A [`ServiceDiscovery`] tracks every active service search of a process. Searches for the same
//! `(service, instance)` key share one availability subscription on the underlying
//! [`AvailabilitySource`]: the first search opens it, the last one to stop releases it. Each search
//! keeps its own list of known handles, which is passed to its handler whenever it changes.
//!
//! The registry is an explicit context object. Create one per process root and hand clones of it
//! to every proxy that needs to search for services.

use crate::{
    types::{FindServiceHandler, ServiceHandleContainer},
    ComErrc, FindServiceHandle, Result, ServiceHandleType,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
    time::Duration,
};

/// Called with the service, the instance and the new availability of a service instance.
pub type AvailabilityHandler = Arc<dyn Fn(u16, u16, bool) + Send + Sync>;

/// Source of service availability information.
pub trait AvailabilitySource: Send + Sync {
    /// Expresses interest in a service instance.
    fn request_service(&self, service: ServiceHandleType);

    /// Withdraws a previous [`AvailabilitySource::request_service`].
    fn release_service(&self, service: ServiceHandleType);

    /// Registers the handler notified about availability changes of a service instance.
    ///
    /// The instance may be [`ANY_INSTANCE`](crate::types::ANY_INSTANCE), in which case the
    /// handler is notified about every instance of the service.
    fn register_availability_handler(&self, service: ServiceHandleType, handler: AvailabilityHandler);

    /// Removes the availability handler of a service instance.
    fn unregister_availability_handler(&self, service: ServiceHandleType);
}

struct Search {
    key: ServiceHandleType,
    handler: FindServiceHandler,
    handles: ServiceHandleContainer,
}

#[derive(Default)]
struct Registry {
    next_handle_id: u64,
    searches: HashMap<u64, Search>,
    /// Handle ids sharing each availability subscription, in registration order.
    registrations: HashMap<ServiceHandleType, Vec<u64>>,
    /// Keys with an open subscription on the source.
    open: HashSet<ServiceHandleType>,
}

/// Process-wide registry of service searches.
#[derive(Clone)]
pub struct ServiceDiscovery {
    source: Arc<dyn AvailabilitySource>,
    registry: Arc<Mutex<Registry>>,
    // Serializes subscription changes on the source. Reentrant because the source may call back
    // into a handler that stops its search while a subscription is being opened.
    source_lock: Arc<ReentrantMutex<()>>,
    window: Duration,
}

impl ServiceDiscovery {
    /// Default duration of the blocking [`ServiceDiscovery::find_service`] window.
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

    /// Creates a new [`ServiceDiscovery`] on top of the given source.
    pub fn new(source: Arc<dyn AvailabilitySource>) -> Self {
        Self {
            source,
            registry: Arc::new(Mutex::new(Registry {
                next_handle_id: 1,
                ..Registry::default()
            })),
            source_lock: Arc::default(),
            window: Self::DEFAULT_WINDOW,
        }
    }

    /// Sets how long [`ServiceDiscovery::find_service`] waits for offers.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Returns the discovery window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Searches for a service for the duration of the discovery window, blocking the caller.
    ///
    /// The result only reflects the offers observed during the window. Instances offered later,
    /// or withdrawn right after, are not accounted for.
    ///
    /// # Errors
    ///
    /// Returns an error if the search could not be started.
    pub fn find_service(
        &self,
        service_id: u16,
        instance_id: u16,
    ) -> Result<ServiceHandleContainer> {
        let (found, handle) = self.start_collecting(service_id, instance_id)?;
        std::thread::sleep(self.window);
        Ok(self.finish_collecting(&found, handle))
    }

    /// Asynchronous version of [`ServiceDiscovery::find_service`].
    ///
    /// # Errors
    ///
    /// Returns an error if the search could not be started.
    pub async fn find_service_async(
        &self,
        service_id: u16,
        instance_id: u16,
    ) -> Result<ServiceHandleContainer> {
        let (found, handle) = self.start_collecting(service_id, instance_id)?;
        tokio::time::sleep(self.window).await;
        Ok(self.finish_collecting(&found, handle))
    }

    fn start_collecting(
        &self,
        service_id: u16,
        instance_id: u16,
    ) -> Result<(Arc<Mutex<ServiceHandleContainer>>, FindServiceHandle)> {
        let found = Arc::new(Mutex::new(ServiceHandleContainer::new()));
        let sink = found.clone();
        let handle = self.start_find_service(
            Arc::new(move |handles, _| *sink.lock() = handles),
            service_id,
            instance_id,
        )?;
        Ok((found, handle))
    }

    fn finish_collecting(
        &self,
        found: &Mutex<ServiceHandleContainer>,
        handle: FindServiceHandle,
    ) -> ServiceHandleContainer {
        if let Err(error) = self.stop_find_service(handle) {
            tracing::debug!(handle = handle.id(), %error, "search already stopped");
        }
        found.lock().clone()
    }

    /// Starts a continuous search for a service.
    ///
    /// The handler is called with the complete list of known instances every time it changes.
    /// If another search for the same key is already running, the handler is called right away
    /// with the instances known so far.
    ///
    /// # Errors
    ///
    /// Never fails with the registry as it is; the signature matches the other search calls.
    pub fn start_find_service(
        &self,
        handler: FindServiceHandler,
        service_id: u16,
        instance_id: u16,
    ) -> Result<FindServiceHandle> {
        let key = ServiceHandleType::new(service_id, instance_id);
        let (handle, replay) = {
            let mut registry = self.registry.lock();
            let id = registry.next_handle_id;
            registry.next_handle_id += 1;
            let known = registry.registrations.get(&key).map(|ids| {
                ids.first()
                    .and_then(|first| registry.searches.get(first))
                    .map(|search| search.handles.clone())
                    .unwrap_or_default()
            });
            registry.registrations.entry(key).or_default().push(id);
            registry.searches.insert(
                id,
                Search {
                    key,
                    handler: handler.clone(),
                    handles: known.clone().unwrap_or_default(),
                },
            );
            (FindServiceHandle::new(id), known)
        };
        match replay {
            Some(known) => handler(known, handle),
            None => self.sync_source(key),
        }
        Ok(handle)
    }

    /// Opens or releases the subscription of a key on the source to match the registry.
    ///
    /// Loops until the two agree, as handlers called back by the source may start or stop
    /// searches for the same key.
    fn sync_source(&self, key: ServiceHandleType) {
        let _guard = self.source_lock.lock();
        loop {
            let (wanted, open) = {
                let mut registry = self.registry.lock();
                let wanted = registry.registrations.contains_key(&key);
                let open = registry.open.contains(&key);
                if wanted && !open {
                    registry.open.insert(key);
                } else if !wanted && open {
                    registry.open.remove(&key);
                }
                (wanted, open)
            };
            match (wanted, open) {
                (true, false) => {
                    tracing::debug!(
                        service_id = key.service_id(),
                        instance_id = key.instance_id(),
                        "opening availability subscription"
                    );
                    self.source.request_service(key);
                    self.source
                        .register_availability_handler(key, self.availability_handler(key));
                }
                (false, true) => {
                    tracing::debug!(
                        service_id = key.service_id(),
                        instance_id = key.instance_id(),
                        "releasing availability subscription"
                    );
                    self.source.unregister_availability_handler(key);
                    self.source.release_service(key);
                }
                _ => return,
            }
        }
    }

    fn availability_handler(&self, key: ServiceHandleType) -> AvailabilityHandler {
        let registry: Weak<Mutex<Registry>> = Arc::downgrade(&self.registry);
        Arc::new(move |service_id, instance_id, available| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let instance = ServiceHandleType::new(service_id, instance_id);
            let calls = {
                let mut registry = registry.lock();
                let Registry {
                    searches,
                    registrations,
                    ..
                } = &mut *registry;
                let Some(ids) = registrations.get(&key) else {
                    return;
                };
                let mut calls = Vec::with_capacity(ids.len());
                for id in ids {
                    let Some(search) = searches.get_mut(id) else {
                        continue;
                    };
                    if available {
                        if !search.handles.contains(&instance) {
                            search.handles.push(instance);
                        }
                    } else {
                        search.handles.retain(|handle| *handle != instance);
                    }
                    calls.push((
                        search.handler.clone(),
                        search.handles.clone(),
                        FindServiceHandle::new(*id),
                    ));
                }
                calls
            };
            for (handler, handles, handle) in calls {
                handler(handles, handle);
            }
        })
    }

    /// Stops a search.
    ///
    /// The availability subscription is released when the last search for its key stops.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::ServiceNotAvailable`] if the handle does not belong to an active search.
    pub fn stop_find_service(&self, handle: FindServiceHandle) -> Result<()> {
        let key = {
            let mut registry = self.registry.lock();
            let search = registry
                .searches
                .remove(&handle.id())
                .ok_or(ComErrc::ServiceNotAvailable)?;
            let key = search.key;
            let last = match registry.registrations.get_mut(&key) {
                Some(ids) => {
                    ids.retain(|id| *id != handle.id());
                    ids.is_empty()
                }
                None => false,
            };
            if last {
                registry.registrations.remove(&key);
            }
            key
        };
        self.sync_source(key);
        Ok(())
    }

    /// Stops every active search of the registry.
    ///
    /// This affects searches started by any caller, and is meant for process teardown only.
    pub fn stop_all(&self) {
        let ids: Vec<u64> = self.registry.lock().searches.keys().copied().collect();
        for id in ids {
            // Handles may disappear concurrently; nothing left to stop then.
            let _ = self.stop_find_service(FindServiceHandle::new(id));
        }
    }

    /// Returns the number of active searches.
    pub fn active_searches(&self) -> usize {
        self.registry.lock().searches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{someip::SomeIpRuntime, testing::LoopbackSomeIp, types::ANY_INSTANCE};

    type Observed = Arc<Mutex<Vec<ServiceHandleContainer>>>;

    fn observer(observed: &Observed) -> FindServiceHandler {
        let observed = observed.clone();
        Arc::new(move |handles, _| observed.lock().push(handles))
    }

    fn setup() -> (Arc<LoopbackSomeIp>, ServiceDiscovery) {
        let runtime = Arc::new(LoopbackSomeIp::new());
        let discovery =
            ServiceDiscovery::new(runtime.clone()).with_window(Duration::from_millis(10));
        (runtime, discovery)
    }

    #[test]
    fn searches_share_one_subscription() {
        let (runtime, discovery) = setup();
        let key = ServiceHandleType::new(0x1234, 1);
        let first = discovery
            .start_find_service(Arc::new(|_, _| {}), 0x1234, 1)
            .expect("should start the search");
        let second = discovery
            .start_find_service(Arc::new(|_, _| {}), 0x1234, 1)
            .expect("should start the search");
        assert_ne!(first, second);
        assert_eq!(runtime.availability_handlers(key), 1);
        assert_eq!(runtime.requested(key), 1);

        discovery.stop_find_service(first).expect("should stop");
        assert_eq!(runtime.availability_handlers(key), 1);
        discovery.stop_find_service(second).expect("should stop");
        assert_eq!(runtime.availability_handlers(key), 0);
        assert_eq!(runtime.requested(key), 0);
    }

    #[test]
    fn searches_observe_the_same_transitions() {
        let (runtime, discovery) = setup();
        let (a, b) = (Observed::default(), Observed::default());
        discovery
            .start_find_service(observer(&a), 0x1234, ANY_INSTANCE)
            .expect("should start the search");
        discovery
            .start_find_service(observer(&b), 0x1234, ANY_INSTANCE)
            .expect("should start the search");
        b.lock().clear();

        runtime.offer_service(ServiceHandleType::new(0x1234, 1), 1, 0);
        runtime.offer_service(ServiceHandleType::new(0x1234, 2), 1, 0);
        runtime.stop_offer_service(ServiceHandleType::new(0x1234, 1), 1, 0);

        let expected = vec![
            vec![ServiceHandleType::new(0x1234, 1)],
            vec![
                ServiceHandleType::new(0x1234, 1),
                ServiceHandleType::new(0x1234, 2),
            ],
            vec![ServiceHandleType::new(0x1234, 2)],
        ];
        assert_eq!(*a.lock(), expected);
        assert_eq!(*b.lock(), expected);
    }

    #[test]
    fn later_search_replays_known_handles() {
        let (runtime, discovery) = setup();
        discovery
            .start_find_service(Arc::new(|_, _| {}), 0x1234, 1)
            .expect("should start the search");
        runtime.offer_service(ServiceHandleType::new(0x1234, 1), 1, 0);

        let replayed = Observed::default();
        discovery
            .start_find_service(observer(&replayed), 0x1234, 1)
            .expect("should start the search");
        assert_eq!(
            *replayed.lock(),
            vec![vec![ServiceHandleType::new(0x1234, 1)]]
        );
    }

    #[test]
    fn duplicate_offers_are_deduplicated() {
        let (runtime, discovery) = setup();
        let observed = Observed::default();
        discovery
            .start_find_service(observer(&observed), 0x1234, 1)
            .expect("should start the search");
        let instance = ServiceHandleType::new(0x1234, 1);
        runtime.offer_service(instance, 1, 0);
        runtime.announce(instance, true);
        assert_eq!(observed.lock().last(), Some(&vec![instance]));
    }

    #[test]
    fn stop_unknown_handle_fails() {
        let (_, discovery) = setup();
        assert_eq!(
            discovery.stop_find_service(FindServiceHandle::new(42)),
            Err(ComErrc::ServiceNotAvailable)
        );
        let handle = discovery
            .start_find_service(Arc::new(|_, _| {}), 1, 1)
            .expect("should start the search");
        discovery.stop_find_service(handle).expect("should stop");
        assert_eq!(
            discovery.stop_find_service(handle),
            Err(ComErrc::ServiceNotAvailable)
        );
    }

    #[test]
    fn stop_all_clears_every_search() {
        let (runtime, discovery) = setup();
        for instance in 1..=3 {
            discovery
                .start_find_service(Arc::new(|_, _| {}), 0x1234, instance)
                .expect("should start the search");
        }
        assert_eq!(discovery.active_searches(), 3);
        discovery.stop_all();
        assert_eq!(discovery.active_searches(), 0);
        assert_eq!(
            runtime.availability_handlers(ServiceHandleType::new(0x1234, 2)),
            0
        );
    }

    #[test]
    fn handler_may_stop_its_own_search() {
        let (runtime, discovery) = setup();
        let registry = discovery.clone();
        discovery
            .start_find_service(
                Arc::new(move |_, handle| {
                    registry
                        .stop_find_service(handle)
                        .expect("should stop from the handler");
                }),
                0x1234,
                1,
            )
            .expect("should start the search");
        runtime.offer_service(ServiceHandleType::new(0x1234, 1), 1, 0);
        assert_eq!(discovery.active_searches(), 0);
    }

    #[test]
    fn concurrent_start_and_stop_keep_the_subscription() {
        let (runtime, discovery) = setup();
        let key = ServiceHandleType::new(0x1234, 1);
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let discovery = discovery.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let handle = discovery
                            .start_find_service(Arc::new(|_, _| {}), 0x1234, 1)
                            .expect("should start the search");
                        discovery.stop_find_service(handle).expect("should stop");
                    }
                })
            })
            .collect();
        let observed = Observed::default();
        let handle = discovery
            .start_find_service(observer(&observed), 0x1234, 1)
            .expect("should start the search");
        for thread in threads {
            thread.join().expect("should complete successfully");
        }

        assert_eq!(runtime.availability_handlers(key), 1);
        assert_eq!(runtime.requested(key), 1);
        runtime.announce(key, true);
        assert_eq!(observed.lock().last(), Some(&vec![key]));

        discovery.stop_find_service(handle).expect("should stop");
        assert_eq!(runtime.availability_handlers(key), 0);
        assert_eq!(runtime.requested(key), 0);
    }

    #[test]
    fn handler_may_stop_its_search_while_it_opens() {
        let (runtime, discovery) = setup();
        let key = ServiceHandleType::new(0x1234, 1);
        runtime.offer_service(key, 1, 0);
        let registry = discovery.clone();
        discovery
            .start_find_service(
                Arc::new(move |_, handle| {
                    registry
                        .stop_find_service(handle)
                        .expect("should stop from the handler");
                }),
                0x1234,
                1,
            )
            .expect("should start the search");
        assert_eq!(discovery.active_searches(), 0);
        assert_eq!(runtime.availability_handlers(key), 0);
        assert_eq!(runtime.requested(key), 0);
    }

    #[test]
    fn find_service_returns_offered_instances() {
        let (runtime, discovery) = setup();
        runtime.offer_service(ServiceHandleType::new(0x1234, 7), 1, 0);
        let handles = discovery
            .find_service(0x1234, ANY_INSTANCE)
            .expect("should find the service");
        assert_eq!(handles, vec![ServiceHandleType::new(0x1234, 7)]);
        assert_eq!(discovery.active_searches(), 0);
    }

    #[tokio::test]
    async fn find_service_async_returns_offered_instances() {
        let (runtime, discovery) = setup();
        runtime.offer_service(ServiceHandleType::new(0x1234, 7), 1, 0);
        let handles = discovery
            .find_service_async(0x1234, 7)
            .await
            .expect("should find the service");
        assert_eq!(handles, vec![ServiceHandleType::new(0x1234, 7)]);
        let handles = discovery
            .find_service_async(0x1234, 8)
            .await
            .expect("should search for the service");
        assert!(handles.is_empty());
    }
}
