//! Identifiers and handler types shared by every layer.

use std::sync::Arc;

/// Wildcard instance id matching every instance of a service.
pub const ANY_INSTANCE: u16 = 0xFFFF;

/// Identifies one discovered service instance.
///
/// Handles are ordered by service id first and instance id second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceHandleType {
    service_id: u16,
    instance_id: u16,
}

impl ServiceHandleType {
    /// Creates a new [`ServiceHandleType`].
    pub const fn new(service_id: u16, instance_id: u16) -> Self {
        Self {
            service_id,
            instance_id,
        }
    }

    /// Returns the service id.
    pub fn service_id(&self) -> u16 {
        self.service_id
    }

    /// Returns the instance id.
    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }
}

/// Handles observed by a single search.
pub type ServiceHandleContainer = Vec<ServiceHandleType>;

/// Token identifying an active service search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FindServiceHandle(u64);

impl FindServiceHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric id of the search.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Subscription state of a proxy-side event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubscriptionState {
    #[default]
    NotSubscribed = 0,
    SubscriptionPending = 1,
    Subscribed = 2,
}

/// How a skeleton processes incoming method calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MethodCallProcessingMode {
    Poll = 0,
    #[default]
    Event = 1,
    EventSingleThread = 2,
}

/// Called whenever a new sample has been queued.
pub type EventReceiveHandler = Arc<dyn Fn() + Send + Sync>;

/// Called whenever the subscription state of an event changes.
pub type SubscriptionStateChangeHandler = Arc<dyn Fn(SubscriptionState) + Send + Sync>;

/// Called with the current handle set of a search whenever it changes.
pub type FindServiceHandler = Arc<dyn Fn(ServiceHandleContainer, FindServiceHandle) + Send + Sync>;

/// Identifiers of one event, fixed when a proxy or skeleton is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventBindingConfig {
    pub service_id: u16,
    pub instance_id: u16,
    pub event_id: u16,
    pub event_group_id: u16,
    pub major_version: u8,
}

impl EventBindingConfig {
    /// Creates a new [`EventBindingConfig`] with major version 1.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ara_com::EventBindingConfig;
    /// let config = EventBindingConfig::new(0x1234, 0x0001, 0x8001, 0x0001).with_major_version(2);
    /// assert_eq!(config.major_version, 2);
    /// ```
    pub fn new(service_id: u16, instance_id: u16, event_id: u16, event_group_id: u16) -> Self {
        Self {
            service_id,
            instance_id,
            event_id,
            event_group_id,
            major_version: 1,
        }
    }

    /// Sets the major interface version.
    #[must_use]
    pub fn with_major_version(mut self, major_version: u8) -> Self {
        self.major_version = major_version;
        self
    }
}

/// Identifiers of one method, fixed when a proxy or skeleton is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodBindingConfig {
    pub service_id: u16,
    pub instance_id: u16,
    pub method_id: u16,
    pub major_version: u8,
}

impl MethodBindingConfig {
    /// Creates a new [`MethodBindingConfig`] with major version 1.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ara_com::MethodBindingConfig;
    /// let config = MethodBindingConfig::new(0x1234, 0x0001, 0x0010);
    /// assert_eq!(config.major_version, 1);
    /// assert_eq!(config.with_major_version(3).major_version, 3);
    /// ```
    pub fn new(service_id: u16, instance_id: u16, method_id: u16) -> Self {
        Self {
            service_id,
            instance_id,
            method_id,
            major_version: 1,
        }
    }

    /// Sets the major interface version.
    #[must_use]
    pub fn with_major_version(mut self, major_version: u8) -> Self {
        self.major_version = major_version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_order_by_service_then_instance() {
        let mut handles = vec![
            ServiceHandleType::new(2, 1),
            ServiceHandleType::new(1, 9),
            ServiceHandleType::new(1, 3),
        ];
        handles.sort();
        assert_eq!(
            handles,
            vec![
                ServiceHandleType::new(1, 3),
                ServiceHandleType::new(1, 9),
                ServiceHandleType::new(2, 1),
            ]
        );
    }

    #[test]
    fn defaults() {
        assert_eq!(SubscriptionState::default(), SubscriptionState::NotSubscribed);
        assert_eq!(
            MethodCallProcessingMode::default(),
            MethodCallProcessingMode::Event
        );
        assert_eq!(EventBindingConfig::new(1, 2, 3, 4).major_version, 1);
    }
}
