//! SOME/IP transport binding.
//!
//! The bindings in this module translate the capability traits of [`crate::binding`] into calls
//! on a [`SomeIpRuntime`], the application object of an external SOME/IP stack. The runtime owns
//! the wire encoding, service discovery and sockets; this module only drives it.

use crate::{binding::RequestHandler, discovery::AvailabilitySource, Result, ServiceHandleType};
use bytes::Bytes;
use std::sync::Arc;

mod event;
pub use event::{SomeIpProxyEventBinding, SomeIpSkeletonEventBinding};

mod method;
pub use method::{SomeIpProxyMethodBinding, SomeIpSkeletonMethodBinding};

/// Called with the payload of every notification of a subscribed event.
pub type MessageHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Called with the session id and outcome of every response to a request.
pub type ResponseMessageHandler = Arc<dyn Fn(u16, Result<Bytes>) + Send + Sync>;

/// Called with the client id and the new state whenever a client subscribes or unsubscribes to
/// an event group. Returns whether the subscription is accepted.
pub type SubscriptionHandler = Arc<dyn Fn(u16, bool) -> bool + Send + Sync>;

/// Application interface of an external SOME/IP stack.
///
/// Services are addressed by a [`ServiceHandleType`]. Events and methods are addressed by their
/// id within the service.
pub trait SomeIpRuntime: AvailabilitySource {
    /// Announces the event and the event groups it belongs to.
    fn request_event(&self, service: ServiceHandleType, event_id: u16, event_groups: &[u16]);

    /// Withdraws a previous [`SomeIpRuntime::request_event`].
    fn release_event(&self, service: ServiceHandleType, event_id: u16);

    /// Subscribes to an event group.
    fn subscribe(&self, service: ServiceHandleType, event_group: u16, major_version: u8);

    /// Unsubscribes from an event group.
    fn unsubscribe(&self, service: ServiceHandleType, event_group: u16);

    /// Registers the handler receiving notifications of an event.
    fn register_message_handler(
        &self,
        service: ServiceHandleType,
        event_id: u16,
        handler: MessageHandler,
    );

    /// Removes the notification handler of an event.
    fn unregister_message_handler(&self, service: ServiceHandleType, event_id: u16);

    /// Offers a service instance.
    fn offer_service(&self, service: ServiceHandleType, major_version: u8, minor_version: u32);

    /// Stops offering a service instance.
    fn stop_offer_service(&self, service: ServiceHandleType, major_version: u8, minor_version: u32);

    /// Offers an event within the given event groups.
    fn offer_event(&self, service: ServiceHandleType, event_id: u16, event_groups: &[u16]);

    /// Stops offering an event.
    fn stop_offer_event(&self, service: ServiceHandleType, event_id: u16);

    /// Sends a notification to every subscriber of an event.
    fn notify(&self, service: ServiceHandleType, event_id: u16, payload: Bytes);

    /// Registers the handler deciding on subscriptions to an event group.
    fn register_subscription_handler(
        &self,
        service: ServiceHandleType,
        event_group: u16,
        handler: SubscriptionHandler,
    );

    /// Removes the subscription handler of an event group.
    fn unregister_subscription_handler(&self, service: ServiceHandleType, event_group: u16);

    /// Registers the handler receiving responses to requests of a method.
    fn register_response_handler(
        &self,
        service: ServiceHandleType,
        method_id: u16,
        handler: ResponseMessageHandler,
    );

    /// Removes the response handler of a method.
    fn unregister_response_handler(&self, service: ServiceHandleType, method_id: u16);

    /// Sends a request tagged with `session`.
    ///
    /// The response is delivered to the response handler of the method with the same session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent.
    fn send_request(
        &self,
        service: ServiceHandleType,
        method_id: u16,
        session: u16,
        payload: Bytes,
    ) -> Result<()>;

    /// Registers the handler serving requests of a method.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot serve the method.
    fn register_request_handler(
        &self,
        service: ServiceHandleType,
        method_id: u16,
        handler: RequestHandler,
    ) -> Result<()>;

    /// Removes the request handler of a method.
    fn unregister_request_handler(&self, service: ServiceHandleType, method_id: u16);
}
