use super::{ResponseMessageHandler, SomeIpRuntime};
use crate::{
    binding::{ProxyMethodBinding, RequestHandler, ResponseHandler, SkeletonMethodBinding},
    ComErrc, MethodBindingConfig, Result, ServiceHandleType,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

/// Calls awaiting a response, keyed by session id.
#[derive(Default)]
struct PendingCalls {
    last_session: u16,
    calls: HashMap<u16, ResponseHandler>,
}

impl PendingCalls {
    /// Returns the next free session id, skipping zero, or [`None`] if every session id is in
    /// flight.
    fn next_session(&mut self) -> Option<u16> {
        for _ in 0..=u16::MAX {
            self.last_session = self.last_session.wrapping_add(1);
            if self.last_session != 0 && !self.calls.contains_key(&self.last_session) {
                return Some(self.last_session);
            }
        }
        None
    }
}

/// Issues the requests of one SOME/IP method.
///
/// Responses are matched to their calls by session id. Dropping the binding resolves every call
/// still in flight with [`ComErrc::CommunicationLinkError`].
pub struct SomeIpProxyMethodBinding {
    runtime: Arc<dyn SomeIpRuntime>,
    config: MethodBindingConfig,
    pending: Arc<Mutex<PendingCalls>>,
}

impl SomeIpProxyMethodBinding {
    /// Creates a new [`SomeIpProxyMethodBinding`] and registers its response handler.
    pub fn new(runtime: Arc<dyn SomeIpRuntime>, config: MethodBindingConfig) -> Self {
        let binding = Self {
            runtime,
            config,
            pending: Arc::default(),
        };
        binding.runtime.register_response_handler(
            binding.service(),
            config.method_id,
            binding.response_handler(),
        );
        binding
    }

    fn service(&self) -> ServiceHandleType {
        ServiceHandleType::new(self.config.service_id, self.config.instance_id)
    }

    fn response_handler(&self) -> ResponseMessageHandler {
        let pending: Weak<Mutex<PendingCalls>> = Arc::downgrade(&self.pending);
        Arc::new(move |session, response| {
            let Some(pending) = pending.upgrade() else {
                return;
            };
            let handler = pending.lock().calls.remove(&session);
            match handler {
                Some(handler) => handler(response),
                None => tracing::warn!(session, "discarding response to unknown session"),
            }
        })
    }
}

impl ProxyMethodBinding for SomeIpProxyMethodBinding {
    fn call(&self, request: Bytes, on_response: ResponseHandler) {
        let mut pending = self.pending.lock();
        let Some(session) = pending.next_session() else {
            drop(pending);
            tracing::warn!(
                service = self.config.service_id,
                method = self.config.method_id,
                "no free session id for the request"
            );
            on_response(Err(ComErrc::CommunicationStackError));
            return;
        };
        pending.calls.insert(session, on_response);
        drop(pending);
        tracing::trace!(
            service = self.config.service_id,
            method = self.config.method_id,
            major_version = self.config.major_version,
            session,
            "sending request"
        );
        if let Err(error) =
            self.runtime
                .send_request(self.service(), self.config.method_id, session, request)
        {
            let handler = self.pending.lock().calls.remove(&session);
            if let Some(handler) = handler {
                handler(Err(error));
            }
        }
    }
}

impl Drop for SomeIpProxyMethodBinding {
    fn drop(&mut self) {
        self.runtime
            .unregister_response_handler(self.service(), self.config.method_id);
        let calls: Vec<ResponseHandler> = self
            .pending
            .lock()
            .calls
            .drain()
            .map(|(_, handler)| handler)
            .collect();
        for handler in calls {
            handler(Err(ComErrc::CommunicationLinkError));
        }
    }
}

/// Serves the requests of one SOME/IP method.
pub struct SomeIpSkeletonMethodBinding {
    runtime: Arc<dyn SomeIpRuntime>,
    config: MethodBindingConfig,
    registered: Mutex<bool>,
}

impl SomeIpSkeletonMethodBinding {
    /// Creates a new [`SomeIpSkeletonMethodBinding`].
    pub fn new(runtime: Arc<dyn SomeIpRuntime>, config: MethodBindingConfig) -> Self {
        Self {
            runtime,
            config,
            registered: Mutex::new(false),
        }
    }

    fn service(&self) -> ServiceHandleType {
        ServiceHandleType::new(self.config.service_id, self.config.instance_id)
    }
}

impl SkeletonMethodBinding for SomeIpSkeletonMethodBinding {
    fn register(&self, handler: RequestHandler) -> Result<()> {
        self.runtime
            .register_request_handler(self.service(), self.config.method_id, handler)?;
        *self.registered.lock() = true;
        Ok(())
    }

    fn unregister(&self) {
        let was_registered = std::mem::replace(&mut *self.registered.lock(), false);
        if was_registered {
            self.runtime
                .unregister_request_handler(self.service(), self.config.method_id);
        }
    }

    fn is_registered(&self) -> bool {
        *self.registered.lock()
    }
}

impl Drop for SomeIpSkeletonMethodBinding {
    fn drop(&mut self) {
        self.unregister();
    }
}
