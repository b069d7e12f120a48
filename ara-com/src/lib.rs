//! A Rust implementation of the communication management layer (`ara::com`) of the AUTOSAR
//! Adaptive Platform.
//!
//! ## Overview
//!
//! Applications exchange data through typed events, methods and fields. Each of them sits on top
//! of a transport binding:
//!
//! - [`someip`] drives an external SOME/IP stack, and carries every capability.
//! - [`dds`] maps events onto DDS topics.
//! - [`zerocopy`] publishes events through shared memory without copying them.
//!
//! Bindings are created by a [`BindingFactory`] for the transport selected in a [`ComConfig`],
//! and can be wrapped with the end-to-end protection decorators of [`e2e`]. Running services are
//! found through a [`ServiceDiscovery`] registry.

#![warn(
    clippy::nursery,
    clippy::pedantic,
    clippy::expect_used,
    clippy::unwrap_used
)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::future_not_send
)]

pub mod binding;
pub mod config;
pub mod dds;
pub mod discovery;
pub mod e2e;
pub mod sample;
pub mod serialization;
pub mod someip;
pub mod types;
pub mod zerocopy;
pub(crate) mod support;
pub(crate) mod testing;

mod error;
pub use error::{ComErrc, Result};

pub mod event;
pub mod field;
pub mod method;
pub use event::{ProxyEvent, SkeletonEvent};
pub use field::{FieldCapabilities, ProxyField, SkeletonField};
pub use method::{MethodFuture, ProxyMethod, SkeletonMethod};

pub mod proxy;
pub mod skeleton;
pub use proxy::ServiceProxyBase;
pub use skeleton::ServiceSkeletonBase;

pub use binding::factory::BindingFactory;
pub use config::{ComConfig, TransportBinding};
pub use discovery::ServiceDiscovery;
pub use sample::{SampleAllocateePtr, SamplePtr, SampleStorage};
pub use types::{
    EventBindingConfig, FindServiceHandle, MethodBindingConfig, MethodCallProcessingMode,
    ServiceHandleType, SubscriptionState,
};
