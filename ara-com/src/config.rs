//! Transport selection and runtime defaults.

use std::{fmt, str::FromStr, time::Duration};

/// Environment variable selecting the event transport.
pub const EVENT_BINDING_ENV: &str = "ARA_COM_EVENT_BINDING";

/// Environment variable consulted when the event transport is `auto`.
pub const PREFER_SOMEIP_ENV: &str = "ARA_COM_PREFER_SOMEIP";

/// Sample queue bound of subscriptions that do not request one.
pub const DEFAULT_MAX_SAMPLES: usize = 16;

/// Transport used by a binding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportBinding {
    /// SOME/IP RPC and eventing.
    #[default]
    SomeIp,
    /// DDS publish/subscribe.
    Dds,
    /// Shared-memory zero-copy channels.
    ZeroCopy,
}

impl TransportBinding {
    /// Resolves the event transport from the process environment.
    ///
    /// See [`TransportBinding::resolve`] for the rules.
    pub fn from_env() -> Self {
        let value = std::env::var(EVENT_BINDING_ENV).ok();
        let prefer_someip = std::env::var(PREFER_SOMEIP_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);
        Self::resolve(value.as_deref(), prefer_someip)
    }

    /// Resolves the event transport from a configured value.
    ///
    /// A recognised name selects its transport. `auto` selects SOME/IP when `prefer_someip` is
    /// set, and DDS otherwise. Anything else, including no value at all, selects DDS.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ara_com::TransportBinding;
    /// assert_eq!(TransportBinding::resolve(Some("vsomeip"), false), TransportBinding::SomeIp);
    /// assert_eq!(TransportBinding::resolve(Some("auto"), true), TransportBinding::SomeIp);
    /// assert_eq!(TransportBinding::resolve(None, true), TransportBinding::Dds);
    /// ```
    pub fn resolve(value: Option<&str>, prefer_someip: bool) -> Self {
        let Some(value) = value else {
            return Self::Dds;
        };
        if value.trim().eq_ignore_ascii_case("auto") {
            return if prefer_someip { Self::SomeIp } else { Self::Dds };
        }
        value.parse().unwrap_or(Self::Dds)
    }
}

impl FromStr for TransportBinding {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "someip" | "vsomeip" => Ok(Self::SomeIp),
            "dds" | "cyclonedds" | "cyclone-dds" => Ok(Self::Dds),
            "zerocopy" | "zero-copy" | "iceoryx" => Ok(Self::ZeroCopy),
            _ => Err(UnknownTransport(s.to_owned())),
        }
    }
}

impl fmt::Display for TransportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SomeIp => write!(f, "someip"),
            Self::Dds => write!(f, "dds"),
            Self::ZeroCopy => write!(f, "zerocopy"),
        }
    }
}

/// Represents an unrecognised transport name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown transport binding: {0}")]
pub struct UnknownTransport(String);

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Runtime defaults for bindings created by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComConfig {
    pub transport: TransportBinding,
    pub max_samples: usize,
    pub discovery_window: Duration,
    pub runtime_name: String,
    pub queue_capacity: u64,
    pub history_capacity: u64,
    pub history_request: u64,
    pub dds_domain_id: u32,
}

impl Default for ComConfig {
    fn default() -> Self {
        Self {
            transport: TransportBinding::default(),
            max_samples: DEFAULT_MAX_SAMPLES,
            discovery_window: Duration::from_millis(500),
            runtime_name: String::from("adaptive_autosar_ara_com"),
            queue_capacity: 256,
            history_capacity: 0,
            history_request: 0,
            dds_domain_id: 0,
        }
    }
}

impl ComConfig {
    /// Creates a new [`ComConfig`] with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportBinding) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the sample queue bound of subscriptions that request a bound of zero.
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// Sets how long the blocking service search waits for offers.
    #[must_use]
    pub fn with_discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window = window;
        self
    }

    /// Sets the name under which zero-copy endpoints register.
    #[must_use]
    pub fn with_runtime_name(mut self, name: impl Into<String>) -> Self {
        self.runtime_name = name.into();
        self
    }

    /// Sets the zero-copy subscriber queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: u64) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the zero-copy publisher history capacity and subscriber history request.
    #[must_use]
    pub fn with_history(mut self, capacity: u64, request: u64) -> Self {
        self.history_capacity = capacity;
        self.history_request = request;
        self
    }

    /// Sets the DDS domain.
    #[must_use]
    pub fn with_dds_domain_id(mut self, domain_id: u32) -> Self {
        self.dds_domain_id = domain_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("someip".parse(), Ok(TransportBinding::SomeIp));
        assert_eq!(" VSOMEIP ".parse(), Ok(TransportBinding::SomeIp));
        assert_eq!("cyclone-dds".parse(), Ok(TransportBinding::Dds));
        assert_eq!("CycloneDDS".parse(), Ok(TransportBinding::Dds));
        assert_eq!("iceoryx".parse(), Ok(TransportBinding::ZeroCopy));
        assert!("mqtt".parse::<TransportBinding>().is_err());
    }

    #[test]
    fn display_parses_back() {
        for transport in [
            TransportBinding::SomeIp,
            TransportBinding::Dds,
            TransportBinding::ZeroCopy,
        ] {
            assert_eq!(transport.to_string().parse(), Ok(transport));
        }
    }

    #[test]
    fn resolve_rules() {
        assert_eq!(TransportBinding::resolve(None, false), TransportBinding::Dds);
        assert_eq!(TransportBinding::resolve(Some(""), true), TransportBinding::Dds);
        assert_eq!(
            TransportBinding::resolve(Some("unknown"), true),
            TransportBinding::Dds
        );
        assert_eq!(
            TransportBinding::resolve(Some("auto"), false),
            TransportBinding::Dds
        );
        assert_eq!(
            TransportBinding::resolve(Some("Auto"), true),
            TransportBinding::SomeIp
        );
        assert_eq!(
            TransportBinding::resolve(Some("someip"), false),
            TransportBinding::SomeIp
        );
    }

    #[test]
    fn truthy_values() {
        for value in ["1", "true", "YES", " on "] {
            assert!(is_truthy(value));
        }
        for value in ["0", "false", "", "enabled"] {
            assert!(!is_truthy(value));
        }
    }

    #[test]
    fn builder() {
        let config = ComConfig::new()
            .with_transport(TransportBinding::ZeroCopy)
            .with_max_samples(4)
            .with_discovery_window(Duration::from_millis(10))
            .with_runtime_name("demo")
            .with_queue_capacity(8)
            .with_history(2, 1)
            .with_dds_domain_id(7);
        assert_eq!(config.transport, TransportBinding::ZeroCopy);
        assert_eq!(config.max_samples, 4);
        assert_eq!(config.discovery_window, Duration::from_millis(10));
        assert_eq!(config.runtime_name, "demo");
        assert_eq!(config.queue_capacity, 8);
        assert_eq!((config.history_capacity, config.history_request), (2, 1));
        assert_eq!(config.dds_domain_id, 7);
        assert_eq!(
            ComConfig::default().discovery_window,
            Duration::from_millis(500)
        );
    }
}
