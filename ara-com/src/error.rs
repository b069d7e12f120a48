//! Error taxonomy of the communication layer.
//!
//! Every fallible operation in this crate returns one of the [`ComErrc`] codes. The numeric values
//! match the ones assigned by the AUTOSAR Adaptive Platform, so they can be carried across process
//! boundaries and mapped back with [`ComErrc::from_code`].

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ComErrc>;

/// Error codes of the communication error domain.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ComErrc {
    #[error("service is not available")]
    ServiceNotAvailable = 1,
    #[error("application holds more samples than configured max")]
    MaxSamplesExceeded = 2,
    #[error("network binding could not be created")]
    NetworkBindingFailure = 3,
    #[error("request to grant failed")]
    GrantFailed = 4,
    #[error("peer is not reachable")]
    PeerUnreachable = 5,
    #[error("field value is not valid")]
    FieldValueIsNotValid = 6,
    #[error("handler has not been registered")]
    SetHandlerNotSet = 7,
    #[error("not enough memory for sample allocation")]
    SampleAllocationFailure = 8,
    #[error("illegal use of allocate API")]
    IllegalUseOfAllocate = 9,
    #[error("service is not offered")]
    ServiceNotOffered = 10,
    #[error("communication link error")]
    CommunicationLinkError = 11,
    #[error("no clients connected")]
    NoClients = 12,
    #[error("communication stack error")]
    CommunicationStackError = 13,
    #[error("instance id could not be resolved")]
    InstanceIdUnresolved = 14,
}

impl ComErrc {
    /// Identifier of the communication error domain.
    pub const DOMAIN_ID: u64 = 0x8000_0000_0000_0201;

    /// Short name of the communication error domain.
    pub const DOMAIN_NAME: &'static str = "Com";

    /// Returns the numeric code of this error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ara_com::ComErrc;
    /// assert_eq!(ComErrc::ServiceNotOffered.code(), 10);
    /// ```
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Maps a numeric code back to its error.
    ///
    /// Returns [`None`] for codes outside of the domain.
    pub fn from_code(code: i32) -> Option<Self> {
        let errc = match code {
            1 => Self::ServiceNotAvailable,
            2 => Self::MaxSamplesExceeded,
            3 => Self::NetworkBindingFailure,
            4 => Self::GrantFailed,
            5 => Self::PeerUnreachable,
            6 => Self::FieldValueIsNotValid,
            7 => Self::SetHandlerNotSet,
            8 => Self::SampleAllocationFailure,
            9 => Self::IllegalUseOfAllocate,
            10 => Self::ServiceNotOffered,
            11 => Self::CommunicationLinkError,
            12 => Self::NoClients,
            13 => Self::CommunicationStackError,
            14 => Self::InstanceIdUnresolved,
            _ => return None,
        };
        Some(errc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ComErrc::ServiceNotAvailable.code(), 1);
        assert_eq!(ComErrc::FieldValueIsNotValid.code(), 6);
        assert_eq!(ComErrc::InstanceIdUnresolved.code(), 14);
    }

    #[test]
    fn codes_map_back() {
        for code in 1..=14 {
            let errc = ComErrc::from_code(code).expect("should map to an error");
            assert_eq!(errc.code(), code);
        }
        assert_eq!(ComErrc::from_code(0), None);
        assert_eq!(ComErrc::from_code(15), None);
    }

    #[test]
    fn display() {
        assert_eq!(
            ComErrc::ServiceNotOffered.to_string(),
            "service is not offered"
        );
        assert_eq!(
            ComErrc::SetHandlerNotSet.to_string(),
            "handler has not been registered"
        );
    }
}
