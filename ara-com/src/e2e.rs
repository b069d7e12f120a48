//! End-to-end (E2E) protection of event payloads.
//!
//! A [`Profile`] prepends a header carrying a CRC and a sequence counter to every outgoing payload,
//! and verifies that header on the receiving side. The decorators in this module apply a profile
//! to any event binding:
//!
//! - [`E2eSkeletonEventBinding`] protects every payload before handing it to the wrapped binding.
//! - [`E2eProxyEventBinding`] checks every received payload and only delivers the ones that pass,
//!   with the header stripped.
//!
//! Sender and receiver keep independent counters, so each side needs its own profile instance.

use bytes::BytesMut;

mod decorator;
mod profile01;
mod profile02;
mod profile04;
mod profile05;

pub use decorator::{E2eProxyEventBinding, E2eSkeletonEventBinding};
pub use profile01::{crc8_sae_j1850, Profile01, Profile01Config};
pub use profile02::{crc8_h2f, Profile02, Profile02Config};
pub use profile04::{crc32_p4, Profile04, Profile04Config};
pub use profile05::{crc16_ccitt, Profile05, Profile05Config};

/// Largest value of the sequence counter, after which it wraps to zero.
pub const COUNTER_MAX: u8 = 14;

/// Outcome of checking a protected payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    /// The payload is intact and in sequence.
    Ok,
    /// The payload carries the same counter as the previous one.
    Repeated,
    /// More payloads than allowed were lost since the previous one.
    WrongSequence,
    /// The CRC does not match the payload.
    WrongCrc,
    /// The payload is too short to carry a header and data.
    NoNewData,
}

impl CheckStatus {
    /// Returns whether the payload may be delivered.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Errors raised while protecting a payload.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectError {
    #[error("cannot protect an empty payload")]
    EmptyPayload,
}

/// An E2E protection profile.
pub trait Profile: Send {
    /// Length of the header prepended to every payload.
    fn header_len(&self) -> usize;

    /// Advances the sending counter and returns the protected payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtectError::EmptyPayload`] if `data` is empty.
    fn try_protect(&mut self, data: &[u8]) -> Result<BytesMut, ProtectError>;

    /// Protects a payload with the counter of the last checked payload, and continues sending
    /// from there.
    ///
    /// # Errors
    ///
    /// Returns [`ProtectError::EmptyPayload`] if `data` is empty.
    fn try_forward(&mut self, data: &[u8]) -> Result<BytesMut, ProtectError>;

    /// Checks a protected payload, updating the receiving counter.
    fn check(&mut self, data: &[u8]) -> CheckStatus;
}

/// Returns the counter following `counter`.
pub(crate) fn next_counter(counter: u8) -> u8 {
    if counter < COUNTER_MAX {
        counter + 1
    } else {
        0
    }
}

/// Classifies the gap between the last checked counter and a received one.
pub(crate) fn sequence_status(last: u8, received: u8, max_delta: u8) -> CheckStatus {
    let modulus = COUNTER_MAX + 1;
    let delta = (received % modulus + modulus - last % modulus) % modulus;
    if delta == 0 {
        CheckStatus::Repeated
    } else if delta > max_delta {
        CheckStatus::WrongSequence
    } else {
        CheckStatus::Ok
    }
}
