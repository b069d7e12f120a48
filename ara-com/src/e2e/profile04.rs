//! Profile 04: CRC-32 (polynomial `0xF4ACFB13`) with a counter byte.
//!
//! The header is six bytes: the CRC in little endian, the counter, and the low byte of the data
//! id.
//!
//! ```
//! use ara_com::e2e::crc32_p4;
//!
//! assert_eq!(crc32_p4(b"123456789"), 0x1697_D06A);
//! ```

use super::{next_counter, sequence_status, CheckStatus, Profile, ProtectError};
use bytes::{BufMut, BytesMut};

/// Reflected form of the polynomial `0xF4ACFB13`.
const REFLECTED_POLY: u32 = 0xC8DF_352F;
const INIT: u32 = 0xFFFF_FFFF;
const HEADER_LEN: usize = 6;

const CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ REFLECTED_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[inline]
fn crc_update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &byte| {
        (crc >> 8) ^ CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

/// Computes the CRC-32/P4 of `data`.
#[inline]
#[must_use]
pub fn crc32_p4(data: &[u8]) -> u32 {
    crc_update(INIT, data) ^ INIT
}

/// Configuration of a [`Profile04`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile04Config {
    /// Identifies the protected data. Both ends must agree on it.
    pub data_id: u16,
    /// Largest counter gap accepted as in sequence.
    pub max_delta_counter: u8,
}

impl Profile04Config {
    /// Creates a new [`Profile04Config`] for the given data id.
    pub fn new(data_id: u16) -> Self {
        Self {
            data_id,
            ..Default::default()
        }
    }

    /// Sets the largest accepted counter gap.
    #[must_use]
    pub fn with_max_delta_counter(mut self, max_delta_counter: u8) -> Self {
        self.max_delta_counter = max_delta_counter;
        self
    }
}

impl Default for Profile04Config {
    fn default() -> Self {
        Self {
            data_id: 0,
            max_delta_counter: 2,
        }
    }
}

/// E2E profile 04.
#[derive(Debug, Clone, Default)]
pub struct Profile04 {
    config: Profile04Config,
    protecting_counter: u8,
    checking_counter: u8,
}

impl Profile04 {
    /// Creates a new [`Profile04`].
    pub fn new(config: Profile04Config) -> Self {
        Self {
            config,
            protecting_counter: 0,
            checking_counter: 0,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Profile04Config {
        &self.config
    }

    fn crc(&self, counter: u8, payload: &[u8]) -> u32 {
        let [high, low] = self.config.data_id.to_be_bytes();
        let crc = crc_update(INIT, &[high, low, counter, low]);
        crc_update(crc, payload) ^ INIT
    }

    fn protect_with(&self, counter: u8, data: &[u8]) -> BytesMut {
        let counter = counter & 0x0F;
        let [_, low] = self.config.data_id.to_be_bytes();
        let mut protected = BytesMut::with_capacity(HEADER_LEN + data.len());
        protected.put_u32_le(self.crc(counter, data));
        protected.put_u8(counter);
        protected.put_u8(low);
        protected.put_slice(data);
        protected
    }
}

impl Profile for Profile04 {
    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn try_protect(&mut self, data: &[u8]) -> Result<BytesMut, ProtectError> {
        if data.is_empty() {
            return Err(ProtectError::EmptyPayload);
        }
        self.protecting_counter = next_counter(self.protecting_counter);
        Ok(self.protect_with(self.protecting_counter, data))
    }

    fn try_forward(&mut self, data: &[u8]) -> Result<BytesMut, ProtectError> {
        if data.is_empty() {
            return Err(ProtectError::EmptyPayload);
        }
        let protected = self.protect_with(self.checking_counter, data);
        self.protecting_counter = self.checking_counter;
        Ok(protected)
    }

    fn check(&mut self, data: &[u8]) -> CheckStatus {
        if data.len() <= HEADER_LEN {
            return CheckStatus::NoNewData;
        }
        let received_crc = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let counter = data[4];
        if received_crc != self.crc(counter, &data[HEADER_LEN..]) {
            return CheckStatus::WrongCrc;
        }
        let received = counter & 0x0F;
        let status = sequence_status(
            self.checking_counter,
            received,
            self.config.max_delta_counter,
        );
        self.checking_counter = received;
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(data_id: u16) -> (Profile04, Profile04) {
        let config = Profile04Config::new(data_id);
        (Profile04::new(config), Profile04::new(config))
    }

    #[test]
    fn header_layout() {
        let (mut sender, _) = pair(0x1234);
        let protected = sender.try_protect(&[0xAB]).expect("should protect");
        assert_eq!(protected.len(), HEADER_LEN + 1);
        assert_eq!(protected[4], 1);
        assert_eq!(protected[5], 0x34);
        let crc = u32::from_le_bytes([protected[0], protected[1], protected[2], protected[3]]);
        assert_eq!(crc, crc32_p4(&[0x12, 0x34, 1, 0x34, 0xAB]));
    }

    #[test]
    fn counter_wraps_without_drops() {
        let (mut sender, mut receiver) = pair(7);
        for value in 0..=u8::MAX {
            let protected = sender.try_protect(&[value]).expect("should protect");
            assert!(protected[4] <= crate::e2e::COUNTER_MAX);
            assert_eq!(receiver.check(&protected), CheckStatus::Ok);
        }
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let (mut sender, mut receiver) = pair(7);
        let mut protected = sender.try_protect(&[1, 2]).expect("should protect");
        protected[2] ^= 0x80;
        assert_eq!(receiver.check(&protected), CheckStatus::WrongCrc);
        assert_eq!(receiver.check(&[0; HEADER_LEN]), CheckStatus::NoNewData);

        // The rejected payload does not move the counter.
        let next = sender.try_protect(&[3]).expect("should protect");
        assert_eq!(receiver.check(&next), CheckStatus::Ok);
    }

    #[test]
    fn forwarding_keeps_the_checked_counter() {
        let (mut sender, mut gateway) = pair(7);
        for _ in 0..3 {
            let protected = sender.try_protect(&[1]).expect("should protect");
            gateway.check(&protected);
        }
        let forwarded = gateway.try_forward(&[2]).expect("should forward");
        assert_eq!(forwarded[4], 3);
        let next = gateway.try_protect(&[3]).expect("should protect");
        assert_eq!(next[4], 4);
    }
}
