//! Profile 05: CRC-16 CCITT with a counter byte.
//!
//! The header is three bytes: the CRC in little endian followed by the counter. The CRC covers the
//! counter, the payload and the data id in little endian.
//!
//! ```
//! use ara_com::e2e::crc16_ccitt;
//!
//! assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
//! ```

use super::{next_counter, sequence_status, CheckStatus, Profile, ProtectError};
use bytes::{BufMut, BytesMut};

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;
const HEADER_LEN: usize = 3;

const CRC_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[inline]
fn crc_update(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, &byte| {
        (crc << 8) ^ CRC_TABLE[usize::from((crc >> 8) as u8 ^ byte)]
    })
}

/// Computes the CRC-16 CCITT (initial value `0xFFFF`, no final xor) of `data`.
#[inline]
#[must_use]
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    crc_update(INIT, data)
}

/// Configuration of a [`Profile05`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile05Config {
    /// Identifies the protected data. Both ends must agree on it.
    pub data_id: u16,
    /// Largest counter gap accepted as in sequence.
    pub max_delta_counter: u8,
}

impl Profile05Config {
    /// Creates a new [`Profile05Config`] for the given data id.
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

impl Default for Profile05Config {
    fn default() -> Self {
        Self {
            data_id: 0,
            max_delta_counter: 2,
        }
    }
}

/// E2E profile 05.
#[derive(Debug, Clone, Default)]
pub struct Profile05 {
    config: Profile05Config,
    protecting_counter: u8,
    checking_counter: u8,
}

impl Profile05 {
    /// Creates a new [`Profile05`].
    pub fn new(config: Profile05Config) -> Self {
        Self {
            config,
            protecting_counter: 0,
            checking_counter: 0,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Profile05Config {
        &self.config
    }

    fn crc(&self, counter: u8, payload: &[u8]) -> u16 {
        let crc = crc_update(crc_update(INIT, &[counter]), payload);
        crc_update(crc, &self.config.data_id.to_le_bytes())
    }

    fn protect_with(&self, counter: u8, data: &[u8]) -> BytesMut {
        let counter = counter & 0x0F;
        let mut protected = BytesMut::with_capacity(HEADER_LEN + data.len());
        protected.put_u16_le(self.crc(counter, data));
        protected.put_u8(counter);
        protected.put_slice(data);
        protected
    }
}

impl Profile for Profile05 {
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
        let crc = u16::from_le_bytes([data[0], data[1]]);
        let counter = data[2];
        if crc != self.crc(counter, &data[HEADER_LEN..]) {
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

    fn pair(data_id: u16) -> (Profile05, Profile05) {
        let config = Profile05Config::new(data_id);
        (Profile05::new(config), Profile05::new(config))
    }

    #[test]
    fn header_layout() {
        let (mut sender, _) = pair(0x1234);
        let protected = sender.try_protect(&[7, 8]).expect("should protect");
        assert_eq!(protected.len(), 5);
        assert_eq!(protected[2], 1);
        assert_eq!(&protected[3..], &[7, 8]);
        let crc = crc16_ccitt(&[1, 7, 8, 0x34, 0x12]);
        assert_eq!(
            &protected[..2],
            &crc.to_le_bytes(),
            "should cover the counter, the payload and the data id"
        );
    }

    #[test]
    fn in_sequence_payloads_pass() {
        let (mut sender, mut receiver) = pair(0x0042);
        for value in 0..40u8 {
            let protected = sender.try_protect(&[value]).expect("should protect");
            assert_eq!(receiver.check(&protected), CheckStatus::Ok);
        }
    }

    #[test]
    fn repeated_and_lost_payloads() {
        let (mut sender, mut receiver) = pair(0x0042);
        let first = sender.try_protect(&[1]).expect("should protect");
        assert_eq!(receiver.check(&first), CheckStatus::Ok);
        assert_eq!(receiver.check(&first), CheckStatus::Repeated);
        for _ in 0..3 {
            sender.try_protect(&[2]).expect("should protect");
        }
        let late = sender.try_protect(&[3]).expect("should protect");
        assert_eq!(receiver.check(&late), CheckStatus::WrongSequence);
    }

    #[test]
    fn corrupted_payloads_fail() {
        let (mut sender, mut receiver) = pair(0x0042);
        let protected = sender.try_protect(&[1, 2, 3]).expect("should protect");
        for index in 0..protected.len() {
            let mut corrupted = protected.clone();
            corrupted[index] ^= 0x80;
            assert_eq!(
                receiver.check(&corrupted),
                CheckStatus::WrongCrc,
                "flipping byte {index} should be detected"
            );
        }
        assert_eq!(receiver.check(&protected[..3]), CheckStatus::NoNewData);

        let (_, mut other) = pair(0x0043);
        assert_eq!(other.check(&protected), CheckStatus::WrongCrc);
        assert_eq!(receiver.check(&protected), CheckStatus::Ok);
    }

    #[test]
    fn empty_payload_cannot_be_protected() {
        let (mut sender, _) = pair(1);
        assert_eq!(sender.try_protect(&[]), Err(ProtectError::EmptyPayload));
        assert_eq!(sender.try_forward(&[]), Err(ProtectError::EmptyPayload));
    }

    #[test]
    fn forwarding_keeps_the_checked_counter() {
        let (mut sender, mut gateway) = pair(0x0042);
        for _ in 0..5 {
            let protected = sender.try_protect(&[1]).expect("should protect");
            assert_eq!(gateway.check(&protected), CheckStatus::Ok);
        }
        let forwarded = gateway.try_forward(&[9]).expect("should forward");
        assert_eq!(forwarded[2], 5);

        let mut receiver = Profile05::new(*gateway.config());
        receiver.checking_counter = 4;
        assert_eq!(receiver.check(&forwarded), CheckStatus::Ok);
        let next = gateway.try_protect(&[10]).expect("should protect");
        assert_eq!(receiver.check(&next), CheckStatus::Ok);
    }
}
