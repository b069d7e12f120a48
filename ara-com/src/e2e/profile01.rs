//! Profile 01: CRC-8 SAE J1850 with a 4-bit counter.
//!
//! The header is two bytes, `[crc, control]`, where the control byte carries the high nibble of the
//! data id and the counter. The CRC covers both bytes of the data id, the control byte and the
//! payload.
//!
//! ```
//! use ara_com::e2e::crc8_sae_j1850;
//!
//! assert_eq!(crc8_sae_j1850(b"123456789"), 0x4B);
//! ```

use super::{next_counter, sequence_status, CheckStatus, Profile, ProtectError};
use bytes::{BufMut, BytesMut};

const POLY: u8 = 0x1D;
const INIT: u8 = 0xFF;
const HEADER_LEN: usize = 2;

const CRC_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;
        while j < 8 {
            if crc & 0x80 != 0 {
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
fn crc_update(crc: u8, data: &[u8]) -> u8 {
    data.iter()
        .fold(crc, |crc, &byte| CRC_TABLE[usize::from(crc ^ byte)])
}

/// Computes the CRC-8 SAE J1850 of `data`.
#[inline]
#[must_use]
pub fn crc8_sae_j1850(data: &[u8]) -> u8 {
    !crc_update(INIT, data)
}

/// Configuration of a [`Profile01`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile01Config {
    /// Identifies the protected data. Both ends must agree on it.
    pub data_id: u16,
    /// Largest counter gap accepted as in sequence.
    pub max_delta_counter: u8,
}

impl Profile01Config {
    /// Creates a new [`Profile01Config`] for the given data id.
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

impl Default for Profile01Config {
    fn default() -> Self {
        Self {
            data_id: 0,
            max_delta_counter: 2,
        }
    }
}

/// E2E profile 01.
#[derive(Debug, Clone, Default)]
pub struct Profile01 {
    config: Profile01Config,
    protecting_counter: u8,
    checking_counter: u8,
}

impl Profile01 {
    /// Creates a new [`Profile01`].
    pub fn new(config: Profile01Config) -> Self {
        Self {
            config,
            protecting_counter: 0,
            checking_counter: 0,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Profile01Config {
        &self.config
    }

    fn control(&self, counter: u8) -> u8 {
        // The high nibble of the data id rides in the control byte.
        let [high, _] = (self.config.data_id & 0xF000).to_be_bytes();
        high | (counter & 0x0F)
    }

    fn crc(&self, control: u8, payload: &[u8]) -> u8 {
        let [high, low] = self.config.data_id.to_be_bytes();
        !crc_update(crc_update(INIT, &[high, low, control]), payload)
    }

    fn protect_with(&self, counter: u8, data: &[u8]) -> BytesMut {
        let control = self.control(counter);
        let mut protected = BytesMut::with_capacity(HEADER_LEN + data.len());
        protected.put_u8(self.crc(control, data));
        protected.put_u8(control);
        protected.put_slice(data);
        protected
    }
}

impl Profile for Profile01 {
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
        let (crc, control) = (data[0], data[1]);
        if crc != self.crc(control, &data[HEADER_LEN..]) {
            return CheckStatus::WrongCrc;
        }
        let received = control & 0x0F;
        let status = sequence_status(
            self.checking_counter,
            received,
            self.config.max_delta_counter,
        );
        self.checking_counter = received;
        status
    }
}
