//! Profile 02: CRC-8H2F with a data id that changes with the counter.
//!
//! The header is two bytes, `[crc, counter]`. Instead of a single data id, both ends share a list
//! of sixteen data id bytes and the CRC of each payload covers the entry selected by its counter.
//!
//! ```
//! use ara_com::e2e::crc8_h2f;
//!
//! assert_eq!(crc8_h2f(b"123456789"), 0xDF);
//! ```

use super::{next_counter, sequence_status, CheckStatus, Profile, ProtectError};
use bytes::{BufMut, BytesMut};

const POLY: u8 = 0x2F;
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

/// Computes the CRC-8H2F of `data`.
#[inline]
#[must_use]
pub fn crc8_h2f(data: &[u8]) -> u8 {
    !crc_update(INIT, data)
}

/// Configuration of a [`Profile02`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile02Config {
    /// Data id byte used for each counter value. Both ends must agree on it.
    pub data_id_list: [u8; 16],
    /// Largest counter gap accepted as in sequence.
    pub max_delta_counter: u8,
}

impl Profile02Config {
    /// Creates a new [`Profile02Config`] for the given data id list.
    pub fn new(data_id_list: [u8; 16]) -> Self {
        Self {
            data_id_list,
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

impl Default for Profile02Config {
    fn default() -> Self {
        Self {
            data_id_list: [0; 16],
            max_delta_counter: 2,
        }
    }
}

/// E2E profile 02.
#[derive(Debug, Clone, Default)]
pub struct Profile02 {
    config: Profile02Config,
    protecting_counter: u8,
    checking_counter: u8,
}

impl Profile02 {
    /// Creates a new [`Profile02`].
    pub fn new(config: Profile02Config) -> Self {
        Self {
            config,
            protecting_counter: 0,
            checking_counter: 0,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Profile02Config {
        &self.config
    }

    fn crc(&self, control: u8, payload: &[u8]) -> u8 {
        let data_id = self.config.data_id_list[usize::from(control & 0x0F)];
        let crc = crc_update(crc_update(INIT, &[control]), payload);
        !crc_update(crc, &[data_id])
    }

    fn protect_with(&self, counter: u8, data: &[u8]) -> BytesMut {
        let control = counter & 0x0F;
        let mut protected = BytesMut::with_capacity(HEADER_LEN + data.len());
        protected.put_u8(self.crc(control, data));
        protected.put_u8(control);
        protected.put_slice(data);
        protected
    }
}

impl Profile for Profile02 {
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
