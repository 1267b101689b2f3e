// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! Injection record submitted to the kernel with `RNDADDENTROPY`
//!
//! Mirrors `struct rand_pool_info { int entropy_count; int buf_size; __u32 buf[]; }`:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────────┐
//! │ bit count    │ byte length  │ payload (zero padded to 4)   │
//! │ i32 native   │ i32 native   │ byte_length bytes            │
//! └──────────────┴──────────────┴──────────────────────────────┘
//! ```

use crate::{Error, Result};

/// Size of the two `i32` header fields
pub const HEADER_LEN: usize = 8;

/// Smallest multiple of 4 that is `>= len`
pub fn padded_len(len: usize) -> usize {
    len.next_multiple_of(4)
}

/// Entropy plus the number of bits it is credited with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRecord {
    bit_count: i32,
    payload: Vec<u8>,
}

impl InjectionRecord {
    /// Pack `data` for injection, crediting it with `bit_count` bits.
    ///
    /// Fails when `data` is empty, when either header field would not fit in
    /// an `i32`, or when `bit_count` exceeds eight bits per padded byte.
    pub fn new(bit_count: u32, data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Validation("cannot inject an empty payload".to_string()));
        }

        let mut payload = data.to_vec();
        payload.resize(padded_len(data.len()), 0);

        let max_bits = (payload.len() as u64) * 8;
        if u64::from(bit_count) > max_bits {
            return Err(Error::Validation(format!(
                "bit count {} exceeds capacity of {} byte payload ({} bits)",
                bit_count,
                payload.len(),
                max_bits
            )));
        }

        let bit_count = i32::try_from(bit_count)
            .map_err(|_| Error::Validation(format!("bit count {} does not fit in i32", bit_count)))?;
        i32::try_from(payload.len()).map_err(|_| {
            Error::Validation(format!("payload of {} bytes is too large", payload.len()))
        })?;

        Ok(Self { bit_count, payload })
    }

    /// Bits credited to the pool
    pub fn bit_count(&self) -> u32 {
        self.bit_count as u32
    }

    /// Padded payload length in bytes
    pub fn byte_length(&self) -> usize {
        self.payload.len()
    }

    /// Padded payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize to the exact layout expected by the control interface
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.bit_count.to_ne_bytes());
        // Length was checked against i32::MAX in `new`.
        bytes.extend_from_slice(&(self.payload.len() as i32).to_ne_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}
