// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! Wire format shared by the entropy server and its clients
//!
//! Both directions use the same JSON envelope:
//!
//! ```text
//! 200     { "error": false, "data-base64": "<base64 bytes>" }
//! 400/500 { "error": true,  "error-message": "<string>" }
//! ```

use crate::{Error, Result, MAX_REQUEST_BYTES};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Message returned to clients when the local source cannot be read
pub const INTERNAL_ERROR_MESSAGE: &str =
    "internal server error, unable to get random data from source";

/// JSON envelope carried by every `/entropy` response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntropyEnvelope {
    /// True when the request could not be served
    pub error: bool,

    /// Human-readable failure reason
    #[serde(
        rename = "error-message",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,

    /// Standard base64 encoding of the random bytes
    #[serde(
        rename = "data-base64",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_base64: Option<String>,
}

impl EntropyEnvelope {
    /// Successful response carrying `data`
    pub fn success(data: &[u8]) -> Self {
        Self {
            error: false,
            error_message: None,
            data_base64: Some(base64::engine::general_purpose::STANDARD.encode(data)),
        }
    }

    /// Failed response carrying `message`
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            error_message: Some(message.into()),
            data_base64: None,
        }
    }

    /// Decode the payload, turning peer-reported errors into `Error::Fetch`
    pub fn into_payload(self) -> Result<Vec<u8>> {
        if self.error {
            let message = self
                .error_message
                .unwrap_or_else(|| "peer reported an error without a message".to_string());
            return Err(Error::Fetch(message));
        }

        let encoded = self
            .data_base64
            .ok_or_else(|| Error::Fetch("response is missing data-base64".to_string()))?;

        Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
    }
}

/// Reasons an `/entropy` request is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("invalid request, incorrect method requested {0}")]
    InvalidMethod(String),

    #[error("invalid request, no bytes in request")]
    MissingBytes,

    #[error("invalid request, bytes must be integer")]
    NotInteger,

    #[error("invalid request, bytes must be larger than 0")]
    NotPositive,

    #[error("invalid request, bytes must be less than 2 MiB")]
    TooLarge,
}

/// A validated request for `bytes` random bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropyRequest {
    bytes: usize,
}

impl EntropyRequest {
    /// Validate the request method and the raw `bytes` query value.
    ///
    /// An empty `bytes` value is treated the same as a missing one.
    pub fn validate(method: &str, raw_bytes: Option<&str>) -> std::result::Result<Self, RequestError> {
        if !method.eq_ignore_ascii_case("GET") {
            return Err(RequestError::InvalidMethod(method.to_string()));
        }

        let raw = match raw_bytes {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(RequestError::MissingBytes),
        };

        let requested: i64 = raw.parse().map_err(|_| RequestError::NotInteger)?;

        if requested <= 0 {
            return Err(RequestError::NotPositive);
        }
        if requested > MAX_REQUEST_BYTES as i64 {
            return Err(RequestError::TooLarge);
        }

        Ok(Self {
            bytes: requested as usize,
        })
    }

    /// Number of bytes requested
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Response body of `/health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: String,
    pub method: String,
}

impl HealthReport {
    pub fn healthy(method: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            method: method.into(),
        }
    }
}
