// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! Error types for the EaaS system
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.

use crate::protocol::RequestError;

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for EaaS operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kernel entropy device could not be opened, queried or written
    #[error("Device error: {0}")]
    Device(String),

    /// Peer reported an error or returned an undecodable payload
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Network communication with the peer failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed entropy request
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Local invariant violated
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local failure while serving a request
    #[error("Internal error: {0}")]
    Internal(String),

    /// Replenishment did not reach the minimum within the iteration cap
    #[error("max attempts to fill entropy reached ({attempts} attempts, pool at {level}/{minimum} bits)")]
    MaxAttempts {
        attempts: u32,
        level: u32,
        minimum: u32,
    },
}

impl Error {
    /// Build a device error that names the failing operation
    pub fn device(operation: &str, cause: impl std::fmt::Display) -> Self {
        Error::Device(format!("{}: {}", operation, cause))
    }

    /// Check if error came from talking to the peer
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Network(_))
    }

    /// Check if error came from the kernel entropy device
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Error::Device(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Fetch(format!("invalid response body: {}", e))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Fetch(format!("invalid base64 payload: {}", e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
