// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! EaaS Core Library
//!
//! Shared building blocks for keeping a kernel entropy pool filled from a
//! remote peer, and for serving local entropy to other hosts.
//!
//! # Architecture
//!
//! - `device`: kernel entropy device port (pool level, injection, raw reads)
//! - `record`: packed injection record for the add-entropy control call
//! - `fetcher`: HTTP client for a peer's `/entropy` endpoint
//! - `monitor`: periodic replenishment loop
//! - `protocol`: JSON envelope and request validation
//! - `config`: configuration management with validation
//! - `metrics`: counters for both roles
//! - `shutdown`: process signal handling
//! - `error`: unified error types

pub mod config;
pub mod device;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod monitor;
pub mod protocol;
pub mod record;
pub mod shutdown;

pub use error::{Error, Result};

/// Library version for protocol compatibility
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum single request size (2 MiB)
pub const MAX_REQUEST_BYTES: usize = 2 * 1024 * 1024;

/// Maximum bits requested in one replenishment round
pub const MAX_REQUEST_BITS: u32 = (MAX_REQUEST_BYTES * 8) as u32;

/// Fetch/inject rounds allowed per replenishment cycle
pub const MAX_FILL_ATTEMPTS: u32 = 10;

/// Default pool level to maintain, in bits
pub const DEFAULT_MINIMUM_ENTROPY_BITS: u32 = 1200;
