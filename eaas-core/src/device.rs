// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! Kernel entropy device access
//!
//! This is the only module that touches the entropy device. Every operation
//! opens its own handle and drops it before returning, so there is no
//! long-lived descriptor and no locking between tasks.

use crate::record::InjectionRecord;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default kernel entropy device
pub const DEFAULT_DEVICE_PATH: &str = "/dev/random";

/// `_IOR('R', 0x00, int)`
#[cfg(target_os = "linux")]
const RNDGETENTCNT: u32 = 0x8004_5200;

/// `_IOW('R', 0x03, int[2])`
#[cfg(target_os = "linux")]
const RNDADDENTROPY: u32 = 0x4008_5203;

/// Pool accounting operations of the kernel entropy device
pub trait KernelEntropyPort: Send + Sync {
    /// Bits of entropy currently available in the pool
    fn read_level(&self) -> Result<u32>;

    /// Add `data` to the pool, crediting it with `bit_count` bits
    fn inject(&self, bit_count: u32, data: &[u8]) -> Result<()>;
}

/// Raw random bytes for the server role
pub trait RandomSource: Send + Sync {
    /// Read up to `n` bytes. A short read is returned as-is.
    fn read_random(&self, n: usize) -> Result<Vec<u8>>;
}

/// Character device such as `/dev/random`
#[derive(Debug, Clone)]
pub struct EntropyDevice {
    path: PathBuf,
}

impl Default for EntropyDevice {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_PATH)
    }
}

impl EntropyDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, writable: bool) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&self.path)
            .map_err(|e| Error::device(&format!("open {}", self.path.display()), e))
    }
}

impl KernelEntropyPort for EntropyDevice {
    #[cfg(target_os = "linux")]
    fn read_level(&self) -> Result<u32> {
        use std::os::fd::AsRawFd;

        let file = self.open(false)?;
        let mut count: libc::c_int = 0;

        // SAFETY: RNDGETENTCNT writes one int through the pointer, which
        // refers to a live local for the duration of the call.
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                RNDGETENTCNT as _,
                &mut count as *mut libc::c_int,
            )
        };
        if rc < 0 {
            return Err(Error::device("RNDGETENTCNT", std::io::Error::last_os_error()));
        }

        Ok(u32::try_from(count).unwrap_or(0))
    }

    #[cfg(not(target_os = "linux"))]
    fn read_level(&self) -> Result<u32> {
        Err(Error::device("RNDGETENTCNT", "unsupported platform"))
    }

    #[cfg(target_os = "linux")]
    fn inject(&self, bit_count: u32, data: &[u8]) -> Result<()> {
        use std::os::fd::AsRawFd;

        let record = InjectionRecord::new(bit_count, data)?;
        let bytes = record.to_bytes();
        let file = self.open(true)?;

        // SAFETY: `bytes` is a complete rand_pool_info (header followed by
        // buf_size payload bytes) and outlives the call. The kernel copies
        // it without alignment requirements.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), RNDADDENTROPY as _, bytes.as_ptr()) };
        if rc < 0 {
            return Err(Error::device("RNDADDENTROPY", std::io::Error::last_os_error()));
        }

        debug!(
            bit_count = record.bit_count(),
            byte_length = record.byte_length(),
            "Injected entropy into kernel pool"
        );
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn inject(&self, bit_count: u32, data: &[u8]) -> Result<()> {
        InjectionRecord::new(bit_count, data)?;
        Err(Error::device("RNDADDENTROPY", "unsupported platform"))
    }
}

impl RandomSource for EntropyDevice {
    fn read_random(&self, n: usize) -> Result<Vec<u8>> {
        let mut file = self.open(false)?;
        let mut buf = vec![0u8; n];
        let read = file
            .read(&mut buf)
            .map_err(|e| Error::device(&format!("read {}", self.path.display()), e))?;
        buf.truncate(read);
        Ok(buf)
    }
}
