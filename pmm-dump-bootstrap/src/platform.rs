// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Platform probes: the two host facts the rest of the system needs.
//! `cpu_count` seeds the default `--workers` count; `total_memory` is the
//! denominator the MYRAM Load Checker metric divides
//! the process's own RSS by.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform error: {0}")]
    Other(String),
}

pub trait Platform: Send + Sync {
    fn cpu_count(&self) -> usize;
    fn total_memory(&self) -> Result<u64, PlatformError>;
}

#[cfg(unix)]
pub struct UnixPlatform;

#[cfg(unix)]
impl UnixPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Platform for UnixPlatform {
    fn cpu_count(&self) -> usize {
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n > 0 {
            n as usize
        } else {
            1
        }
    }

    fn total_memory(&self) -> Result<u64, PlatformError> {
        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if pages <= 0 || page_size <= 0 {
            return Err(PlatformError::Other("sysconf returned a non-positive value".into()));
        }
        Ok(pages as u64 * page_size as u64)
    }
}

#[cfg(windows)]
pub struct WindowsPlatform;

#[cfg(windows)]
impl WindowsPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
impl Platform for WindowsPlatform {
    fn cpu_count(&self) -> usize {
        use std::mem;
        use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
        unsafe {
            let mut sys_info: SYSTEM_INFO = mem::zeroed();
            GetSystemInfo(&mut sys_info);
            sys_info.dwNumberOfProcessors.max(1) as usize
        }
    }

    fn total_memory(&self) -> Result<u64, PlatformError> {
        use std::mem;
        use winapi::um::sysinfoapi::{GlobalMemoryStatusEx, MEMORYSTATUSEX};
        unsafe {
            let mut status: MEMORYSTATUSEX = mem::zeroed();
            status.dwLength = mem::size_of::<MEMORYSTATUSEX>() as u32;
            if GlobalMemoryStatusEx(&mut status) != 0 {
                Ok(status.ullTotalPhys)
            } else {
                Err(PlatformError::Other("GlobalMemoryStatusEx failed".into()))
            }
        }
    }
}

#[cfg(unix)]
type PlatformImpl = UnixPlatform;

#[cfg(windows)]
type PlatformImpl = WindowsPlatform;

pub fn create_platform() -> Box<dyn Platform> {
    Box::new(PlatformImpl::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_at_least_one_cpu_and_nonzero_memory() {
        let platform = create_platform();
        assert!(platform.cpu_count() >= 1);
        assert!(platform.total_memory().unwrap() > 0);
    }
}
