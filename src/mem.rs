//! Physical-memory windows for memory BARs.

use crate::{Error, Result};
use core::ptr::NonNull;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;

/// A mapped window of physical memory, unmapped on drop.
///
/// The mapping is shared with the device: stores through it reach the
/// device's registers, so all access goes through volatile operations on
/// [`as_ptr`](MemoryMap::as_ptr).
pub struct MemoryMap {
    ptr: NonNull<u8>,
    len: usize,
}

impl MemoryMap {
    /// Wraps a mapping obtained from `mmap`.
    ///
    /// # Safety
    ///
    /// `ptr` must be the start of a live mapping of at least `len` bytes
    /// that the new value may exclusively own and later `munmap`.
    pub(crate) unsafe fn from_raw(ptr: *mut u8, len: usize) -> MemoryMap {
        MemoryMap { ptr: NonNull::new_unchecked(ptr), len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MemoryMap {
    fn drop(&mut self) {
        // A failed munmap must not stop the teardown of the remaining
        // regions; report it and move on.
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } == -1 {
            log::warn!("munmap of {} bytes failed: {}", self.len, io::Error::last_os_error());
        }
    }
}

/// Maps windows of the physical address space.
pub trait PhysMapper {
    /// Maps `len` bytes at physical address `base`, read+write and shared.
    ///
    /// A refusal on permission grounds is reported as
    /// [`Error::PermissionDenied`]; any other failure as
    /// [`Error::MappingFailed`].
    fn map_region(&self, base: u64, len: u64) -> Result<MemoryMap>;
}

impl<T: PhysMapper + ?Sized> PhysMapper for &T {
    fn map_region(&self, base: u64, len: u64) -> Result<MemoryMap> {
        (**self).map_region(base, len)
    }
}

/// The host's physical-memory device node.
pub struct DevMem;

impl DevMem {
    const PATH: &'static str = "/dev/mem";
}

impl PhysMapper for DevMem {
    fn map_region(&self, base: u64, len: u64) -> Result<MemoryMap> {
        let file = OpenOptions::new().read(true).write(true).open(Self::PATH).map_err(|err| {
            if err.kind() == io::ErrorKind::PermissionDenied {
                Error::PermissionDenied
            } else {
                Error::MappingFailed(err)
            }
        })?;

        let len = usize::try_from(len).map_err(|_| {
            Error::MappingFailed(io::Error::new(io::ErrorKind::InvalidInput, "region too large"))
        })?;

        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                base as libc::off_t,
            )
        };
        // The descriptor is only needed to establish the mapping; `file`
        // closes when it goes out of scope.
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EPERM) | Some(libc::EACCES) => Error::PermissionDenied,
                _ => Error::MappingFailed(err),
            });
        }

        Ok(unsafe { MemoryMap::from_raw(ptr.cast(), len) })
    }
}
