//! POSIX shared-memory mapping
//!
//! Owns one `shm_open` + `mmap` pair. The creating side unlinks the name on
//! drop so no new process can attach; existing mappings stay valid until
//! their owners unmap them.

use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use tracing::{debug, warn};

use crate::error::{BusError, Result};

/// Normalise a channel name into a POSIX shared-memory name
///
/// A leading `/` is added when missing. Empty names, embedded slashes and
/// NUL bytes are rejected.
pub fn shm_name(name: &str) -> Result<String> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() || bare.contains('/') || bare.contains('\0') {
        return Err(BusError::InvalidName(name.to_string()));
    }
    Ok(format!("/{bare}"))
}

/// A shared-memory object mapped read/write into this process
#[derive(Debug)]
pub(crate) struct SharedMapping {
    ptr: NonNull<u8>,
    len: usize,
    name: String,
    unlink_on_drop: bool,
}

// SAFETY: the mapping is plain memory shared between processes. All
// cross-thread access goes through atomics in the header or through
// explicit copies whose races are part of the channel contract.
unsafe impl Send for SharedMapping {}
// SAFETY: see `Send` above.
unsafe impl Sync for SharedMapping {}

impl SharedMapping {
    /// Create a new object of `len` bytes, failing if the name is taken
    pub(crate) fn create(name: &str, len: usize) -> Result<Self> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|e| match e {
            Errno::EEXIST => BusError::ChannelExists(name.to_string()),
            other => BusError::Os(other),
        })?;
        let file = File::from(fd);

        let mapped = file
            .set_len(len as u64)
            .map_err(BusError::from)
            .and_then(|()| map_file(&file, len));
        match mapped {
            Ok(ptr) => {
                debug!("Created shared memory {} ({} bytes)", name, len);
                Ok(Self {
                    ptr,
                    len,
                    name: name.to_string(),
                    unlink_on_drop: true,
                })
            }
            Err(e) => {
                if let Err(unlink_err) = shm_unlink(name) {
                    warn!("Failed to unlink {} after create error: {}", name, unlink_err);
                }
                Err(e)
            }
        }
    }

    /// Map an existing object in full
    pub(crate) fn open(name: &str) -> Result<Self> {
        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty()).map_err(|e| match e {
            Errno::ENOENT => BusError::ChannelNotFound(name.to_string()),
            other => BusError::Os(other),
        })?;
        let file = File::from(fd);
        let len = usize::try_from(file.metadata()?.len())
            .map_err(|_| BusError::invalid("shared memory larger than the address space"))?;
        if len < crate::layout::HEADER_SIZE {
            return Err(BusError::invalid(format!("shared memory too small ({len} bytes)")));
        }

        let ptr = map_file(&file, len)?;
        debug!("Attached shared memory {} ({} bytes)", name, len);
        Ok(Self {
            ptr,
            len,
            name: name.to_string(),
            unlink_on_drop: false,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

fn map_file(file: &File, len: usize) -> Result<NonNull<u8>> {
    let length = NonZeroUsize::new(len).ok_or_else(|| BusError::geometry("zero-length mapping"))?;
    // SAFETY: we request a fresh shared mapping (no fixed address) of a file
    // that is at least `len` bytes long; nothing else aliases it yet.
    let ptr: NonNull<c_void> = unsafe {
        mmap(
            None,
            length,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            file,
            0,
        )?
    };
    Ok(ptr.cast())
}

impl Drop for SharedMapping {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe exactly the region returned by mmap
        // and no borrow of it outlives `self`.
        if let Err(e) = unsafe { munmap(self.ptr.cast(), self.len) } {
            warn!("munmap of {} failed: {}", self.name, e);
        }
        if self.unlink_on_drop {
            match shm_unlink(self.name.as_str()) {
                Ok(()) => debug!("Unlinked shared memory {}", self.name),
                Err(e) => warn!("shm_unlink of {} failed: {}", self.name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shm_name_normalisation() {
        assert_eq!(shm_name("program").expect("valid"), "/program");
        assert_eq!(shm_name("/program").expect("valid"), "/program");
        assert!(matches!(shm_name(""), Err(BusError::InvalidName(_))));
        assert!(shm_name("/").is_err());
        assert!(shm_name("a/b").is_err());
        assert!(shm_name("a\0b").is_err());
    }

    #[test]
    fn test_open_missing_object() {
        let name = format!("/fb-missing-{}", std::process::id());
        assert!(matches!(
            SharedMapping::open(&name),
            Err(BusError::ChannelNotFound(_))
        ));
    }
}
