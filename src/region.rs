use std::{io, ptr, ptr::NonNull, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};

use crate::{
  align_to,
  error::{Result, StagingError},
};

/// Returns the system page size, which is also the alignment of every region.
pub fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if size <= 0 { 4096 } else { size as usize }
}

/// Anonymous, page-aligned memory mapping that backs a staging ring.
///
/// The mapping is created once and never moves, so offsets into it stay valid
/// for the whole lifetime of the ring. It is unmapped on drop.
pub struct Region {
  base: NonNull<u8>,
  len: usize,
  mapped: usize,
}

// The region is plain memory; access discipline is enforced by the ring cursors.
unsafe impl Send for Region {}

impl Region {
  /// Maps `len` usable bytes, rounded up to whole pages.
  pub fn map(len: usize) -> Result<Self> {
    if len == 0 {
      return Err(StagingError::InvalidConfig(
        "region length must be greater than 0".into(),
      ));
    }

    let mapped = align_to!(len, page_size());

    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        mapped,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(StagingError::Map(io::Error::last_os_error()));
    }

    let base = NonNull::new(address as *mut u8)
      .ok_or_else(|| StagingError::Map(io::Error::other("mmap returned null")))?;

    tracing::info!(len, mapped, base = ?base, "Mapped staging region");

    Ok(Self { base, len, mapped })
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Largest alignment an offset into this region can carry over to addresses.
  pub fn base_alignment(&self) -> usize {
    page_size()
  }

  /// Borrows `[offset, offset + len)` for writing.
  ///
  /// # Safety
  ///
  /// The range must be in bounds and must not be read by the consumer for the
  /// lifetime of the returned slice.
  pub unsafe fn slice_mut(
    &mut self,
    offset: usize,
    len: usize,
  ) -> &mut [u8] {
    debug_assert!(offset + len <= self.len);
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
  }

  /// A raw, copyable handle for the consumer side.
  pub fn view(&self) -> RegionView {
    RegionView {
      base: self.base,
      len: self.len,
    }
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    let result = unsafe { libc::munmap(self.base.as_ptr() as *mut c_void, self.mapped) };

    if result != 0 {
      tracing::warn!(error = %io::Error::last_os_error(), "Failed to unmap staging region");
    } else {
      tracing::info!(len = self.len, "Unmapped staging region");
    }
  }
}

/// Read-only handle on a [`Region`] that can cross threads.
///
/// It carries no lifetime: readers must rely on the ring's completion protocol
/// to know that the bytes they read are stable and still mapped.
#[derive(Clone, Copy, Debug)]
pub struct RegionView {
  base: NonNull<u8>,
  len: usize,
}

unsafe impl Send for RegionView {}
unsafe impl Sync for RegionView {}

impl RegionView {
  pub fn len(&self) -> usize {
    self.len
  }

  /// # Safety
  ///
  /// The range must be in bounds, the region still mapped, and no producer
  /// write may overlap it while the slice is alive.
  pub unsafe fn slice(
    &self,
    offset: usize,
    len: usize,
  ) -> &[u8] {
    debug_assert!(offset + len <= self.len);
    unsafe { slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
  }
}
