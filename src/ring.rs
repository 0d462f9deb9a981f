use crate::{
  align_to,
  error::StagingError,
  region::{Region, RegionView},
};

/// Where a request lands in the ring, before any synchronization happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
  /// Aligned start of the request.
  pub offset: usize,
  /// One past the last byte of the request. May equal the ring capacity.
  pub end: usize,
  /// The request did not fit before the end of the ring and restarts at 0.
  pub wrapped: bool,
}

impl Placement {
  /// Whether advancing the write cursor from `from` to this placement's end
  /// passes over `mark`, padding and skipped tail included.
  ///
  /// `from` itself always counts as passed. `include_end` decides whether
  /// landing exactly on `mark` counts too.
  pub fn sweeps(
    &self,
    from: usize,
    mark: usize,
    include_end: bool,
  ) -> bool {
    let before_end = mark < self.end || (include_end && mark == self.end);

    if self.wrapped {
      from <= mark || before_end
    } else {
      from <= mark && before_end
    }
  }
}

/// The mapped byte region plus the write cursor.
pub struct RingStore {
  region: Region,
  offset: usize,
}

impl RingStore {
  pub fn new(region: Region) -> Self {
    Self { region, offset: 0 }
  }

  pub fn capacity(&self) -> usize {
    self.region.len()
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn max_alignment(&self) -> usize {
    self.region.base_alignment()
  }

  /// Computes the aligned placement of `size` bytes, wrapping to the start of
  /// the ring when the tail is too short. Does not move the cursor.
  ///
  /// # Errors
  ///
  /// [`StagingError::Capacity`] when the request cannot fit even in an empty ring.
  pub fn place(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<Placement, StagingError> {
    let capacity = self.capacity();
    let capacity_error = |available: usize| StagingError::Capacity {
      requested: size,
      capacity: available,
    };

    if size > capacity {
      return Err(capacity_error(capacity));
    }

    let aligned = align_to!(self.offset, alignment);

    if aligned <= capacity && capacity - aligned >= size {
      return Ok(Placement {
        offset: aligned,
        end: aligned + size,
        wrapped: false,
      });
    }

    let aligned = align_to!(0, alignment);
    let available = capacity.saturating_sub(aligned);

    if available < size {
      return Err(capacity_error(available));
    }

    Ok(Placement {
      offset: aligned,
      end: aligned + size,
      wrapped: true,
    })
  }

  /// Moves the cursor past `placement`, folding an end at capacity back to 0.
  pub fn advance(
    &mut self,
    placement: &Placement,
  ) {
    self.offset = if placement.end == self.capacity() { 0 } else { placement.end };
  }

  /// # Safety
  ///
  /// `placement` must have been cleared by the segment tracker, so that no
  /// in-flight batch covers it.
  pub unsafe fn bytes_mut(
    &mut self,
    placement: &Placement,
  ) -> &mut [u8] {
    unsafe {
      self
        .region
        .slice_mut(placement.offset, placement.end - placement.offset)
    }
  }

  pub fn view(&self) -> RegionView {
    self.region.view()
  }
}
