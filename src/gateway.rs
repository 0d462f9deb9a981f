//! The seam between the staging ring and whatever consumes it.

use std::fmt;

use crate::{error::GatewayError, region::RegionView, segment::Segment};

/// Opaque handle for "has the consumer finished this batch yet?".
///
/// Tokens issued by one gateway are strictly increasing in submission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompletionToken(u64);

impl CompletionToken {
  pub const fn new(value: u64) -> Self {
    Self(value)
  }

  pub const fn value(self) -> u64 {
    self.0
  }
}

impl fmt::Display for CompletionToken {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// One flushed segment of the ring, handed to the gateway for consumption.
#[derive(Clone, Copy, Debug)]
pub struct Batch {
  segment: Segment,
  view: RegionView,
}

impl Batch {
  pub(crate) fn new(
    segment: Segment,
    view: RegionView,
  ) -> Self {
    Self { segment, view }
  }

  pub fn segment(&self) -> Segment {
    self.segment
  }

  /// Bytes covered by the batch, including alignment padding.
  pub fn len(&self) -> usize {
    self.segment.len(self.view.len())
  }

  /// The batch bytes in ring order: the tail part, then the part that wrapped
  /// to the start of the ring (empty unless the segment wraps).
  ///
  /// # Safety
  ///
  /// Only valid until the batch's completion has been reported. The ring may
  /// reuse these bytes as soon as a wait on its token returns.
  pub unsafe fn parts(&self) -> (&[u8], &[u8]) {
    let (head, tail) = self.segment.ranges(self.view.len());

    unsafe {
      let first = self.view.slice(head.start, head.len());
      let second = match tail {
        Some(range) => self.view.slice(range.start, range.len()),
        None => &[],
      };

      (first, second)
    }
  }
}

/// Submits staged batches to a consumer and waits for them.
///
/// Implementations must keep submission order: completion of a token implies
/// completion of every token issued before it. Waiting on a token that has
/// already completed returns immediately.
pub trait FlushGateway {
  fn submit_batch(
    &mut self,
    batch: Batch,
  ) -> Result<CompletionToken, GatewayError>;

  fn await_completion(
    &mut self,
    token: CompletionToken,
  ) -> Result<(), GatewayError>;
}

impl<G: FlushGateway + ?Sized> FlushGateway for &mut G {
  fn submit_batch(
    &mut self,
    batch: Batch,
  ) -> Result<CompletionToken, GatewayError> {
    (**self).submit_batch(batch)
  }

  fn await_completion(
    &mut self,
    token: CompletionToken,
  ) -> Result<(), GatewayError> {
    (**self).await_completion(token)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::region::Region;

  #[test]
  fn test_token_order() {
    let first = CompletionToken::new(1);
    let second = CompletionToken::new(2);

    assert!(first < second);
    assert_eq!(second.value(), 2);
    assert_eq!(first.to_string(), "#1");
  }

  #[test]
  fn test_batch_parts_wrapped() {
    let mut region = Region::map(16).unwrap();

    unsafe {
      region.slice_mut(0, 16).copy_from_slice(&(0..16).collect::<Vec<u8>>());
    }

    let batch = Batch::new(Segment::new(12, 3), region.view());
    let (first, second) = unsafe { batch.parts() };

    assert_eq!(batch.len(), 7);
    assert_eq!(first, &[12, 13, 14, 15]);
    assert_eq!(second, &[0, 1, 2]);
  }

  #[test]
  fn test_batch_parts_contiguous() {
    let region = Region::map(16).unwrap();

    let batch = Batch::new(Segment::new(2, 6), region.view());
    let (first, second) = unsafe { batch.parts() };

    assert_eq!(first.len(), 4);
    assert!(second.is_empty());
  }
}
