//! Segment bookkeeping: which parts of the ring are unsubmitted, which are in
//! flight, and what has to happen before a new placement may be written.
//!
//! ```text
//!   |====PREV~~~~~~~~~~~CURR~~~~~~~~~~OFFS---------------|
//!        └─ in flight ──┘└─ unflushed ─┘└──── free ──────┘
//! ```
//!
//! The write cursor only moves forward (modulo capacity), so the bytes right
//! ahead of it are always the oldest ones still in use.

use std::ops::Range;

use crate::{gateway::CompletionToken, ring::Placement};

/// A run of ring bytes in ring order, `[start, end)` modulo capacity.
///
/// `end <= start` means the run wraps past the end of the ring. `end == start`
/// is the whole ring; an empty run is never represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
  pub start: usize,
  pub end: usize,
}

impl Segment {
  pub const fn new(
    start: usize,
    end: usize,
  ) -> Self {
    Self { start, end }
  }

  pub fn is_wrapped(&self) -> bool {
    self.end <= self.start
  }

  pub fn len(
    &self,
    capacity: usize,
  ) -> usize {
    if self.is_wrapped() {
      capacity - self.start + self.end
    } else {
      self.end - self.start
    }
  }

  /// Contiguous byte ranges covered by the segment, in ring order.
  pub fn ranges(
    &self,
    capacity: usize,
  ) -> (Range<usize>, Option<Range<usize>>) {
    if !self.is_wrapped() {
      return (self.start..self.end, None);
    }

    let tail = (self.end > 0).then_some(0..self.end);
    (self.start..capacity, tail)
  }

  pub fn contains(
    &self,
    capacity: usize,
    offset: usize,
  ) -> bool {
    let (head, tail) = self.ranges(capacity);
    head.contains(&offset) || tail.is_some_and(|range| range.contains(&offset))
  }
}

/// Synchronization required before a placement may be handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Remedy {
  /// Nothing to protect in the swept range.
  Clear,
  /// The unflushed segment is in the way; submitting it is enough.
  Flush,
  /// The unflushed segment is in the way and, once submitted, so is an
  /// in-flight batch: submit and wait for the new token.
  FlushAndWait,
  /// Only an in-flight batch is in the way: wait for it, submit nothing.
  Wait,
}

/// Data submitted to the consumer but not yet confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InFlight {
  pub start: usize,
  pub token: CompletionToken,
}

/// The two segment cursors. `None` is the "nothing to protect" sentinel.
#[derive(Debug, Default)]
pub struct SegmentTracker {
  current: Option<usize>,
  in_flight: Option<InFlight>,
}

impl SegmentTracker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current_start(&self) -> Option<usize> {
    self.current
  }

  pub fn previous_start(&self) -> Option<usize> {
    self.in_flight.map(|in_flight| in_flight.start)
  }

  pub fn in_flight(&self) -> Option<InFlight> {
    self.in_flight
  }

  /// The unflushed segment, ending at the write cursor `offset`.
  pub fn pending(
    &self,
    offset: usize,
  ) -> Option<Segment> {
    self.current.map(|start| Segment::new(start, offset))
  }

  /// Decides what must happen before the cursor may move from `from` over
  /// `placement`.
  pub fn assess(
    &self,
    from: usize,
    placement: &Placement,
  ) -> Remedy {
    // Landing exactly on the unflushed start would make a full ring look empty.
    let overwrites_current = self
      .current
      .is_some_and(|start| placement.sweeps(from, start, true));
    let overwrites_in_flight = self
      .in_flight
      .is_some_and(|in_flight| placement.sweeps(from, in_flight.start, false));

    if overwrites_current {
      // After the flush the current segment is in flight as well.
      let overwrites_submitted = self
        .current
        .is_some_and(|start| placement.sweeps(from, start, false));

      if overwrites_submitted || overwrites_in_flight {
        Remedy::FlushAndWait
      } else {
        Remedy::Flush
      }
    } else if overwrites_in_flight {
      Remedy::Wait
    } else {
      Remedy::Clear
    }
  }

  /// Records that the unflushed segment was submitted under `token`.
  ///
  /// If an older batch is still unconfirmed, the in-flight range keeps its
  /// start and takes the newer token: completion is ordered, so waiting on the
  /// newer token also covers the older batch.
  pub fn submitted(
    &mut self,
    token: CompletionToken,
  ) {
    let Some(start) = self.current.take() else {
      return;
    };

    let start = self.in_flight.map_or(start, |in_flight| in_flight.start);
    self.in_flight = Some(InFlight { start, token });
  }

  /// Records that everything in flight has been consumed.
  pub fn confirmed(&mut self) {
    self.in_flight = None;
  }

  /// Opens a segment at `offset` unless one is already open.
  pub fn begin(
    &mut self,
    offset: usize,
  ) {
    self.current.get_or_insert(offset);
  }
}
