use std::{
  fmt,
  ops::{Deref, DerefMut},
};

use crate::{
  align::is_valid_alignment,
  config::StagingConfig,
  error::{Result, StagingError},
  gateway::{Batch, CompletionToken, FlushGateway},
  region::Region,
  ring::{Placement, RingStore},
  segment::{Remedy, Segment, SegmentTracker},
};

/// Logs the diagnostic and terminates: the caller sized something statically wrong.
#[cold]
#[track_caller]
fn fatal(error: StagingError) -> ! {
  tracing::error!(%error, "Fatal staging configuration error");
  panic!("{error}");
}

/// A writable chunk of the ring, valid until the next call on the ring.
pub struct Reservation<'a> {
  offset: usize,
  bytes: &'a mut [u8],
}

impl Reservation<'_> {
  /// Offset of the chunk from the start of the ring, for the consumer-side command.
  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn as_mut_ptr(&mut self) -> *mut u8 {
    self.bytes.as_mut_ptr()
  }
}

impl Deref for Reservation<'_> {
  type Target = [u8];

  fn deref(&self) -> &[u8] {
    self.bytes
  }
}

impl DerefMut for Reservation<'_> {
  fn deref_mut(&mut self) -> &mut [u8] {
    self.bytes
  }
}

impl fmt::Debug for Reservation<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Reservation")
      .field("offset", &self.offset)
      .field("len", &self.bytes.len())
      .finish()
  }
}

/// Single-producer staging ring in front of an asynchronous consumer.
///
/// Writes land in the ring immediately; the consumer sees them only once the
/// segment holding them has been flushed through the gateway. The ring never
/// hands out bytes that a submitted, unconfirmed batch still covers.
///
/// Unconfirmed batches are tracked as one range waited on through the newest
/// token. Running into the oldest of several in-flight batches therefore
/// stalls until all of them are consumed, not just the one in the way. Size
/// the ring to hold at least two flushes' worth of writes to keep such stalls
/// rare.
pub struct StagingRing<G: FlushGateway> {
  // Declared first so it drops (and drains) before the region is unmapped.
  gateway: G,
  store: RingStore,
  tracker: SegmentTracker,
}

impl<G: FlushGateway> StagingRing<G> {
  /// Maps a ring of `config.capacity` bytes in front of `gateway`.
  ///
  /// # Errors
  ///
  /// Fails on an invalid configuration or when the region cannot be mapped.
  pub fn new(
    config: &StagingConfig,
    gateway: G,
  ) -> Result<Self> {
    config.validate()?;

    let region = Region::map(config.capacity)?;

    tracing::info!(capacity = config.capacity, "Created staging ring");

    Ok(Self {
      gateway,
      store: RingStore::new(region),
      tracker: SegmentTracker::new(),
    })
  }

  pub fn capacity(&self) -> usize {
    self.store.capacity()
  }

  /// Next free byte.
  pub fn offset(&self) -> usize {
    self.store.offset()
  }

  /// Start of the unflushed segment, if anything was written since the last flush.
  pub fn current_segment_start(&self) -> Option<usize> {
    self.tracker.current_start()
  }

  /// Start of the submitted, unconfirmed data, if any.
  pub fn previous_segment_start(&self) -> Option<usize> {
    self.tracker.previous_start()
  }

  /// The unflushed segment, if any.
  pub fn pending(&self) -> Option<Segment> {
    self.tracker.pending(self.store.offset())
  }

  pub fn gateway(&self) -> &G {
    &self.gateway
  }

  pub fn gateway_mut(&mut self) -> &mut G {
    &mut self.gateway
  }

  /// Reserves `size` bytes at `alignment`, flushing or waiting first when the
  /// bytes are still owed to the consumer.
  ///
  /// # Errors
  ///
  /// Only gateway failures, in which case nothing is reserved and the cursor
  /// does not move.
  ///
  /// # Panics
  ///
  /// On a zero `size`, an alignment that is not a power of two or exceeds the
  /// page size, or a `size` the ring can never hold.
  pub fn reserve(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<Reservation<'_>> {
    if size == 0 {
      fatal(StagingError::InvalidConfig("reservation size must be greater than 0".into()));
    }

    if !is_valid_alignment(alignment) || alignment > self.store.max_alignment() {
      fatal(StagingError::InvalidConfig(format!(
        "alignment {alignment} must be a power of two no larger than {}",
        self.store.max_alignment()
      )));
    }

    let placement = match self.store.place(size, alignment) {
      Ok(placement) => placement,
      Err(error) => fatal(error),
    };

    self.clear(&placement)?;

    tracing::trace!(
      offset = placement.offset,
      size,
      wrapped = placement.wrapped,
      "Reserved staging bytes"
    );

    self.tracker.begin(placement.offset);
    self.store.advance(&placement);

    let bytes = unsafe { self.store.bytes_mut(&placement) };

    Ok(Reservation {
      offset: placement.offset,
      bytes,
    })
  }

  /// Reserves room for `source` and copies it in. Returns the offset of the copy.
  ///
  /// # Errors
  ///
  /// Same as [`reserve`](Self::reserve).
  pub fn write(
    &mut self,
    alignment: usize,
    source: &[u8],
  ) -> Result<usize> {
    let mut reservation = self.reserve(source.len(), alignment)?;
    reservation.copy_from_slice(source);
    Ok(reservation.offset())
  }

  /// Submits everything written since the last flush as one batch. With
  /// `blocking`, also waits until the consumer has drained everything in flight.
  ///
  /// Without new writes nothing is submitted. Returns the token of the
  /// submitted batch, if one was submitted.
  ///
  /// # Errors
  ///
  /// Gateway failures.
  pub fn flush_pending(
    &mut self,
    blocking: bool,
  ) -> Result<Option<CompletionToken>> {
    let token = self.submit_pending()?;

    if blocking {
      self.wait_in_flight()?;
    }

    Ok(token)
  }

  /// Flushes, waits for the consumer, and tears the ring down.
  ///
  /// Unlike dropping the ring, reports a failure to drain.
  ///
  /// # Errors
  ///
  /// Gateway failures; the ring is dropped either way.
  pub fn finish(mut self) -> Result<()> {
    self.flush_pending(true)?;
    Ok(())
  }

  fn clear(
    &mut self,
    placement: &Placement,
  ) -> Result<()> {
    let from = self.store.offset();

    match self.tracker.assess(from, placement) {
      Remedy::Clear => {}
      Remedy::Flush => {
        self.submit_pending()?;
      }
      Remedy::FlushAndWait => {
        tracing::warn!(
          from,
          offset = placement.offset,
          end = placement.end,
          "Staging ring caught up with unflushed data, flushing and waiting"
        );
        self.flush_pending(true)?;
      }
      Remedy::Wait => {
        tracing::warn!(
          from,
          offset = placement.offset,
          end = placement.end,
          "Staging ring caught up with in-flight data, waiting"
        );
        self.wait_in_flight()?;
      }
    }

    Ok(())
  }

  fn submit_pending(&mut self) -> Result<Option<CompletionToken>> {
    let Some(segment) = self.pending() else {
      return Ok(None);
    };

    let token = self
      .gateway
      .submit_batch(Batch::new(segment, self.store.view()))?;

    tracing::debug!(
      start = segment.start,
      end = segment.end,
      %token,
      "Submitted staging batch"
    );

    self.tracker.submitted(token);
    Ok(Some(token))
  }

  fn wait_in_flight(&mut self) -> Result<()> {
    let Some(in_flight) = self.tracker.in_flight() else {
      return Ok(());
    };

    self.gateway.await_completion(in_flight.token)?;
    self.tracker.confirmed();
    Ok(())
  }
}

impl<G: FlushGateway> Drop for StagingRing<G> {
  fn drop(&mut self) {
    if let Err(error) = self.flush_pending(true) {
      tracing::warn!(%error, "Failed to drain staging ring on drop");
    } else {
      tracing::info!(capacity = self.capacity(), "Dropped staging ring");
    }
  }
}
