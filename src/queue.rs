//! A [`FlushGateway`] that feeds batches to a consumer running on its own thread.
//!
//! ```text
//!   producer thread                        worker thread
//!   ───────────────                        ─────────────
//!   submit_batch ──► [job #1][job #2] ──► consume(#1) ─► fence.signal(1)
//!   await_completion(#2) ◄──────── fence ◄─ consume(#2) ─► fence.signal(2)
//! ```
//!
//! Jobs are consumed strictly in submission order, so a signalled value also
//! covers every value before it.

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::{Arc, mpsc},
  thread::{self, JoinHandle},
  time::Duration,
};

use crate::{
  config::StagingConfig,
  error::{GatewayError, Result, StagingError},
  fence::Fence,
  gateway::{Batch, CompletionToken, FlushGateway},
  segment::Segment,
};

/// The asynchronous reader of staged batches.
///
/// `head` and `tail` are the batch bytes in ring order; `tail` is empty unless
/// the segment wrapped. An error marks the queue's device as lost.
pub trait BatchConsumer: Send + 'static {
  fn consume(
    &mut self,
    segment: Segment,
    head: &[u8],
    tail: &[u8],
  ) -> std::result::Result<(), String>;
}

impl<F> BatchConsumer for F
where
  F: FnMut(Segment, &[u8], &[u8]) -> std::result::Result<(), String> + Send + 'static,
{
  fn consume(
    &mut self,
    segment: Segment,
    head: &[u8],
    tail: &[u8],
  ) -> std::result::Result<(), String> {
    self(segment, head, tail)
  }
}

/// A panicking consumer counts as a lost device; its message becomes the reason.
fn panic_reason(payload: &(dyn Any + Send)) -> String {
  let message = payload
    .downcast_ref::<&str>()
    .map(|message| message.to_string())
    .or_else(|| payload.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "unknown panic payload".into());

  format!("consumer panicked: {message}")
}

struct Job {
  batch: Batch,
  value: u64,
}

/// Single-worker copy queue with a completion fence.
pub struct CopyQueue {
  jobs: Option<mpsc::Sender<Job>>,
  worker: Option<JoinHandle<()>>,
  fence: Arc<Fence>,
  issued: u64,
  wait_timeout: Option<Duration>,
}

impl CopyQueue {
  /// Starts the worker thread that drives `consumer`.
  ///
  /// # Errors
  ///
  /// Fails on an invalid configuration or when the thread cannot be spawned.
  pub fn spawn<C: BatchConsumer>(
    config: &StagingConfig,
    mut consumer: C,
  ) -> Result<Self> {
    config.validate()?;

    let (jobs, inbox) = mpsc::channel::<Job>();
    let fence = Arc::new(Fence::new());

    let worker = {
      let fence = Arc::clone(&fence);

      thread::Builder::new()
        .name("staging-consumer".into())
        .spawn(move || {
          tracing::info!("Staging consumer started");

          while let Ok(job) = inbox.recv() {
            if fence.is_lost() {
              continue;
            }

            let (head, tail) = unsafe { job.batch.parts() };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
              consumer.consume(job.batch.segment(), head, tail)
            }))
            .unwrap_or_else(|payload| Err(panic_reason(&*payload)));

            match outcome {
              Ok(()) => fence.signal(job.value),
              Err(reason) => {
                tracing::warn!(batch = job.value, %reason, "Staging consumer failed");
                fence.lose(reason);
              }
            }
          }

          tracing::info!("Staging consumer stopped");
        })
        .map_err(StagingError::Spawn)?
    };

    Ok(Self {
      jobs: Some(jobs),
      worker: Some(worker),
      fence,
      issued: 0,
      wait_timeout: config.wait_timeout,
    })
  }

  pub fn fence(&self) -> &Arc<Fence> {
    &self.fence
  }

  /// Token of the most recently submitted batch, if any.
  pub fn last_issued(&self) -> Option<CompletionToken> {
    (self.issued > 0).then(|| CompletionToken::new(self.issued))
  }
}

impl FlushGateway for CopyQueue {
  fn submit_batch(
    &mut self,
    batch: Batch,
  ) -> std::result::Result<CompletionToken, GatewayError> {
    if let Some(reason) = self.fence.lost_reason() {
      return Err(GatewayError::DeviceLost(reason));
    }

    let jobs = self.jobs.as_ref().ok_or(GatewayError::Disconnected)?;
    let value = self.issued + 1;

    jobs
      .send(Job { batch, value })
      .map_err(|_| GatewayError::Disconnected)?;

    self.issued = value;
    Ok(CompletionToken::new(value))
  }

  fn await_completion(
    &mut self,
    token: CompletionToken,
  ) -> std::result::Result<(), GatewayError> {
    self.fence.wait(token, self.wait_timeout)
  }
}

impl Drop for CopyQueue {
  fn drop(&mut self) {
    // Closing the channel lets the worker drain what is queued and exit.
    self.jobs.take();

    if let Some(worker) = self.worker.take() {
      if worker.join().is_err() {
        tracing::warn!("Staging consumer panicked");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc::Receiver;

  use parking_lot::Mutex;

  use super::*;
  use crate::staging::StagingRing;

  type Seen = Arc<Mutex<Vec<(Segment, Vec<u8>)>>>;

  fn recording_consumer(seen: Seen) -> impl BatchConsumer {
    move |segment: Segment, head: &[u8], tail: &[u8]| -> std::result::Result<(), String> {
      let mut bytes = head.to_vec();
      bytes.extend_from_slice(tail);
      seen.lock().push((segment, bytes));
      Ok(())
    }
  }

  #[test]
  fn test_ring_through_queue_delivers_every_write() {
    let capacity = 512;
    let config = StagingConfig::default().with_capacity(capacity);
    let seen: Seen = Arc::default();

    let slow = {
      let mut inner = recording_consumer(Arc::clone(&seen));
      let mut calls = 0u64;

      move |segment: Segment, head: &[u8], tail: &[u8]| -> std::result::Result<(), String> {
        calls += 1;
        if calls % 3 == 0 {
          thread::sleep(Duration::from_millis(1));
        }
        inner.consume(segment, head, tail)
      }
    };

    let queue = CopyQueue::spawn(&config, slow).unwrap();
    let mut ring = StagingRing::new(&config, queue).unwrap();
    let mut records = Vec::new();

    for stamp in 0..400u32 {
      let size = 8 + (stamp as usize * 37) % 120;
      let data: Vec<u8> = (0..size).map(|i| (stamp as u8).wrapping_add(i as u8)).collect();
      let offset = ring.write(8, &data).unwrap();
      let batch = ring.gateway().last_issued().map_or(0, |token| token.value() as usize);

      records.push((batch, offset, data));

      if stamp % 25 == 24 {
        ring.flush_pending(false).unwrap();
      }
    }

    ring.finish().unwrap();

    let seen = seen.lock();

    for (batch, offset, data) in &records {
      let (segment, bytes) = &seen[*batch];
      let position = (offset + capacity - segment.start) % capacity;

      assert!(segment.contains(capacity, *offset));
      assert_eq!(&bytes[position..position + data.len()], &data[..]);
    }
  }

  #[test]
  fn test_consumer_failure_loses_device() {
    let config = StagingConfig::default().with_capacity(256);

    let failing = |_: Segment, _: &[u8], _: &[u8]| -> std::result::Result<(), String> {
      Err("copy engine fault".into())
    };

    let queue = CopyQueue::spawn(&config, failing).unwrap();
    let mut ring = StagingRing::new(&config, queue).unwrap();

    ring.write(4, b"doomed").unwrap();
    let result = ring.flush_pending(true);

    assert!(matches!(
      result,
      Err(StagingError::Gateway(GatewayError::DeviceLost(reason))) if reason == "copy engine fault"
    ));
    assert!(ring.gateway().fence().is_lost());

    ring.write(4, b"again").unwrap();
    assert!(matches!(
      ring.flush_pending(false),
      Err(StagingError::Gateway(GatewayError::DeviceLost(_)))
    ));
  }

  #[test]
  fn test_consumer_panic_loses_device() {
    let config = StagingConfig::default().with_capacity(256);

    let panicking = |_: Segment, _: &[u8], _: &[u8]| -> std::result::Result<(), String> {
      panic!("copy engine exploded");
    };

    let queue = CopyQueue::spawn(&config, panicking).unwrap();
    let mut ring = StagingRing::new(&config, queue).unwrap();

    ring.write(4, b"data").unwrap();
    let result = ring.flush_pending(true);

    assert!(matches!(
      result,
      Err(StagingError::Gateway(GatewayError::DeviceLost(reason)))
        if reason == "consumer panicked: copy engine exploded"
    ));
    assert!(ring.gateway().fence().is_lost());
  }

  #[test]
  fn test_panic_reason_reads_string_payloads() {
    let owned: Box<dyn Any + Send> = Box::new(String::from("owned message"));
    let opaque: Box<dyn Any + Send> = Box::new(7u32);

    assert_eq!(panic_reason(&*owned), "consumer panicked: owned message");
    assert_eq!(panic_reason(&*opaque), "consumer panicked: unknown panic payload");
  }

  #[test]
  fn test_wait_times_out_on_stalled_consumer() {
    let config = StagingConfig::default()
      .with_capacity(256)
      .with_wait_timeout(Duration::from_millis(20));

    let (release, gate): (mpsc::Sender<()>, Receiver<()>) = mpsc::channel();

    let stalled = move |_: Segment, _: &[u8], _: &[u8]| -> std::result::Result<(), String> {
      gate.recv().map_err(|error| error.to_string())
    };

    let queue = CopyQueue::spawn(&config, stalled).unwrap();
    let mut ring = StagingRing::new(&config, queue).unwrap();

    ring.write(4, b"stuck").unwrap();
    let result = ring.flush_pending(true);

    assert!(matches!(
      result,
      Err(StagingError::Gateway(GatewayError::Timeout { .. }))
    ));
    assert_eq!(ring.previous_segment_start(), Some(0));

    release.send(()).unwrap();
    ring.flush_pending(true).unwrap();

    assert_eq!(ring.previous_segment_start(), None);
    assert_eq!(ring.gateway().fence().completed(), 1);
  }

  #[test]
  fn test_drop_drains_queue() {
    let config = StagingConfig::default().with_capacity(256);
    let seen: Seen = Arc::default();

    {
      let mut queue = CopyQueue::spawn(&config, recording_consumer(Arc::clone(&seen))).unwrap();
      assert_eq!(queue.last_issued(), None);

      let mut ring = StagingRing::new(&config, &mut queue).unwrap();
      ring.write(1, b"one").unwrap();
      ring.flush_pending(false).unwrap();
      ring.write(1, b"two").unwrap();
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1, b"one");
    assert_eq!(seen[1].1, b"two");
  }
}
