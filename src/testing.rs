//! Gateway double shared by the unit tests.

use crate::{
  error::GatewayError,
  gateway::{Batch, CompletionToken, FlushGateway},
  segment::Segment,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
  Submit(Segment),
  Wait(CompletionToken),
}

/// A consumer that never makes progress on its own: a batch is read only when
/// someone waits for it (or for a later one). Bytes are captured at that point,
/// so any producer write that raced ahead of the wait shows up as corruption.
#[derive(Default)]
pub struct Recorder {
  pub events: Vec<Event>,
  /// Bytes of every consumed batch, in submission order, in ring order.
  pub consumed: Vec<(Segment, Vec<u8>)>,
  pending: Vec<Batch>,
  issued: u64,
  pub fail_submit: bool,
  pub fail_wait: bool,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn submissions(&self) -> usize {
    self
      .events
      .iter()
      .filter(|event| matches!(event, Event::Submit(_)))
      .count()
  }

  pub fn waits(&self) -> usize {
    self
      .events
      .iter()
      .filter(|event| matches!(event, Event::Wait(_)))
      .count()
  }

  /// Batches submitted but not yet consumed.
  pub fn outstanding(&self) -> &[Batch] {
    &self.pending
  }
}

impl FlushGateway for Recorder {
  fn submit_batch(
    &mut self,
    batch: Batch,
  ) -> Result<CompletionToken, GatewayError> {
    if self.fail_submit {
      return Err(GatewayError::DeviceLost("submission rejected".into()));
    }

    self.issued += 1;
    self.events.push(Event::Submit(batch.segment()));
    self.pending.push(batch);
    Ok(CompletionToken::new(self.issued))
  }

  fn await_completion(
    &mut self,
    token: CompletionToken,
  ) -> Result<(), GatewayError> {
    if self.fail_wait {
      return Err(GatewayError::DeviceLost("wait rejected".into()));
    }

    self.events.push(Event::Wait(token));

    let completed = self.consumed.len() as u64;
    let due = token.value().saturating_sub(completed) as usize;

    for batch in self.pending.drain(..due.min(self.pending.len())) {
      let (first, second) = unsafe { batch.parts() };
      let mut bytes = first.to_vec();
      bytes.extend_from_slice(second);
      self.consumed.push((batch.segment(), bytes));
    }

    Ok(())
  }
}
