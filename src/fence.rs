use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{error::GatewayError, gateway::CompletionToken};

struct FenceState {
  completed: u64,
  lost: Option<String>,
}

/// Monotonic completion counter with a blocking wait.
///
/// The consumer signals each value in order; the producer waits for a value
/// to be reached. Once lost, a fence fails every wait it cannot already satisfy.
pub struct Fence {
  state: Mutex<FenceState>,
  signal: Condvar,
}

impl Default for Fence {
  fn default() -> Self {
    Self::new()
  }
}

impl Fence {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(FenceState {
        completed: 0,
        lost: None,
      }),
      signal: Condvar::new(),
    }
  }

  pub fn completed(&self) -> u64 {
    self.state.lock().completed
  }

  pub fn is_lost(&self) -> bool {
    self.state.lock().lost.is_some()
  }

  pub fn lost_reason(&self) -> Option<String> {
    self.state.lock().lost.clone()
  }

  /// Marks everything up to `value` as complete.
  pub fn signal(
    &self,
    value: u64,
  ) {
    let mut state = self.state.lock();
    state.completed = state.completed.max(value);
    self.signal.notify_all();
  }

  /// Fails every wait whose value has not been reached yet.
  pub fn lose(
    &self,
    reason: impl Into<String>,
  ) {
    let mut state = self.state.lock();
    state.lost.get_or_insert_with(|| reason.into());
    self.signal.notify_all();
  }

  /// Blocks until `token` is reached, the fence is lost, or `timeout` elapses.
  pub fn wait(
    &self,
    token: CompletionToken,
    timeout: Option<Duration>,
  ) -> Result<(), GatewayError> {
    let started = Instant::now();
    let deadline = timeout.map(|timeout| started + timeout);
    let mut state = self.state.lock();

    loop {
      if state.completed >= token.value() {
        return Ok(());
      }

      if let Some(reason) = &state.lost {
        return Err(GatewayError::DeviceLost(reason.clone()));
      }

      match deadline {
        Some(deadline) => {
          if self.signal.wait_until(&mut state, deadline).timed_out()
            && state.completed < token.value()
            && state.lost.is_none()
          {
            return Err(GatewayError::Timeout {
              token,
              waited: started.elapsed(),
            });
          }
        }
        None => self.signal.wait(&mut state),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread};

  use super::*;

  #[test]
  fn test_completed_token_returns_immediately() {
    let fence = Fence::new();
    fence.signal(3);

    assert!(fence.wait(CompletionToken::new(2), None).is_ok());
    assert!(fence.wait(CompletionToken::new(3), None).is_ok());
    assert_eq!(fence.completed(), 3);
  }

  #[test]
  fn test_signal_never_goes_backwards() {
    let fence = Fence::new();
    fence.signal(5);
    fence.signal(2);

    assert_eq!(fence.completed(), 5);
  }

  #[test]
  fn test_wait_across_threads() {
    let fence = Arc::new(Fence::new());

    let signaller = {
      let fence = Arc::clone(&fence);
      thread::spawn(move || {
        for value in 1..=4 {
          thread::sleep(Duration::from_millis(2));
          fence.signal(value);
        }
      })
    };

    fence.wait(CompletionToken::new(4), None).unwrap();
    signaller.join().unwrap();

    assert_eq!(fence.completed(), 4);
  }

  #[test]
  fn test_wait_times_out() {
    let fence = Fence::new();
    fence.signal(1);

    let error = fence
      .wait(CompletionToken::new(2), Some(Duration::from_millis(10)))
      .unwrap_err();

    assert!(matches!(
      error,
      GatewayError::Timeout { token, waited } if token == CompletionToken::new(2)
        && waited >= Duration::from_millis(10)
    ));
  }

  #[test]
  fn test_lost_fence_fails_waiters() {
    let fence = Arc::new(Fence::new());

    let waiter = {
      let fence = Arc::clone(&fence);
      thread::spawn(move || fence.wait(CompletionToken::new(1), None))
    };

    thread::sleep(Duration::from_millis(5));
    fence.lose("consumer crashed");

    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(GatewayError::DeviceLost(reason)) if reason == "consumer crashed"));
    assert!(fence.is_lost());
  }
}
