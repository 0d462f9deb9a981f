use std::time::Duration;

use crate::error::{Result, StagingError};

/// Default ring size, 4 MiB.
pub const DEFAULT_CAPACITY: usize = 4 * 1024 * 1024;

/// Sizing and pacing knobs for a staging ring and its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingConfig {
  /// Total bytes of the ring. Rounded up to whole pages when mapped.
  pub capacity: usize,
  /// Upper bound for any single wait on the consumer. `None` waits forever.
  pub wait_timeout: Option<Duration>,
}

impl Default for StagingConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      wait_timeout: None,
    }
  }
}

impl StagingConfig {
  pub fn with_capacity(
    mut self,
    capacity: usize,
  ) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_wait_timeout(
    mut self,
    timeout: Duration,
  ) -> Self {
    self.wait_timeout = Some(timeout);
    self
  }

  /// Checks the configuration before anything is mapped or spawned.
  ///
  /// # Errors
  ///
  /// Returns [`StagingError::InvalidConfig`] for a zero capacity or a zero
  /// timeout (which would fail every wait).
  pub fn validate(&self) -> Result<()> {
    if self.capacity == 0 {
      return Err(StagingError::InvalidConfig(
        "capacity must be greater than 0".into(),
      ));
    }

    if self.capacity > isize::MAX as usize / 2 {
      return Err(StagingError::InvalidConfig(format!(
        "capacity {} exceeds the addressable range",
        self.capacity
      )));
    }

    if self.wait_timeout == Some(Duration::ZERO) {
      return Err(StagingError::InvalidConfig(
        "wait timeout must be non-zero".into(),
      ));
    }

    Ok(())
  }
}
