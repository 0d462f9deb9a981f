//! Error types for the staging ring and its gateways.

use std::{io, time::Duration};

use thiserror::Error;

use crate::gateway::CompletionToken;

/// Failures reported by a [`FlushGateway`](crate::FlushGateway).
///
/// The allocator never retries these; they are handed back to the caller as-is.
#[derive(Debug, Error)]
pub enum GatewayError {
  /// The consumer failed and will not complete any further batches.
  #[error("device lost: {0}")]
  DeviceLost(String),

  /// A wait on a completion token ran out of time.
  #[error("timed out after {waited:?} waiting for batch {token}")]
  Timeout {
    token: CompletionToken,
    waited: Duration,
  },

  /// The channel to the consumer is gone.
  #[error("consumer channel disconnected")]
  Disconnected,
}

/// Errors surfaced by [`StagingRing`](crate::StagingRing).
#[derive(Debug, Error)]
pub enum StagingError {
  /// Submission or wait failed in the gateway.
  #[error("gateway failure: {0}")]
  Gateway(#[from] GatewayError),

  /// The backing region could not be mapped.
  #[error("failed to map staging region: {0}")]
  Map(#[source] io::Error),

  /// The consumer worker thread could not be started.
  #[error("failed to spawn consumer worker: {0}")]
  Spawn(#[source] io::Error),

  /// The configuration can never produce a working ring.
  #[error("invalid staging configuration: {0}")]
  InvalidConfig(String),

  /// A single request does not fit the ring, even at offset zero.
  ///
  /// Only ever used as the diagnostic of the fatal reservation path.
  #[error("insufficient staging capacity: {requested} bytes requested, {capacity} bytes available")]
  Capacity { requested: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, StagingError>;
