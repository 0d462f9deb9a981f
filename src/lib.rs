//! # stagering - A Staging Ring Allocator for Asynchronous Consumers
//!
//! This crate provides a fixed-capacity **staging ring**: a mapped byte region
//! the CPU writes into immediately, and an asynchronous consumer (a copy or
//! compute device, or any worker) reads from later, once the writes have been
//! flushed to it as a batch.
//!
//! ## Overview
//!
//! The ring is split into logical segments by two cursors that trail the
//! write offset:
//!
//! ```text
//!   Staging Ring:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          MAPPED REGION                               │
//!   │                                                                      │
//!   │   ┌──────────────┬─────────────────┬─────────────┬────────────────┐  │
//!   │   │     free     │  previous seg.  │ current seg.│      free      │  │
//!   │   │              │  (in flight)    │ (unflushed) │                │  │
//!   │   └──────────────┴─────────────────┴─────────────┴────────────────┘  │
//!   │                  ▲                 ▲             ▲                   │
//!   │                  │                 │             │                   │
//!   │             prev start        curr start      offset                 │
//!   │                                                (next write)          │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Writes extend the current segment. A flush submits it as one batch
//!   and it becomes the previous segment until the consumer confirms it.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   stagering
//!   ├── align      - Alignment macro (align_to!)
//!   ├── config     - StagingConfig
//!   ├── error      - StagingError, GatewayError
//!   ├── region     - Anonymous mmap backing the ring
//!   ├── ring       - RingStore: write cursor, alignment, wrap-around
//!   ├── segment    - SegmentTracker: hazard detection and cursor updates
//!   ├── staging    - StagingRing: reserve / write / flush_pending
//!   ├── gateway    - FlushGateway trait, Batch, CompletionToken
//!   ├── fence      - Completion counter with blocking waits
//!   └── queue      - CopyQueue: a threaded FlushGateway
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagering::{CopyQueue, Segment, StagingConfig, StagingRing};
//!
//! fn main() -> stagering::Result<()> {
//!     let config = StagingConfig::default().with_capacity(64 * 1024);
//!
//!     let queue = CopyQueue::spawn(&config, |segment: Segment, head: &[u8], tail: &[u8]| -> Result<(), String> {
//!         // Upload `head` then `tail` somewhere.
//!         Ok(())
//!     })?;
//!     let mut ring = StagingRing::new(&config, queue)?;
//!
//!     let offset = ring.write(16, b"vertex data")?;
//!     // Record a device command that reads `offset`, then:
//!     ring.flush_pending(false)?;
//!
//!     ring.finish()
//! }
//! ```
//!
//! ## How It Works
//!
//! Every reservation sweeps the write cursor forward from `offset` to the end
//! of the new chunk, over alignment padding and, on wrap-around, over the
//! skipped tail of the ring:
//!
//! ```text
//!   No wrap:     |====OFFS~~~~CHUNK~~~~AEND==========|
//!
//!   Wrap-around: |~~~~CHUNK~~~~AEND=====OFFS---------|
//!                 ▲                           └─ skipped tail
//!                 └─ restarts at 0
//! ```
//!
//! Before the cursor may move, the segment tracker checks what it passes:
//!
//! ```text
//!   passes curr start ──► flush the current segment
//!                         (and wait, if the flushed data is overwritten too)
//!   passes prev start ──► wait for the in-flight batch
//!   passes neither    ──► hand the chunk out right away
//! ```
//!
//! ## Limitations
//!
//! - **Single producer**: no internal locking; one ring per producer thread
//! - **Ordered consumers**: completion of a batch must imply completion of all
//!   earlier batches
//! - **Unix-only**: the region is mapped through `libc`
//!
//! ## Safety
//!
//! Reservations are plain `&mut [u8]`. Consumers read through raw views whose
//! validity rests on the completion protocol: a batch's bytes stay untouched
//! until a wait on its token has returned.

pub mod align;
pub mod config;
pub mod error;
pub mod fence;
pub mod gateway;
pub mod queue;
pub mod region;
pub mod ring;
pub mod segment;
mod staging;

#[cfg(test)]
mod testing;

pub use config::StagingConfig;
pub use error::{GatewayError, Result, StagingError};
pub use fence::Fence;
pub use gateway::{Batch, CompletionToken, FlushGateway};
pub use queue::{BatchConsumer, CopyQueue};
pub use segment::Segment;
pub use staging::{Reservation, StagingRing};
