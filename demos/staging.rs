use std::{io::Read, time::Duration};

use stagering::{CopyQueue, Segment, StagingConfig, StagingRing};

/// Waits for ENTER when the demo runs with `--step`.
/// Handy for following each step while the consumer thread prints its batches.
fn block_until_enter_pressed(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_cursors(
  label: &str,
  ring: &StagingRing<CopyQueue>,
) {
  println!(
    "[{}] offset = {}, current start = {:?}, previous start = {:?}, completed = {}",
    label,
    ring.offset(),
    ring.current_segment_start(),
    ring.previous_segment_start(),
    ring.gateway().fence().completed(),
  );
}

fn main() -> stagering::Result<()> {
  let step = std::env::args().any(|arg| arg == "--step");

  // A deliberately tiny ring so wrap-around shows up after a few writes.
  let config = StagingConfig::default()
    .with_capacity(256)
    .with_wait_timeout(Duration::from_secs(5));

  // The consumer stands in for a copy engine: it reads every batch in order,
  // a little slower than the producer writes them.
  let queue = CopyQueue::spawn(&config, |segment: Segment, head: &[u8], tail: &[u8]| -> Result<(), String> {
    std::thread::sleep(Duration::from_millis(20));
    println!(
      "    consumer: batch [{}..{}) = {} + {} bytes",
      segment.start,
      segment.end,
      head.len(),
      tail.len()
    );
    Ok(())
  })?;

  let mut ring = StagingRing::new(&config, queue)?;
  print_cursors("start", &ring);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) Stage a few small writes. Nothing reaches the consumer yet.
  // --------------------------------------------------------------------
  println!("\n[1] Write three chunks");
  for (alignment, payload) in [
    (4, &b"mesh"[..]),
    (16, &b"texture rows"[..]),
    (8, &b"uniforms"[..]),
  ] {
    let offset = ring.write(alignment, payload)?;
    println!("[1] {:>2} bytes aligned to {:>2} at offset {}", payload.len(), alignment, offset);
  }
  print_cursors("1", &ring);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) Flush without waiting. The current segment becomes in flight.
  // --------------------------------------------------------------------
  let token = ring.flush_pending(false)?;
  println!("\n[2] Flushed pending segment, token = {:?}", token);
  print_cursors("2", &ring);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Reserve in place and fill the chunk directly.
  // --------------------------------------------------------------------
  {
    let mut chunk = ring.reserve(96, 32)?;
    chunk.fill(0xAB);
    println!("\n[3] Reserved 96 bytes aligned to 32 at offset {}", chunk.offset());
  }
  print_cursors("3", &ring);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) Keep writing until the ring wraps.
  //    Crossing the current start forces a flush; crossing the in-flight
  //    start forces a wait.
  // --------------------------------------------------------------------
  println!("\n[4] Write past the end of the ring");
  for round in 0..6u8 {
    let payload = [round; 64];
    let offset = ring.write(16, &payload)?;
    println!("[4] round {} landed at offset {}", round, offset);
    print_cursors("4", &ring);
  }
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 5) Blocking flush: returns once the consumer has read everything.
  // --------------------------------------------------------------------
  ring.flush_pending(true)?;
  println!("\n[5] Blocking flush done");
  print_cursors("5", &ring);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 6) End of demo. finish() drains the ring before the region is unmapped.
  // --------------------------------------------------------------------
  ring.finish()?;
  println!("\n[6] End of example. Ring drained and released.");

  Ok(())
}
