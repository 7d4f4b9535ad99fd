//! Clock offset estimation for Buzzwire.
//!
//! Players buzz in with timestamps from their own clocks, over links with
//! different latencies. Comparing those raw timestamps would hand the win
//! to whoever sits closest to the server. This crate estimates each
//! player's one-way lag from a sliding window of probe exchanges so the
//! engine can shift every buzz onto the server's time axis before ordering
//! responders.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session manager  ← probes players, feeds reflected samples in
//!     ↕
//! Clock layer (this crate)  ← rings of samples, one estimate per player
//!     ↕
//! Protocol layer  ← provides PlayerId and the offset_check messages
//! ```
//!
//! The crate is deliberately synchronous: the probing schedule and the
//! transport sends belong to the session manager. All this layer does is
//! remember samples and do arithmetic.

mod registry;
mod sampler;

pub use registry::ClockRegistry;
pub use sampler::{ClockSampler, SAMPLE_WINDOW};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
///
/// All wire timestamps (probe sends, buzz receipts) use this axis.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
