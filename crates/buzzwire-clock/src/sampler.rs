//! Per-player sample ring and lag arithmetic.

/// Number of probe exchanges kept per player.
///
/// A ring of 8 smooths out jitter without letting a stale route estimate
/// linger for more than a few seconds at the 1 s probe cadence.
pub const SAMPLE_WINDOW: usize = 8;

/// One three-timestamp probe exchange.
///
/// `server_out_ts` is when the server sent the probe, `client_ts` is the
/// client's clock when it reflected it, `server_in_ts` is when the
/// reflection arrived back. A zeroed `server_out_ts` marks an empty slot.
#[derive(Debug, Clone, Copy, Default)]
struct ClockSample {
    server_out_ts: u64,
    #[allow(dead_code)]
    client_ts: u64,
    server_in_ts: u64,
}

impl ClockSample {
    /// One-way lag estimate for this exchange: half the round trip.
    ///
    /// The classic symmetric-delay approximation — asymmetric routes are
    /// deliberately ignored.
    fn lag(&self) -> f64 {
        (self.server_in_ts.saturating_sub(self.server_out_ts)) as f64 / 2.0
    }

    fn is_empty(&self) -> bool {
        self.server_out_ts == 0
    }
}

/// A fixed-size circular buffer of the last [`SAMPLE_WINDOW`] probe
/// exchanges for one player, with an aggregate lag estimate.
#[derive(Debug, Clone, Default)]
pub struct ClockSampler {
    counter: u64,
    samples: [ClockSample; SAMPLE_WINDOW],
}

impl ClockSampler {
    /// Creates an empty sampler. [`ClockSampler::lag`] reports 0 until
    /// the first sample lands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one exchange into slot `counter % SAMPLE_WINDOW`,
    /// overwriting the oldest, and returns the recomputed aggregate lag.
    pub fn record(
        &mut self,
        server_out_ts: u64,
        server_in_ts: u64,
        client_ts: u64,
    ) -> f64 {
        let slot = (self.counter as usize) % SAMPLE_WINDOW;
        self.samples[slot] = ClockSample {
            server_out_ts,
            client_ts,
            server_in_ts,
        };
        self.counter += 1;
        self.lag()
    }

    /// Arithmetic mean of all non-empty slots' lag values, or 0.0 when no
    /// sample exists yet.
    pub fn lag(&self) -> f64 {
        let filled: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| !s.is_empty())
            .map(ClockSample::lag)
            .collect();
        if filled.is_empty() {
            return 0.0;
        }
        filled.iter().sum::<f64>() / filled.len() as f64
    }

    /// Total samples ever recorded (not capped at the window size).
    pub fn sample_count(&self) -> u64 {
        self.counter
    }
}
