//! RTP tick to millisecond conversion
//!
//! RTP timestamps count ticks of the media clock (90 kHz for video, the
//! sample rate for audio); FLV tags carry integer milliseconds. One tick
//! is usually a fraction of a millisecond, so a plain division drifts.
//! The normalizer keeps the fractional remainder and folds a whole
//! millisecond into the output whenever the residue crosses 1.0.

/// Converts a stream of RTP timestamps into non-decreasing milliseconds
/// starting at 0. The first observed timestamp becomes the base.
#[derive(Debug)]
pub struct TimestampNormalizer {
    clock_per_ms: f64,
    base: Option<u32>,
    residue: f64,
}

impl TimestampNormalizer {
    /// Create a normalizer for a media clock in Hz
    pub fn new(clock_rate: u32) -> Self {
        Self {
            clock_per_ms: clock_rate as f64 / 1000.0,
            base: None,
            residue: 0.0,
        }
    }

    /// Milliseconds since the first observed timestamp. Tolerates the
    /// 32-bit RTP timestamp wrapping around.
    pub fn normalize(&mut self, timestamp: u32) -> u64 {
        let base = *self.base.get_or_insert(timestamp);
        let ticks = timestamp.wrapping_sub(base) as f64;
        let exact = ticks / self.clock_per_ms;
        let mut whole = exact.floor();
        self.residue += exact - whole;
        if self.residue > 1.0 {
            self.residue -= 1.0;
            whole += 1.0;
        }
        whole as u64
    }
}
