//! Windowed rate observers
//!
//! Purely observational: a bitrate observer fed with raw upstream reads
//! and an FPS observer fed with reassembled video NALs. Both log through
//! `tracing` once per period and reset their window.

use std::time::Instant;

use crate::media::h264;

/// Accumulates byte counts and logs peak/average/min/max bitrate
#[derive(Debug)]
pub struct BitrateObserver {
    period_secs: f64,
    started: Instant,
    bits: u64,
    max: f64,
    min: f64,
    average: f64,
}

impl BitrateObserver {
    pub fn new(period_secs: u64) -> Self {
        Self {
            period_secs: period_secs as f64,
            started: Instant::now(),
            bits: 0,
            max: 0.0,
            min: 0.0,
            average: 0.0,
        }
    }

    /// Count one read; logs and resets when the period has elapsed
    pub fn on_data(&mut self, len: usize) {
        self.bits += len as u64 * 8;
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > self.period_secs {
            self.rollover(elapsed);
            self.started = Instant::now();
        }
    }

    fn rollover(&mut self, elapsed: f64) {
        let rate = self.bits as f64 / elapsed;
        // both extremes are seeded from the first window so min cannot
        // stick at zero
        if self.average == 0.0 {
            self.max = rate;
            self.min = rate;
            self.average = rate;
        } else {
            self.max = self.max.max(rate);
            self.min = self.min.min(rate);
            self.average = (self.average + rate) / 2.0;
        }
        tracing::debug!(
            peak = format_args!("{:.1}", rate),
            average = format_args!("{:.1}", self.average),
            max = format_args!("{:.1}", self.max),
            min = format_args!("{:.1}", self.min),
            period_secs = format_args!("{:.2}", elapsed),
            "bitrate b/s"
        );
        self.bits = 0;
    }
}

/// Counts frames and keyframes per period
#[derive(Debug)]
pub struct FpsObserver {
    period_secs: f64,
    started: Instant,
    frames: u64,
    keyframes: u64,
}

impl FpsObserver {
    pub fn new(period_secs: u64) -> Self {
        Self {
            period_secs: period_secs as f64,
            started: Instant::now(),
            frames: 0,
            keyframes: 0,
        }
    }

    /// Count one reassembled NAL; logs and resets when the period elapsed
    pub fn on_frame(&mut self, frame: &[u8]) {
        self.frames += 1;
        if h264::is_idr(frame) {
            self.keyframes += 1;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > self.period_secs {
            tracing::debug!(
                fps = format_args!("{:.2}", self.frames as f64 / elapsed),
                frames = self.frames,
                keys = self.keyframes,
                period_secs = format_args!("{:.2}", elapsed),
                "frame rate"
            );
            self.frames = 0;
            self.keyframes = 0;
            self.started = Instant::now();
        }
    }
}
