//! Adaptive Sizer & Speed Probe (component C3).
//!
//! Follows the same concurrency shape as the rest of this workspace: an
//! internal mutex around `chunk_size`/`speed` rather than atomics, since
//! more than one field has to change together.

use rand::RngCore;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

#[derive(Clone, Copy, Debug)]
struct SizerState {
    chunk_size: u64,
    last_speed_bps: Option<u64>,
}

/// Tunes the FastCDC target size to the measured link speed, via
/// `set_speed`/`chunk_sizes`/`adjust_on_timeout`/`adjust_on_success`.
pub struct AdaptiveSizer {
    absolute_min: u64,
    absolute_max: u64,
    target_seconds: f64,
    state: Mutex<SizerState>,
}

impl AdaptiveSizer {
    pub fn new(initial_chunk_size: u64, absolute_min: u64, absolute_max: u64, target_seconds: f64) -> Self {
        Self {
            absolute_min,
            absolute_max,
            target_seconds,
            state: Mutex::new(SizerState {
                chunk_size: initial_chunk_size.clamp(absolute_min, absolute_max),
                last_speed_bps: None,
            }),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.state.lock().unwrap().chunk_size
    }

    /// `chunkSize := clamp(bps * targetSeconds, absoluteMin, absoluteMax)`.
    pub fn set_speed(&self, bytes_per_sec: u64) -> u64 {
        let mut state = self.state.lock().unwrap();
        let raw = (bytes_per_sec as f64 * self.target_seconds) as u64;
        state.chunk_size = raw.clamp(self.absolute_min, self.absolute_max);
        state.last_speed_bps = Some(bytes_per_sec);
        state.chunk_size
    }

    /// `(avg/4, avg, avg*4)`, lower bound floored at 64 and upper bound
    /// clipped to `absoluteMax`.
    pub fn chunk_sizes(&self) -> (u64, u64, u64) {
        let avg = self.chunk_size();
        let lower = (avg / 4).max(64);
        let upper = (avg * 4).min(self.absolute_max);
        (lower, avg, upper)
    }

    /// Multiplies `chunkSize` by `factor` (default 0.5), clamped to
    /// `absoluteMin`.
    pub fn adjust_on_timeout(&self, factor: f64) -> u64 {
        let mut state = self.state.lock().unwrap();
        let reduced = (state.chunk_size as f64 * factor) as u64;
        state.chunk_size = reduced.clamp(self.absolute_min, self.absolute_max);
        state.chunk_size
    }

    /// Multiplies `chunkSize` by `factor` (> 1) only when `actual_duration`
    /// beat `targetSeconds`; otherwise a no-op.
    pub fn adjust_on_success(&self, actual_duration: Duration, factor: f64) -> u64 {
        let mut state = self.state.lock().unwrap();
        if actual_duration.as_secs_f64() < self.target_seconds {
            let increased = (state.chunk_size as f64 * factor) as u64;
            state.chunk_size = increased.clamp(self.absolute_min, self.absolute_max);
        }
        state.chunk_size
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("speed probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error during speed probe: {0}")]
    Io(#[from] std::io::Error),
}

/// Measures throughput by writing a fixed-size buffer of pseudo-random
/// bytes into a caller-supplied sink under a timeout
pub struct SpeedProbe {
    pub probe_size: usize,
    pub timeout: Duration,
}

impl Default for SpeedProbe {
    fn default() -> Self {
        Self {
            probe_size: 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

impl SpeedProbe {
    pub fn new(probe_size: usize, timeout: Duration) -> Self {
        Self { probe_size, timeout }
    }

    /// Returns measured bytes/sec, or `ProbeError::Timeout` if the sink
    /// didn't accept the whole probe buffer in time — callers should treat
    /// a timed-out connection as very slow and fall back to `absoluteMin`.
    pub async fn measure<W: AsyncWrite + Unpin>(&self, sink: &mut W) -> Result<f64, ProbeError> {
        let mut buf = vec![0u8; self.probe_size];
        rand::rng().fill_bytes(&mut buf);

        let start = tokio::time::Instant::now();
        let write = async {
            sink.write_all(&buf).await?;
            sink.flush().await?;
            Ok::<_, std::io::Error>(())
        };

        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => {
                let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
                Ok(self.probe_size as f64 / elapsed)
            }
            Ok(Err(e)) => Err(ProbeError::Io(e)),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}
