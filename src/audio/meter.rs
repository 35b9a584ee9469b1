use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

/// Largest value reported by [`AmplitudeMeter::take_peak`]
pub const MAX_AMPLITUDE: u16 = 32767;

/// Peak amplitude since the last read, shared between the capture callback
/// and the sampler task.
#[derive(Debug, Clone, Default)]
pub struct AmplitudeMeter {
    peak: Arc<AtomicU32>,
}

impl AmplitudeMeter {
    /// Creates a meter reading zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a block of f32 samples into the running peak
    pub fn record_block(&self, samples: &[f32]) {
        let block_peak = samples
            .iter()
            .fold(0.0_f32, |acc, &s| acc.max(s.abs()))
            .min(1.0);
        // Clamped to [0, 1] so the product stays within u16
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = (block_peak * f32::from(MAX_AMPLITUDE)).round() as u32;
        self.peak.fetch_max(scaled, Ordering::Relaxed);
    }

    /// Returns the peak since the previous call and resets it
    pub fn take_peak(&self) -> u16 {
        let peak = self.peak.swap(0, Ordering::Relaxed);
        u16::try_from(peak).unwrap_or(MAX_AMPLITUDE)
    }

    /// Clears any pending peak
    pub fn reset(&self) {
        self.peak.store(0, Ordering::Relaxed);
    }
}

/// Level as a percentage of full scale
pub fn level_percent(amplitude: u16) -> u8 {
    let percent = u32::from(amplitude.min(MAX_AMPLITUDE)) * 100 / u32::from(MAX_AMPLITUDE);
    u8::try_from(percent).unwrap_or(100)
}

/// Spawns a task reading the meter every `interval` and publishing the peak.
///
/// The task runs until aborted or until every receiver is dropped.
pub fn spawn_sampler(
    meter: AmplitudeMeter,
    interval: Duration,
    levels: watch::Sender<u16>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let amplitude = meter.take_peak();
            trace!(amplitude, "amplitude sample");
            if levels.send(amplitude).is_err() {
                break;
            }
        }
    })
}
