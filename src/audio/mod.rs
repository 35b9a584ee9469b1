/// Capture backend trait and the CPAL implementation
pub mod capture;
/// Amplitude metering and the periodic sampler task
pub mod meter;

pub use capture::{CaptureBackend, CaptureError, CpalCapture, AUDIO_MIME_TYPE};
pub use meter::AmplitudeMeter;
