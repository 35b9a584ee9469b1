//! Sentiment Recorder - record a voice clip and show its sentiment
//!
//! This library exports core modules for testing and reuse by the binary.

/// Record button state machine and view
pub mod app;
/// Audio capture and metering
pub mod audio;
/// Configuration management
pub mod config;
/// Input handling (global hotkey)
pub mod input;
/// Microphone permission check
pub mod permissions;
/// Recording session controller
pub mod recorder;
/// Sentiment API client
pub mod sentiment;
/// Logging setup
pub mod telemetry;
/// Menubar surface
pub mod tray;
