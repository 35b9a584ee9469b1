use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::audio::{AmplitudeMeter, CaptureBackend, CaptureError};
use crate::permissions::MicrophonePermission;

/// Errors returned by [`RecorderController`]
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Microphone permission was not granted
    #[error("microphone permission denied")]
    PermissionDenied,

    /// A session is already active
    #[error("a recording session is already active")]
    AlreadyRecording,

    /// No active session, or the handle does not match it
    #[error("no matching active recording session")]
    InvalidState,

    /// Capture backend could not be acquired, configured or finalized
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(#[source] CaptureError),

    /// Recordings directory could not be created
    #[error("failed to prepare recordings directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifies the active recording session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    id: u64,
    path: PathBuf,
}

impl SessionHandle {
    /// Output file of this session
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Monotonic session number
    pub const fn id(&self) -> u64 {
        self.id
    }
}

/// Owns the capture backend and enforces a single active session
pub struct RecorderController<B: CaptureBackend> {
    backend: B,
    directory: PathBuf,
    permission: MicrophonePermission,
    active: Option<SessionHandle>,
    next_id: u64,
    last_stamp: u128,
}

impl<B: CaptureBackend> RecorderController<B> {
    /// Creates an idle controller writing into `directory`
    pub fn new(backend: B, directory: PathBuf, permission: MicrophonePermission) -> Self {
        Self {
            backend,
            directory,
            permission,
            active: None,
            next_id: 1,
            last_stamp: 0,
        }
    }

    /// Whether a session is active
    pub const fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The active session, if any
    pub const fn active_session(&self) -> Option<&SessionHandle> {
        self.active.as_ref()
    }

    /// Meter fed by the backend while recording
    pub fn meter(&self) -> AmplitudeMeter {
        self.backend.meter()
    }

    /// Start a new session on a freshly allocated file
    ///
    /// # Errors
    /// Returns `PermissionDenied`, `AlreadyRecording`, `DeviceUnavailable` or
    /// `Io`; the controller is unchanged on error
    pub fn start(&mut self) -> Result<SessionHandle, RecorderError> {
        let result = self.try_start();
        if let Err(e) = &result {
            error!("failed to start recording: {}", e);
        }
        result
    }

    fn try_start(&mut self) -> Result<SessionHandle, RecorderError> {
        if !self.permission.is_granted() {
            return Err(RecorderError::PermissionDenied);
        }
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        fs::create_dir_all(&self.directory)?;
        let (path, stamp) = self.allocate_path(unix_millis());

        self.backend
            .start(&path)
            .map_err(RecorderError::DeviceUnavailable)?;

        let handle = SessionHandle {
            id: self.next_id,
            path,
        };
        self.next_id += 1;
        self.last_stamp = stamp;
        self.active = Some(handle.clone());

        info!(session = handle.id, path = %handle.path.display(), "recording started");
        Ok(handle)
    }

    /// Stop the active session and return its finalized file
    ///
    /// # Errors
    /// Returns `InvalidState` if `handle` is not the active session, or
    /// `DeviceUnavailable` if the backend failed to finalize (the controller is
    /// Idle afterwards either way)
    pub fn stop(&mut self, handle: &SessionHandle) -> Result<PathBuf, RecorderError> {
        let active = match self.active.take() {
            Some(active) if active.id == handle.id => active,
            Some(active) => {
                warn!(
                    active = active.id,
                    requested = handle.id,
                    "stop requested for a stale session"
                );
                self.active = Some(active);
                return Err(RecorderError::InvalidState);
            }
            None => {
                warn!("stop requested while idle");
                return Err(RecorderError::InvalidState);
            }
        };

        if let Err(e) = self.backend.stop() {
            error!(session = active.id, "failed to finalize recording: {}", e);
            return Err(RecorderError::DeviceUnavailable(e));
        }

        info!(session = active.id, path = %active.path.display(), "recording stopped");
        Ok(active.path)
    }

    /// Stop any active session, discarding the result
    pub fn release(&mut self) {
        if let Some(active) = self.active.take() {
            info!(session = active.id, "releasing active recording");
            if let Err(e) = self.backend.stop() {
                warn!(session = active.id, "failed to release capture: {}", e);
            }
        }
    }

    /// Pick `recording_<millis>.wav`, bumping the stamp past previous sessions
    /// and existing files
    fn allocate_path(&self, now_millis: u128) -> (PathBuf, u128) {
        let mut stamp = now_millis.max(self.last_stamp + 1);
        loop {
            let path = self.directory.join(format!("recording_{stamp}.wav"));
            if !path.exists() {
                return (path, stamp);
            }
            stamp += 1;
        }
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}
