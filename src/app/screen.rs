use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::view::ScreenView;
use crate::audio::meter::spawn_sampler;
use crate::audio::CaptureBackend;
use crate::recorder::{RecorderController, SessionHandle};
use crate::sentiment::{SentimentClient, SentimentLabel, Transport};

/// Application state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    /// Waiting for a press
    Idle,
    /// Capturing audio
    Recording,
    /// Upload in flight; presses are ignored
    Processing,
}

/// Outcome of one analysis, delivered back to the UI loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenEvent {
    /// Recording that was analysed
    pub path: PathBuf,
    /// `None` when the analysis failed
    pub label: Option<SentimentLabel>,
}

enum Phase {
    Idle,
    Recording {
        session: SessionHandle,
        sampler: JoinHandle<()>,
        levels: watch::Receiver<u16>,
    },
    Processing {
        path: PathBuf,
        task: JoinHandle<()>,
    },
}

/// The record button and result display.
///
/// Owns the recorder, the amplitude sampler and the in-flight analysis;
/// dropping the screen cancels both tasks and releases the recorder.
pub struct Screen<B: CaptureBackend, T: Transport + 'static> {
    controller: RecorderController<B>,
    client: Arc<SentimentClient<T>>,
    level_interval: Duration,
    phase: Phase,
    result: String,
    events_tx: mpsc::UnboundedSender<ScreenEvent>,
    events_rx: mpsc::UnboundedReceiver<ScreenEvent>,
}

impl<B: CaptureBackend, T: Transport + 'static> Screen<B, T> {
    /// Creates an idle screen with an empty result
    pub fn new(
        controller: RecorderController<B>,
        client: SentimentClient<T>,
        level_interval: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            client: Arc::new(client),
            level_interval,
            phase: Phase::Idle,
            result: String::new(),
            events_tx,
            events_rx,
        }
    }

    /// Current state
    pub const fn state(&self) -> AppState {
        match self.phase {
            Phase::Idle => AppState::Idle,
            Phase::Recording { .. } => AppState::Recording,
            Phase::Processing { .. } => AppState::Processing,
        }
    }

    /// Session being recorded, if any
    pub const fn active_session(&self) -> Option<&SessionHandle> {
        self.controller.active_session()
    }

    /// Last displayed sentiment text
    pub fn result(&self) -> &str {
        &self.result
    }

    /// Handle a button press and return the resulting state
    ///
    /// Must be called from within a tokio runtime.
    pub fn press(&mut self) -> AppState {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => self.begin_recording(),
            Phase::Recording {
                session, sampler, ..
            } => self.finish_recording(&session, &sampler),
            busy @ Phase::Processing { .. } => {
                debug!("press ignored while analysis is in flight");
                self.phase = busy;
            }
        }
        self.state()
    }

    fn begin_recording(&mut self) {
        // start() logs its own failures; the screen stays Idle
        let Ok(session) = self.controller.start() else {
            return;
        };

        let (levels_tx, levels) = watch::channel(0);
        let sampler = spawn_sampler(self.controller.meter(), self.level_interval, levels_tx);

        info!(path = %session.path().display(), "Idle → Recording");
        self.phase = Phase::Recording {
            session,
            sampler,
            levels,
        };
    }

    fn finish_recording(&mut self, session: &SessionHandle, sampler: &JoinHandle<()>) {
        sampler.abort();

        match self.controller.stop(session) {
            Ok(path) => {
                info!(path = %path.display(), "Recording → Processing");
                let task = self.spawn_analysis(path.clone());
                self.phase = Phase::Processing { path, task };
            }
            Err(e) => {
                warn!("recording discarded: {}", e);
            }
        }
    }

    fn spawn_analysis(&self, path: PathBuf) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let analysed = path.clone();
            let label = tokio::task::spawn_blocking(move || client.analyze(&analysed))
                .await
                .unwrap_or_else(|e| {
                    error!("analysis task failed: {}", e);
                    None
                });

            if events.send(ScreenEvent { path, label }).is_err() {
                debug!("screen closed before analysis finished");
            }
        })
    }

    /// Wait for the next analysis outcome
    pub async fn next_event(&mut self) -> Option<ScreenEvent> {
        self.events_rx.recv().await
    }

    /// Apply an analysis outcome; returns true when the state changed
    pub fn apply(&mut self, event: ScreenEvent) -> bool {
        let matches = matches!(&self.phase, Phase::Processing { path, .. } if path == &event.path);
        if !matches {
            debug!(path = %event.path.display(), "ignoring stale analysis result");
            return false;
        }

        match event.label {
            Some(label) => {
                info!(sentiment = label.as_str(), "Processing → Idle");
                self.result = label.to_string();
            }
            None => info!("Processing → Idle (no result)"),
        }
        self.phase = Phase::Idle;
        true
    }

    /// Snapshot for rendering
    pub fn view(&self) -> ScreenView {
        let level = match &self.phase {
            Phase::Recording { levels, .. } => Some(*levels.borrow()),
            _ => None,
        };
        ScreenView::new(self.state(), self.result.clone(), level)
    }

    /// Cancel background work and release the recorder
    pub fn teardown(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {}
            Phase::Recording { sampler, .. } => {
                sampler.abort();
                info!("screen closed while recording");
            }
            Phase::Processing { task, .. } => {
                task.abort();
                info!("screen closed with analysis in flight");
            }
        }
        self.controller.release();
    }

    #[cfg(test)]
    fn processing_path(&self) -> Option<&std::path::Path> {
        match &self.phase {
            Phase::Processing { path, .. } => Some(path.as_path()),
            _ => None,
        }
    }
}

impl<B: CaptureBackend, T: Transport + 'static> Drop for Screen<B, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::MockCaptureBackend;
    use crate::audio::AmplitudeMeter;
    use crate::config::ApiConfig;
    use crate::permissions::MicrophonePermission;
    use crate::sentiment::transport::{MockTransport, TransportResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sentiment_screen_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    /// Backend that writes a small file on stop so the client can read it
    fn file_backend() -> MockCaptureBackend {
        let written = Arc::new(std::sync::Mutex::new(None::<PathBuf>));
        let on_start = Arc::clone(&written);
        let mut backend = MockCaptureBackend::new();
        backend.expect_start().returning(move |path| {
            *on_start.lock().unwrap() = Some(path.to_path_buf());
            Ok(())
        });
        backend.expect_stop().returning(move || {
            if let Some(path) = written.lock().unwrap().take() {
                std::fs::write(path, b"RIFF").unwrap();
            }
            Ok(())
        });
        backend.expect_meter().returning(AmplitudeMeter::new);
        backend
    }

    fn api() -> ApiConfig {
        ApiConfig {
            endpoint: "https://sentiment.test/v1/sentiment".to_owned(),
            token: "token".to_owned(),
            timeout_secs: None,
        }
    }

    fn screen_with(
        name: &str,
        backend: MockCaptureBackend,
        transport: MockTransport,
    ) -> Screen<MockCaptureBackend, MockTransport> {
        let controller =
            RecorderController::new(backend, test_dir(name), MicrophonePermission::Granted);
        Screen::new(
            controller,
            SentimentClient::new(transport, &api()),
            Duration::from_millis(150),
        )
    }

    fn transport_replying(bodies: Vec<(u16, &'static str)>) -> MockTransport {
        let calls = AtomicUsize::new(0);
        let mut transport = MockTransport::new();
        transport.expect_send().returning(move |_| {
            let (status, body) = bodies[calls.fetch_add(1, Ordering::SeqCst)];
            Ok(TransportResponse {
                status,
                body: body.to_owned(),
            })
        });
        transport
    }

    #[tokio::test]
    async fn test_press_cycle_displays_label() {
        let transport = transport_replying(vec![(200, r#"{"sentiment":"neutral"}"#)]);
        let mut screen = screen_with("cycle", file_backend(), transport);

        assert_eq!(screen.press(), AppState::Recording);
        let recorded = screen.active_session().unwrap().path().to_path_buf();

        assert_eq!(screen.press(), AppState::Processing);
        assert_eq!(screen.processing_path(), Some(recorded.as_path()));

        let event = screen.next_event().await.unwrap();
        assert_eq!(event.path, recorded);
        assert!(screen.apply(event));

        assert_eq!(screen.state(), AppState::Idle);
        assert_eq!(screen.result(), "neutral");
    }

    #[tokio::test]
    async fn test_press_while_processing_is_ignored() {
        let transport = transport_replying(vec![(200, r#"{"sentiment":"positive"}"#)]);
        let mut screen = screen_with("reentrant", file_backend(), transport);

        screen.press();
        screen.press();
        assert_eq!(screen.press(), AppState::Processing);
        assert_eq!(screen.press(), AppState::Processing);
        assert!(screen.active_session().is_none());

        let event = screen.next_event().await.unwrap();
        screen.apply(event);
        assert_eq!(screen.state(), AppState::Idle);
    }

    #[tokio::test]
    async fn test_failed_analysis_keeps_previous_result() {
        let transport = transport_replying(vec![
            (200, r#"{"sentiment":"positive"}"#),
            (500, "internal error"),
        ]);
        let mut screen = screen_with("failure", file_backend(), transport);

        screen.press();
        screen.press();
        let event = screen.next_event().await.unwrap();
        screen.apply(event);
        assert_eq!(screen.result(), "positive");

        screen.press();
        screen.press();
        let event = screen.next_event().await.unwrap();
        assert_eq!(event.label, None);
        screen.apply(event);

        assert_eq!(screen.state(), AppState::Idle);
        assert_eq!(screen.result(), "positive");
    }

    #[tokio::test]
    async fn test_failed_start_stays_idle() {
        let mut backend = MockCaptureBackend::new();
        backend
            .expect_start()
            .times(1)
            .returning(|_| Err(crate::audio::CaptureError::NoInputDevice));
        backend.expect_stop().never();
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let mut screen = screen_with("start_failure", backend, transport);

        assert_eq!(screen.press(), AppState::Idle);
        assert!(screen.view().button_enabled);
    }

    #[tokio::test]
    async fn test_stale_event_is_ignored() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let mut screen = screen_with("stale", MockCaptureBackend::new(), transport);

        let applied = screen.apply(ScreenEvent {
            path: PathBuf::from("/tmp/recording_1.wav"),
            label: Some(SentimentLabel::new("negative")),
        });

        assert!(!applied);
        assert_eq!(screen.result(), "");
    }

    #[tokio::test]
    async fn test_drop_while_recording_releases_backend() {
        let mut backend = MockCaptureBackend::new();
        backend.expect_start().times(1).returning(|_| Ok(()));
        backend.expect_stop().times(1).returning(|| Ok(()));
        backend.expect_meter().returning(AmplitudeMeter::new);
        let mut screen = screen_with("teardown", backend, MockTransport::new());

        screen.press();
        assert_eq!(screen.state(), AppState::Recording);
        drop(screen);
    }

    #[tokio::test]
    async fn test_view_reports_level_only_while_recording() {
        let transport = transport_replying(vec![(200, "{}")]);
        let mut screen = screen_with("level", file_backend(), transport);

        assert_eq!(screen.view().level, None);
        screen.press();
        assert_eq!(screen.view().level, Some(0));
        screen.press();
        assert_eq!(screen.view().level, None);
    }
}
