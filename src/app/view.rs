use super::screen::AppState;
use crate::audio::meter::level_percent;

/// Button label while idle
pub const RECORD_LABEL: &str = "Record Audio";
/// Button label while recording
pub const STOP_LABEL: &str = "Stop Recording";

/// What the surfaces render: one button and one result line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenView {
    /// State the view was taken in
    pub state: AppState,
    /// Button caption
    pub button_label: &'static str,
    /// False while an analysis is in flight
    pub button_enabled: bool,
    /// Last sentiment label, possibly empty
    pub result_text: String,
    /// Input level in percent while recording
    pub level: Option<u8>,
}

impl ScreenView {
    /// Builds the view for a state, result and raw amplitude
    pub fn new(state: AppState, result_text: String, amplitude: Option<u16>) -> Self {
        let button_label = match state {
            AppState::Recording => STOP_LABEL,
            AppState::Idle | AppState::Processing => RECORD_LABEL,
        };
        Self {
            state,
            button_label,
            button_enabled: state != AppState::Processing,
            result_text,
            level: amplitude.map(level_percent),
        }
    }

    /// One-line status for the menubar
    pub fn status_text(&self) -> String {
        match (self.state, self.level) {
            (AppState::Idle, _) => "Ready".to_owned(),
            (AppState::Recording, Some(level)) => format!("Recording… level {level}%"),
            (AppState::Recording, None) => "Recording…".to_owned(),
            (AppState::Processing, _) => "Analyzing…".to_owned(),
        }
    }

    /// Result line for the menubar
    pub fn result_line(&self) -> String {
        if self.result_text.is_empty() {
            "Sentiment: –".to_owned()
        } else {
            format!("Sentiment: {}", self.result_text)
        }
    }
}
