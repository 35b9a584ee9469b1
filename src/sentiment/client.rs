use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

use super::transport::{Transport, TransportError, UploadRequest};
use crate::audio::AUDIO_MIME_TYPE;
use crate::config::ApiConfig;

/// Form field carrying the recording
pub const UPLOAD_FIELD_NAME: &str = "file";
/// Filename sent in the part header
pub const UPLOAD_FILE_NAME: &str = "recording.wav";

/// Longest slice of an error body kept in logs
const MAX_LOGGED_BODY: usize = 200;

/// Sentiment classification returned by the API, possibly empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentimentLabel(String);

impl SentimentLabel {
    /// Wraps a label string
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Label text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the response carried no usable `sentiment`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reasons an analysis produced no label
#[derive(Debug, Error)]
pub enum SentimentError {
    /// Recording could not be read
    #[error("failed to read recording {}: {source}", path.display())]
    ReadAudio {
        /// File that was requested
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// No HTTP response
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-2xx response
    #[error("sentiment API returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// 2xx response whose body is not JSON
    #[error("sentiment API returned a non-JSON body: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// Uploads recordings to the sentiment API
pub struct SentimentClient<T: Transport> {
    transport: T,
    endpoint: String,
    token: String,
}

impl<T: Transport> SentimentClient<T> {
    /// Creates a client for the configured endpoint and token
    pub fn new(transport: T, api: &ApiConfig) -> Self {
        Self {
            transport,
            endpoint: api.endpoint.clone(),
            token: api.token.clone(),
        }
    }

    /// Analyze a finished recording; failures are logged and yield `None`
    pub fn analyze(&self, path: &Path) -> Option<SentimentLabel> {
        let _span = tracing::info_span!("analyze", path = %path.display()).entered();
        let start = std::time::Instant::now();

        match self.try_analyze(path) {
            Ok(label) => {
                info!(
                    sentiment = label.as_str(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "sentiment analysis complete"
                );
                Some(label)
            }
            Err(e) => {
                error!("failed to analyze audio sentiment: {}", e);
                None
            }
        }
    }

    /// Analyze a finished recording
    ///
    /// # Errors
    /// Returns error if the file is unreadable, the request fails, the status
    /// is not 2xx or the body is not JSON
    pub fn try_analyze(&self, path: &Path) -> Result<SentimentLabel, SentimentError> {
        let body = std::fs::read(path).map_err(|source| SentimentError::ReadAudio {
            path: path.to_path_buf(),
            source,
        })?;

        let request = UploadRequest {
            url: self.endpoint.clone(),
            bearer_token: self.token.clone(),
            field_name: UPLOAD_FIELD_NAME.to_owned(),
            file_name: UPLOAD_FILE_NAME.to_owned(),
            content_type: AUDIO_MIME_TYPE.to_owned(),
            body,
        };

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(SentimentError::Status {
                status: response.status,
                body: truncate(&response.body, MAX_LOGGED_BODY),
            });
        }

        parse_sentiment(&response.body)
    }
}

impl<T: Transport> fmt::Debug for SentimentClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentimentClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Extract the `sentiment` field from a JSON response body.
///
/// Missing or null fields and non-object bodies give an empty label; numbers
/// and booleans are rendered as text.
///
/// # Errors
/// Returns `MalformedResponse` if the body is not JSON
pub fn parse_sentiment(body: &str) -> Result<SentimentLabel, SentimentError> {
    let value: Value = serde_json::from_str(body)?;
    let label = match value.get("sentiment") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Ok(SentimentLabel(label))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
