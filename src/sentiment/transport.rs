use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// One multipart upload with a single file part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Target URL
    pub url: String,
    /// Sent as `Authorization: Bearer <token>`
    pub bearer_token: String,
    /// Form field holding the file
    pub field_name: String,
    /// Filename reported in the part header
    pub file_name: String,
    /// MIME type of the part
    pub content_type: String,
    /// File contents
    pub body: Vec<u8>,
}

/// Status and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl TransportResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failures (no response received)
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Multipart part was rejected (bad MIME type)
    #[error("invalid multipart part: {0}")]
    Part(String),

    /// Connection, TLS, timeout or body read failure
    #[error("request failed: {0}")]
    Request(String),
}

/// Sends an [`UploadRequest`] and returns the raw response.
///
/// Blocking; callers run it off the UI loop.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Perform the request
    ///
    /// # Errors
    /// Returns error when no HTTP response was obtained
    fn send(&self, request: &UploadRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` blocking transport
pub struct ReqwestTransport {
    timeout: Option<Duration>,
    /// Built on first use, from the blocking pool thread that sends
    http: OnceLock<Client>,
}

impl ReqwestTransport {
    /// Creates a transport; `None` keeps reqwest's default timeout
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            http: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, TransportError> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(self.http.get_or_init(|| client))
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &UploadRequest) -> Result<TransportResponse, TransportError> {
        let part = Part::bytes(request.body.clone())
            .file_name(request.file_name.clone())
            .mime_str(&request.content_type)
            .map_err(|e| TransportError::Part(e.to_string()))?;
        let form = Form::new().part(request.field_name.clone(), part);

        tracing::debug!(
            url = %request.url,
            bytes = request.body.len(),
            "sending multipart upload"
        );

        let response = self
            .client()?
            .post(&request.url)
            .bearer_auth(&request.bearer_token)
            .multipart(form)
            .send()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn request(url: &str) -> UploadRequest {
        UploadRequest {
            url: url.to_owned(),
            bearer_token: "token".to_owned(),
            field_name: "file".to_owned(),
            file_name: "recording.wav".to_owned(),
            content_type: "audio/wav".to_owned(),
            body: vec![0, 1, 2, 3],
        }
    }

    #[test]
    fn test_success_range() {
        let ok = |status| TransportResponse {
            status,
            body: String::new(),
        };
        assert!(ok(200).is_success());
        assert!(ok(204).is_success());
        assert!(!ok(199).is_success());
        assert!(!ok(301).is_success());
        assert!(!ok(500).is_success());
    }

    #[test]
    fn test_invalid_mime_is_part_error() {
        let transport = ReqwestTransport::new(None);
        let mut req = request("http://127.0.0.1:9/sentiment");
        req.content_type = "not a mime".to_owned();
        assert!(matches!(
            transport.send(&req),
            Err(TransportError::Part(_))
        ));
    }

    /// Serves one request on a local listener, answering with `reply`.
    /// Returns the URL and a handle yielding the raw request text.
    fn serve_once(reply: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/sentiment", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&raw) {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (url, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let headers = text[..header_end].to_ascii_lowercase();
        let body_len = raw.len() - (header_end + 4);
        headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .map_or_else(|| text.ends_with("0\r\n\r\n"), |len| body_len >= len)
    }

    #[test]
    fn test_wire_format() {
        let (url, server) = serve_once(r#"{"sentiment":"positive"}"#);
        let transport = ReqwestTransport::new(Some(Duration::from_secs(5)));
        let mut req = request(&url);
        req.bearer_token = "tok".to_owned();

        let response = transport.send(&req).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"sentiment":"positive"}"#);

        let raw = server.join().unwrap();
        let lower = raw.to_ascii_lowercase();
        assert!(raw.starts_with("POST /sentiment HTTP/1.1\r\n"));
        assert!(lower.contains("authorization: bearer tok\r\n"));
        assert!(lower.contains("content-type: multipart/form-data; boundary="));
        assert!(raw.contains(
            "Content-Disposition: form-data; name=\"file\"; filename=\"recording.wav\"\r\n"
        ));
        assert!(raw.contains("Content-Type: audio/wav\r\n"));
        assert_eq!(raw.matches("Content-Disposition: form-data").count(), 1);
    }

    #[test]
    fn test_connection_refused_is_request_error() {
        // Bind then drop to get a local port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let transport = ReqwestTransport::new(Some(Duration::from_secs(2)));
        let result = transport.send(&request(&format!("http://127.0.0.1:{port}/sentiment")));
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
