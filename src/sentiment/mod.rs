/// Sentiment API client and response parsing
pub mod client;
/// HTTP transport seam
pub mod transport;

pub use client::{parse_sentiment, SentimentClient, SentimentError, SentimentLabel};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse, UploadRequest};
