//! Networked camera: one blocking HTTP GET per frame (e.g. an ESP32-CAM `/capture` endpoint).

use crate::frame::Frame;
use crate::source::{CaptureError, FrameSource};
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("snapshot larger than {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("reading snapshot body: {0}")]
    Body(std::io::Error),
}

/// Snapshots above this are rejected before decoding.
pub const DEFAULT_MAX_SNAPSHOT_BYTES: u64 = 16 * 1024 * 1024;

/// Pulls still frames from a fixed URL.
pub struct HttpSnapshotSource {
    client: reqwest::blocking::Client,
    url: String,
    max_bytes: u64,
    sequence: u32,
}

impl HttpSnapshotSource {
    /// Build a client with an explicit per-request timeout.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        tracing::info!(url, timeout_ms = timeout.as_millis() as u64, "networked camera configured");
        Ok(Self {
            client,
            url: url.to_string(),
            max_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
            sequence: 0,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn fetch(&self) -> Result<Vec<u8>, HttpError> {
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }
        let too_large = HttpError::TooLarge {
            limit: self.max_bytes,
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(too_large);
        }

        // Content-Length may be absent or wrong; cap the read itself too.
        let mut body = Vec::new();
        response
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(HttpError::Body)?;
        if body.len() as u64 > self.max_bytes {
            return Err(too_large);
        }
        Ok(body)
    }
}

impl FrameSource for HttpSnapshotSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.sequence = self.sequence.wrapping_add(1);
        let body = self.fetch()?;
        tracing::trace!(bytes = body.len(), seq = self.sequence, "snapshot fetched");
        Ok(Frame::decode(&body, self.sequence)?)
    }

    fn describe(&self) -> String {
        format!("networked camera {}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::net::TcpListener;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn source(server: &MockServer) -> HttpSnapshotSource {
        HttpSnapshotSource::new(&server.url("/capture"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_snapshot_decodes_to_rgb_frame() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/capture");
            then.status(200)
                .header("content-type", "image/png")
                .body(png(6, 4));
        });

        let mut source = source(&server);
        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();

        mock.assert_hits(2);
        assert_eq!((first.width, first.height), (6, 4));
        assert_eq!(&first.data[..3], &[10, 20, 30]);
        assert_eq!(second.sequence, first.sequence + 1);
    }

    #[test]
    fn test_malformed_payload_is_transient() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/capture");
            then.status(200).body("definitely not a jpeg");
        });

        let err = source(&server).next_frame().unwrap_err();
        assert!(matches!(err, CaptureError::Frame(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_status_is_transient() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/capture");
            then.status(503);
        });

        let err = source(&server).next_frame().unwrap_err();
        assert!(matches!(err, CaptureError::Http(HttpError::Status(503))));
        assert!(err.is_transient());
    }

    #[test]
    fn test_oversized_snapshot_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/capture");
            then.status(200).body(vec![0u8; 4096]);
        });

        let mut source = source(&server).with_max_bytes(1024);
        let err = source.next_frame().unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Http(HttpError::TooLarge { limit: 1024 })
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_snapshot_at_limit_is_accepted() {
        let body = png(2, 2);
        let limit = body.len() as u64;
        let server = MockServer::start();
        server.mock(move |when, then| {
            when.method(GET).path("/capture");
            then.status(200).body(body);
        });

        let mut source = source(&server).with_max_bytes(limit);
        assert_eq!(source.next_frame().unwrap().width, 2);
    }

    #[test]
    fn test_unreachable_endpoint_is_transient() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/capture");
        let mut source = HttpSnapshotSource::new(&url, Duration::from_millis(500)).unwrap();
        let err = source.next_frame().unwrap_err();
        assert!(matches!(err, CaptureError::Http(HttpError::Request(_))));
        assert!(err.is_transient());
    }
}
