//! Backend endpoint for violation records

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ReportingConfig;
use crate::shared::ViolationReport;

/// JSON body posted for each violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub video_id: String,
    pub violation_type: String,
    /// ISO 8601 detection time
    pub timestamp: String,
    pub confidence: f32,
    pub speed: f64,
    pub vehicle_number: String,
    /// Evidence file name inside the evidence directory
    pub evidence_image: String,
    pub vehicle_type: String,
}

impl ViolationRecord {
    pub fn from_report(report: &ViolationReport, evidence_image: String, confidence: f32) -> Self {
        Self {
            video_id: report.stream_id.clone(),
            violation_type: report.kind.label().to_string(),
            timestamp: report.detected_at.to_rfc3339_opts(SecondsFormat::Millis, false),
            confidence,
            speed: report.speed,
            vehicle_number: report.vehicle_number.clone(),
            evidence_image,
            vehicle_type: report.vehicle_class.label().to_string(),
        }
    }
}

/// Receiver of violation records
#[async_trait]
pub trait ViolationBackend: Send + Sync {
    async fn submit(&self, record: &ViolationRecord) -> Result<()>;
}

/// Posts records as JSON over HTTP
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpBackend {
    pub fn new(settings: &ReportingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, settings.backend_url.clone()))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ViolationBackend for HttpBackend {
    async fn submit(&self, record: &ViolationRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .with_context(|| format!("Failed to reach backend {}", self.url))?;

        if !response.status().is_success() {
            anyhow::bail!("Backend rejected record with status {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ViolationEvent, ViolationKind};
    use crate::vision::ObjectClass;
    use image::RgbImage;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn report() -> ViolationReport {
        let event = ViolationEvent {
            track_id: 4,
            kind: ViolationKind::NoHelmet,
            speed: 12.5,
            plate_guess: Some("KA01AB1234".to_string()),
            vehicle_class: ObjectClass::Motorcycle,
            heuristic: true,
        };
        ViolationReport::from_event("cam_1", &event, RgbImage::new(1, 1))
    }

    fn local_backend(url: String) -> HttpBackend {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        HttpBackend::with_client(client, url)
    }

    /// Accept one request and answer with `status`, returning the raw request
    async fn serve_once(listener: TcpListener, status: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + length {
                    break;
                }
            }
        }
        let reply = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        socket.write_all(reply.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    #[test]
    fn test_client_built_from_settings() {
        assert!(HttpBackend::new(&ReportingConfig::default()).is_ok());
    }

    #[test]
    fn test_record_fields() {
        let record = ViolationRecord::from_report(&report(), "cam_1_NO_HELMET_4.jpg".to_string(), 0.95);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["video_id"], "cam_1");
        assert_eq!(json["violation_type"], "NO HELMET");
        assert_eq!(json["vehicle_number"], "KA01AB1234");
        assert_eq!(json["evidence_image"], "cam_1_NO_HELMET_4.jpg");
        assert_eq!(json["vehicle_type"], "MOTORCYCLE");
        assert_eq!(json["speed"], 12.5);
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_http_backend_posts_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "201 Created"));

        let backend = local_backend(format!("http://{addr}/api/violations/internal/record"));
        let record = ViolationRecord::from_report(&report(), "e.jpg".to_string(), 0.95);
        backend.submit(&record).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/violations/internal/record"));
        assert!(request.contains("\"violation_type\":\"NO HELMET\""));
    }

    #[tokio::test]
    async fn test_http_backend_rejects_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "500 Internal Server Error"));

        let backend = local_backend(format!("http://{addr}/"));
        let record = ViolationRecord::from_report(&report(), "e.jpg".to_string(), 0.95);
        assert!(backend.submit(&record).await.is_err());
        server.await.unwrap();
    }
}
