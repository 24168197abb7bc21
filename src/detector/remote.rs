use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::metrics::DetectorMetrics;

use super::{CodeDetector, DetectorError};

/// Response shape of the remote decode service.
#[derive(Debug, Deserialize)]
struct DecodeResponse {
    status: String,
    #[serde(default)]
    data: Option<String>,
}

/// Backend that forwards the uploaded image to an external decode service
/// over HTTP multipart and relays its verdict.
pub struct RemoteDetector {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteDetector {
    pub fn new(endpoint: String, timeout_ms: u64) -> Result<Self, DetectorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CodeDetector for RemoteDetector {
    async fn detect(
        &self,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<Option<String>, DetectorError> {
        let part = Part::bytes(image)
            .file_name("photo")
            .mime_str(content_type)
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;
        let form = Form::new().part("photo", part);

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .inspect_err(|_| DetectorMetrics::record_error())?;

        let body: DecodeResponse = response.json().await.inspect_err(|_| {
            DetectorMetrics::record_error();
        })?;
        let latency = start.elapsed().as_secs_f64();

        match body.status.as_str() {
            "success" => {
                let text = body.data.ok_or_else(|| {
                    DetectorMetrics::record_error();
                    DetectorError::InvalidResponse(
                        "success response without decoded data".to_string(),
                    )
                })?;
                DetectorMetrics::record_decoded(self.name(), latency);
                tracing::debug!(latency_secs = latency, "Remote decode succeeded");
                Ok(Some(text))
            }
            "not_found" => {
                DetectorMetrics::record_not_found(self.name(), latency);
                Ok(None)
            }
            other => {
                DetectorMetrics::record_error();
                Err(DetectorError::InvalidResponse(format!(
                    "unexpected status: {}",
                    other
                )))
            }
        }
    }

    fn name(&self) -> &str {
        "remote"
    }
}
