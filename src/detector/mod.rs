//! Decode-pipeline seam.
//!
//! The hub never decodes images itself; it consumes the pipeline through a
//! single call, `detect(image) -> text | none`. Backends are selected by
//! configuration: `remote` forwards the image to an external decode service,
//! `disabled` always reports nothing found.

mod disabled;
mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DetectorConfig;

pub use disabled::DisabledDetector;
pub use remote::RemoteDetector;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Decode request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Decode backend misconfigured: {0}")]
    Configuration(String),

    #[error("Decode backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Barcode/QR decode pipeline, consumed as an external collaborator.
#[async_trait]
pub trait CodeDetector: Send + Sync {
    /// Attempt to decode a code from `image`. `Ok(None)` means the image was
    /// processed but contained no recognizable code.
    async fn detect(
        &self,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<Option<String>, DetectorError>;

    /// Backend name, for health reporting and metrics labels.
    fn name(&self) -> &str;
}

/// Create a detector backend based on configuration.
///
/// - `"remote"`: forwards images to the decode service at `endpoint`
/// - `"disabled"` (default): always reports no code found
pub fn create_detector(config: &DetectorConfig) -> Result<Arc<dyn CodeDetector>, DetectorError> {
    match config.backend.as_str() {
        "remote" => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                DetectorError::Configuration(
                    "detector.endpoint is required for the remote backend".to_string(),
                )
            })?;
            let detector = RemoteDetector::new(endpoint, config.timeout_ms)?;
            tracing::info!(backend = "remote", "Detector backend initialized");
            Ok(Arc::new(detector))
        }
        "disabled" => {
            tracing::info!(backend = "disabled", "Detector backend initialized");
            Ok(Arc::new(DisabledDetector))
        }
        other => Err(DetectorError::Configuration(format!(
            "unknown detector backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_defaults_to_disabled() {
        let config = DetectorConfig::default();
        let detector = create_detector(&config).unwrap();
        assert_eq!(detector.name(), "disabled");
    }

    #[test]
    fn factory_rejects_remote_without_endpoint() {
        let config = DetectorConfig {
            backend: "remote".to_string(),
            endpoint: None,
            timeout_ms: 1000,
        };
        assert!(matches!(
            create_detector(&config),
            Err(DetectorError::Configuration(_))
        ));
    }

    #[test]
    fn factory_rejects_unknown_backend() {
        let config = DetectorConfig {
            backend: "zxing".to_string(),
            endpoint: None,
            timeout_ms: 1000,
        };
        assert!(matches!(
            create_detector(&config),
            Err(DetectorError::Configuration(_))
        ));
    }
}
