use async_trait::async_trait;

use super::{CodeDetector, DetectorError};

/// No-op backend used when no decode service is configured. Uploads are
/// accepted but always report "no code found".
pub struct DisabledDetector;

#[async_trait]
impl CodeDetector for DisabledDetector {
    async fn detect(
        &self,
        _image: Vec<u8>,
        _content_type: &str,
    ) -> Result<Option<String>, DetectorError> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
