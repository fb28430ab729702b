use crate::error::PipelineError;
use base64::{Engine, engine::general_purpose::STANDARD};
use std::path::Path;

/// A finished clip encoded for transport.
///
/// Produced once per round trip and consumed once by the request builder.
/// The whole clip is buffered: captures are short by construction, so no
/// streamed upload is needed.
#[derive(Debug)]
pub struct SubmissionPayload {
    base64: String,
}

impl SubmissionPayload {
    /// Data URL form expected by the `video_url` content part.
    pub fn to_data_url(&self) -> String {
        format!("data:;base64,{}", self.base64)
    }
}

/// Read the capture file fully into memory and base64-encode it.
pub async fn encode(path: &Path) -> Result<SubmissionPayload, PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::FileUnreadable(format!("{}: {}", path.display(), e)))?;

    tracing::info!("Encoded {} byte clip for submission", bytes.len());
    Ok(SubmissionPayload {
        base64: STANDARD.encode(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_encode_produces_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let payload = encode(&path).await.unwrap();
        assert_eq!(payload.to_data_url(), "data:;base64,YWJj");
    }

    #[tokio::test]
    async fn test_missing_capture_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = encode(&dir.path().join("never-written.mp4")).await.unwrap_err();
        assert!(matches!(err, PipelineError::FileUnreadable(_)));
    }
}
