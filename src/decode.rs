use crate::audio::{self, AudioFormat};
use crate::error::PipelineError;
use crate::messages::PipelineEvent;
use crate::omni::protocol::ResponseFragment;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Where response fragments come from.
///
/// The network client implements this over its SSE stream; tests feed
/// canned sequences. `Ok(None)` means the underlying transport is exhausted.
#[async_trait]
pub trait FragmentSource {
    async fn next_fragment(&mut self) -> Result<Option<ResponseFragment>, PipelineError>;
}

/// Reassembles the spoken answer from an ordered fragment stream.
///
/// Text and transcript deltas are display-only and forwarded to the event
/// channel unbuffered. Audio deltas are decoded and appended strictly in
/// arrival order; each must decode fully before the next is read. The
/// accumulator is materialized into the WAV container exactly once, on the
/// completion marker. At most one artifact per round trip: exhaustion or any
/// failure before the marker leaves nothing on disk.
pub struct StreamDecoder {
    format: AudioFormat,
    output_path: PathBuf,
    events: mpsc::Sender<PipelineEvent>,
}

impl StreamDecoder {
    pub fn new(output_path: &Path, events: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            format: AudioFormat::default(),
            output_path: output_path.to_path_buf(),
            events,
        }
    }

    pub async fn decode<S: FragmentSource + Send>(
        mut self,
        source: &mut S,
    ) -> Result<PathBuf, PipelineError> {
        let mut pcm: Vec<u8> = Vec::new();

        loop {
            match source.next_fragment().await? {
                Some(ResponseFragment::TextDelta(text)) => {
                    self.observe(PipelineEvent::TextDelta(text)).await;
                }
                Some(ResponseFragment::TranscriptDelta(text)) => {
                    self.observe(PipelineEvent::TranscriptDelta(text)).await;
                }
                Some(ResponseFragment::AudioDelta(data)) => {
                    let bytes = STANDARD.decode(&data).map_err(|e| {
                        PipelineError::MalformedFragment(format!("bad audio base64: {e}"))
                    })?;
                    pcm.extend_from_slice(&bytes);
                }
                Some(ResponseFragment::UsageSummary(usage)) => {
                    tracing::info!("Usage: {usage}");
                }
                Some(ResponseFragment::End) => {
                    tracing::info!(
                        "Stream complete, {} bytes of audio accumulated",
                        pcm.len()
                    );
                    audio::wav::write_pcm(&self.output_path, &pcm, self.format)?;
                    return Ok(self.output_path);
                }
                None => {
                    return Err(PipelineError::StreamInterrupted(
                        "stream ended before completion marker".into(),
                    ));
                }
            }
        }
    }

    async fn observe(&mut self, event: PipelineEvent) {
        // Display-only; a departed observer must not fail the decode.
        let _ = self.events.send(event).await;
    }
}
