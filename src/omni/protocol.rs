//! Wire types for the OpenAI-compatible omni completion endpoint.
//!
//! One streamed request per round trip:
//!
//! 1. POST `{base_url}/chat/completions` with the clip embedded as a
//!    base64 `video_url` content part and `modalities: ["text", "audio"]`
//! 2. Receive SSE chunks carrying text deltas, audio transcript deltas and
//!    base64 audio deltas, in order
//! 3. A trailing usage-only chunk, then the `[DONE]` marker

use crate::config::Config;
use crate::submission::SubmissionPayload;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request (sent to the endpoint)
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Both modalities are requested; text arrives ahead of the audio it narrates.
    pub modalities: Vec<String>,
    pub audio: AudioParams,
    pub stream: bool,
    pub stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    VideoUrl { video_url: VideoUrl },
}

#[derive(Debug, Serialize)]
pub struct VideoUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AudioParams {
    pub voice: String,
    /// Always "wav": the only container the decoder materializes.
    pub format: String,
}

#[derive(Debug, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// Assemble the single request a round trip makes.
pub fn build_request(config: &Config, payload: &SubmissionPayload) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: vec![
            Message {
                role: "system".into(),
                content: vec![ContentPart::Text {
                    text: config.system_prompt.clone(),
                }],
            },
            Message {
                role: "user".into(),
                content: vec![
                    ContentPart::VideoUrl {
                        video_url: VideoUrl {
                            url: payload.to_data_url(),
                        },
                    },
                    ContentPart::Text {
                        text: config.question.clone(),
                    },
                ],
            },
        ],
        modalities: vec!["text".into(), "audio".into()],
        audio: AudioParams {
            voice: config.voice.clone(),
            format: "wav".into(),
        },
        stream: true,
        stream_options: StreamOptions {
            include_usage: true,
        },
    }
}

// ============================================================================
// Response (streamed SSE chunks)
// ============================================================================

/// One unit of the response stream, after SSE framing and JSON parsing.
///
/// `AudioDelta` carries the transport encoding (base64); the decoder is the
/// one place it is decoded, so a corrupt payload fails exactly where the
/// bytes would be appended.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFragment {
    TextDelta(String),
    TranscriptDelta(String),
    AudioDelta(String),
    UsageSummary(serde_json::Value),
    End,
}

/// A raw chat-completion chunk as it appears on the wire. Unknown fields and
/// unknown chunk shapes deserialize to nothing and are skipped downstream.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub audio: Option<AudioChunk>,
}

#[derive(Debug, Deserialize)]
pub struct AudioChunk {
    /// Base64 PCM bytes.
    #[serde(default)]
    pub data: Option<String>,
    /// Text the audio is speaking.
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ChatChunk {
    /// Flatten a chunk into the fragments it carries, preserving order.
    ///
    /// A single chunk can hold several: a transcript delta and its audio
    /// bytes often ride together. Chunks carrying nothing we understand
    /// yield an empty vec and are a no-op for the decoder.
    pub fn into_fragments(self) -> Vec<ResponseFragment> {
        let mut fragments = Vec::new();

        for choice in self.choices {
            if let Some(text) = choice.delta.content {
                fragments.push(ResponseFragment::TextDelta(text));
            }
            if let Some(audio) = choice.delta.audio {
                if let Some(transcript) = audio.transcript {
                    fragments.push(ResponseFragment::TranscriptDelta(transcript));
                }
                if let Some(data) = audio.data {
                    fragments.push(ResponseFragment::AudioDelta(data));
                }
            }
        }

        if let Some(usage) = self.usage {
            fragments.push(ResponseFragment::UsageSummary(usage));
        }

        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments_of(json: &str) -> Vec<ResponseFragment> {
        serde_json::from_str::<ChatChunk>(json)
            .unwrap()
            .into_fragments()
    }

    #[test]
    fn test_text_delta_chunk() {
        let fragments =
            fragments_of(r#"{"choices":[{"delta":{"content":"hello"},"index":0}]}"#);
        assert_eq!(fragments, vec![ResponseFragment::TextDelta("hello".into())]);
    }

    #[test]
    fn test_audio_chunk_keeps_transcript_before_data() {
        let fragments = fragments_of(
            r#"{"choices":[{"delta":{"audio":{"transcript":"hi","data":"AAECAw=="}}}]}"#,
        );
        assert_eq!(
            fragments,
            vec![
                ResponseFragment::TranscriptDelta("hi".into()),
                ResponseFragment::AudioDelta("AAECAw==".into()),
            ]
        );
    }

    #[test]
    fn test_usage_only_chunk() {
        let fragments =
            fragments_of(r#"{"choices":[],"usage":{"total_tokens":42}}"#);
        assert!(matches!(
            fragments.as_slice(),
            [ResponseFragment::UsageSummary(_)]
        ));
    }

    #[test]
    fn test_unknown_chunk_shape_is_a_noop() {
        let fragments = fragments_of(
            r#"{"choices":[{"delta":{"reasoning":"...","role":"assistant"}}]}"#,
        );
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn test_build_request_embeds_clip_and_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, b"abc").await.unwrap();
        let payload = crate::submission::encode(&path).await.unwrap();

        let config = Config {
            api_key: "sk-test".into(),
            ..Config::default()
        };
        let value = serde_json::to_value(build_request(&config, &payload)).unwrap();

        assert_eq!(value["model"], "qwen2.5-omni-7b");
        assert_eq!(value["modalities"], serde_json::json!(["text", "audio"]));
        assert_eq!(value["audio"]["voice"], "Chelsie");
        assert_eq!(value["audio"]["format"], "wav");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"][0]["type"], "video_url");
        assert_eq!(
            value["messages"][1]["content"][0]["video_url"]["url"],
            "data:;base64,YWJj"
        );
        assert_eq!(value["stream"], true);
        assert_eq!(value["stream_options"]["include_usage"], true);
    }
}
