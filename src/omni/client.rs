use crate::decode::FragmentSource;
use crate::error::PipelineError;
use crate::omni::protocol::{ChatChunk, ChatRequest, ResponseFragment};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::timeout;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, PipelineError>> + Send>>;

/// Client for the OpenAI-compatible omni completion endpoint.
#[derive(Clone)]
pub struct OmniClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    idle_timeout: Duration,
}

impl OmniClient {
    pub fn new(base_url: String, api_key: String, idle_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            idle_timeout,
        }
    }

    /// Submit the request and return the response fragment stream.
    ///
    /// Connection failures and error statuses are interruptions of the
    /// (not yet started) stream; there is no retry.
    pub async fn ask(&self, request: &ChatRequest) -> Result<SseFragmentSource, PipelineError> {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PipelineError::StreamInterrupted(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::StreamInterrupted(format!(
                "HTTP {status}: {}",
                body.trim()
            )));
        }

        let bytes = response.bytes_stream().map(|item| {
            item.map(|b| b.to_vec())
                .map_err(|e| PipelineError::StreamInterrupted(e.to_string()))
        });

        Ok(SseFragmentSource::new(Box::pin(bytes), self.idle_timeout))
    }
}

/// Incremental SSE parser over the response byte stream.
///
/// Frames `data:` lines out of arbitrarily split byte chunks, maps `[DONE]`
/// to `ResponseFragment::End` and everything else through the chunk JSON.
/// One wire chunk can yield several fragments; they are queued and handed
/// out strictly in arrival order.
pub struct SseFragmentSource {
    stream: ByteStream,
    buf: Vec<u8>,
    pending: VecDeque<ResponseFragment>,
    done: bool,
    idle_timeout: Duration,
}

impl SseFragmentSource {
    pub fn new(stream: ByteStream, idle_timeout: Duration) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            pending: VecDeque::new(),
            done: false,
            idle_timeout,
        }
    }

    /// Consume every complete line sitting in the buffer.
    fn drain_lines(&mut self) -> Result<(), PipelineError> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.parse_line(&line[..line.len() - 1])?;
        }
        Ok(())
    }

    fn parse_line(&mut self, line: &[u8]) -> Result<(), PipelineError> {
        let line = std::str::from_utf8(line)
            .map_err(|e| PipelineError::MalformedFragment(format!("non-utf8 line: {e}")))?
            .trim_end_matches('\r');

        let Some(data) = line.strip_prefix("data:") else {
            // Blank keep-alive separators and comment lines carry nothing.
            return Ok(());
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.pending.push_back(ResponseFragment::End);
            self.done = true;
            return Ok(());
        }

        let chunk: ChatChunk = serde_json::from_str(data)
            .map_err(|e| PipelineError::MalformedFragment(format!("bad chunk json: {e}")))?;
        self.pending.extend(chunk.into_fragments());
        Ok(())
    }
}

#[async_trait]
impl FragmentSource for SseFragmentSource {
    async fn next_fragment(&mut self) -> Result<Option<ResponseFragment>, PipelineError> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Ok(Some(fragment));
            }
            if self.done {
                return Ok(None);
            }

            let item = timeout(self.idle_timeout, self.stream.next())
                .await
                .map_err(|_| {
                    PipelineError::StreamInterrupted(format!(
                        "no data for {}s",
                        self.idle_timeout.as_secs()
                    ))
                })?;

            match item {
                Some(Ok(bytes)) => {
                    self.buf.extend_from_slice(&bytes);
                    self.drain_lines()?;
                }
                Some(Err(e)) => return Err(e),
                None => {
                    // Transport closed; a final unterminated line still counts.
                    self.done = true;
                    if !self.buf.is_empty() {
                        let line = std::mem::take(&mut self.buf);
                        self.parse_line(&line)?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn source_of(chunks: Vec<Vec<u8>>) -> SseFragmentSource {
        let items: Vec<Result<Vec<u8>, PipelineError>> = chunks.into_iter().map(Ok).collect();
        SseFragmentSource::new(
            Box::pin(stream::iter(items)),
            Duration::from_secs(5),
        )
    }

    async fn collect(mut source: SseFragmentSource) -> Vec<ResponseFragment> {
        let mut out = Vec::new();
        while let Some(fragment) = source.next_fragment().await.unwrap() {
            out.push(fragment);
        }
        out
    }

    #[tokio::test]
    async fn test_full_exchange_in_order() {
        let source = source_of(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n".to_vec(),
            b"data: {\"choices\":[{\"delta\":{\"audio\":{\"data\":\"AAE=\"}}}]}\n\n".to_vec(),
            b"data: {\"choices\":[],\"usage\":{\"total_tokens\":7}}\n\n".to_vec(),
            b"data: [DONE]\n\n".to_vec(),
        ]);

        let fragments = collect(source).await;
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[0], ResponseFragment::TextDelta("hi".into()));
        assert_eq!(fragments[1], ResponseFragment::AudioDelta("AAE=".into()));
        assert!(matches!(fragments[2], ResponseFragment::UsageSummary(_)));
        assert_eq!(fragments[3], ResponseFragment::End);
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let source = source_of(vec![
            b"data: {\"choices\":[{\"delta\":{\"con".to_vec(),
            b"tent\":\"split\"}}]}\ndata: [DO".to_vec(),
            b"NE]\n".to_vec(),
        ]);

        let fragments = collect(source).await;
        assert_eq!(
            fragments,
            vec![
                ResponseFragment::TextDelta("split".into()),
                ResponseFragment::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_json_is_malformed() {
        let mut source = source_of(vec![b"data: {not json}\n".to_vec()]);
        let err = source.next_fragment().await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedFragment(_)));
    }

    #[tokio::test]
    async fn test_transport_end_without_done_exhausts() {
        let mut source = source_of(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n".to_vec(),
        ]);
        assert!(source.next_fragment().await.unwrap().is_some());
        assert!(source.next_fragment().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idle_stream_times_out() {
        let mut source = SseFragmentSource::new(
            Box::pin(stream::pending()),
            Duration::from_millis(20),
        );
        let err = source.next_fragment().await.unwrap_err();
        assert!(matches!(err, PipelineError::StreamInterrupted(_)));
    }
}
