use crate::error::PipelineError;
use std::path::PathBuf;
use tokio::sync::oneshot;

/// Commands for the pipeline service
pub enum PipelineCommand {
    Begin(oneshot::Sender<Result<(), PipelineError>>),
    End(oneshot::Sender<Result<(), PipelineError>>),
}

/// Pipeline state (observable via watch channel)
///
/// Transitions are strictly linear within one round trip:
/// Idle -> Recording -> Stopping -> Submitting -> Streaming -> Playing -> Idle,
/// with any failure going through Failed before the reset to Idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Recording,
    Stopping,
    Submitting,
    Streaming,
    Playing,
    Failed,
}

/// Events delivered to the UI collaborator.
///
/// Text and transcript deltas are display-only side effects; exactly one
/// `Completed` fires per accepted begin/end pair.
#[derive(Debug)]
pub enum PipelineEvent {
    TextDelta(String),
    TranscriptDelta(String),
    Completed(Result<PathBuf, PipelineError>),
}
