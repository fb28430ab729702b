use thiserror::Error;

/// Failure kinds a round trip can surface.
///
/// None of these are retried: each propagates straight to the pipeline
/// orchestrator, which reports it once and resets to idle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No usable audio or video input device could be resolved.
    #[error("no usable capture device: {0}")]
    DeviceUnavailable(String),

    /// The capture process could not be spawned, or would not die.
    #[error("capture process failure: {0}")]
    ProcessLaunchFailed(String),

    /// The capture file (or artifact) is missing or unreadable.
    #[error("file unreadable: {0}")]
    FileUnreadable(String),

    /// A response fragment could not be parsed or decoded.
    #[error("malformed response fragment: {0}")]
    MalformedFragment(String),

    /// The response stream ended or stalled before its completion marker.
    #[error("response stream interrupted: {0}")]
    StreamInterrupted(String),

    /// No output device could be opened for playback.
    #[error("no usable playback device: {0}")]
    PlaybackDeviceUnavailable(String),

    /// `begin` was called while a round trip is already in flight.
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// `end` was called with no recording in progress.
    #[error("no recording in progress")]
    NotRecording,
}
