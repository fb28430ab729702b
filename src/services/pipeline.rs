use crate::audio;
use crate::capture::CaptureSession;
use crate::config::Config;
use crate::decode::StreamDecoder;
use crate::devices;
use crate::error::PipelineError;
use crate::messages::{PipelineCommand, PipelineEvent, PipelineState};
use crate::omni::{OmniClient, protocol};
use crate::submission;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Coordinates one round trip at a time: capture, submit, stream, play.
///
/// This service:
/// - Accepts begin/end commands and rejects them outside the right state
/// - Owns the capture session and the published pipeline state
/// - Runs each accepted round trip on its own task so the command loop
///   stays responsive
/// - Emits exactly one Completed event per accepted begin/end pair
///
/// Admission control is the whole concurrency story: begin is rejected
/// unless the state is Idle, so a second round trip can never start while
/// one is in flight and the state/accumulator have a single owner.
pub struct Pipeline {
    config: Arc<Config>,
    client: OmniClient,
    cmd_rx: mpsc::Receiver<PipelineCommand>,
    event_tx: mpsc::Sender<PipelineEvent>,
    state_tx: Arc<watch::Sender<PipelineState>>,
    session: Option<CaptureSession>,
    done_tx: mpsc::Sender<Result<PathBuf, PipelineError>>,
    done_rx: mpsc::Receiver<Result<PathBuf, PipelineError>>,
}

impl Pipeline {
    /// Spawn the pipeline service. Returns the command handle, the event
    /// channel for the UI collaborator, and the observable state.
    pub fn spawn(
        config: Config,
    ) -> (
        PipelineHandle,
        mpsc::Receiver<PipelineEvent>,
        watch::Receiver<PipelineState>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(10);
        let (event_tx, event_rx) = mpsc::channel(100);
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let (done_tx, done_rx) = mpsc::channel(1);

        let client = OmniClient::new(
            config.api_url.clone(),
            config.api_key.clone(),
            config.stream_idle_timeout(),
        );

        let pipeline = Self {
            config: Arc::new(config),
            client,
            cmd_rx,
            event_tx,
            state_tx: Arc::new(state_tx),
            session: None,
            done_tx,
            done_rx,
        };
        tokio::spawn(pipeline.run());

        (PipelineHandle::new(cmd_tx), event_rx, state_rx)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                Some(outcome) = self.done_rx.recv() => {
                    self.finish_round_trip(outcome).await;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: PipelineCommand) {
        match cmd {
            PipelineCommand::Begin(reply) => {
                let _ = reply.send(self.handle_begin().await);
            }
            PipelineCommand::End(reply) => {
                let _ = reply.send(self.handle_end());
            }
        }
    }

    async fn handle_begin(&mut self) -> Result<(), PipelineError> {
        ensure_can_begin(*self.state_tx.borrow())?;

        let spec = devices::resolve(&self.config).await?;
        let session = CaptureSession::start(
            &self.config.ffmpeg_path,
            &spec,
            self.config.audio_gain,
            &self.config.capture_path(),
        )?;

        self.session = Some(session);
        self.state_tx.send_replace(PipelineState::Recording);
        tracing::info!("Recording started");
        Ok(())
    }

    fn handle_end(&mut self) -> Result<(), PipelineError> {
        ensure_can_end(*self.state_tx.borrow())?;
        let session = self.session.take().ok_or(PipelineError::NotRecording)?;

        self.state_tx.send_replace(PipelineState::Stopping);

        let trip = RoundTrip {
            config: self.config.clone(),
            client: self.client.clone(),
            state_tx: self.state_tx.clone(),
            event_tx: self.event_tx.clone(),
        };
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = trip.run(session).await;
            let _ = done_tx.send(outcome).await;
        });

        Ok(())
    }

    async fn finish_round_trip(&mut self, outcome: Result<PathBuf, PipelineError>) {
        if let Err(e) = &outcome {
            tracing::error!("Round trip failed: {e}");
            self.state_tx.send_replace(PipelineState::Failed);
        }

        let _ = self.event_tx.send(PipelineEvent::Completed(outcome)).await;
        self.state_tx.send_replace(PipelineState::Idle);
    }
}

/// The post-capture phases of one accepted round trip, run off the command
/// loop. Ownership of the capture session moves here, so stop/encode/stream/
/// play are strictly ordered without locks.
struct RoundTrip {
    config: Arc<Config>,
    client: OmniClient,
    state_tx: Arc<watch::Sender<PipelineState>>,
    event_tx: mpsc::Sender<PipelineEvent>,
}

impl RoundTrip {
    async fn run(self, mut session: CaptureSession) -> Result<PathBuf, PipelineError> {
        session.stop(self.config.stop_grace()).await?;

        self.state_tx.send_replace(PipelineState::Submitting);
        let payload = submission::encode(session.output_path()).await?;

        self.state_tx.send_replace(PipelineState::Streaming);
        let request = protocol::build_request(&self.config, &payload);
        let mut source = self.client.ask(&request).await?;
        let decoder = StreamDecoder::new(&self.config.answer_path(), self.event_tx.clone());
        let artifact = decoder.decode(&mut source).await?;

        self.state_tx.send_replace(PipelineState::Playing);
        audio::playback::play(&artifact).await?;

        Ok(artifact)
    }
}

fn ensure_can_begin(state: PipelineState) -> Result<(), PipelineError> {
    match state {
        PipelineState::Idle => Ok(()),
        _ => Err(PipelineError::AlreadyRecording),
    }
}

fn ensure_can_end(state: PipelineState) -> Result<(), PipelineError> {
    match state {
        PipelineState::Recording => Ok(()),
        _ => Err(PipelineError::NotRecording),
    }
}

/// Handle for communicating with the pipeline service
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineCommand>,
}

impl PipelineHandle {
    pub fn new(tx: mpsc::Sender<PipelineCommand>) -> Self {
        Self { tx }
    }

    pub async fn begin(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PipelineCommand::Begin(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send begin command: {e}"))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive begin response: {e}"))?
            .map_err(Into::into)
    }

    pub async fn end(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PipelineCommand::End(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send end command: {e}"))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive end response: {e}"))?
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_only_from_idle() {
        ensure_can_begin(PipelineState::Idle).unwrap();

        for state in [
            PipelineState::Recording,
            PipelineState::Stopping,
            PipelineState::Submitting,
            PipelineState::Streaming,
            PipelineState::Playing,
            PipelineState::Failed,
        ] {
            assert!(matches!(
                ensure_can_begin(state),
                Err(PipelineError::AlreadyRecording)
            ));
        }
    }

    #[test]
    fn test_end_only_while_recording() {
        ensure_can_end(PipelineState::Recording).unwrap();

        for state in [
            PipelineState::Idle,
            PipelineState::Stopping,
            PipelineState::Submitting,
            PipelineState::Streaming,
            PipelineState::Playing,
            PipelineState::Failed,
        ] {
            assert!(matches!(
                ensure_can_end(state),
                Err(PipelineError::NotRecording)
            ));
        }
    }

    #[tokio::test]
    async fn test_end_while_idle_is_rejected() {
        let (handle, _events, state_rx) = Pipeline::spawn(Config::default());

        let err = handle.end().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NotRecording)
        ));
        assert_eq!(*state_rx.borrow(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_begin_failure_leaves_state_idle() {
        let config = Config {
            ffmpeg_path: "/nonexistent/ffmpeg-binary".into(),
            ..Config::default()
        };
        let (handle, _events, state_rx) = Pipeline::spawn(config);

        // Device resolution succeeds on Linux defaults, so the failure is the
        // spawn itself; either way nothing runs and the state must stay Idle.
        let err = handle.begin().await.unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
        assert_eq!(*state_rx.borrow(), PipelineState::Idle);
    }
}
