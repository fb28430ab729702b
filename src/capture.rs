use crate::devices::DeviceSpec;
use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Bound on the wait after escalating to a forced kill.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// One live capture: an ffmpeg child writing audio+video to `output_path`.
///
/// The session owns the process handle. `stop` releases it; dropping an
/// unstopped session kills the child rather than leaking it.
#[derive(Debug)]
pub struct CaptureSession {
    child: Option<Child>,
    output_path: PathBuf,
}

impl CaptureSession {
    /// Launch the capture process for the given devices.
    ///
    /// The output file is created/truncated by ffmpeg (`-y`). Returns
    /// `ProcessLaunchFailed` if the child cannot be spawned; device
    /// resolution errors happen upstream, before anything is spawned.
    pub fn start(
        ffmpeg: &str,
        spec: &DeviceSpec,
        audio_gain: f32,
        output_path: &Path,
    ) -> Result<Self, PipelineError> {
        let mut cmd = Command::new(ffmpeg);
        cmd.arg("-y")
            .args(spec.input_args())
            .args(["-vcodec", "libx264"])
            .args(["-af", &format!("volume={audio_gain}")])
            .args(["-acodec", "aac"])
            .arg(output_path);

        tracing::info!("Recording to {}", output_path.display());
        Self::launch(cmd, output_path.to_path_buf())
    }

    fn launch(mut cmd: Command, output_path: PathBuf) -> Result<Self, PipelineError> {
        let child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::ProcessLaunchFailed(e.to_string()))?;

        Ok(Self {
            child: Some(child),
            output_path,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Request a graceful stop and wait for the child to exit.
    ///
    /// Sends `q` on the control channel and closes it, which makes ffmpeg
    /// finalize the container. If the child outlives `grace` it is killed and
    /// given `KILL_WAIT` more; a kill that does produce an exit is a recovered
    /// condition, not an error, though the file may be truncated. Calling
    /// `stop` on an already-stopped session is a no-op.
    pub async fn stop(&mut self, grace: Duration) -> Result<(), PipelineError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(mut stdin) = child.stdin.take() {
            // The child may already have exited; a dead pipe is fine.
            let _ = stdin.write_all(b"q\n").await;
            let _ = stdin.shutdown().await;
        }

        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!("Capture process exited: {status}");
                Ok(())
            }
            Ok(Err(e)) => Err(PipelineError::ProcessLaunchFailed(format!(
                "waiting for capture process: {e}"
            ))),
            Err(_) => {
                tracing::warn!("Capture process ignored stop request, killing it");
                child
                    .start_kill()
                    .map_err(|e| PipelineError::ProcessLaunchFailed(format!("kill: {e}")))?;

                match timeout(KILL_WAIT, child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::warn!("Capture process killed: {status}");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(PipelineError::ProcessLaunchFailed(format!(
                        "waiting for killed capture process: {e}"
                    ))),
                    Err(_) => Err(PipelineError::ProcessLaunchFailed(
                        "capture process did not exit after kill".into(),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn session_running(program: &str, args: &[&str]) -> CaptureSession {
        let mut cmd = Command::new(program);
        cmd.args(args);
        CaptureSession::launch(cmd, PathBuf::from("/tmp/unused.mp4")).unwrap()
    }

    #[tokio::test]
    async fn test_graceful_stop_on_stdin_close() {
        // cat exits as soon as its stdin closes, exercising the graceful path
        let mut session = session_running("cat", &[]);
        session.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_twice_is_noop() {
        let mut session = session_running("cat", &[]);
        session.stop(Duration::from_secs(5)).await.unwrap();
        session.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_grace_overrun_escalates_to_kill() {
        // sleep ignores stdin, so the grace period must expire and the
        // forced-termination path must still return normally
        let mut session = session_running("sleep", &["30"]);
        session.stop(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_unspawnable_program_fails() {
        let cmd = Command::new("/nonexistent/ffmpeg-binary");
        let err = CaptureSession::launch(cmd, PathBuf::from("/tmp/unused.mp4")).unwrap_err();
        assert!(matches!(err, PipelineError::ProcessLaunchFailed(_)));
    }
}
