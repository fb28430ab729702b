use crate::error::PipelineError;
use rodio::OutputStreamBuilder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Play a finished answer file on the default output device.
///
/// Playback is a blocking wait on the audio device, so it runs on a
/// dedicated blocking thread. The decoder picks up channel count, sample
/// width and rate from the container header. A playback failure is reported
/// but does not invalidate the artifact on disk.
pub async fn play(path: &Path) -> Result<(), PipelineError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || play_blocking(&path))
        .await
        .map_err(|e| PipelineError::PlaybackDeviceUnavailable(format!("playback task: {e}")))?
}

fn play_blocking(path: &Path) -> Result<(), PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::FileUnreadable(format!("{}: {}", path.display(), e)))?;

    let stream_handle = OutputStreamBuilder::open_default_stream()
        .map_err(|e| PipelineError::PlaybackDeviceUnavailable(e.to_string()))?;

    let sink = rodio::play(stream_handle.mixer(), BufReader::new(file))
        .map_err(|e| PipelineError::PlaybackDeviceUnavailable(e.to_string()))?;
    sink.sleep_until_end();

    Ok(())
}
