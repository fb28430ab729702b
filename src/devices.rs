use crate::config::Config;
use crate::error::PipelineError;
use regex::Regex;
use tokio::process::Command;

/// Resolved ffmpeg input selection for the host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Windows: a single dshow input combining both devices by name.
    DirectShow { video: String, audio: String },
    /// macOS: avfoundation index pair, e.g. "0:0".
    AvFoundation { input: String },
    /// Linux: v4l2 device node plus ALSA capture name.
    V4l2Alsa { video: String, audio: String },
}

impl DeviceSpec {
    /// Input arguments for the capture command line.
    pub fn input_args(&self) -> Vec<String> {
        match self {
            DeviceSpec::DirectShow { video, audio } => vec![
                "-f".into(),
                "dshow".into(),
                "-i".into(),
                format!("video={video}:audio={audio}"),
            ],
            DeviceSpec::AvFoundation { input } => {
                vec!["-f".into(), "avfoundation".into(), "-i".into(), input.clone()]
            }
            DeviceSpec::V4l2Alsa { video, audio } => vec![
                "-f".into(),
                "v4l2".into(),
                "-i".into(),
                video.clone(),
                "-f".into(),
                "alsa".into(),
                "-i".into(),
                audio.clone(),
            ],
        }
    }
}

/// Resolve the input devices for this platform.
///
/// Config overrides win everywhere. Without overrides, Windows probes the
/// dshow listing, macOS takes the default avfoundation pair, Linux takes the
/// first video node and the ALSA default.
pub async fn resolve(config: &Config) -> Result<DeviceSpec, PipelineError> {
    if cfg!(target_os = "windows") {
        if let (Some(video), Some(audio)) = (&config.video_device, &config.audio_device) {
            return Ok(DeviceSpec::DirectShow {
                video: video.clone(),
                audio: audio.clone(),
            });
        }
        let listing = list_dshow_devices(&config.ffmpeg_path).await?;
        let (video, audio) = pick_dshow_devices(&listing)?;
        tracing::info!("Using video device: {video}");
        tracing::info!("Using audio device: {audio}");
        Ok(DeviceSpec::DirectShow { video, audio })
    } else if cfg!(target_os = "macos") {
        Ok(DeviceSpec::AvFoundation {
            input: config.video_device.clone().unwrap_or_else(|| "0:0".into()),
        })
    } else {
        Ok(DeviceSpec::V4l2Alsa {
            video: config
                .video_device
                .clone()
                .unwrap_or_else(|| "/dev/video0".into()),
            audio: config.audio_device.clone().unwrap_or_else(|| "default".into()),
        })
    }
}

/// Run the dshow device listing. ffmpeg prints it to stderr and exits
/// non-zero, so only a failure to run the binary at all is an error here.
async fn list_dshow_devices(ffmpeg: &str) -> Result<String, PipelineError> {
    let output = Command::new(ffmpeg)
        .args(["-list_devices", "true", "-f", "dshow", "-i", "dummy"])
        .output()
        .await
        .map_err(|e| PipelineError::DeviceUnavailable(format!("device probe: {e}")))?;

    Ok(String::from_utf8_lossy(&output.stderr).into_owned())
}

/// Pick one video and one audio device from a dshow listing.
///
/// Virtual cameras (OBS and friends) register ahead of real ones, so the
/// first non-"Virtual" video device is preferred.
fn pick_dshow_devices(listing: &str) -> Result<(String, String), PipelineError> {
    let video_re = Regex::new(r#"\[dshow @ .*?\] "(.*?)" \(video\)"#)
        .map_err(|e| PipelineError::DeviceUnavailable(e.to_string()))?;
    let audio_re = Regex::new(r#"\[dshow @ .*?\] "(.*?)" \(audio\)"#)
        .map_err(|e| PipelineError::DeviceUnavailable(e.to_string()))?;

    let videos: Vec<String> = video_re
        .captures_iter(listing)
        .map(|c| c[1].to_string())
        .collect();
    let audios: Vec<String> = audio_re
        .captures_iter(listing)
        .map(|c| c[1].to_string())
        .collect();

    let video = videos
        .iter()
        .find(|name| !name.contains("Virtual"))
        .or_else(|| videos.first())
        .cloned()
        .ok_or_else(|| PipelineError::DeviceUnavailable("no video input device".into()))?;

    let audio = audios
        .first()
        .cloned()
        .ok_or_else(|| PipelineError::DeviceUnavailable("no audio input device".into()))?;

    Ok((video, audio))
}
