use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Empty means "take it from DASHSCOPE_API_KEY at startup".
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_question")]
    pub question: String,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Capture device overrides; platform defaults apply when unset.
    #[serde(default)]
    pub video_device: Option<String>,

    #[serde(default)]
    pub audio_device: Option<String>,

    #[serde(default = "default_audio_gain")]
    pub audio_gain: f32,

    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_model() -> String {
    "qwen2.5-omni-7b".to_string()
}

fn default_voice() -> String {
    "Chelsie".to_string()
}

fn default_system_prompt() -> String {
    "You are a precise and concise assistant. Only respond to explicit audio \
     instructions in the video. Do not provide any suggestions, summaries, or \
     ask follow-up questions."
        .to_string()
}

fn default_question() -> String {
    "Watch the video and answer the question asked in its audio.".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_audio_gain() -> f32 {
    4.0
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_stream_idle_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            model: default_model(),
            voice: default_voice(),
            system_prompt: default_system_prompt(),
            question: default_question(),
            ffmpeg_path: default_ffmpeg_path(),
            work_dir: default_work_dir(),
            video_device: None,
            audio_device: None,
            audio_gain: default_audio_gain(),
            stop_grace_secs: default_stop_grace_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/omniask/config.json)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

            let config: Self = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;

            tracing::info!("Loaded config from {:?}", config_path);
            config
        } else {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save()?;
            config
        };

        if config.api_key.is_empty() {
            if let Ok(key) = std::env::var("DASHSCOPE_API_KEY") {
                config.api_key = key;
            }
        }

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {config_path:?}"))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("omniask").join("config.json"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(anyhow::anyhow!("api_url cannot be empty"));
        }

        if self.api_key.is_empty() {
            return Err(anyhow::anyhow!(
                "api_key is not set; put it in the config file or export DASHSCOPE_API_KEY"
            ));
        }

        if self.model.is_empty() {
            return Err(anyhow::anyhow!("model cannot be empty"));
        }

        if self.voice.is_empty() {
            return Err(anyhow::anyhow!("voice cannot be empty"));
        }

        if self.audio_gain <= 0.0 {
            return Err(anyhow::anyhow!("audio_gain must be positive"));
        }

        if self.stop_grace_secs == 0 {
            return Err(anyhow::anyhow!("stop_grace_secs must be at least 1"));
        }

        Ok(())
    }

    /// Transient capture output, overwritten each round trip.
    pub fn capture_path(&self) -> PathBuf {
        self.work_dir.join("capture.mp4")
    }

    /// Transient synthesized-answer output, overwritten each round trip.
    pub fn answer_path(&self) -> PathBuf {
        self.work_dir.join("answer.wav")
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate_once_key_is_set() {
        let config = Config {
            api_key: "sk-test".into(),
            ..Config::default()
        };
        config.validate().unwrap();
        assert_eq!(config.capture_path(), PathBuf::from("tmp/capture.mp4"));
        assert_eq!(config.answer_path(), PathBuf::from("tmp/answer.wav"));
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_zero_grace_rejected() {
        let config = Config {
            api_key: "sk-test".into(),
            stop_grace_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_key":"sk-test","voice":"Ethan"}"#).unwrap();
        assert_eq!(config.voice, "Ethan");
        assert_eq!(config.model, default_model());
        assert_eq!(config.stream_idle_timeout(), Duration::from_secs(30));
    }
}
