use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnnotationError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// データフォルダ (動画・検出ファイルのパスはここからの相対)
    #[serde(default = "default_data_root")]
    pub root: PathBuf,
    /// メタデータファイル名 (root からの相対)
    #[serde(default = "default_metadata")]
    pub metadata: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    /// 正解データの保存先
    #[serde(default = "default_project_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    /// 1フレームあたりの履歴上限
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
    /// 履歴を保持するフレーム数
    #[serde(default = "default_tracked_frames")]
    pub tracked_frames: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaybackConfig {
    /// 再生速度 (fps に掛ける倍率)
    #[serde(default = "default_playback_speed")]
    pub speed: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// RUST_LOG 未設定時のログレベル
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_data_root() -> PathBuf { PathBuf::from("data") }
fn default_metadata() -> String { "metadata.json".to_string() }
fn default_project_path() -> PathBuf { PathBuf::from("project.glmks") }
fn default_history_capacity() -> usize { 50 }
fn default_tracked_frames() -> usize { 10 }
fn default_playback_speed() -> f64 { 1.0 }
fn default_log_level() -> String { "info".to_string() }

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
            metadata: default_metadata(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: default_project_path(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            tracked_frames: default_tracked_frames(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: default_playback_speed(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト値を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}: {} (using defaults)", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 || self.history.tracked_frames == 0 {
            return Err(AnnotationError::Config(
                "history.capacity and history.tracked_frames must be at least 1".to_string(),
            ));
        }
        if self.playback.speed.is_nan() || self.playback.speed <= 0.0 {
            return Err(AnnotationError::Config(format!(
                "playback.speed must be positive, got {}",
                self.playback.speed
            )));
        }
        Ok(())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data.root.join(&self.data.metadata)
    }
}
