//! アノテーションエンジンのエラー型

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    /// メタデータ・設定ファイルが存在しない、または壊れている
    #[error("Configuration error: {0}")]
    Config(String),

    /// メタデータが参照する検出ファイルが存在しない
    #[error("Integrity error: video '{video}' method '{method}' references missing file {}", path.display())]
    Integrity {
        video: String,
        method: String,
        path: PathBuf,
    },

    #[error("Not found: {kind} '{name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("Frame {frame} out of range [0, {frame_count})")]
    Range { frame: usize, frame_count: usize },

    #[error("Missing file: {}", .0.display())]
    MissingFile(PathBuf),

    /// 検出ファイル・フレームのデコード失敗
    #[error("Decode error in {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Frame Source 側の失敗
    #[error("Media error: {0}")]
    Media(String),

    /// プロジェクトファイルの形式不一致
    #[error("Project format error: {0}")]
    Format(String),

    #[error("No video selected")]
    NoVideo,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnnotationError>;

impl AnnotationError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for AnnotationError {
    fn from(e: serde_json::Error) -> Self {
        AnnotationError::Config(e.to_string())
    }
}

impl From<toml::de::Error> for AnnotationError {
    fn from(e: toml::de::Error) -> Self {
        AnnotationError::Config(e.to_string())
    }
}

impl From<bincode::Error> for AnnotationError {
    fn from(e: bincode::Error) -> Self {
        AnnotationError::Format(e.to_string())
    }
}
