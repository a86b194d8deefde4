//! メタデータインデックス
//!
//! `metadata.json` の形式:
//!
//! ```json
//! {
//!   "src15": {
//!     "local_path": "videos/src15.mp4",
//!     "methods": { "mediapipe": "det/src15_mp.json", "openpose": "det/src15_op.json" },
//!     "alt_name": "Session 15"
//!   }
//! }
//! ```
//!
//! 動画の順序・手法の順序は宣言順を保持する。

use indexmap::IndexMap;
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnnotationError, Result};

/// メタデータファイル上の1エントリ
#[derive(Debug, Clone, Deserialize)]
struct RawVideoEntry {
    local_path: PathBuf,
    #[serde(default)]
    methods: IndexMap<String, PathBuf>,
    #[serde(default)]
    alt_name: Option<String>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    frame_count: Option<usize>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// 動画1本の情報 (パスはデータフォルダで解決済み)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub id: String,
    pub media_path: PathBuf,
    pub methods: IndexMap<String, PathBuf>,
    pub alt_name: Option<String>,
    /// 任意: メタデータに書かれていれば Frame Source の代わりに使える
    pub declared_fps: Option<f64>,
    pub declared_frame_count: Option<usize>,
    pub declared_size: Option<(u32, u32)>,
}

impl VideoRecord {
    pub fn display_name(&self) -> &str {
        self.alt_name.as_deref().unwrap_or(&self.id)
    }
}

/// 読み込み後は読み取り専用
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    videos: IndexMap<String, VideoRecord>,
    methods: Vec<String>,
}

impl MetadataIndex {
    /// メタデータファイルを読み込む
    ///
    /// 相対パスはメタデータファイルのあるフォルダから解決する。
    /// 宣言された検出ファイルが1つでも欠けていれば失敗する。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AnnotationError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let index = Self::from_json(&content, root)?;
        index.check_integrity()?;
        info!(
            "Loaded metadata {}: {} videos, {} methods",
            path.display(),
            index.videos.len(),
            index.methods.len()
        );
        Ok(index)
    }

    /// JSON文字列から構築 (ファイルの存在確認はしない)
    pub fn from_json(content: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let raw: IndexMap<String, RawVideoEntry> = serde_json::from_str(content)?;

        let mut methods: Vec<String> = Vec::new();
        let mut videos = IndexMap::with_capacity(raw.len());
        for (id, entry) in raw {
            for method in entry.methods.keys() {
                if !methods.contains(method) {
                    methods.push(method.clone());
                }
            }
            let record = VideoRecord {
                id: id.clone(),
                media_path: root.join(&entry.local_path),
                methods: entry
                    .methods
                    .into_iter()
                    .map(|(name, file)| (name, root.join(file)))
                    .collect(),
                alt_name: entry.alt_name,
                declared_fps: entry.fps,
                declared_frame_count: entry.frame_count,
                declared_size: entry.width.zip(entry.height),
            };
            videos.insert(id, record);
        }

        Ok(Self {
            videos,
            methods,
        })
    }

    fn check_integrity(&self) -> Result<()> {
        for record in self.videos.values() {
            for (method, file) in &record.methods {
                if !file.is_file() {
                    return Err(AnnotationError::Integrity {
                        video: record.id.clone(),
                        method: method.clone(),
                        path: file.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// 宣言順の動画ID
    pub fn list_videos(&self) -> Vec<&str> {
        self.videos.keys().map(String::as_str).collect()
    }

    /// 全動画の手法名 (重複なし、初出順)
    pub fn list_methods(&self) -> &[String] {
        &self.methods
    }

    pub fn video(&self, id: &str) -> Result<&VideoRecord> {
        self.videos
            .get(id)
            .ok_or_else(|| AnnotationError::not_found("video", id))
    }

    pub fn videos(&self) -> impl Iterator<Item = &VideoRecord> {
        self.videos.values()
    }

    /// 表示名 (alt_name がなければ ID)
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.videos
            .get(id)
            .map(VideoRecord::display_name)
            .unwrap_or(id)
    }

    /// 表示名から動画IDを引く
    pub fn find_by_display_name(&self, name: &str) -> Option<&str> {
        self.videos
            .values()
            .find(|r| r.display_name() == name)
            .map(|r| r.id.as_str())
    }
}
