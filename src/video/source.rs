use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AnnotationError, Result};
use crate::metadata::MetadataIndex;

/// 動画のプロパティ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub frame_count: usize,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub fn new(frame_count: usize, fps: f64, width: u32, height: u32) -> Self {
        Self {
            frame_count,
            fps,
            width,
            height,
        }
    }
}

/// デコード済みフレーム (RGB8, 行優先)
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// 動画のデコードを担う外部コンポーネント
///
/// 一度に開くのは1本だけ。`open` は前の動画を解放してから開く。
pub trait FrameSource {
    fn open(&mut self, path: &Path) -> Result<VideoInfo>;

    fn read_frame(&mut self, index: usize) -> Result<Frame>;

    fn release(&mut self) {}
}

/// プロパティだけを返す Frame Source
///
/// 画像のデコードはできない。メタデータに fps / frame_count / width / height が
/// 書かれていれば OpenCV なしで注釈データを扱える。
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    videos: HashMap<PathBuf, VideoInfo>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, path: impl Into<PathBuf>, info: VideoInfo) -> Self {
        self.videos.insert(path.into(), info);
        self
    }

    /// メタデータに宣言されたプロパティから構築
    pub fn from_index(index: &MetadataIndex) -> Self {
        let videos = index
            .videos()
            .filter_map(|record| {
                let fps = record.declared_fps?;
                let frame_count = record.declared_frame_count?;
                let (width, height) = record.declared_size?;
                Some((
                    record.media_path.clone(),
                    VideoInfo::new(frame_count, fps, width, height),
                ))
            })
            .collect();
        Self { videos }
    }
}

impl FrameSource for StaticSource {
    fn open(&mut self, path: &Path) -> Result<VideoInfo> {
        if !path.is_file() {
            return Err(AnnotationError::MissingFile(path.to_path_buf()));
        }
        self.videos.get(path).copied().ok_or_else(|| {
            AnnotationError::Media(format!(
                "no declared properties for {}",
                path.display()
            ))
        })
    }

    fn read_frame(&mut self, index: usize) -> Result<Frame> {
        Err(AnnotationError::Media(format!(
            "frame {index}: decoding requires the `desktop` feature"
        )))
    }
}
