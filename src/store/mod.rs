//! 選択中の動画について、手法ごとの検出骨格を保持する

pub mod detection;

use indexmap::IndexMap;
use log::info;

use crate::error::{AnnotationError, Result};
use crate::metadata::MetadataIndex;
use crate::pose::Skeleton;
use crate::video::{format_frame_time, Frame, FrameSource, VideoInfo};

pub use detection::{DetectionFormat, MethodTrack};

/// 選択中の動画の状態
struct ActiveVideo {
    id: String,
    info: VideoInfo,
    methods: IndexMap<String, MethodTrack>,
    current_frame: usize,
}

pub struct SkeletonStore {
    source: Box<dyn FrameSource>,
    active: Option<ActiveVideo>,
}

impl SkeletonStore {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            active: None,
        }
    }

    /// 動画を選択し、宣言された全手法の検出ファイルを読み込む
    ///
    /// 全部読めた場合だけ切り替わる。ID が不明、または動画・検出ファイルが
    /// 見つからない/壊れている場合は元の状態のまま失敗する。
    /// Frame Source がファイルを開けなかった場合、またはフレームサイズが 0 の
    /// 場合は選択なしの状態になる。
    pub fn select_video(&mut self, index: &MetadataIndex, id: &str) -> Result<&VideoInfo> {
        let record = index.video(id)?;
        if !record.media_path.is_file() {
            return Err(AnnotationError::MissingFile(record.media_path.clone()));
        }

        let mut methods = IndexMap::with_capacity(record.methods.len());
        for (name, path) in &record.methods {
            methods.insert(name.clone(), MethodTrack::load(path)?);
        }

        // open は前のキャプチャを解放するので、失敗しても前の動画には戻れない
        let opened = self.source.open(&record.media_path);
        self.active = None;
        let info = opened?;
        if info.width == 0 || info.height == 0 {
            self.source.release();
            return Err(AnnotationError::Media(format!(
                "invalid frame size {}x{} for {}",
                info.width,
                info.height,
                record.media_path.display()
            )));
        }
        info!(
            "Selected video '{}': {} frames @ {:.2} fps, {}x{}, methods: [{}]",
            id,
            info.frame_count,
            info.fps,
            info.width,
            info.height,
            methods.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        let active = self.active.insert(ActiveVideo {
            id: id.to_string(),
            info,
            methods,
            current_frame: 0,
        });
        Ok(&active.info)
    }

    fn active(&self) -> Result<&ActiveVideo> {
        self.active.as_ref().ok_or(AnnotationError::NoVideo)
    }

    pub fn video_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    pub fn info(&self) -> Result<VideoInfo> {
        Ok(self.active()?.info)
    }

    pub fn frame_count(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.info.frame_count)
    }

    /// 選択中の動画で使える手法 (宣言順)
    pub fn current_methods(&self) -> Vec<&str> {
        self.active
            .as_ref()
            .map(|a| a.methods.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.methods.contains_key(method))
    }

    pub fn current_frame(&self) -> Result<usize> {
        Ok(self.active()?.current_frame)
    }

    fn check_frame(&self, frame: usize) -> Result<()> {
        let frame_count = self.active()?.info.frame_count;
        if frame >= frame_count {
            return Err(AnnotationError::Range { frame, frame_count });
        }
        Ok(())
    }

    /// 現在フレームの位置だけを更新する (デコードはしない)
    pub fn set_frame(&mut self, frame: usize) -> Result<()> {
        self.check_frame(frame)?;
        if let Some(active) = self.active.as_mut() {
            active.current_frame = frame;
        }
        Ok(())
    }

    /// 手法・フレームの骨格
    ///
    /// `pixel` が真ならその場でピクセル座標に変換する。保持データは変更しない。
    /// 検出ファイルにないフレームは全点0の骨格。
    pub fn frame_skeleton(&self, method: &str, frame: usize, pixel: bool) -> Result<Skeleton> {
        let active = self.active()?;
        let track = active
            .methods
            .get(method)
            .ok_or_else(|| AnnotationError::not_found("method", method))?;
        self.check_frame(frame)?;

        let skeleton = track.get(frame).cloned().unwrap_or_default();
        if pixel {
            Ok(skeleton.to_pixel(active.info.width, active.info.height))
        } else {
            Ok(skeleton)
        }
    }

    pub fn current_skeleton(&self, method: &str, pixel: bool) -> Result<Skeleton> {
        self.frame_skeleton(method, self.current_frame()?, pixel)
    }

    pub fn to_pixel(&self, skeleton: &Skeleton) -> Result<Skeleton> {
        let info = self.active()?.info;
        Ok(skeleton.to_pixel(info.width, info.height))
    }

    pub fn to_normalized(&self, skeleton: &Skeleton) -> Result<Skeleton> {
        let info = self.active()?.info;
        Ok(skeleton.to_normalized(info.width, info.height))
    }

    /// 現在フレームの画像を Frame Source から取得
    pub fn frame_image(&mut self) -> Result<Frame> {
        let frame = self.current_frame()?;
        self.source.read_frame(frame)
    }

    /// `frame` 時点の経過時間 (`H:MM:SS.cc`)
    pub fn duration_string(&self, frame: usize) -> Result<String> {
        Ok(format_frame_time(frame, self.active()?.info.fps))
    }

    pub fn total_duration(&self) -> Result<String> {
        self.duration_string(self.active()?.info.frame_count)
    }

    pub fn current_duration(&self) -> Result<String> {
        self.duration_string(self.current_frame()?)
    }
}
