//! エディタから使う操作をまとめたもの
//!
//! Skeleton Store と Annotation Ledger を1つにまとめ、選択中の手法・骨格の取得元・
//! 再生状態を保持する。動画の切り替えはストアと履歴のリセットを1回の操作で行う。

use indexmap::IndexMap;
use log::{debug, info};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::consensus::{self, Consensus, FillMode, SourceMode};
use crate::error::{AnnotationError, Result};
use crate::ledger::AnnotationLedger;
use crate::metadata::MetadataIndex;
use crate::pose::Skeleton;
use crate::store::SkeletonStore;
use crate::video::{Frame, FrameSource, VideoInfo};

/// 進捗表示
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub labeled: usize,
    pub total: usize,
    pub current: usize,
    /// 現在位置 (`H:MM:SS.cc`)
    pub position: String,
    /// 動画の長さ (`H:MM:SS.cc`)
    pub duration: String,
}

impl Progress {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.labeled as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Labeled {} out of {} frames ({:.2}%)",
            self.labeled,
            self.total,
            self.ratio() * 100.0
        )
    }
}

pub struct Session {
    index: MetadataIndex,
    store: SkeletonStore,
    ledger: AnnotationLedger,
    /// 選択中の手法 (動画の宣言順)
    selected: Vec<String>,
    mode: SourceMode,
    playing: bool,
    recording: bool,
    speed: f64,
}

impl Session {
    pub fn new(index: MetadataIndex, source: Box<dyn FrameSource>) -> Self {
        Self::with_ledger(index, source, AnnotationLedger::new(), 1.0)
    }

    pub fn from_config(index: MetadataIndex, source: Box<dyn FrameSource>, config: &Config) -> Self {
        Self::with_ledger(
            index,
            source,
            AnnotationLedger::from_config(&config.history),
            config.playback.speed,
        )
    }

    fn with_ledger(
        index: MetadataIndex,
        source: Box<dyn FrameSource>,
        ledger: AnnotationLedger,
        speed: f64,
    ) -> Self {
        Self {
            index,
            store: SkeletonStore::new(source),
            ledger,
            selected: Vec::new(),
            mode: SourceMode::Average,
            playing: false,
            recording: false,
            speed,
        }
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn store(&self) -> &SkeletonStore {
        &self.store
    }

    pub fn ledger(&self) -> &AnnotationLedger {
        &self.ledger
    }

    pub fn video_id(&self) -> Option<&str> {
        self.store.video_id()
    }

    fn video(&self) -> Result<&str> {
        self.store.video_id().ok_or(AnnotationError::NoVideo)
    }

    pub fn current_frame(&self) -> Result<usize> {
        self.store.current_frame()
    }

    // ---- 動画・フレーム ----

    /// 動画を切り替える。切り替え前に失敗した場合、正解データと履歴には触れない。
    /// Frame Source で失敗して選択が外れた場合は、履歴と手法の選択も捨てる
    pub fn select_video(&mut self, id: &str) -> Result<VideoInfo> {
        self.playing = false;
        let info = match self.store.select_video(&self.index, id).map(|info| *info) {
            Ok(info) => info,
            Err(e) => {
                if self.store.video_id().is_none() {
                    self.ledger.deactivate();
                    self.selected.clear();
                    self.recording = false;
                    self.refresh_mode();
                }
                return Err(e);
            }
        };
        self.ledger.activate(id);
        self.selected.clear();
        self.refresh_mode();
        info!(
            "{} ({}): {}",
            self.index.display_name(id),
            self.store.total_duration()?,
            self.progress()?
        );
        Ok(info)
    }

    /// フレームを移動し、取得元を「保存済みがあれば Saved」に戻す
    pub fn set_frame(&mut self, frame: usize) -> Result<()> {
        let previous = self.store.current_frame()?;
        self.store.set_frame(frame)?;
        if self.recording && previous != frame {
            self.record(previous)?;
        }
        self.refresh_mode();
        Ok(())
    }

    fn current_is_labeled(&self) -> bool {
        match (self.store.video_id(), self.store.current_frame()) {
            (Some(video), Ok(frame)) => self.ledger.is_labeled(video, frame),
            _ => false,
        }
    }

    fn refresh_mode(&mut self) {
        self.mode = if self.current_is_labeled() {
            SourceMode::Saved
        } else {
            SourceMode::Average
        };
    }

    pub fn step_forward(&mut self) -> Result<Option<usize>> {
        let frame = self.store.current_frame()?;
        if frame + 1 >= self.store.frame_count() {
            return Ok(None);
        }
        self.set_frame(frame + 1)?;
        Ok(Some(frame + 1))
    }

    pub fn step_back(&mut self) -> Result<Option<usize>> {
        let frame = self.store.current_frame()?;
        if frame == 0 {
            return Ok(None);
        }
        self.set_frame(frame - 1)?;
        Ok(Some(frame - 1))
    }

    // ---- 取得元・手法 ----

    pub fn source_mode(&self) -> SourceMode {
        self.mode
    }

    /// Saved / Average を切り替える。正解データのないフレームでは Saved にできない
    pub fn toggle_source(&mut self) -> bool {
        match self.mode {
            SourceMode::Saved => {
                self.mode = SourceMode::Average;
                true
            }
            SourceMode::Average => {
                let labeled = self.current_is_labeled();
                if labeled {
                    self.mode = SourceMode::Saved;
                }
                labeled
            }
        }
    }

    pub fn selected_methods(&self) -> &[String] {
        &self.selected
    }

    /// 融合に使う手法を選ぶ。選択中の動画にない手法があれば何も変えずに失敗する
    pub fn set_selected_methods<I, S>(&mut self, methods: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.video()?;
        let mut wanted = Vec::new();
        for method in methods {
            let method = method.as_ref();
            if !self.store.has_method(method) {
                return Err(AnnotationError::not_found("method", method));
            }
            wanted.push(method.to_string());
        }
        self.selected = self
            .store
            .current_methods()
            .into_iter()
            .filter(|m| wanted.iter().any(|w| w == *m))
            .map(str::to_string)
            .collect();
        debug!("selected methods: {:?}", self.selected);
        Ok(())
    }

    // ---- 骨格 ----

    fn resolve(&self, frame: usize) -> Result<Option<Consensus>> {
        consensus::resolve(&self.store, &self.ledger, frame, &self.selected, self.mode)
    }

    /// 現在フレームに表示する骨格
    pub fn current_skeleton(&self, pixel: bool) -> Result<Option<Skeleton>> {
        let frame = self.store.current_frame()?;
        let Some(resolved) = self.resolve(frame)? else {
            return Ok(None);
        };
        let skeleton = resolved.into_skeleton();
        if pixel {
            Ok(Some(self.store.to_pixel(&skeleton)?))
        } else {
            Ok(Some(skeleton))
        }
    }

    /// 正規化座標の骨格を現在フレームにコミットする
    pub fn commit(&mut self, skeleton: Skeleton) -> Result<()> {
        let frame = self.store.current_frame()?;
        let video = self.store.video_id().ok_or(AnnotationError::NoVideo)?;
        self.ledger.commit(video, frame, skeleton);
        self.mode = SourceMode::Saved;
        Ok(())
    }

    /// 画面上で編集したピクセル座標の骨格をコミットする
    pub fn commit_pixel(&mut self, skeleton: &Skeleton) -> Result<()> {
        let normalized = self.store.to_normalized(skeleton)?;
        self.commit(normalized)
    }

    pub fn undo(&mut self) -> Result<Option<usize>> {
        let frame = self.store.current_frame()?;
        let video = self.store.video_id().ok_or(AnnotationError::NoVideo)?;
        let undone = self.ledger.undo(video, frame);
        self.refresh_mode();
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<Option<usize>> {
        let frame = self.store.current_frame()?;
        let video = self.store.video_id().ok_or(AnnotationError::NoVideo)?;
        let redone = self.ledger.redo(video, frame);
        self.refresh_mode();
        Ok(redone)
    }

    pub fn can_undo(&self) -> bool {
        self.store
            .current_frame()
            .is_ok_and(|frame| self.ledger.can_undo(frame))
    }

    pub fn can_redo(&self) -> bool {
        self.store
            .current_frame()
            .is_ok_and(|frame| self.ledger.can_redo(frame))
    }

    /// 前後の正解データから現在フレームの候補を作る (コミットはしない)
    pub fn fill_current(&self, mode: FillMode) -> Result<Option<Skeleton>> {
        let frame = self.store.current_frame()?;
        let (previous, next) = self.ledger.neighbors(self.video()?, frame);
        Ok(consensus::fill_from_neighbors(
            previous.map(|(_, s)| s),
            next.map(|(_, s)| s),
            mode,
        ))
    }

    /// 手法ごとの現在フレームの信頼度
    ///
    /// ポーズ33点の visibility と、検出された手のスコア (21点分) の平均。
    pub fn method_confidence(&self) -> Result<IndexMap<String, f32>> {
        let frame = self.store.current_frame()?;
        let mut confidence = IndexMap::new();
        for method in self.store.current_methods() {
            let skeleton = self.store.frame_skeleton(method, frame, false)?;
            let scores: Vec<f32> = skeleton
                .pose
                .iter()
                .chain(skeleton.hands.values().flatten())
                .map(|lm| lm.score)
                .collect();
            let mean = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f32>() / scores.len() as f32
            };
            confidence.insert(method.to_string(), mean);
        }
        Ok(confidence)
    }

    pub fn frame_image(&mut self) -> Result<Frame> {
        self.store.frame_image()
    }

    // ---- 未ラベルのフレーム探索 ----

    fn find_unlabeled(&self, frames: impl Iterator<Item = usize>) -> Result<Option<usize>> {
        let labeled = self.ledger.labeled_frames(self.video()?);
        Ok(frames.into_iter().find(|f| !labeled.contains(f)))
    }

    /// 現在フレームから後ろへ探して移動する (現在フレームを含む)
    pub fn next_unlabeled(&mut self) -> Result<Option<usize>> {
        let current = self.store.current_frame()?;
        let found = self.find_unlabeled(current..self.store.frame_count())?;
        self.move_to(found)
    }

    /// 現在フレームから前へ探して移動する (現在フレームを含む)
    pub fn previous_unlabeled(&mut self) -> Result<Option<usize>> {
        let current = self.store.current_frame()?;
        let found = self.find_unlabeled((0..=current).rev())?;
        self.move_to(found)
    }

    /// 後ろ、次に前を探す。全フレームにラベルがあれば `None`
    pub fn first_unlabeled(&mut self) -> Result<Option<usize>> {
        let current = self.store.current_frame()?;
        let forward = current..self.store.frame_count();
        let backward = (0..current).rev();
        let found = self.find_unlabeled(forward.chain(backward))?;
        self.move_to(found)
    }

    fn move_to(&mut self, frame: Option<usize>) -> Result<Option<usize>> {
        if let Some(frame) = frame {
            self.set_frame(frame)?;
        }
        Ok(frame)
    }

    // ---- 再生・記録 ----

    pub fn play(&mut self) {
        self.playing = self.store.video_id().is_some();
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle_play(&mut self) -> bool {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
        self.playing
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if speed.is_nan() || speed <= 0.0 {
            return Err(AnnotationError::Config(format!(
                "playback speed must be positive, got {speed}"
            )));
        }
        self.speed = speed;
        Ok(())
    }

    /// 再生時の1フレームの間隔
    pub fn tick_interval(&self) -> Option<Duration> {
        let fps = self.store.info().ok()?.fps * self.speed;
        if fps.is_finite() && fps > 0.0 {
            Some(Duration::from_secs_f64(1.0 / fps))
        } else {
            None
        }
    }

    /// 再生中なら1フレーム進める。最終フレームで停止して `false`
    pub fn tick(&mut self) -> Result<bool> {
        if !self.playing {
            return Ok(false);
        }
        if self.step_forward()?.is_none() {
            self.playing = false;
            return Ok(false);
        }
        Ok(true)
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// 記録モード。停止時は再生を止め、現在フレームも記録する
    pub fn set_recording(&mut self, on: bool) -> Result<()> {
        if self.recording && !on {
            self.playing = false;
            if let Ok(frame) = self.store.current_frame() {
                self.record(frame)?;
            }
        }
        self.recording = on;
        Ok(())
    }

    /// `frame` に表示していた融合結果をコミットする
    fn record(&mut self, frame: usize) -> Result<()> {
        let Some(Consensus::Fused(skeleton)) = self.resolve(frame)? else {
            return Ok(());
        };
        let video = self.store.video_id().ok_or(AnnotationError::NoVideo)?;
        self.ledger.commit(video, frame, skeleton);
        debug!("recorded frame {}", frame);
        Ok(())
    }

    // ---- 進捗・プロジェクト ----

    pub fn progress(&self) -> Result<Progress> {
        let video = self.video()?;
        let total = self.store.frame_count();
        let current = self.store.current_frame()?;
        Ok(Progress {
            labeled: self.ledger.labeled_count(video),
            total,
            current,
            position: self.store.current_duration()?,
            duration: self.store.total_duration()?,
        })
    }

    pub fn save_project(&self, path: &Path) -> Result<()> {
        self.ledger.save(path)
    }

    /// 正解データを読み込む。履歴は空になる
    pub fn load_project(&mut self, path: &Path) -> Result<()> {
        self.ledger.load(path)?;
        self.refresh_mode();
        Ok(())
    }
}
