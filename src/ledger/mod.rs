//! 正解データ (動画・フレームごとにコミットされた骨格) と undo/redo 履歴
//!
//! 履歴は2つの独立した方針で制限される:
//! - フレームごとに最大 `capacity` 件 ([`Timeline`])
//! - 履歴を持つフレームは直近にコミットした `tracked_frames` 個まで ([`Recency`])
//!
//! 履歴が追い出されても正解データは残る。動画を切り替えると履歴はすべて消える。

pub mod project;
pub mod recency;
pub mod timeline;

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::pose::Skeleton;

pub use project::Entries;
pub use recency::Recency;
pub use timeline::Timeline;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_TRACKED_FRAMES: usize = 10;

pub struct AnnotationLedger {
    entries: Entries,
    /// 履歴が属する動画
    active: Option<String>,
    timelines: HashMap<usize, Timeline>,
    recency: Recency,
    capacity: usize,
}

impl AnnotationLedger {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_HISTORY_CAPACITY, DEFAULT_TRACKED_FRAMES)
    }

    pub fn with_limits(capacity: usize, tracked_frames: usize) -> Self {
        Self {
            entries: Entries::new(),
            active: None,
            timelines: HashMap::new(),
            recency: Recency::new(tracked_frames),
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::with_limits(config.capacity, config.tracked_frames)
    }

    /// 動画の切り替え。全フレームの履歴と LRU を破棄する
    pub fn activate(&mut self, video: &str) {
        self.clear_history();
        self.active = Some(video.to_string());
    }

    /// 動画の選択が外れたときに呼ぶ。正解データは残し、履歴だけを捨てる
    pub fn deactivate(&mut self) {
        self.clear_history();
        self.active = None;
    }

    pub fn active_video(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn clear_history(&mut self) {
        self.timelines.clear();
        self.recency.clear();
    }

    fn is_active(&self, video: &str) -> bool {
        self.active.as_deref() == Some(video)
    }

    /// 骨格をコミットして、そのフレームの履歴の末尾に追加する
    pub fn commit(&mut self, video: &str, frame: usize, skeleton: Skeleton) {
        if !self.is_active(video) {
            self.activate(video);
        }

        let origin = self.get(video, frame).cloned();
        let capacity = self.capacity;
        let timeline = self
            .timelines
            .entry(frame)
            .or_insert_with(|| Timeline::new(capacity, origin));
        timeline.push(skeleton.clone());
        debug!(
            "commit frame {}: pointer {}/{}",
            frame,
            timeline.pointer(),
            timeline.len()
        );

        self.entries
            .entry(video.to_string())
            .or_default()
            .insert(frame, skeleton);

        if let Some(evicted) = self.recency.touch(frame) {
            self.timelines.remove(&evicted);
            debug!("history of frame {} evicted", evicted);
        }
    }

    /// 1つ前の状態に戻す。戻せなければ `None`
    pub fn undo(&mut self, video: &str, frame: usize) -> Option<usize> {
        if !self.is_active(video) {
            return None;
        }
        let timeline = self.timelines.get_mut(&frame)?;
        let restored = timeline.undo()?;
        debug!(
            "undo frame {}: pointer {}/{}",
            frame,
            timeline.pointer(),
            timeline.len()
        );
        self.set_entry(video, frame, restored);
        Some(frame)
    }

    pub fn redo(&mut self, video: &str, frame: usize) -> Option<usize> {
        if !self.is_active(video) {
            return None;
        }
        let timeline = self.timelines.get_mut(&frame)?;
        let restored = timeline.redo()?;
        debug!(
            "redo frame {}: pointer {}/{}",
            frame,
            timeline.pointer(),
            timeline.len()
        );
        self.set_entry(video, frame, Some(restored));
        Some(frame)
    }

    pub fn can_undo(&self, frame: usize) -> bool {
        self.timelines.get(&frame).is_some_and(Timeline::can_undo)
    }

    pub fn can_redo(&self, frame: usize) -> bool {
        self.timelines.get(&frame).is_some_and(Timeline::can_redo)
    }

    fn set_entry(&mut self, video: &str, frame: usize, skeleton: Option<Skeleton>) {
        match skeleton {
            Some(s) => {
                self.entries
                    .entry(video.to_string())
                    .or_default()
                    .insert(frame, s);
            }
            None => {
                if let Some(frames) = self.entries.get_mut(video) {
                    frames.remove(&frame);
                    if frames.is_empty() {
                        self.entries.remove(video);
                    }
                }
            }
        }
    }

    pub fn get(&self, video: &str, frame: usize) -> Option<&Skeleton> {
        self.entries.get(video)?.get(&frame)
    }

    pub fn is_labeled(&self, video: &str, frame: usize) -> bool {
        self.get(video, frame).is_some()
    }

    /// 正解データのあるフレーム番号
    pub fn labeled_frames(&self, video: &str) -> BTreeSet<usize> {
        self.entries
            .get(video)
            .map(|frames| frames.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn labeled_count(&self, video: &str) -> usize {
        self.entries.get(video).map_or(0, BTreeMap::len)
    }

    /// `frame` より前で最も近い正解データと、後で最も近い正解データ
    pub fn neighbors(
        &self,
        video: &str,
        frame: usize,
    ) -> (Option<(usize, &Skeleton)>, Option<(usize, &Skeleton)>) {
        let Some(frames) = self.entries.get(video) else {
            return (None, None);
        };
        let previous = frames.range(..frame).next_back().map(|(f, s)| (*f, s));
        let next = frames
            .range(frame.saturating_add(1)..)
            .next()
            .map(|(f, s)| (*f, s));
        (previous, next)
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        project::write(path, &self.entries)?;
        info!(
            "Saved {} labeled frames across {} videos to {}",
            self.entries.values().map(BTreeMap::len).sum::<usize>(),
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// 正解データを置き換える。履歴は空になる
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let entries = project::read(path)?;
        self.entries = entries;
        self.clear_history();
        info!(
            "Loaded {} videos from {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }
}

impl Default for AnnotationLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;

    const VIDEO: &str = "clip";

    fn mark(v: f32) -> Skeleton {
        let mut s = Skeleton::zeroed();
        s.pose[0] = Landmark::new(v, v, 0.0, 1.0);
        s
    }

    #[test]
    fn test_commit_then_undo_restores_absent() {
        let mut ledger = AnnotationLedger::new();
        ledger.commit(VIDEO, 3, mark(0.1));
        assert_eq!(ledger.get(VIDEO, 3), Some(&mark(0.1)));

        assert_eq!(ledger.undo(VIDEO, 3), Some(3));
        assert_eq!(ledger.get(VIDEO, 3), None);
        assert!(ledger.labeled_frames(VIDEO).is_empty());
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn test_commit_then_undo_restores_previous() {
        let mut ledger = AnnotationLedger::new();
        ledger.commit(VIDEO, 3, mark(0.1));
        ledger.commit(VIDEO, 3, mark(0.2));
        ledger.undo(VIDEO, 3);
        assert_eq!(ledger.get(VIDEO, 3), Some(&mark(0.1)));
        ledger.redo(VIDEO, 3);
        assert_eq!(ledger.get(VIDEO, 3), Some(&mark(0.2)));
    }

    #[test]
    fn test_nothing_to_undo_or_redo() {
        let mut ledger = AnnotationLedger::new();
        assert_eq!(ledger.undo(VIDEO, 0), None);
        assert_eq!(ledger.redo(VIDEO, 0), None);
        ledger.commit(VIDEO, 0, mark(0.1));
        assert_eq!(ledger.redo(VIDEO, 0), None);
        assert_eq!(ledger.get(VIDEO, 0), Some(&mark(0.1)));
    }

    #[test]
    fn test_51_commits_loses_earliest() {
        let mut ledger = AnnotationLedger::new();
        for i in 1..=51 {
            ledger.commit(VIDEO, 0, mark(i as f32));
        }
        let mut reachable = vec![ledger.get(VIDEO, 0).unwrap().pose[0].x];
        while ledger.undo(VIDEO, 0).is_some() {
            reachable.push(ledger.get(VIDEO, 0).unwrap().pose[0].x);
        }
        assert_eq!(reachable.len(), 50);
        assert_eq!(reachable.first(), Some(&51.0));
        assert_eq!(reachable.last(), Some(&2.0));
        assert!(!ledger.can_undo(0));
    }

    #[test]
    fn test_eleventh_frame_evicts_least_recent() {
        let mut ledger = AnnotationLedger::new();
        for frame in 0..11 {
            ledger.commit(VIDEO, frame, mark(frame as f32));
        }
        assert!(!ledger.can_undo(0));
        assert_eq!(ledger.get(VIDEO, 0), Some(&mark(0.0)));
        assert_eq!(ledger.undo(VIDEO, 0), None);
        assert_eq!(ledger.get(VIDEO, 0), Some(&mark(0.0)));
        assert!((1..11).all(|f| ledger.can_undo(f)));
    }

    #[test]
    fn test_recommit_refreshes_recency() {
        let mut ledger = AnnotationLedger::with_limits(50, 2);
        ledger.commit(VIDEO, 0, mark(0.1));
        ledger.commit(VIDEO, 1, mark(0.2));
        ledger.commit(VIDEO, 0, mark(0.3));
        ledger.commit(VIDEO, 2, mark(0.4));
        assert!(ledger.can_undo(0));
        assert!(!ledger.can_undo(1));
    }

    #[test]
    fn test_history_after_eviction_starts_from_entry() {
        let mut ledger = AnnotationLedger::with_limits(50, 1);
        ledger.commit(VIDEO, 0, mark(0.1));
        ledger.commit(VIDEO, 1, mark(0.2));
        ledger.commit(VIDEO, 0, mark(0.3));
        // 新しい履歴のコミット前の状態は 0.1
        ledger.undo(VIDEO, 0);
        assert_eq!(ledger.get(VIDEO, 0), Some(&mark(0.1)));
    }

    #[test]
    fn test_queries_do_not_mutate() {
        let mut ledger = AnnotationLedger::new();
        ledger.commit(VIDEO, 4, mark(0.1));
        for _ in 0..3 {
            assert!(ledger.can_undo(4));
            assert!(!ledger.can_redo(4));
        }
        assert_eq!(ledger.get(VIDEO, 4), Some(&mark(0.1)));
    }

    #[test]
    fn test_switching_video_clears_history() {
        let mut ledger = AnnotationLedger::new();
        ledger.activate(VIDEO);
        ledger.commit(VIDEO, 0, mark(0.1));
        ledger.activate("other");
        assert!(!ledger.can_undo(0));
        assert_eq!(ledger.undo(VIDEO, 0), None);
        assert_eq!(ledger.get(VIDEO, 0), Some(&mark(0.1)));

        // 別の動画へのコミットも履歴を切り替える
        ledger.commit("other", 5, mark(0.2));
        ledger.commit(VIDEO, 6, mark(0.3));
        assert_eq!(ledger.active_video(), Some(VIDEO));
        assert!(!ledger.can_undo(5));
    }

    #[test]
    fn test_deactivate_keeps_entries() {
        let mut ledger = AnnotationLedger::new();
        ledger.commit(VIDEO, 2, mark(0.1));
        ledger.deactivate();
        assert_eq!(ledger.active_video(), None);
        assert!(!ledger.can_undo(2));
        assert_eq!(ledger.undo(VIDEO, 2), None);
        assert_eq!(ledger.get(VIDEO, 2), Some(&mark(0.1)));
    }

    #[test]
    fn test_labeled_count_matches_entries() {
        let mut ledger = AnnotationLedger::with_limits(4, 3);
        for step in 0..40usize {
            let frame = (step * 7) % 5;
            if step % 3 == 0 {
                ledger.undo(VIDEO, frame);
            } else {
                ledger.commit(VIDEO, frame, mark(step as f32));
            }
            let expected = (0..5).filter(|f| ledger.get(VIDEO, *f).is_some()).count();
            assert_eq!(ledger.labeled_count(VIDEO), expected);
            assert_eq!(ledger.labeled_frames(VIDEO).len(), expected);
        }
    }

    #[test]
    fn test_neighbors() {
        let mut ledger = AnnotationLedger::new();
        ledger.commit(VIDEO, 2, mark(0.2));
        ledger.commit(VIDEO, 5, mark(0.5));
        ledger.commit(VIDEO, 9, mark(0.9));

        let (prev, next) = ledger.neighbors(VIDEO, 5);
        assert_eq!(prev.map(|(f, _)| f), Some(2));
        assert_eq!(next.map(|(f, _)| f), Some(9));
        let (prev, next) = ledger.neighbors(VIDEO, 0);
        assert!(prev.is_none());
        assert_eq!(next.map(|(f, _)| f), Some(2));
        assert_eq!(ledger.neighbors("other", 3), (None, None));
    }

    #[test]
    fn test_save_load_clears_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.glmks");

        let mut ledger = AnnotationLedger::new();
        ledger.commit(VIDEO, 1, mark(0.1));
        ledger.commit(VIDEO, 1, mark(0.2));
        ledger.commit("other", 7, mark(0.7));
        ledger.save(&path).unwrap();
        let saved = ledger.entries().clone();

        ledger.commit(VIDEO, 1, mark(0.3));
        ledger.load(&path).unwrap();
        assert_eq!(ledger.entries(), &saved);
        assert!(!ledger.can_undo(1));
        assert!(!ledger.can_undo(7));

        let mut fresh = AnnotationLedger::new();
        fresh.load(&path).unwrap();
        assert_eq!(fresh.entries(), &saved);
    }

    #[test]
    fn test_load_failure_keeps_entries() {
        let mut ledger = AnnotationLedger::new();
        ledger.commit(VIDEO, 1, mark(0.1));
        assert!(ledger.load(Path::new("/nonexistent/p.glmks")).is_err());
        assert_eq!(ledger.get(VIDEO, 1), Some(&mark(0.1)));
        assert!(ledger.can_undo(1));
    }
}
