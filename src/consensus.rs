//! 複数手法の検出結果を融合し、アノテーターが編集する骨格を決める

use log::warn;
use ndarray::{Array2, Zip};

use crate::error::{AnnotationError, Result};
use crate::ledger::AnnotationLedger;
use crate::pose::{HandSide, Landmark, Skeleton, CHANNELS, HAND_LANDMARKS, POSE_LANDMARKS};
use crate::store::SkeletonStore;

/// 表示する骨格の取得元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// 保存済みの正解データがあればそれを使う
    Saved,
    /// 常に手法の平均を使う
    Average,
}

/// 解決結果
#[derive(Debug, Clone, PartialEq)]
pub enum Consensus {
    Saved(Skeleton),
    Fused(Skeleton),
}

impl Consensus {
    pub fn into_skeleton(self) -> Skeleton {
        match self {
            Self::Saved(s) | Self::Fused(s) => s,
        }
    }
}

/// 要素ごとの合計と「0でない値を報告した手法の数」
struct Accumulator {
    sum: Array2<f32>,
    count: Array2<f32>,
}

impl Accumulator {
    fn new(rows: usize) -> Self {
        Self {
            sum: Array2::zeros((rows, CHANNELS)),
            count: Array2::zeros((rows, CHANNELS)),
        }
    }

    fn add(&mut self, points: &[Landmark]) {
        let rows = self.sum.nrows();
        if points.len() != rows {
            warn!("skipping {} landmarks, expected {}", points.len(), rows);
            return;
        }
        let flat: Vec<f32> = points.iter().flat_map(|p| p.to_array()).collect();
        let Ok(values) = Array2::from_shape_vec((rows, CHANNELS), flat) else {
            return;
        };
        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(&values)
            .for_each(|sum, count, &v| {
                *sum += v;
                if v != 0.0 {
                    *count += 1.0;
                }
            });
    }

    /// 合計 / 個数。0除算で出た NaN・±Inf は 0 にする
    fn mean(self) -> Vec<Landmark> {
        let mut mean = &self.sum / &self.count;
        mean.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
        mean.rows()
            .into_iter()
            .map(|row| Landmark::from_array([row[0], row[1], row[2], row[3]]))
            .collect()
    }
}

/// 手法ごとの骨格を平均する
///
/// 0 は「未検出」とみなし、報告した手法だけで平均をとる。
/// 入力がなければ `None`。結果には常に両手が含まれる。
pub fn fuse<'a, I>(skeletons: I) -> Option<Skeleton>
where
    I: IntoIterator<Item = &'a Skeleton>,
{
    let mut pose = Accumulator::new(POSE_LANDMARKS);
    let mut left = Accumulator::new(HAND_LANDMARKS);
    let mut right = Accumulator::new(HAND_LANDMARKS);
    let mut contributors = 0usize;

    for skeleton in skeletons {
        contributors += 1;
        pose.add(&skeleton.pose);
        if let Some(points) = skeleton.hand(HandSide::Left) {
            left.add(points);
        }
        if let Some(points) = skeleton.hand(HandSide::Right) {
            right.add(points);
        }
    }
    if contributors == 0 {
        return None;
    }

    let hands = [(HandSide::Left, left.mean()), (HandSide::Right, right.mean())]
        .into_iter()
        .collect();
    Some(Skeleton::new(pose.mean(), hands))
}

/// `frame` に表示する骨格を決める
///
/// 1. `mode` が `Saved` で正解データがあれば、それをそのまま返す
/// 2. 手法が選択されていれば、その平均
/// 3. どちらでもなければ `None`
pub fn resolve<S: AsRef<str>>(
    store: &SkeletonStore,
    ledger: &AnnotationLedger,
    frame: usize,
    methods: &[S],
    mode: SourceMode,
) -> Result<Option<Consensus>> {
    let video = store.video_id().ok_or(AnnotationError::NoVideo)?;
    if mode == SourceMode::Saved {
        if let Some(saved) = ledger.get(video, frame) {
            return Ok(Some(Consensus::Saved(saved.clone())));
        }
    }
    if methods.is_empty() {
        return Ok(None);
    }

    let skeletons = methods
        .iter()
        .map(|m| store.frame_skeleton(m.as_ref(), frame, false))
        .collect::<Result<Vec<_>>>()?;
    Ok(fuse(&skeletons).map(Consensus::Fused))
}

/// 未ラベルのフレームを前後の正解データから埋める方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    Previous,
    Next,
    /// 前後の平均
    Between,
}

pub fn fill_from_neighbors(
    previous: Option<&Skeleton>,
    next: Option<&Skeleton>,
    mode: FillMode,
) -> Option<Skeleton> {
    match mode {
        FillMode::Previous => previous.cloned(),
        FillMode::Next => next.cloned(),
        FillMode::Between => fuse([previous?, next?]),
    }
}
