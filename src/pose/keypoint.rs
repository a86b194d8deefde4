use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 全身ポーズのランドマーク数
pub const POSE_LANDMARKS: usize = 33;
/// 片手のランドマーク数
pub const HAND_LANDMARKS: usize = 21;
/// 1ランドマークあたりのチャンネル数 (x, y, z, score)
pub const CHANNELS: usize = 4;

/// 単一ランドマーク
///
/// 検出ファイル上は正規化座標 (0.0〜1.0) で保存される。
/// ポーズでは `score` が visibility、手では手全体のスコア。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub score: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, score: f32) -> Self {
        Self { x, y, z, score }
    }

    /// `[x, y, z]` または `[x, y, z, score]` から生成
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match *values {
            [x, y, z] => Some(Self::new(x, y, z, 0.0)),
            [x, y, z, score] => Some(Self::new(x, y, z, score)),
            _ => None,
        }
    }

    pub fn to_array(&self) -> [f32; CHANNELS] {
        [self.x, self.y, self.z, self.score]
    }

    pub fn from_array(values: [f32; CHANNELS]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// 検出器が何も報告していない (全チャンネル0)
    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }

    /// ピクセル座標に変換 (z と score はそのまま)
    pub fn to_pixel(&self, width: u32, height: u32) -> Self {
        Self {
            x: self.x * width as f32,
            y: self.y * height as f32,
            ..*self
        }
    }

    /// ピクセル座標から正規化座標に戻す
    pub fn to_normalized(&self, width: u32, height: u32) -> Self {
        Self {
            x: self.x / width as f32,
            y: self.y / height as f32,
            ..*self
        }
    }
}

/// 手の左右
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub const ALL: [HandSide; 2] = [HandSide::Left, HandSide::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }

    /// 検出ファイルの "class" ラベルを解釈
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Left" | "left" => Some(Self::Left),
            "Right" | "right" => Some(Self::Right),
            _ => None,
        }
    }
}

impl fmt::Display for HandSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1フレーム分の骨格: ポーズ33点 + 左右の手21点
///
/// 手は検出されなかった側が欠けることがある。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub pose: Vec<Landmark>,
    pub hands: BTreeMap<HandSide, Vec<Landmark>>,
}

impl Skeleton {
    pub fn new(pose: Vec<Landmark>, hands: BTreeMap<HandSide, Vec<Landmark>>) -> Self {
        Self { pose, hands }
    }

    /// ポーズは全点0、手はなし
    pub fn empty() -> Self {
        Self {
            pose: vec![Landmark::default(); POSE_LANDMARKS],
            hands: BTreeMap::new(),
        }
    }

    /// ポーズ・両手とも全点0
    pub fn zeroed() -> Self {
        let hands = HandSide::ALL
            .iter()
            .map(|side| (*side, vec![Landmark::default(); HAND_LANDMARKS]))
            .collect();
        Self {
            pose: vec![Landmark::default(); POSE_LANDMARKS],
            hands,
        }
    }

    pub fn hand(&self, side: HandSide) -> Option<&[Landmark]> {
        self.hands.get(&side).map(|v| v.as_slice())
    }

    /// ランドマーク数が規定どおりか
    pub fn is_well_formed(&self) -> bool {
        self.pose.len() == POSE_LANDMARKS
            && self.hands.values().all(|h| h.len() == HAND_LANDMARKS)
    }

    pub fn is_blank(&self) -> bool {
        self.pose.iter().all(Landmark::is_zero)
            && self.hands.values().flatten().all(Landmark::is_zero)
    }

    fn map_landmarks(&self, f: impl Fn(&Landmark) -> Landmark) -> Self {
        Self {
            pose: self.pose.iter().map(&f).collect(),
            hands: self
                .hands
                .iter()
                .map(|(side, points)| (*side, points.iter().map(&f).collect()))
                .collect(),
        }
    }

    /// 正規化座標 → ピクセル座標 (新しい値を返し、自身は変更しない)
    pub fn to_pixel(&self, width: u32, height: u32) -> Self {
        self.map_landmarks(|lm| lm.to_pixel(width, height))
    }

    /// ピクセル座標 → 正規化座標
    pub fn to_normalized(&self, width: u32, height: u32) -> Self {
        self.map_landmarks(|lm| lm.to_normalized(width, height))
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_landmark_from_slice() {
        assert_eq!(
            Landmark::from_slice(&[0.1, 0.2, 0.3]),
            Some(Landmark::new(0.1, 0.2, 0.3, 0.0))
        );
        assert_eq!(
            Landmark::from_slice(&[0.1, 0.2, 0.3, 0.9]),
            Some(Landmark::new(0.1, 0.2, 0.3, 0.9))
        );
        assert_eq!(Landmark::from_slice(&[0.1, 0.2]), None);
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, -0.1, 0.8);
        let px = lm.to_pixel(640, 480);
        assert_eq!(px.x, 320.0);
        assert_eq!(px.y, 120.0);
        // z と score は変換しない
        assert_eq!(px.z, -0.1);
        assert_eq!(px.score, 0.8);
    }

    #[test]
    fn test_pixel_round_trip() {
        let (w, h) = (1920, 1080);
        for i in 0..=20 {
            for j in 0..=20 {
                let lm = Landmark::new(i as f32 / 20.0, j as f32 / 20.0, 0.0, 1.0);
                let px = lm.to_pixel(w, h);
                let again = px.to_normalized(w, h).to_pixel(w, h);
                assert!(approx_eq_f32(px.x, again.x, 1e-3));
                assert!(approx_eq_f32(px.y, again.y, 1e-3));
            }
        }
    }

    #[test]
    fn test_no_clamping_outside_unit_square() {
        let lm = Landmark::new(1.2, -0.1, 0.0, 0.0);
        let back = lm.to_pixel(100, 50).to_normalized(100, 50);
        assert!(approx_eq_f32(back.x, 1.2, 1e-6));
        assert!(approx_eq_f32(back.y, -0.1, 1e-6));
    }

    #[test]
    fn test_skeleton_shapes() {
        assert!(Skeleton::empty().is_well_formed());
        assert!(Skeleton::zeroed().is_well_formed());
        assert!(Skeleton::zeroed().is_blank());
        assert_eq!(Skeleton::zeroed().hands.len(), 2);
        assert!(Skeleton::empty().hand(HandSide::Left).is_none());
    }

    #[test]
    fn test_skeleton_to_pixel_keeps_source() {
        let mut skeleton = Skeleton::zeroed();
        skeleton.pose[0] = Landmark::new(0.5, 0.5, 0.0, 0.9);
        let px = skeleton.to_pixel(200, 100);
        assert_eq!(px.pose[0].x, 100.0);
        assert_eq!(px.pose[0].y, 50.0);
        assert_eq!(skeleton.pose[0].x, 0.5);
    }

    #[test]
    fn test_hand_side_label() {
        assert_eq!(HandSide::from_label("Left"), Some(HandSide::Left));
        assert_eq!(HandSide::from_label("right"), Some(HandSide::Right));
        assert_eq!(HandSide::from_label("both"), None);
        assert_eq!(HandSide::Right.to_string(), "Right");
    }
}
