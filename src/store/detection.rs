//! 検出ファイルの読み込み
//!
//! テキスト形式 (JSON):
//!
//! ```json
//! {
//!   "pose":  { "0": [[x, y, z, visibility], ...] },
//!   "hands": { "0": { "0": { "landmarks": [[x, y, z], ...], "score": 0.97, "class": "Left" } } }
//! }
//! ```
//!
//! バイナリ形式は `b"SKDT"` + バージョン (u16 LE) の後に、フレーム番号 → 骨格の
//! マップを bincode で書いたもの。

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{AnnotationError, Result};
use crate::pose::{HandSide, Landmark, Skeleton, HAND_LANDMARKS, POSE_LANDMARKS};

pub const BINARY_MAGIC: &[u8; 4] = b"SKDT";
pub const BINARY_VERSION: u16 = 1;

const BINARY_HEADER_LEN: usize = BINARY_MAGIC.len() + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionFormat {
    Json,
    Binary,
}

impl DetectionFormat {
    /// 拡張子から判定 (.bin / .skel はバイナリ、それ以外はJSON)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") | Some("skel") => Self::Binary,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDetections {
    #[serde(default)]
    pose: HashMap<String, Option<Vec<Vec<f32>>>>,
    #[serde(default)]
    hands: HashMap<String, Option<RawFrameHands>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFrameHands {
    Indexed(BTreeMap<String, RawHand>),
    Listed(Vec<RawHand>),
}

#[derive(Debug, Deserialize)]
struct RawHand {
    landmarks: Vec<Vec<f32>>,
    #[serde(default)]
    score: f32,
    class: String,
}

/// 1手法・1動画分の検出結果 (フレーム番号 → 骨格)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodTrack {
    frames: BTreeMap<u32, Skeleton>,
}

impl MethodTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame: u32, skeleton: Skeleton) {
        self.frames.insert(frame, skeleton);
    }

    pub fn get(&self, frame: usize) -> Option<&Skeleton> {
        u32::try_from(frame).ok().and_then(|f| self.frames.get(&f))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// ファイルから読み込む。開けなければ MissingFile、解釈できなければ Decode
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).map_err(|_| AnnotationError::MissingFile(path.to_path_buf()))?;
        let track = match DetectionFormat::from_path(path) {
            DetectionFormat::Json => Self::from_json_slice(&bytes)
                .map_err(|reason| AnnotationError::decode(path, reason))?,
            DetectionFormat::Binary => Self::from_binary_slice(&bytes)
                .map_err(|reason| AnnotationError::decode(path, reason))?,
        };
        if let Some((frame, _)) = track.frames.iter().find(|(_, s)| !s.is_well_formed()) {
            return Err(AnnotationError::decode(
                path,
                format!("frame {frame}: wrong landmark count"),
            ));
        }
        debug!("Loaded {} frames from {}", track.len(), path.display());
        Ok(track)
    }

    pub fn write_binary(&self, path: &Path) -> Result<()> {
        let mut data = Vec::with_capacity(BINARY_HEADER_LEN);
        data.extend_from_slice(BINARY_MAGIC);
        data.extend_from_slice(&BINARY_VERSION.to_le_bytes());
        bincode::serialize_into(&mut data, &self.frames)?;
        fs::write(path, data)?;
        Ok(())
    }

    fn from_binary_slice(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < BINARY_HEADER_LEN || &bytes[..BINARY_MAGIC.len()] != BINARY_MAGIC {
            return Err("not a binary detection file".to_string());
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != BINARY_VERSION {
            return Err(format!(
                "unsupported detection version {version} (expected {BINARY_VERSION})"
            ));
        }
        let frames = bincode::deserialize(&bytes[BINARY_HEADER_LEN..]).map_err(|e| e.to_string())?;
        Ok(Self { frames })
    }

    fn from_json_slice(bytes: &[u8]) -> std::result::Result<Self, String> {
        let raw: RawDetections = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        let mut frames: BTreeMap<u32, Skeleton> = BTreeMap::new();

        for (key, points) in raw.pose {
            let frame = parse_frame_key(&key)?;
            let pose = parse_pose(points.unwrap_or_default())
                .map_err(|e| format!("pose frame {frame}: {e}"))?;
            frames.entry(frame).or_insert_with(Skeleton::empty).pose = pose;
        }

        for (key, hands) in raw.hands {
            let frame = parse_frame_key(&key)?;
            let hands = match hands {
                Some(RawFrameHands::Indexed(map)) => map.into_values().collect(),
                Some(RawFrameHands::Listed(list)) => list,
                None => Vec::new(),
            };
            let skeleton = frames.entry(frame).or_insert_with(Skeleton::empty);
            let mut best_score: HashMap<HandSide, f32> = HashMap::new();
            for hand in hands {
                let Some(side) = HandSide::from_label(&hand.class) else {
                    warn!("frame {}: unknown hand class '{}', skipped", frame, hand.class);
                    continue;
                };
                let points = parse_hand(&hand).map_err(|e| format!("hand frame {frame}: {e}"))?;
                // 同じ側が2つ検出された場合はスコアの高い方
                if best_score.get(&side).map_or(true, |s| hand.score > *s) {
                    best_score.insert(side, hand.score);
                    skeleton.hands.insert(side, points);
                }
            }
        }

        Ok(Self { frames })
    }
}

fn parse_frame_key(key: &str) -> std::result::Result<u32, String> {
    key.trim()
        .parse()
        .map_err(|_| format!("invalid frame key '{key}'"))
}

fn parse_pose(points: Vec<Vec<f32>>) -> std::result::Result<Vec<Landmark>, String> {
    // 未検出フレームは空配列
    if points.is_empty() {
        return Ok(vec![Landmark::default(); POSE_LANDMARKS]);
    }
    if points.len() != POSE_LANDMARKS {
        return Err(format!(
            "expected {POSE_LANDMARKS} landmarks, got {}",
            points.len()
        ));
    }
    points
        .iter()
        .map(|p| {
            Landmark::from_slice(p).ok_or_else(|| format!("bad landmark of length {}", p.len()))
        })
        .collect()
}

fn parse_hand(hand: &RawHand) -> std::result::Result<Vec<Landmark>, String> {
    if hand.landmarks.len() != HAND_LANDMARKS {
        return Err(format!(
            "expected {HAND_LANDMARKS} landmarks, got {}",
            hand.landmarks.len()
        ));
    }
    hand.landmarks
        .iter()
        .map(|p| match p.len() {
            3 => Ok(Landmark::new(p[0], p[1], p[2], hand.score)),
            _ => Landmark::from_slice(p)
                .ok_or_else(|| format!("bad landmark of length {}", p.len())),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn pose_json(x: f32, y: f32, vis: f32) -> serde_json::Value {
        let points: Vec<[f32; 4]> = (0..POSE_LANDMARKS).map(|_| [x, y, 0.0, vis]).collect();
        json!(points)
    }

    pub(crate) fn hand_json(class: &str, x: f32, score: f32) -> serde_json::Value {
        let points: Vec<[f32; 3]> = (0..HAND_LANDMARKS).map(|_| [x, 0.5, 0.0]).collect();
        json!({ "landmarks": points, "score": score, "class": class })
    }

    #[test]
    fn test_parse_pose_and_hands() {
        let doc = json!({
            "pose": { "0": pose_json(0.5, 0.4, 0.9), "1": [] },
            "hands": { "0": { "0": hand_json("Left", 0.2, 0.8) } }
        });
        let track = MethodTrack::from_json_slice(doc.to_string().as_bytes()).unwrap();
        assert_eq!(track.len(), 2);

        let f0 = track.get(0).unwrap();
        assert_eq!(f0.pose[0], Landmark::new(0.5, 0.4, 0.0, 0.9));
        let left = f0.hand(HandSide::Left).unwrap();
        assert_eq!(left.len(), HAND_LANDMARKS);
        // 手のスコアは各ランドマークに付与
        assert_eq!(left[3].score, 0.8);
        assert!(f0.hand(HandSide::Right).is_none());

        // 空配列は未検出
        assert!(track.get(1).unwrap().is_blank());
        assert!(track.get(2).is_none());
    }

    #[test]
    fn test_hands_as_list() {
        let doc = json!({
            "pose": { "0": pose_json(0.1, 0.1, 1.0) },
            "hands": { "0": [hand_json("Right", 0.3, 0.5), hand_json("Right", 0.7, 0.9)] }
        });
        let track = MethodTrack::from_json_slice(doc.to_string().as_bytes()).unwrap();
        let right = track.get(0).unwrap().hand(HandSide::Right).unwrap();
        assert_eq!(right[0].x, 0.7);
    }

    #[test]
    fn test_duplicate_side_keeps_higher_score() {
        let doc = json!({
            "hands": { "0": [hand_json("Left", 0.4, 0.9), hand_json("Left", 0.6, 0.2)] }
        });
        let track = MethodTrack::from_json_slice(doc.to_string().as_bytes()).unwrap();
        let left = track.get(0).unwrap().hand(HandSide::Left).unwrap();
        assert_eq!(left[0].x, 0.4);
        assert_eq!(left[0].score, 0.9);
    }

    #[test]
    fn test_wrong_pose_length() {
        let doc = json!({ "pose": { "0": [[0.1, 0.2, 0.3, 0.4]] } });
        let err = MethodTrack::from_json_slice(doc.to_string().as_bytes()).unwrap_err();
        assert!(err.contains("expected 33"));
    }

    #[test]
    fn test_invalid_frame_key() {
        let doc = json!({ "pose": { "first": [] } });
        assert!(MethodTrack::from_json_slice(doc.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = MethodTrack::load(Path::new("/nonexistent/det.json"));
        assert!(matches!(result, Err(AnnotationError::MissingFile(_))));
    }

    #[test]
    fn test_load_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det.json");
        fs::write(&path, b"[1, 2").unwrap();
        assert!(matches!(
            MethodTrack::load(&path),
            Err(AnnotationError::Decode { .. })
        ));
    }

    #[test]
    fn test_binary_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det.bin");
        let mut track = MethodTrack::new();
        let mut skeleton = Skeleton::zeroed();
        skeleton.pose[5] = Landmark::new(0.25, 0.75, 0.1, 0.6);
        track.insert(3, skeleton.clone());
        track.write_binary(&path).unwrap();

        let loaded = MethodTrack::load(&path).unwrap();
        assert_eq!(loaded.get(3), Some(&skeleton));
    }

    #[test]
    fn test_binary_without_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det.bin");
        let mut track = MethodTrack::new();
        track.insert(0, Skeleton::zeroed());
        fs::write(&path, bincode::serialize(&track.frames).unwrap()).unwrap();
        assert!(matches!(
            MethodTrack::load(&path),
            Err(AnnotationError::Decode { .. })
        ));

        let mut data = BINARY_MAGIC.to_vec();
        data.extend_from_slice(&(BINARY_VERSION + 1).to_le_bytes());
        data.extend_from_slice(&bincode::serialize(&track.frames).unwrap());
        fs::write(&path, data).unwrap();
        let err = MethodTrack::load(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported detection version"));
    }
}
