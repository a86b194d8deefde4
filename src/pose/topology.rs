//! 骨格の接続定義
//!
//! 描画側はキーポイントごとに「親」と「線の接続先」を引くだけで済むよう、
//! 接続リストから隣接テーブルをコンパイル時に構築する。

use super::keypoint::{Landmark, HAND_LANDMARKS, POSE_LANDMARKS};

/// ポーズの接続 (親, 子)
pub const POSE_CONNECTIONS: [(u8, u8); 31] = [
    // 顔
    (8, 6),
    (6, 5),
    (5, 4),
    (4, 0),
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (9, 10),
    // 上半身
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    // 胴体
    (11, 23),
    (12, 24),
    (23, 24),
    // 下半身
    (23, 25),
    (25, 27),
    (27, 29),
    (29, 31),
    (24, 26),
    (26, 28),
    (28, 30),
    (30, 32),
];

/// 手の接続 (親, 子): 手首(0)から各指先へ
pub const HAND_CONNECTIONS: [(u8, u8); 20] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// キーポイント1点の隣接情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub parent: Option<u8>,
    /// 線を引く先 (接続リストで最後に現れた子)
    pub target: Option<u8>,
}

const fn build<const N: usize>(connections: &[(u8, u8)]) -> [Link; N] {
    let mut links = [Link {
        parent: None,
        target: None,
    }; N];
    let mut i = 0;
    while i < connections.len() {
        let (from, to) = connections[i];
        links[from as usize].target = Some(to);
        links[to as usize].parent = Some(from);
        i += 1;
    }
    links
}

pub const POSE_LINKS: [Link; POSE_LANDMARKS] = build::<POSE_LANDMARKS>(&POSE_CONNECTIONS);
pub const HAND_LINKS: [Link; HAND_LANDMARKS] = build::<HAND_LANDMARKS>(&HAND_CONNECTIONS);

/// 骨格の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Pose,
    Hand,
}

impl Topology {
    pub fn links(&self) -> &'static [Link] {
        match self {
            Self::Pose => &POSE_LINKS,
            Self::Hand => &HAND_LINKS,
        }
    }

    pub fn connections(&self) -> &'static [(u8, u8)] {
        match self {
            Self::Pose => &POSE_CONNECTIONS,
            Self::Hand => &HAND_CONNECTIONS,
        }
    }

    pub fn link(&self, index: usize) -> Option<Link> {
        self.links().get(index).copied()
    }

    /// 両端とも検出されている接続の数
    pub fn visible_connections(&self, points: &[Landmark]) -> usize {
        let present = |i: u8| points.get(i as usize).is_some_and(|p| !p.is_zero());
        self.connections()
            .iter()
            .filter(|(a, b)| present(*a) && present(*b))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connections_in_range() {
        for (a, b) in POSE_CONNECTIONS {
            assert!((a as usize) < POSE_LANDMARKS && (b as usize) < POSE_LANDMARKS);
        }
        for (a, b) in HAND_CONNECTIONS {
            assert!((a as usize) < HAND_LANDMARKS && (b as usize) < HAND_LANDMARKS);
        }
    }

    #[test]
    fn test_hand_links() {
        // 手首は親なし、最後の接続 (0, 17) が線の接続先
        let wrist = Topology::Hand.link(0).unwrap();
        assert_eq!(wrist.parent, None);
        assert_eq!(wrist.target, Some(17));
        // 指先は子なし
        let tip = Topology::Hand.link(4).unwrap();
        assert_eq!(tip.parent, Some(3));
        assert_eq!(tip.target, None);
    }

    #[test]
    fn test_pose_links() {
        let nose = Topology::Pose.link(0).unwrap();
        assert_eq!(nose.parent, Some(4));
        assert_eq!(nose.target, Some(1));
        assert_eq!(Topology::Pose.link(33), None);
    }

    #[test]
    fn test_visible_connections() {
        let mut points = vec![Landmark::default(); HAND_LANDMARKS];
        assert_eq!(Topology::Hand.visible_connections(&points), 0);
        for i in [0, 1, 2, 5] {
            points[i] = Landmark::new(0.5, 0.5, 0.0, 1.0);
        }
        // (0,1) (1,2) (0,5)
        assert_eq!(Topology::Hand.visible_connections(&points), 3);
        // 点が足りなければ欠けている扱い
        assert_eq!(Topology::Pose.visible_connections(&points[..3]), 2);
    }

    #[test]
    fn test_every_hand_point_connected() {
        for (i, link) in HAND_LINKS.iter().enumerate() {
            assert!(link.parent.is_some() || link.target.is_some(), "point {i}");
        }
    }
}
