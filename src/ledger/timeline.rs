use std::collections::VecDeque;

use crate::pose::Skeleton;

/// 1フレーム分の undo/redo 履歴
///
/// `pointer > 0` のとき、正解データは常に `items[pointer - 1]` と一致する。
/// `pointer == 0` は最初のコミット前の状態 (`origin`) を指す。
/// 容量を超えて先頭を捨てた後は `origin` に戻れない。
#[derive(Debug, Clone)]
pub struct Timeline {
    items: VecDeque<Skeleton>,
    pointer: usize,
    capacity: usize,
    origin: Option<Skeleton>,
    trimmed: bool,
}

impl Timeline {
    /// `origin` は履歴を作る前の正解データ (なければ `None`)
    pub fn new(capacity: usize, origin: Option<Skeleton>) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            pointer: 0,
            capacity: capacity.max(1),
            origin,
            trimmed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// 追加して新しい末尾を指す。pointer より後ろ (redo 側) は捨てる
    pub fn push(&mut self, skeleton: Skeleton) {
        self.items.truncate(self.pointer);
        self.items.push_back(skeleton);
        if self.items.len() > self.capacity {
            self.items.pop_front();
            self.trimmed = true;
        }
        self.pointer = self.items.len();
    }

    fn floor(&self) -> usize {
        usize::from(self.trimmed)
    }

    pub fn can_undo(&self) -> bool {
        self.pointer > self.floor()
    }

    pub fn can_redo(&self) -> bool {
        self.pointer < self.items.len()
    }

    /// 1つ戻し、戻った先の正解データを返す (`Some(None)` は「正解データなし」)
    pub fn undo(&mut self) -> Option<Option<Skeleton>> {
        if !self.can_undo() {
            return None;
        }
        self.pointer -= 1;
        Some(self.current())
    }

    pub fn redo(&mut self) -> Option<Skeleton> {
        let item = self.items.get(self.pointer)?.clone();
        self.pointer += 1;
        Some(item)
    }

    fn current(&self) -> Option<Skeleton> {
        match self.pointer {
            0 => self.origin.clone(),
            p => self.items.get(p - 1).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;

    fn mark(v: f32) -> Skeleton {
        let mut s = Skeleton::empty();
        s.pose[0] = Landmark::new(v, v, 0.0, 1.0);
        s
    }

    fn value(s: &Skeleton) -> f32 {
        s.pose[0].x
    }

    #[test]
    fn test_new_timeline() {
        let t = Timeline::new(50, None);
        assert!(t.is_empty());
        assert!(!t.can_undo());
        assert!(!t.can_redo());
    }

    #[test]
    fn test_undo_to_origin() {
        let mut t = Timeline::new(50, None);
        t.push(mark(0.1));
        assert_eq!(t.undo(), Some(None));
        assert_eq!(t.pointer(), 0);
        assert_eq!(t.undo(), None);

        let mut t = Timeline::new(50, Some(mark(0.9)));
        t.push(mark(0.1));
        assert_eq!(t.undo(), Some(Some(mark(0.9))));
    }

    #[test]
    fn test_redo_after_undo() {
        let mut t = Timeline::new(50, None);
        t.push(mark(0.1));
        t.push(mark(0.2));
        assert_eq!(t.undo().flatten().map(|s| value(&s)), Some(0.1));
        assert!(t.can_redo());
        assert_eq!(t.redo().map(|s| value(&s)), Some(0.2));
        assert!(!t.can_redo());
        assert_eq!(t.redo(), None);
    }

    #[test]
    fn test_push_discards_redo_tail() {
        let mut t = Timeline::new(50, None);
        t.push(mark(0.1));
        t.push(mark(0.2));
        t.push(mark(0.3));
        t.undo();
        t.undo();
        t.push(mark(0.4));
        assert_eq!(t.len(), 2);
        assert_eq!(t.pointer(), 2);
        assert!(!t.can_redo());
        assert_eq!(t.undo().flatten().map(|s| value(&s)), Some(0.1));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut t = Timeline::new(3, None);
        for i in 1..=4 {
            t.push(mark(i as f32 / 10.0));
        }
        assert_eq!(t.len(), 3);

        let mut seen = Vec::new();
        while let Some(entry) = t.undo() {
            seen.push(entry.map(|s| value(&s)));
        }
        // 0.1 とコミット前の状態には戻れない
        assert_eq!(seen, vec![Some(0.3), Some(0.2)]);
        assert!(!t.can_undo());
        assert_eq!(t.pointer(), 1);
    }
}
