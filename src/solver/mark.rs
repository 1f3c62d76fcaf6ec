/// Epoch-stamped membership set over cell indices.
///
/// `reset` is O(1): it advances the epoch base so every stamp from the
/// previous round becomes stale. The dense `list` of currently marked
/// cells is kept for iteration (the deadlock test walks it to check every
/// frozen box).
pub struct MarkSet {
    stamps: Vec<u32>,
    list: Vec<usize>,
    count: usize,
    epoch_base: u32,
    max_marks: u32,
}

impl MarkSet {
    pub fn new(num_cells: usize, max_marks: usize) -> MarkSet {
        MarkSet {
            stamps: vec![0; num_cells],
            list: vec![0; max_marks],
            count: 0,
            epoch_base: 1,
            max_marks: max_marks as u32,
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
        if self.epoch_base >= u32::MAX - 2 * self.max_marks {
            for stamp in &mut self.stamps {
                *stamp = 0;
            }
            self.epoch_base = 1;
        } else {
            self.epoch_base += self.max_marks;
        }
    }

    pub fn mark(&mut self, pos: usize) {
        self.stamps[pos] = self.epoch_base + self.count as u32;
        self.list[self.count] = pos;
        self.count += 1;
    }

    /// Swap-removes `pos` from the dense list. `pos` must be marked.
    pub fn unmark(&mut self, pos: usize) {
        let slot = (self.stamps[pos] - self.epoch_base) as usize;
        self.stamps[pos] = 0;
        self.count -= 1;
        let last = self.list[self.count];
        self.stamps[last] = self.epoch_base + slot as u32;
        self.list[slot] = last;
    }

    pub fn is_marked(&self, pos: usize) -> bool {
        self.stamps[pos] >= self.epoch_base
    }

    pub fn marked(&self) -> &[usize] {
        &self.list[..self.count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_unmark() {
        let mut marks = MarkSet::new(10, 4);
        marks.mark(3);
        marks.mark(7);
        marks.mark(1);
        assert!(marks.is_marked(3));
        assert!(marks.is_marked(7));
        assert!(!marks.is_marked(2));
        assert_eq!(marks.marked(), &[3, 7, 1]);

        marks.unmark(7);
        assert!(!marks.is_marked(7));
        assert!(marks.is_marked(1));
        assert_eq!(marks.marked(), &[3, 1]);
    }

    #[test]
    fn reset_is_cheap_and_complete() {
        let mut marks = MarkSet::new(10, 4);
        marks.mark(3);
        marks.reset();
        assert!(!marks.is_marked(3));
        assert_eq!(marks.marked().len(), 0);

        marks.mark(3);
        assert!(marks.is_marked(3));
        marks.reset();
        assert!(!marks.is_marked(3));
    }

    #[test]
    fn epoch_overflow_clears() {
        let mut marks = MarkSet::new(4, 2);
        // force many resets past the wrap guard
        for _ in 0..10 {
            marks.epoch_base = u32::MAX - 3;
            marks.mark(1);
            marks.reset();
            assert!(!marks.is_marked(1));
        }
    }
}
