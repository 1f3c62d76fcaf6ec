/// Box positions as a dense list plus an inverse map from cell to list
/// slot, so moving a box is O(1) and iteration touches only live boxes.
///
/// Inverse entries for vacated cells go stale on purpose; they are only
/// ever read through cells that currently hold a box.
pub struct BoxPositions {
    list: Vec<usize>,
    slots: Vec<u16>,
}

impl BoxPositions {
    pub fn new(num_cells: usize, boxes: &[usize]) -> BoxPositions {
        let mut slots = vec![0; num_cells];
        for (i, &pos) in boxes.iter().enumerate() {
            slots[pos] = i as u16;
        }
        BoxPositions {
            list: boxes.to_vec(),
            slots,
        }
    }

    pub fn move_box(&mut self, old_pos: usize, new_pos: usize) {
        let slot = self.slots[old_pos];
        self.list[slot as usize] = new_pos;
        self.slots[new_pos] = slot;
    }

    pub fn positions(&self) -> &[usize] {
        &self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn moving_keeps_list_and_slots_consistent() {
        let mut boxes = BoxPositions::new(100, &[10, 20, 30]);
        boxes.move_box(20, 21);
        boxes.move_box(10, 20);
        assert_eq!(boxes.positions(), &[20, 21, 30]);
    }

    #[test]
    fn randomized_moves_stay_a_bijection() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut occupied = vec![5, 17, 42, 63];
        let mut boxes = BoxPositions::new(64, &occupied);

        for _ in 0..1000 {
            let i = rng.gen_range(0..occupied.len());
            let new_pos = rng.gen_range(0..64);
            if occupied.contains(&new_pos) {
                continue;
            }
            boxes.move_box(occupied[i], new_pos);
            occupied[i] = new_pos;
            assert_eq!(boxes.positions(), &occupied[..]);
        }
    }
}
