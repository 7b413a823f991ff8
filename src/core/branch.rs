// branch.rs
//
// Branch prediction and the checkpoint stack that makes rollback cheap.
// The predictor is a direct-mapped table of 8 one-bit entries indexed by
// the low 3 bits of (4 * instruction ID), so every ID maps deterministically
// to one of 8 slots regardless of how many times the program counter has
// jumped around by the time that ID is fetched. A checkpoint captures the
// RAT at rename time and the target the instruction did *not* predict, so
// a later misprediction can restore the renamer and redirect the IQ to the
// other path in one step.

use crate::core::rat::RegisterAliasTable;

const TABLE_SIZE: usize = 8;

pub struct BranchPredictor {
    taken: [bool; TABLE_SIZE],
}

impl Default for BranchPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchPredictor {
    pub fn new() -> Self {
        Self { taken: [true; TABLE_SIZE] }
    }

    fn index(id: u64) -> usize {
        ((4 * id) & 0b111) as usize
    }

    pub fn predict(&self, id: u64) -> bool {
        self.taken[Self::index(id)]
    }

    /// Update the table only when the prediction was wrong, matching the
    /// update-on-misprediction behaviour of the source predictor.
    pub fn resolve(&mut self, id: u64, actually_taken: bool) {
        let slot = Self::index(id);
        if self.taken[slot] != actually_taken {
            self.taken[slot] = actually_taken;
        }
    }
}

#[derive(Clone)]
pub struct Checkpoint {
    pub branch_id: u64,
    pub rat: RegisterAliasTable,
    /// Fetch index of the path *not* predicted -- where the IQ must be
    /// redirected to if this branch turns out to be mispredicted.
    pub other_target: usize,
    pub predicted_taken: bool,
}

pub struct CheckpointStack {
    entries: Vec<Checkpoint>,
    capacity: usize,
}

impl CheckpointStack {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Vec::new(), capacity }
    }

    pub fn has_room(&self) -> bool {
        self.entries.len() < self.capacity
    }

    pub fn push(
        &mut self,
        branch_id: u64,
        rat: &RegisterAliasTable,
        other_target: usize,
        predicted_taken: bool,
    ) {
        self.entries.push(Checkpoint { branch_id, rat: rat.clone(), other_target, predicted_taken });
    }

    /// On resolution of `branch_id`, drop its checkpoint and every one
    /// taken after it (those branches are necessarily newer and either
    /// already resolved in program order or about to be squashed anyway).
    pub fn take(&mut self, branch_id: u64) -> Option<Checkpoint> {
        let pos = self.entries.iter().position(|c| c.branch_id == branch_id)?;
        let cp = self.entries[pos].clone();
        self.entries.truncate(pos);
        Some(cp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_defaults_taken_and_flips_on_misprediction() {
        let mut p = BranchPredictor::new();
        assert!(p.predict(1));
        p.resolve(1, false);
        assert!(!p.predict(1));
    }

    #[test]
    fn predictor_indices_wrap_through_id_times_four() {
        // IDs 0 and 2 both map to slot 0 ((4*0)&7 == 0, (4*2)&7 == 0).
        let mut p = BranchPredictor::new();
        p.resolve(0, false);
        assert!(!p.predict(2));
    }

    #[test]
    fn checkpoint_take_discards_newer_entries_too() {
        let mut stack = CheckpointStack::new(4);
        let rat = RegisterAliasTable::new();
        stack.push(1, &rat, 10, true);
        stack.push(3, &rat, 20, false);
        stack.push(5, &rat, 30, true);
        let cp = stack.take(3).unwrap();
        assert_eq!(cp.other_target, 20);
        assert!(stack.take(5).is_none());
        assert!(stack.take(1).is_some());
    }
}
