// reservation_station.rs
//
// A pool of reservation-station entries for one functional-unit class.
// The same generic pool backs the integer ALU, FP adder, and FP
// multiplier classes; only the operation enum each one holds differs.
// Loads and stores do not use this pool -- they have program-ordering and
// forwarding needs the LSQ models separately (core::lsq).

use crate::core::rob::RobTag;
use crate::core::value::{Operand, RegValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Addi,
    Beq,
    Bne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpAddOp {
    AddD,
    SubD,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpMulOp {
    MultD,
}

#[derive(Debug, Clone)]
pub struct RsEntry<Op> {
    pub id: u64,
    pub dest: RobTag,
    pub op: Op,
    pub j: Operand,
    pub k: Operand,
    pub executing: bool,
}

impl<Op> RsEntry<Op> {
    fn is_ready(&self) -> bool {
        !self.executing && self.j.is_ready() && self.k.is_ready()
    }
}

pub struct RsPool<Op> {
    entries: Vec<Option<RsEntry<Op>>>,
}

impl<Op: Copy> RsPool<Op> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.iter().all(|e| e.is_some())
    }

    /// Insert a new entry into the first free slot. Slot order is
    /// insertion order modulo admission skips, which is what execute's
    /// "RS insertion order" tie-break relies on.
    pub fn insert(&mut self, id: u64, dest: RobTag, op: Op, j: Operand, k: Operand) {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .expect("insert called on a full RS pool");
        *slot = Some(RsEntry { id, dest, op, j, k, executing: false });
    }

    pub fn broadcast(&mut self, tag: RobTag, value: RegValue) {
        for entry in self.entries.iter_mut().flatten() {
            entry.j.resolve(tag, value);
            entry.k.resolve(tag, value);
        }
    }

    /// Indices of entries ready to execute (both operands resolved, not
    /// already executing), in slot order. Freshness (must not execute in
    /// the issue cycle) is the caller's responsibility since only the
    /// caller has access to the per-instruction stage timestamps.
    pub fn ready_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().filter(|e| e.is_ready()).map(|_| i))
            .collect()
    }

    pub fn get(&self, idx: usize) -> &RsEntry<Op> {
        self.entries[idx].as_ref().expect("index not occupied")
    }

    pub fn mark_executing(&mut self, idx: usize) {
        self.entries[idx].as_mut().expect("index not occupied").executing = true;
    }

    pub fn remove(&mut self, idx: usize) -> RsEntry<Op> {
        self.entries[idx].take().expect("index not occupied")
    }

    pub fn find_by_dest(&self, dest: RobTag) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.dest == dest))
    }

    /// Discard every entry with an ID strictly greater than `branch_id`,
    /// as part of a misprediction rollback.
    pub fn purge_after(&mut self, branch_id: u64) {
        for slot in &mut self.entries {
            if slot.as_ref().is_some_and(|e| e.id > branch_id) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::RegValue;

    #[test]
    fn ready_requires_both_operands_resolved() {
        let mut pool: RsPool<AluOp> = RsPool::new(2);
        pool.insert(
            0,
            RobTag(0),
            AluOp::Add,
            Operand::Value(RegValue::Int(1)),
            Operand::Tag(RobTag(3)),
        );
        assert!(pool.ready_indices().is_empty());
        pool.broadcast(RobTag(3), RegValue::Int(9));
        assert_eq!(pool.ready_indices(), vec![0]);
    }

    #[test]
    fn purge_after_drops_newer_ids_only() {
        let mut pool: RsPool<AluOp> = RsPool::new(4);
        pool.insert(0, RobTag(0), AluOp::Add, Operand::Value(RegValue::Int(0)), Operand::Value(RegValue::Int(0)));
        pool.insert(5, RobTag(1), AluOp::Add, Operand::Value(RegValue::Int(0)), Operand::Value(RegValue::Int(0)));
        pool.purge_after(2);
        assert_eq!(pool.ready_indices(), vec![0]);
    }
}
