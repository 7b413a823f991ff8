// rob.rs
//
// Reorder buffer: a fixed-size ring of slots, head commits, tail admits.
// A slot's tag *is* its physical index -- "ROB3" names the third slot
// directly, never a logical FIFO position -- so that rollback ("discard
// everything after branch B") is a pointer reset rather than a list walk.

use crate::arch::registers::RegName;
use crate::core::instruction::Instruction;
use crate::core::value::RegValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RobTag(pub usize);

impl std::fmt::Display for RobTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ROB{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RobEntry {
    pub id: u64,
    pub op: Instruction,
    pub dest: Option<RegName>,
    pub value: Option<RegValue>,
    pub done: bool,
    /// Set when this entry's writeback happened in the current cycle, so
    /// commit's freshness check can refuse to commit in the same cycle.
    pub writeback_cycle: Option<u64>,
}

impl RobEntry {
    fn new(id: u64, op: Instruction, dest: Option<RegName>) -> Self {
        Self {
            id,
            op,
            dest,
            value: None,
            done: false,
            writeback_cycle: None,
        }
    }
}

pub struct ReorderBuffer {
    slots: Vec<Option<RobEntry>>,
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            capacity,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Reserve a slot at the tail for a newly renamed instruction. Returns
    /// `None` (stall) if the ROB is full.
    pub fn admit(&mut self, id: u64, op: Instruction, dest: Option<RegName>) -> Option<RobTag> {
        if self.is_full() {
            return None;
        }
        let idx = self.tail;
        self.slots[idx] = Some(RobEntry::new(id, op, dest));
        self.tail = (self.tail + 1) % self.capacity;
        self.count += 1;
        Some(RobTag(idx))
    }

    pub fn entry(&self, tag: RobTag) -> Option<&RobEntry> {
        self.slots[tag.0].as_ref()
    }

    pub fn entry_mut(&mut self, tag: RobTag) -> Option<&mut RobEntry> {
        self.slots[tag.0].as_mut()
    }

    pub fn head_tag(&self) -> Option<RobTag> {
        (!self.is_empty()).then_some(RobTag(self.head))
    }

    /// Pop the head entry. Caller must already have confirmed it is done
    /// and fresh.
    pub fn commit_head(&mut self) -> RobEntry {
        let entry = self.slots[self.head].take().expect("commit of empty ROB head");
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        entry
    }

    /// Discard every entry admitted strictly after `branch_tag`, resetting
    /// the tail back to just after the branch. Entries between the new
    /// tail and old tail are cleared (freed, not merely marked non-done,
    /// since they are about to be re-admitted by rename on the fall-through
    /// path).
    pub fn rollback_after(&mut self, branch_tag: RobTag) {
        let new_tail = (branch_tag.0 + 1) % self.capacity;
        let mut idx = new_tail;
        while idx != self.tail {
            self.slots[idx] = None;
            self.count -= 1;
            idx = (idx + 1) % self.capacity;
        }
        self.tail = new_tail;
    }

    /// All occupied slots in program order (head to tail), used by the
    /// completion table and by rollback-totality checks in tests.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (RobTag, &RobEntry)> {
        let cap = self.capacity;
        let head = self.head;
        let count = self.count;
        (0..count).map(move |i| {
            let idx = (head + i) % cap;
            (RobTag(idx), self.slots[idx].as_ref().unwrap())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_commit_order() {
        let mut rob = ReorderBuffer::new(4);
        let t0 = rob
            .admit(0, Instruction::Addi { rt: 1, rs: 0, imm: 1 }, Some(RegName::Int(1)))
            .unwrap();
        let t1 = rob
            .admit(1, Instruction::Addi { rt: 2, rs: 0, imm: 2 }, Some(RegName::Int(2)))
            .unwrap();
        assert_eq!(t0, RobTag(0));
        assert_eq!(t1, RobTag(1));
        assert_eq!(rob.head_tag(), Some(RobTag(0)));
        rob.commit_head();
        assert_eq!(rob.head_tag(), Some(RobTag(1)));
    }

    #[test]
    fn full_admission_stalls() {
        let mut rob = ReorderBuffer::new(1);
        assert!(rob
            .admit(0, Instruction::Addi { rt: 1, rs: 0, imm: 1 }, Some(RegName::Int(1)))
            .is_some());
        assert!(rob
            .admit(1, Instruction::Addi { rt: 2, rs: 0, imm: 2 }, Some(RegName::Int(2)))
            .is_none());
    }

    #[test]
    fn rollback_frees_newer_entries() {
        let mut rob = ReorderBuffer::new(8);
        for i in 0..4u64 {
            rob.admit(i, Instruction::Addi { rt: 1, rs: 0, imm: 1 }, Some(RegName::Int(1)))
                .unwrap();
        }
        // Roll back to branch at ROB1 (id 1): ROB2, ROB3 must be freed.
        rob.rollback_after(RobTag(1));
        assert_eq!(rob.len(), 2);
        assert!(rob.entry(RobTag(2)).is_none());
        assert!(rob.entry(RobTag(3)).is_none());
    }
}
