// functional_unit.rs
//
// The integer ALU and the two FP classes. The integer ALU is a single
// non-pipelined unit: one operation occupies it for its whole latency and
// nothing else can start until it is done. The FP classes are pipelined:
// a new operation can start every cycle even while earlier ones are still
// draining, up to the configured pipeline depth in flight at once. Each
// class ends in a small FIFO output buffer that writeback arbitrates over.

use std::collections::VecDeque;

use crate::core::rob::RobTag;
use crate::core::value::RegValue;

#[derive(Debug, Clone, Copy)]
pub struct AluResult {
    pub id: u64,
    pub dest: RobTag,
    pub value: RegValue,
    pub is_branch: bool,
}

struct ActiveOp {
    id: u64,
    dest: RobTag,
    value: RegValue,
    is_branch: bool,
    remaining: usize,
}

/// Non-pipelined: the integer ALU. Also executes BEQ/BNE, whose "value"
/// is the taken/not-taken boolean.
pub struct IntegerAlu {
    latency: usize,
    active: Option<ActiveOp>,
    output: VecDeque<AluResult>,
    output_capacity: usize,
}

impl IntegerAlu {
    pub fn new(latency: usize, output_capacity: usize) -> Self {
        Self { latency, active: None, output: VecDeque::new(), output_capacity }
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn has_output_room(&self) -> bool {
        self.output.len() < self.output_capacity
    }

    /// Begin executing a result already computed combinationally at issue
    /// of the execute sub-phase; only the latency countdown happens here.
    pub fn start(&mut self, id: u64, dest: RobTag, value: RegValue, is_branch: bool) {
        debug_assert!(self.active.is_none());
        self.active = Some(ActiveOp { id, dest, value, is_branch, remaining: self.latency });
    }

    /// Advance the active op by one cycle; move it to the output buffer
    /// once its latency has elapsed.
    pub fn tick(&mut self) {
        if let Some(op) = &mut self.active {
            op.remaining = op.remaining.saturating_sub(1);
            if op.remaining == 0 {
                let op = self.active.take().unwrap();
                self.output.push_back(AluResult {
                    id: op.id,
                    dest: op.dest,
                    value: op.value,
                    is_branch: op.is_branch,
                });
            }
        }
    }

    pub fn output_front(&self) -> Option<&AluResult> {
        self.output.front()
    }

    pub fn pop_output(&mut self) -> Option<AluResult> {
        self.output.pop_front()
    }

    /// Drain every branch-typed result sitting in the output buffer,
    /// wherever it is, leaving arithmetic results in place for the
    /// ordinary CDB arbitration path. Branches carry no destination
    /// register, so they never compete for the CDB.
    pub fn take_branches(&mut self) -> Vec<AluResult> {
        let (branches, rest): (VecDeque<AluResult>, VecDeque<AluResult>) =
            self.output.drain(..).partition(|r| r.is_branch);
        self.output = rest;
        branches.into_iter().collect()
    }

    pub fn purge_after(&mut self, branch_id: u64) {
        if self.active.as_ref().is_some_and(|op| op.id > branch_id) {
            self.active = None;
        }
        self.output.retain(|r| r.id <= branch_id);
    }
}

struct PipeSlot {
    id: u64,
    dest: RobTag,
    value: RegValue,
    remaining: usize,
}

/// Pipelined: the FP adder and FP multiplier classes share this shape.
/// `depth` operations may be in flight at once, each progressing
/// independently; a new one may start every cycle room allows.
pub struct PipelinedFpUnit {
    latency: usize,
    depth: usize,
    in_flight: Vec<PipeSlot>,
    output: VecDeque<AluResult>,
    output_capacity: usize,
}

impl PipelinedFpUnit {
    pub fn new(latency: usize, depth: usize, output_capacity: usize) -> Self {
        Self { latency, depth, in_flight: Vec::new(), output: VecDeque::new(), output_capacity }
    }

    pub fn has_slot(&self) -> bool {
        self.in_flight.len() < self.depth
    }

    pub fn has_output_room(&self) -> bool {
        self.output.len() < self.output_capacity
    }

    pub fn start(&mut self, id: u64, dest: RobTag, value: RegValue) {
        debug_assert!(self.has_slot());
        self.in_flight.push(PipeSlot { id, dest, value, remaining: self.latency });
    }

    pub fn tick(&mut self) {
        for slot in &mut self.in_flight {
            slot.remaining = slot.remaining.saturating_sub(1);
        }
        let mut i = 0;
        while i < self.in_flight.len() {
            if self.in_flight[i].remaining == 0 {
                let slot = self.in_flight.remove(i);
                self.output.push_back(AluResult {
                    id: slot.id,
                    dest: slot.dest,
                    value: slot.value,
                    is_branch: false,
                });
            } else {
                i += 1;
            }
        }
    }

    pub fn output_front(&self) -> Option<&AluResult> {
        self.output.front()
    }

    pub fn pop_output(&mut self) -> Option<AluResult> {
        self.output.pop_front()
    }

    pub fn purge_after(&mut self, branch_id: u64) {
        self.in_flight.retain(|s| s.id <= branch_id);
        self.output.retain(|r| r.id <= branch_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alu_result_surfaces_after_latency_cycles() {
        let mut alu = IntegerAlu::new(2, 4);
        alu.start(0, RobTag(0), RegValue::Int(7), false);
        alu.tick();
        assert!(alu.output_front().is_none());
        alu.tick();
        assert_eq!(alu.output_front().unwrap().value.as_int(), 7);
    }

    #[test]
    fn pipelined_unit_overlaps_two_ops() {
        let mut fp = PipelinedFpUnit::new(3, 2, 4);
        fp.start(0, RobTag(0), RegValue::Float(1.0));
        fp.tick();
        fp.start(1, RobTag(1), RegValue::Float(2.0));
        fp.tick();
        fp.tick();
        assert_eq!(fp.pop_output().unwrap().id, 0);
        fp.tick();
        assert_eq!(fp.pop_output().unwrap().id, 1);
    }
}
