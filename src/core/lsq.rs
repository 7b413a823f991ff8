// lsq.rs
//
// The load/store queue: a program-ordered list of in-flight memory ops,
// plus the single memory port they all share. Effective addresses are
// computed here; a load first checks for a forwarding store before ever
// touching the port, so a forwarded load never occupies the port at all.
// Stores only reach the port once they have committed (precise exceptions:
// a store's effect on memory cannot be undone by a later squash).

use std::collections::VecDeque;

use crate::core::rob::RobTag;
use crate::core::value::{Operand, RegValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOpKind {
    Load,
    Store,
}

#[derive(Debug, Clone)]
pub struct LsqEntry {
    pub id: u64,
    pub dest: RobTag,
    pub kind: MemOpKind,
    pub base: Operand,
    pub store_value: Option<Operand>,
    pub offset: i32,
    pub address: Option<i32>,
    pub committed: bool,
}

impl LsqEntry {
    fn data_ready(&self) -> bool {
        match self.kind {
            MemOpKind::Load => true,
            MemOpKind::Store => self.store_value.as_ref().is_some_and(|v| v.is_ready()),
        }
    }
}

pub struct MemResult {
    pub id: u64,
    pub dest: RobTag,
    pub value: RegValue,
}

struct ActiveMemOp {
    id: u64,
    kind: MemOpKind,
    remaining: usize,
    address: i32,
    dest: RobTag,
    store_value: Option<f64>,
}

pub struct LoadStoreUnit {
    entries: Vec<LsqEntry>,
    capacity: usize,
    latency: usize,
    port: Option<ActiveMemOp>,
    output: VecDeque<MemResult>,
    output_capacity: usize,
}

impl LoadStoreUnit {
    pub fn new(capacity: usize, latency: usize, output_capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            latency,
            port: None,
            output: VecDeque::new(),
            output_capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// True once every entry has left the queue, the port is idle, and no
    /// load result is still waiting to be written back -- a committed
    /// store can outlive its ROB entry while it drains through the port,
    /// so termination must check this separately from the ROB.
    pub fn is_idle(&self) -> bool {
        self.entries.is_empty() && self.port.is_none() && self.output.is_empty()
    }

    pub fn push(&mut self, entry: LsqEntry) {
        self.entries.push(entry);
    }

    /// Admission-time check for a load: true if some entry already in the
    /// queue is a store whose address is resolved, equal to `address`, and
    /// whose data is not yet ready. Admitting the load anyway would let it
    /// race a store it cannot yet know the true value of; the load instead
    /// stalls this cycle as if the queue were full.
    pub fn has_pending_store_conflict(&self, address: i32) -> bool {
        self.entries.iter().any(|e| e.kind == MemOpKind::Store && e.address == Some(address) && !e.data_ready())
    }

    pub fn broadcast(&mut self, tag: RobTag, value: RegValue) {
        for e in &mut self.entries {
            e.base.resolve(tag, value);
            if let Some(sv) = &mut e.store_value {
                sv.resolve(tag, value);
            }
        }
    }

    /// Step 1 of the MEMORY sub-phase: compute effective addresses for
    /// every store whose base is ready. One cycle, combinational.
    pub fn compute_addresses(&mut self) {
        for e in &mut self.entries {
            if e.address.is_none() {
                if let Some(base) = e.base.value() {
                    e.address = Some(base.as_int() + e.offset);
                }
            }
        }
    }

    /// Step 2: try to forward a matching in-flight store's value to each
    /// unresolved load, oldest first. A load that forwards leaves the
    /// queue immediately with a result, never touching the memory port.
    pub fn try_forward(&mut self) -> Vec<MemResult> {
        let mut resolved = Vec::new();
        let mut forwarded_ids = Vec::new();
        for i in 0..self.entries.len() {
            if self.entries[i].kind != MemOpKind::Load {
                continue;
            }
            let Some(addr) = self.entries[i].address else { continue };
            let mut blocking_unresolved_store = false;
            let mut forward_value = None;
            for j in (0..i).rev() {
                if self.entries[j].kind != MemOpKind::Store {
                    continue;
                }
                match self.entries[j].address {
                    Some(store_addr) if store_addr == addr => {
                        if let Some(sv) = self.entries[j].store_value.as_ref().and_then(|o| o.value()) {
                            forward_value = Some(sv.as_float());
                        } else {
                            blocking_unresolved_store = true;
                        }
                        break;
                    },
                    Some(_) => continue,
                    None => {
                        blocking_unresolved_store = true;
                        break;
                    },
                }
            }
            if blocking_unresolved_store {
                continue;
            }
            if let Some(value) = forward_value {
                resolved.push(MemResult {
                    id: self.entries[i].id,
                    dest: self.entries[i].dest,
                    value: RegValue::Float(value),
                });
                forwarded_ids.push(self.entries[i].id);
            }
        }
        self.entries.retain(|e| !forwarded_ids.contains(&e.id));
        resolved
    }

    /// Step 3: if the port is idle, dispatch the oldest ready candidate --
    /// a load with a resolved address and no blocking store ahead of it
    /// (try_forward already removed any that could forward), or a store
    /// that has committed. Ties between an eligible load and an eligible
    /// store favour whichever has the lower fetch ID.
    pub fn dispatch(&mut self) {
        if self.port.is_some() {
            return;
        }
        let mut best: Option<usize> = None;
        for i in 0..self.entries.len() {
            let e = &self.entries[i];
            let eligible = match e.kind {
                MemOpKind::Load => e.address.is_some(),
                MemOpKind::Store => e.committed && e.address.is_some() && e.data_ready(),
            };
            let better = match best {
                None => true,
                Some(b) => e.id < self.entries[b].id,
            };
            if eligible && better {
                best = Some(i);
            }
        }
        let Some(idx) = best else { return };
        let e = self.entries.remove(idx);
        let store_value = e.store_value.and_then(|o| o.value()).map(|v| v.as_float());
        self.port = Some(ActiveMemOp {
            id: e.id,
            kind: e.kind,
            remaining: self.latency,
            address: e.address.unwrap(),
            dest: e.dest,
            store_value,
        });
    }

    /// Advance the port by a cycle; perform the memory effect and surface
    /// a result (loads only) once the latency elapses.
    pub fn tick_port(&mut self, memory: &mut crate::arch::Memory) -> Result<(), crate::errors::SimulatorError> {
        if let Some(op) = &mut self.port {
            op.remaining = op.remaining.saturating_sub(1);
            if op.remaining == 0 {
                let op = self.port.take().unwrap();
                match op.kind {
                    MemOpKind::Load => {
                        let value = memory.read_double(op.address as u32)?;
                        self.output.push_back(MemResult { id: op.id, dest: op.dest, value: RegValue::Float(value) });
                    },
                    MemOpKind::Store => {
                        memory.write_double(op.address as u32, op.store_value.unwrap())?;
                    },
                }
            }
        }
        Ok(())
    }

    pub fn has_output_room(&self) -> bool {
        self.output.len() < self.output_capacity
    }

    pub fn push_output(&mut self, result: MemResult) {
        self.output.push_back(result);
    }

    pub fn output_front(&self) -> Option<&MemResult> {
        self.output.front()
    }

    pub fn pop_output(&mut self) -> Option<MemResult> {
        self.output.pop_front()
    }

    pub fn mark_committed(&mut self, dest: RobTag) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.dest == dest) {
            e.committed = true;
        }
    }

    pub fn purge_after(&mut self, branch_id: u64) {
        self.entries.retain(|e| e.id <= branch_id);
        if self.port.as_ref().is_some_and(|op| op.id > branch_id) {
            self.port = None;
        }
        self.output.retain(|r| r.id <= branch_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::RegValue;

    fn store(id: u64, dest: RobTag, addr: i32, val: f64) -> LsqEntry {
        LsqEntry {
            id,
            dest,
            kind: MemOpKind::Store,
            base: Operand::Value(RegValue::Int(0)),
            store_value: Some(Operand::Value(RegValue::Float(val))),
            offset: addr,
            address: None,
            committed: false,
        }
    }

    fn load(id: u64, dest: RobTag, addr: i32) -> LsqEntry {
        LsqEntry {
            id,
            dest,
            kind: MemOpKind::Load,
            base: Operand::Value(RegValue::Int(0)),
            store_value: None,
            offset: addr,
            address: None,
            committed: false,
        }
    }

    #[test]
    fn load_forwards_from_matching_prior_store() {
        let mut lsq = LoadStoreUnit::new(8, 2, 4);
        lsq.push(store(0, RobTag(0), 8, 3.5));
        lsq.push(load(1, RobTag(1), 8));
        lsq.compute_addresses();
        let results = lsq.try_forward();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value.as_float(), 3.5);
    }

    #[test]
    fn load_does_not_forward_past_unresolved_store_to_same_address() {
        let mut lsq = LoadStoreUnit::new(8, 2, 4);
        let mut blocked = store(0, RobTag(0), 8, 0.0);
        blocked.store_value = None;
        lsq.push(blocked);
        lsq.push(load(1, RobTag(1), 8));
        lsq.compute_addresses();
        assert!(lsq.try_forward().is_empty());
    }
}
