// simulator.rs
//
// The cycle-stepped driver. Each call to `tick` runs the six sub-phases in
// order -- ISSUE, EXECUTE, BRANCH-CHECK, MEMORY, WRITEBACK, COMMIT -- and
// advances the cycle counter once. Freshness ("no instruction advances two
// pipeline stages in one cycle") is enforced structurally rather than with
// a timestamp table: the set of reservation-station entries eligible to
// start executing, and the set of output-buffer entries eligible to write
// back, are both snapshotted at the top of the cycle before ISSUE or
// EXECUTE can add anything new to them. An instruction issued or completed
// this cycle therefore cannot be seen by this same cycle's later
// sub-phases; it is only visible starting next cycle's snapshot.

use crate::arch::registers::RegName;
use crate::arch::{Memory, Registers};
use crate::config::SimConfig;
use crate::core::branch::{BranchPredictor, CheckpointStack};
use crate::core::functional_unit::{IntegerAlu, PipelinedFpUnit};
use crate::core::instruction::{FuClass, Instruction};
use crate::core::lsq::{LoadStoreUnit, LsqEntry, MemOpKind};
use crate::core::rat::{RatEntry, RegisterAliasTable};
use crate::core::reservation_station::{AluOp, FpAddOp, FpMulOp, RsPool};
use crate::core::rob::ReorderBuffer;
use crate::core::value::{Operand, RegValue};
use crate::errors::SimulatorError;

/// A committed-or-in-flight instruction the completion table reports on.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub id: u64,
    pub issue_cycle: u64,
    pub writeback_cycle: Option<u64>,
    pub commit_cycle: Option<u64>,
}

pub struct Simulator {
    config: SimConfig,
    registers: Registers,
    memory: Memory,
    rat: RegisterAliasTable,
    rob: ReorderBuffer,
    alu_rs: RsPool<AluOp>,
    fp_add_rs: RsPool<FpAddOp>,
    fp_mul_rs: RsPool<FpMulOp>,
    alu_unit: IntegerAlu,
    fp_add_unit: PipelinedFpUnit,
    fp_mul_unit: PipelinedFpUnit,
    lsq: LoadStoreUnit,
    predictor: BranchPredictor,
    checkpoints: CheckpointStack,

    program: Vec<Instruction>,
    next_fetch: usize,
    next_id: u64,
    cycle: u64,
    max_cycles: u64,

    issue_cycle: std::collections::HashMap<u64, u64>,
    completions: Vec<CompletionRecord>,
}

impl Simulator {
    pub fn new(config: SimConfig, program: Vec<Instruction>, memory: Memory, registers: Registers) -> Self {
        let rob_capacity = config.rob_entries;
        let rs_capacity = config.reservation_stations_per_class();
        let lsq_capacity = rob_capacity;
        Self {
            alu_unit: IntegerAlu::new(config.integer_adder.latency, config.cdb_buffer_entries),
            fp_add_unit: PipelinedFpUnit::new(
                config.fp_adder.latency,
                config.fp_adder.depth,
                config.cdb_buffer_entries,
            ),
            fp_mul_unit: PipelinedFpUnit::new(
                config.fp_multiplier.latency,
                config.fp_multiplier.depth,
                config.cdb_buffer_entries,
            ),
            lsq: LoadStoreUnit::new(lsq_capacity, config.load_store_unit.latency, config.cdb_buffer_entries),
            alu_rs: RsPool::new(rs_capacity),
            fp_add_rs: RsPool::new(rs_capacity),
            fp_mul_rs: RsPool::new(rs_capacity),
            rob: ReorderBuffer::new(rob_capacity),
            predictor: BranchPredictor::new(),
            checkpoints: CheckpointStack::new(config.cdb_buffer_entries),
            rat: RegisterAliasTable::new(),
            registers,
            memory,
            program,
            next_fetch: 0,
            next_id: 0,
            cycle: 0,
            max_cycles: 1_000_000,
            issue_cycle: std::collections::HashMap::new(),
            completions: Vec::new(),
            config,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn completions(&self) -> &[CompletionRecord] {
        &self.completions
    }

    fn is_done(&self) -> bool {
        self.next_fetch >= self.program.len() && self.rob.is_empty() && self.lsq.is_idle()
    }

    pub fn run_to_completion(&mut self) -> Result<(), SimulatorError> {
        while !self.is_done() {
            if self.cycle >= self.max_cycles {
                return Err(SimulatorError::UnitFault(format!(
                    "simulation did not terminate within {} cycles",
                    self.max_cycles
                )));
            }
            self.tick()?;
        }
        Ok(())
    }

    pub fn tick(&mut self) -> Result<(), SimulatorError> {
        let alu_ready = self.alu_rs.ready_indices();
        let fp_add_ready = self.fp_add_rs.ready_indices();
        let fp_mul_ready = self.fp_mul_rs.ready_indices();
        let alu_wb_candidate = self.alu_unit.output_front().map(|r| r.id);
        let fp_add_wb_candidate = self.fp_add_unit.output_front().map(|r| r.id);
        let fp_mul_wb_candidate = self.fp_mul_unit.output_front().map(|r| r.id);
        let mem_wb_candidate = self.lsq.output_front().map(|r| r.id);
        let commit_eligible = self
            .rob
            .head_tag()
            .and_then(|t| self.rob.entry(t))
            .is_some_and(|e| e.done);

        self.issue_phase();
        self.execute_phase(&alu_ready, &fp_add_ready, &fp_mul_ready);
        self.branch_check_phase();
        self.memory_phase()?;
        self.writeback_phase(alu_wb_candidate, fp_add_wb_candidate, fp_mul_wb_candidate, mem_wb_candidate);
        self.commit_phase(commit_eligible);

        self.cycle += 1;
        Ok(())
    }

    // ---- ISSUE -------------------------------------------------------

    fn issue_phase(&mut self) {
        let Some(op) = self.program.get(self.next_fetch).copied() else { return };
        let class = op.fu_class();
        let class_has_room = match class {
            FuClass::IntegerAlu => !self.alu_rs.is_full(),
            FuClass::FpAdder => !self.fp_add_rs.is_full(),
            FuClass::FpMultiplier => !self.fp_mul_rs.is_full(),
            FuClass::LoadStore => !self.lsq.is_full(),
        };
        if self.rob.is_full() || !class_has_room {
            return;
        }
        if op.is_branch() && !self.checkpoints.has_room() {
            return;
        }

        let sources = op.sources();
        let operands: Vec<Operand> = sources.iter().map(|&r| self.resolve(r)).collect();

        // A load whose base is already resolved can have its effective
        // address computed now; if a prior store sitting in the queue has
        // that same address resolved but its data still pending, admitting
        // the load would race an unknown value, so it stalls this cycle as
        // if the LSQ were full.
        if class == FuClass::LoadStore && op.is_load() {
            if let Operand::Value(base) = operands[0] {
                let address = base.as_int() + op.immediate().unwrap();
                if self.lsq.has_pending_store_conflict(address) {
                    return;
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.next_fetch += 1;
        self.issue_cycle.insert(id, self.cycle);

        let dest_reg = op.dest();
        let tag = self.rob.admit(id, op, dest_reg).expect("capacity already checked");

        match class {
            FuClass::IntegerAlu => {
                let alu_op = match op {
                    Instruction::Add { .. } => AluOp::Add,
                    Instruction::Sub { .. } => AluOp::Sub,
                    Instruction::Addi { .. } => AluOp::Addi,
                    Instruction::Beq { .. } => AluOp::Beq,
                    Instruction::Bne { .. } => AluOp::Bne,
                    _ => unreachable!(),
                };
                let j = operands.first().copied().unwrap_or(Operand::Value(RegValue::Int(0)));
                let k = if matches!(alu_op, AluOp::Addi) {
                    Operand::Value(RegValue::Int(op.immediate().unwrap()))
                } else {
                    operands.get(1).copied().unwrap_or(Operand::Value(RegValue::Int(0)))
                };
                self.alu_rs.insert(id, tag, alu_op, j, k);
            },
            FuClass::FpAdder => {
                let fp_op = match op {
                    Instruction::AddD { .. } => FpAddOp::AddD,
                    Instruction::SubD { .. } => FpAddOp::SubD,
                    _ => unreachable!(),
                };
                self.fp_add_rs.insert(id, tag, fp_op, operands[0], operands[1]);
            },
            FuClass::FpMultiplier => {
                self.fp_mul_rs.insert(id, tag, FpMulOp::MultD, operands[0], operands[1]);
            },
            FuClass::LoadStore => {
                let kind = if op.is_load() { MemOpKind::Load } else { MemOpKind::Store };
                let store_value = op.store_value_source().map(|r| self.resolve(r));
                self.lsq.push(LsqEntry {
                    id,
                    dest: tag,
                    kind,
                    base: operands[0],
                    store_value,
                    offset: op.immediate().unwrap(),
                    address: None,
                    committed: false,
                });
            },
        }

        if let Some(dest) = dest_reg {
            self.rat.rename(dest, tag);
        }

        if op.is_branch() {
            self.issue_branch(id, op);
        }

        log::debug!("cycle {}: issued id={id} {op:?} -> {tag}", self.cycle);
    }

    fn resolve(&self, reg: RegName) -> Operand {
        match self.rat.get(reg) {
            RatEntry::Committed => Operand::Value(self.registers.read(reg)),
            RatEntry::InFlight(tag) => match self.rob.entry(tag).and_then(|e| e.value) {
                Some(value) => Operand::Value(value),
                None => Operand::Tag(tag),
            },
        }
    }

    fn issue_branch(&mut self, id: u64, op: Instruction) {
        let disp = op.immediate().unwrap();
        let predicted_taken = self.predictor.predict(id);
        let sequential_next = self.next_fetch;
        let taken_target = (sequential_next as i64 + disp as i64).max(0) as usize;
        let other_target = if predicted_taken { sequential_next } else { taken_target };
        if predicted_taken {
            self.next_fetch = taken_target;
        }
        self.checkpoints.push(id, &self.rat, other_target, predicted_taken);
    }

    // ---- EXECUTE -------------------------------------------------------

    fn execute_phase(&mut self, alu_ready: &[usize], fp_add_ready: &[usize], fp_mul_ready: &[usize]) {
        if self.alu_unit.is_idle() {
            if let Some(&idx) = alu_ready.first() {
                let entry = self.alu_rs.get(idx);
                let value = Self::eval_alu(entry.op, entry.j, entry.k);
                let is_branch = matches!(entry.op, AluOp::Beq | AluOp::Bne);
                let (id, dest) = (entry.id, entry.dest);
                self.alu_unit.start(id, dest, value, is_branch);
                self.alu_rs.mark_executing(idx);
            }
        }
        self.alu_unit.tick();

        if self.fp_add_unit.has_slot() && self.fp_add_unit.has_output_room() {
            if let Some(&idx) = fp_add_ready.first() {
                let entry = self.fp_add_rs.get(idx);
                let value = Self::eval_fp_add(entry.op, entry.j, entry.k);
                self.fp_add_unit.start(entry.id, entry.dest, value);
                self.fp_add_rs.mark_executing(idx);
            }
        }
        self.fp_add_unit.tick();

        if self.fp_mul_unit.has_slot() && self.fp_mul_unit.has_output_room() {
            if let Some(&idx) = fp_mul_ready.first() {
                let entry = self.fp_mul_rs.get(idx);
                let value = RegValue::Float(entry.j.value().unwrap().as_float() * entry.k.value().unwrap().as_float());
                self.fp_mul_unit.start(entry.id, entry.dest, value);
                self.fp_mul_rs.mark_executing(idx);
            }
        }
        self.fp_mul_unit.tick();
    }

    fn eval_alu(op: AluOp, j: Operand, k: Operand) -> RegValue {
        let a = j.value().unwrap().as_int();
        let b = k.value().unwrap().as_int();
        match op {
            AluOp::Add | AluOp::Addi => RegValue::Int(a.wrapping_add(b)),
            AluOp::Sub => RegValue::Int(a.wrapping_sub(b)),
            AluOp::Beq => RegValue::Bool(a == b),
            AluOp::Bne => RegValue::Bool(a != b),
        }
    }

    fn eval_fp_add(op: FpAddOp, j: Operand, k: Operand) -> RegValue {
        let a = j.value().unwrap().as_float();
        let b = k.value().unwrap().as_float();
        match op {
            FpAddOp::AddD => RegValue::Float(a + b),
            FpAddOp::SubD => RegValue::Float(a - b),
        }
    }

    // ---- BRANCH-CHECK ----------------------------------------------

    fn branch_check_phase(&mut self) {
        for result in self.alu_unit.take_branches() {
            let actual_taken = match result.value {
                RegValue::Bool(b) => b,
                _ => unreachable!("branch result must be boolean"),
            };
            self.predictor.resolve(result.id, actual_taken);

            if let Some(entry) = self.rob.entry_mut(result.dest) {
                entry.done = true;
                entry.value = Some(RegValue::Bool(actual_taken));
                entry.writeback_cycle = Some(self.cycle);
            }
            let rs_idx = self.alu_rs.find_by_dest(result.dest).expect("branch RS entry must exist");
            self.alu_rs.remove(rs_idx);

            let Some(checkpoint) = self.checkpoints.take(result.id) else { continue };
            if checkpoint.predicted_taken != actual_taken {
                log::debug!("cycle {}: misprediction at id={}", self.cycle, result.id);
                self.next_fetch = checkpoint.other_target;
                self.rat.restore(&checkpoint.rat);
                self.rob.rollback_after(result.dest);
                self.alu_rs.purge_after(result.id);
                self.fp_add_rs.purge_after(result.id);
                self.fp_mul_rs.purge_after(result.id);
                self.alu_unit.purge_after(result.id);
                self.fp_add_unit.purge_after(result.id);
                self.fp_mul_unit.purge_after(result.id);
                self.lsq.purge_after(result.id);
            }
        }
    }

    // ---- MEMORY -------------------------------------------------------

    fn memory_phase(&mut self) -> Result<(), SimulatorError> {
        self.lsq.compute_addresses();
        for result in self.lsq.try_forward() {
            self.lsq.push_output(result);
        }
        self.lsq.dispatch();
        self.lsq.tick_port(&mut self.memory)?;
        Ok(())
    }

    // ---- WRITEBACK (CDB arbitration) --------------------------------

    fn writeback_phase(
        &mut self,
        alu_candidate: Option<u64>,
        fp_add_candidate: Option<u64>,
        fp_mul_candidate: Option<u64>,
        mem_candidate: Option<u64>,
    ) {
        // Among classes whose front output still matches this cycle's
        // pre-EXECUTE/MEMORY snapshot, the CDB picks the smallest ID --
        // the oldest instruction in program order -- and only falls back
        // to fixed class priority (ALU, FP adder, FP multiplier, memory)
        // to break an exact tie between two equal IDs, which cannot
        // actually happen since IDs are unique; the order still matters
        // for determinism if that invariant is ever relaxed. Each
        // candidate was snapshotted before this cycle's EXECUTE/MEMORY
        // ran, so a front entry that no longer matches (purged by a
        // misprediction earlier this same cycle) is left alone rather
        // than popped and discarded.
        let alu_match = alu_candidate.is_some() && self.alu_unit.output_front().map(|r| r.id) == alu_candidate;
        let fp_add_match =
            fp_add_candidate.is_some() && self.fp_add_unit.output_front().map(|r| r.id) == fp_add_candidate;
        let fp_mul_match =
            fp_mul_candidate.is_some() && self.fp_mul_unit.output_front().map(|r| r.id) == fp_mul_candidate;
        let mem_match = mem_candidate.is_some() && self.lsq.output_front().map(|r| r.id) == mem_candidate;

        let candidates = [
            alu_match.then(|| (alu_candidate.unwrap(), 0u8)),
            fp_add_match.then(|| (fp_add_candidate.unwrap(), 1u8)),
            fp_mul_match.then(|| (fp_mul_candidate.unwrap(), 2u8)),
            mem_match.then(|| (mem_candidate.unwrap(), 3u8)),
        ];
        let winning_class = candidates.into_iter().flatten().min().map(|(_, class)| class);

        let winner = match winning_class {
            Some(0) => self.alu_unit.pop_output().map(|r| (r.dest, r.value)),
            Some(1) => self.fp_add_unit.pop_output().map(|r| (r.dest, r.value)),
            Some(2) => self.fp_mul_unit.pop_output().map(|r| (r.dest, r.value)),
            Some(3) => self.lsq.pop_output().map(|r| (r.dest, r.value)),
            _ => None,
        };

        let Some((dest, value)) = winner else { return };

        self.alu_rs.broadcast(dest, value);
        self.fp_add_rs.broadcast(dest, value);
        self.fp_mul_rs.broadcast(dest, value);
        self.lsq.broadcast(dest, value);

        if let Some(entry) = self.rob.entry_mut(dest) {
            entry.value = Some(value);
            entry.done = true;
            entry.writeback_cycle = Some(self.cycle);
        }
        // Remove the now-resolved entry from whichever RS pool produced it,
        // if it is still sitting there (ALU/FP classes keep the entry
        // parked until its result broadcasts; LSQ entries already left on
        // dispatch or forward).
        if let Some(idx) = self.alu_rs.find_by_dest(dest) {
            self.alu_rs.remove(idx);
        } else if let Some(idx) = self.fp_add_rs.find_by_dest(dest) {
            self.fp_add_rs.remove(idx);
        } else if let Some(idx) = self.fp_mul_rs.find_by_dest(dest) {
            self.fp_mul_rs.remove(idx);
        }

        log::debug!("cycle {}: writeback {dest} = {value:?}", self.cycle);
    }

    // ---- COMMIT -------------------------------------------------------

    fn commit_phase(&mut self, eligible: bool) {
        if !eligible {
            return;
        }
        let Some(tag) = self.rob.head_tag() else { return };
        let is_store = self.rob.entry(tag).is_some_and(|e| e.op.is_store());
        if is_store {
            self.lsq.mark_committed(tag);
        }
        let entry = self.rob.commit_head();
        if let (Some(dest), Some(value)) = (entry.dest, entry.value) {
            self.registers.write(dest, value);
            self.rat.clear_if(dest, tag);
        }
        self.completions.push(CompletionRecord {
            id: entry.id,
            issue_cycle: self.issue_cycle.remove(&entry.id).unwrap_or(self.cycle),
            writeback_cycle: entry.writeback_cycle,
            commit_cycle: Some(self.cycle),
        });
        log::debug!("cycle {}: committed id={} {}", self.cycle, entry.id, tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelinedUnitConfig, UnitConfig};

    fn tiny_config() -> SimConfig {
        SimConfig {
            integer_adder: UnitConfig { count: 1, latency: 1 },
            fp_adder: PipelinedUnitConfig { latency: 2, depth: 2 },
            fp_multiplier: PipelinedUnitConfig { latency: 4, depth: 2 },
            load_store_unit: UnitConfig { count: 1, latency: 2 },
            rob_entries: 8,
            cdb_buffer_entries: 4,
        }
    }

    #[test]
    fn straight_line_program_commits_in_order() {
        // R1 = 0 + 5; R2 = R1 + 1 -> a RAW hazard resolved through the ROB.
        let program = vec![
            Instruction::Addi { rt: 1, rs: 0, imm: 5 },
            Instruction::Add { rd: 2, rs: 1, rt: 1 },
        ];
        let mut sim = Simulator::new(tiny_config(), program, Memory::new(), Registers::new());
        sim.run_to_completion().unwrap();
        assert_eq!(sim.registers().read_int(1), 5);
        assert_eq!(sim.registers().read_int(2), 10);
        assert_eq!(sim.completions().len(), 2);
    }

    #[test]
    fn store_then_load_forwards_without_reaching_memory_port() {
        let program = vec![
            Instruction::Addi { rt: 1, rs: 0, imm: 8 }, // base = 8
            Instruction::Sd { ft: 4, offset: 0, base: 1 },
            Instruction::Ld { ft: 2, offset: 0, base: 1 },
        ];
        let mut registers = Registers::new();
        registers.write_float(4, 3.5);
        let mut sim = Simulator::new(tiny_config(), program, Memory::new(), registers);
        sim.run_to_completion().unwrap();
        assert_eq!(sim.registers().read_float(2), 3.5);
    }

    #[test]
    fn mispredicted_branch_squashes_wrong_path() {
        // BEQ R0,R0 is always taken; predictor defaults to taken too, so
        // this one should resolve correctly with no squash needed. Flip
        // the comparison to force a misprediction against the always-taken
        // default instead.
        let program = vec![
            Instruction::Addi { rt: 1, rs: 0, imm: 1 },
            Instruction::Bne { rs: 1, rt: 1, disp: 10 }, // never taken; predictor defaults taken
            Instruction::Addi { rt: 2, rs: 0, imm: 99 }, // correct (fall-through) path
        ];
        let mut sim = Simulator::new(tiny_config(), program, Memory::new(), Registers::new());
        sim.run_to_completion().unwrap();
        assert_eq!(sim.registers().read_int(2), 99);
    }

    #[test]
    fn writeback_prefers_oldest_id_over_fixed_class_priority() {
        // An older FP-adder result (id=3) and a newer ALU result (id=10)
        // are both sitting at the front of their output buffers this
        // cycle. Fixed class priority alone would hand the CDB to the ALU
        // result; the arbitration must instead pick the smaller ID.
        let mut sim = Simulator::new(tiny_config(), Vec::new(), Memory::new(), Registers::new());
        let alu_tag = sim.rob.admit(10, Instruction::Add { rd: 1, rs: 0, rt: 0 }, Some(RegName::Int(1))).unwrap();
        let fp_tag = sim.rob.admit(3, Instruction::AddD { fd: 2, fs: 0, ft: 0 }, Some(RegName::Float(2))).unwrap();

        sim.alu_unit.start(10, alu_tag, RegValue::Int(42), false);
        for _ in 0..sim.config.integer_adder.latency {
            sim.alu_unit.tick();
        }
        sim.fp_add_unit.start(3, fp_tag, RegValue::Float(1.5));
        for _ in 0..sim.config.fp_adder.latency {
            sim.fp_add_unit.tick();
        }
        assert_eq!(sim.alu_unit.output_front().map(|r| r.id), Some(10));
        assert_eq!(sim.fp_add_unit.output_front().map(|r| r.id), Some(3));

        sim.writeback_phase(Some(10), Some(3), None, None);

        assert!(sim.rob.entry(fp_tag).unwrap().done, "older FP result should have won the CDB this cycle");
        assert!(!sim.rob.entry(alu_tag).unwrap().done, "newer ALU result should still be waiting");
        assert!(sim.fp_add_unit.output_front().is_none());
        assert_eq!(sim.alu_unit.output_front().map(|r| r.id), Some(10));
    }
}
