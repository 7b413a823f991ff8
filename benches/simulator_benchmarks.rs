use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tomasulo_sim::arch::{Memory, Registers};
use tomasulo_sim::config::{PipelinedUnitConfig, SimConfig, UnitConfig};
use tomasulo_sim::core::instruction::Instruction;
use tomasulo_sim::Simulator;

fn bench_config() -> SimConfig {
    SimConfig {
        integer_adder: UnitConfig { count: 1, latency: 1 },
        fp_adder: PipelinedUnitConfig { latency: 2, depth: 2 },
        fp_multiplier: PipelinedUnitConfig { latency: 4, depth: 2 },
        load_store_unit: UnitConfig { count: 1, latency: 2 },
        rob_entries: 16,
        cdb_buffer_entries: 8,
    }
}

fn arithmetic_chain(len: usize) -> Vec<Instruction> {
    (0..len)
        .map(|i| {
            let r = (i % 3) as u8 + 1;
            Instruction::Addi { rt: r, rs: r, imm: 1 }
        })
        .collect()
}

fn load_store_heavy(len: usize) -> Vec<Instruction> {
    (0..len)
        .map(|i| {
            if i % 2 == 0 {
                Instruction::Sd { ft: 2, offset: 0, base: 1 }
            } else {
                Instruction::Ld { ft: 3, offset: 0, base: 1 }
            }
        })
        .collect()
}

fn straight_line_benchmark(c: &mut Criterion) {
    c.bench_function("straight_line_arithmetic_256", |b| {
        b.iter(|| {
            let program = arithmetic_chain(256);
            let mut sim = Simulator::new(bench_config(), program, Memory::new(), Registers::new());
            sim.run_to_completion().unwrap();
            black_box(sim.registers().read_int(1));
        });
    });
}

fn load_store_forwarding_benchmark(c: &mut Criterion) {
    c.bench_function("store_load_forwarding_128", |b| {
        b.iter(|| {
            let program = load_store_heavy(128);
            let mut sim = Simulator::new(bench_config(), program, Memory::new(), Registers::new());
            sim.run_to_completion().unwrap();
            black_box(sim.registers().read_float(3));
        });
    });
}

fn memory_access_benchmark(c: &mut Criterion) {
    c.bench_function("memory_read_write", |b| {
        let mut memory = Memory::new();
        b.iter(|| {
            for i in 0..32u32 {
                memory.write_word(i * 4, i as i32).unwrap();
                black_box(memory.read_word(i * 4).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    straight_line_benchmark,
    load_store_forwarding_benchmark,
    memory_access_benchmark
);
criterion_main!(benches);
