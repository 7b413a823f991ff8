// parser.rs
//
// Reads the plain-text input file: an ignored header line, six
// parameter lines, an optional block of comma-separated register/memory
// initializers terminated by a blank line, then one MIPS-like
// instruction per line. Grounded on the address-reinterpretation rule in
// original_source/lib/helpers.py::getParameters -- an initializer
// address that is itself a multiple of 4 is treated as a word index and
// widened to a byte address by multiplying by 4, so the same file can
// mix byte and word addressing without ambiguity.
//
// The first token after "IntegerAdder"/"FPAdder"/"FPMultiplier"/
// "LoadStoreUnit" (an RS-pool size) is parsed but otherwise unused: RS
// pool capacity is sized to the ROB's capacity directly, since an
// instruction can never be issued past the ROB regardless of which
// class it targets (see DESIGN.md).

use std::fs;
use std::path::Path;

use crate::arch::{Memory, Registers};
use crate::config::{PipelinedUnitConfig, SimConfig, UnitConfig};
use crate::core::instruction::Instruction;
use crate::errors::SimulatorError;

pub struct ParsedProgram {
    pub config: SimConfig,
    pub program: Vec<Instruction>,
    pub memory: Memory,
    pub registers: Registers,
}

pub fn parse_input(path: &Path) -> Result<ParsedProgram, SimulatorError> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines();

    // Header line, ignored.
    lines.next().ok_or_else(|| SimulatorError::Config("empty input file".into()))?;

    let integer_adder = parse_unit_config(&mut lines, "IntegerAdder")?;
    let fp_adder = parse_pipelined_config(&mut lines, "FPAdder")?;
    let fp_multiplier = parse_pipelined_config(&mut lines, "FPMultiplier")?;
    let load_store_unit = parse_unit_config(&mut lines, "LoadStoreUnit")?;
    let rob_entries = parse_single_value(&mut lines, "ROBEntries")?;
    let cdb_buffer_entries = parse_single_value(&mut lines, "CDBBufferEntries")?;

    let config = SimConfig { integer_adder, fp_adder, fp_multiplier, load_store_unit, rob_entries, cdb_buffer_entries };

    let mut memory = Memory::new();
    let mut registers = Registers::new();
    let mut rest: Vec<&str> = lines.collect();

    // Optional initializer block, one line per `M...` or register set,
    // terminated by a blank line (or end of file).
    let mut idx = 0;
    while idx < rest.len() && !rest[idx].trim().is_empty() {
        parse_initializer_line(rest[idx], &mut memory, &mut registers)?;
        idx += 1;
    }
    rest.drain(..idx);
    if rest.first().is_some_and(|l| l.trim().is_empty()) {
        rest.remove(0);
    }

    let program = rest
        .into_iter()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(parse_instruction)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedProgram { config, program, memory, registers })
}

fn next_nonempty<'a>(lines: &mut std::str::Lines<'a>, label: &str) -> Result<&'a str, SimulatorError> {
    lines
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| SimulatorError::Config(format!("missing {label} line")))
}

/// Split `<Name> = <tok> <tok> ...` into its label and trailing tokens.
fn split_param_line<'a>(line: &'a str, label: &str) -> Result<Vec<&'a str>, SimulatorError> {
    let (name, rhs) = line
        .split_once('=')
        .ok_or_else(|| SimulatorError::Config(format!("expected `{label} = ...`, got `{line}`")))?;
    if name.trim() != label {
        return Err(SimulatorError::Config(format!("expected `{label}` line, got `{line}`")));
    }
    Ok(rhs.split_whitespace().collect())
}

fn parse_unit_config(lines: &mut std::str::Lines, label: &str) -> Result<UnitConfig, SimulatorError> {
    let line = next_nonempty(lines, label)?;
    let tokens = split_param_line(line, label)?;
    // tokens: rs_size, latency, count
    if tokens.len() < 3 {
        return Err(SimulatorError::Config(format!("`{label}`: expected `<rs_size> <latency> <count>`, got `{line}`")));
    }
    let latency = parse_usize(tokens[1], label)?;
    let count = parse_usize(tokens[2], label)?;
    Ok(UnitConfig { count, latency })
}

fn parse_pipelined_config(lines: &mut std::str::Lines, label: &str) -> Result<PipelinedUnitConfig, SimulatorError> {
    let line = next_nonempty(lines, label)?;
    let tokens = split_param_line(line, label)?;
    // tokens: rs_size, latency, depth (pipeline depth takes the place of count for FP units)
    if tokens.len() < 3 {
        return Err(SimulatorError::Config(format!("`{label}`: expected `<rs_size> <latency> <depth>`, got `{line}`")));
    }
    let latency = parse_usize(tokens[1], label)?;
    let depth = parse_usize(tokens[2], label)?;
    Ok(PipelinedUnitConfig { latency, depth })
}

fn parse_single_value(lines: &mut std::str::Lines, label: &str) -> Result<usize, SimulatorError> {
    let line = next_nonempty(lines, label)?;
    let tokens = split_param_line(line, label)?;
    let token = tokens.last().ok_or_else(|| SimulatorError::Config(format!("`{label}`: missing value")))?;
    parse_usize(token, label)
}

fn parse_usize(token: &str, label: &str) -> Result<usize, SimulatorError> {
    token.parse().map_err(|_| SimulatorError::Config(format!("`{label}`: expected an integer, got `{token}`")))
}

fn reinterpret_address(addr: i32) -> i32 {
    if addr % 4 == 0 {
        addr * 4
    } else {
        addr
    }
}

/// A memory-initializer line (leading `M`) holds comma-separated
/// `MEM[<addr>]=<value>` entries; any other non-blank line holds
/// comma-separated `<Rn>=<int>` or `<Fn>=<float>` entries.
fn parse_initializer_line(line: &str, memory: &mut Memory, registers: &mut Registers) -> Result<(), SimulatorError> {
    let is_memory_line = line.trim_start().to_ascii_uppercase().starts_with('M');
    for entry in line.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| SimulatorError::Config(format!("malformed initializer `{entry}`")))?;
        let name = name.trim();
        let value = value.trim();

        if is_memory_line {
            let inner = name
                .trim_start_matches(|c: char| c.is_ascii_alphabetic())
                .trim_start_matches('[')
                .trim_end_matches(']');
            let addr: i32 = inner
                .parse()
                .map_err(|_| SimulatorError::Config(format!("bad memory address `{name}`")))?;
            if addr < 0 {
                return Err(SimulatorError::Init(format!("negative memory address `{addr}`")));
            }
            let addr = reinterpret_address(addr) as u32;
            if let Ok(word) = value.parse::<i32>() {
                memory.write_word(addr, word)?;
            } else {
                let double: f64 = value
                    .parse()
                    .map_err(|_| SimulatorError::Config(format!("bad memory value `{value}`")))?;
                memory.write_double(addr, double)?;
            }
        } else if let Some(n) = name.strip_prefix('R') {
            let n: u8 = n.parse().map_err(|_| SimulatorError::Config(format!("bad register `{name}`")))?;
            let v: i32 = value.parse().map_err(|_| SimulatorError::Config(format!("bad value `{value}` for {name}")))?;
            if n == 0 && v != 0 {
                return Err(SimulatorError::Init("R0 must be initialized to zero".into()));
            }
            registers.write_int(n, v);
        } else if let Some(n) = name.strip_prefix('F') {
            let n: u8 = n.parse().map_err(|_| SimulatorError::Config(format!("bad register `{name}`")))?;
            let v: f64 = value.parse().map_err(|_| SimulatorError::Config(format!("bad value `{value}` for {name}")))?;
            if n == 0 && v != 0.0 {
                return Err(SimulatorError::Init("F0 must be initialized to zero".into()));
            }
            registers.write_float(n, v);
        } else {
            return Err(SimulatorError::Config(format!("unrecognized initializer target `{name}`")));
        }
    }
    Ok(())
}

fn parse_instruction(line: &str) -> Result<Instruction, SimulatorError> {
    let (mnemonic, rest) = line
        .split_once(char::is_whitespace)
        .map(|(m, r)| (m, r.trim()))
        .unwrap_or((line, ""));
    let operands: Vec<&str> = rest.split(',').map(str::trim).collect();

    let reg_int = |s: &str| -> Result<u8, SimulatorError> {
        s.trim_start_matches('R')
            .parse()
            .map_err(|_| SimulatorError::Decode(format!("bad integer register `{s}`")))
    };
    let reg_float = |s: &str| -> Result<u8, SimulatorError> {
        s.trim_start_matches('F')
            .parse()
            .map_err(|_| SimulatorError::Decode(format!("bad float register `{s}`")))
    };
    let imm = |s: &str| -> Result<i32, SimulatorError> {
        s.parse().map_err(|_| SimulatorError::Decode(format!("bad immediate `{s}`")))
    };

    // `offset(base)` syntax for LD/SD, e.g. "0(R1)".
    let parse_mem_operand = |s: &str| -> Result<(i32, u8), SimulatorError> {
        let (off, base) = s
            .split_once('(')
            .ok_or_else(|| SimulatorError::Decode(format!("expected `offset(Rbase)`, got `{s}`")))?;
        let base = base.strip_suffix(')').unwrap_or(base);
        Ok((imm(off)?, reg_int(base)?))
    };

    let argc_err = |expected: usize| {
        SimulatorError::Decode(format!(
            "`{mnemonic}`: expected {expected} operand(s), got {} (`{line}`)",
            operands.len()
        ))
    };

    match mnemonic.to_ascii_uppercase().as_str() {
        "ADD" | "SUB" if operands.len() != 3 => Err(argc_err(3)),
        "ADD" => Ok(Instruction::Add { rd: reg_int(operands[0])?, rs: reg_int(operands[1])?, rt: reg_int(operands[2])? }),
        "SUB" => Ok(Instruction::Sub { rd: reg_int(operands[0])?, rs: reg_int(operands[1])?, rt: reg_int(operands[2])? }),
        "ADDI" if operands.len() != 3 => Err(argc_err(3)),
        "ADDI" => Ok(Instruction::Addi { rt: reg_int(operands[0])?, rs: reg_int(operands[1])?, imm: imm(operands[2])? }),
        "ADD.D" | "SUB.D" if operands.len() != 3 => Err(argc_err(3)),
        "ADD.D" => Ok(Instruction::AddD { fd: reg_float(operands[0])?, fs: reg_float(operands[1])?, ft: reg_float(operands[2])? }),
        "SUB.D" => Ok(Instruction::SubD { fd: reg_float(operands[0])?, fs: reg_float(operands[1])?, ft: reg_float(operands[2])? }),
        "MULT.D" if operands.len() != 3 => Err(argc_err(3)),
        "MULT.D" => Ok(Instruction::MultD { fd: reg_float(operands[0])?, fs: reg_float(operands[1])?, ft: reg_float(operands[2])? }),
        "LD" | "SD" if operands.len() != 2 => Err(argc_err(2)),
        "LD" => {
            let (offset, base) = parse_mem_operand(operands[1])?;
            Ok(Instruction::Ld { ft: reg_float(operands[0])?, offset, base })
        },
        "SD" => {
            let (offset, base) = parse_mem_operand(operands[1])?;
            Ok(Instruction::Sd { ft: reg_float(operands[0])?, offset, base })
        },
        "BEQ" | "BNE" if operands.len() != 3 => Err(argc_err(3)),
        "BEQ" => Ok(Instruction::Beq { rs: reg_int(operands[0])?, rt: reg_int(operands[1])?, disp: imm(operands[2])? }),
        "BNE" => Ok(Instruction::Bne { rs: reg_int(operands[0])?, rt: reg_int(operands[1])?, disp: imm(operands[2])? }),
        other => Err(SimulatorError::Decode(format!("unrecognized mnemonic `{other}`"))),
    }
}
