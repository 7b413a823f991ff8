use std::error::Error;
use std::fmt;

/// Errors the simulator can raise: config/init/decode failures are fatal
/// at startup, unit faults are fatal at the cycle they occur. Structural
/// full conditions (ROB/RS/LSQ full, FU busy, CDB conflict, checkpoint
/// buffer full) are never represented here -- they are the stall
/// mechanism, not errors.
#[derive(Debug)]
pub enum SimulatorError {
    // Missing file, missing parameter line, malformed token.
    Config(String),

    // Non-zero R0/F0 initializer, out-of-range initializer address.
    Init(String),

    // Unknown opcode, operand count mismatch.
    Decode(String),

    // A functional unit was asked to execute an operation outside its
    // class. Indicates a simulator bug, not a user-facing error.
    UnitFault(String),

    MemoryOutOfBounds(u32),
    MemoryMisaligned(u32),

    IoError(std::io::Error),
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::Config(msg) => write!(f, "configuration error: {msg}"),
            SimulatorError::Init(msg) => write!(f, "initialization error: {msg}"),
            SimulatorError::Decode(msg) => write!(f, "decode error: {msg}"),
            SimulatorError::UnitFault(msg) => write!(f, "functional unit fault: {msg}"),
            SimulatorError::MemoryOutOfBounds(addr) => {
                write!(f, "memory access out of bounds: word {addr}")
            },
            SimulatorError::MemoryMisaligned(addr) => {
                write!(f, "misaligned memory access: 0x{addr:08X}")
            },
            SimulatorError::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl Error for SimulatorError {}

impl From<std::io::Error> for SimulatorError {
    fn from(error: std::io::Error) -> Self {
        SimulatorError::IoError(error)
    }
}
