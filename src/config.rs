// config.rs
//
// The simulator's configuration record, produced by io::parser from the
// six mandatory parameter lines of the input file and consumed by
// core::Simulator::new. Kept as a plain data record (no builder), since
// nothing here is ever constructed incrementally -- it is parsed whole
// from one input file.

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct UnitConfig {
    pub count: usize,
    pub latency: usize,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PipelinedUnitConfig {
    pub latency: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SimConfig {
    pub integer_adder: UnitConfig,
    pub fp_adder: PipelinedUnitConfig,
    pub fp_multiplier: PipelinedUnitConfig,
    pub load_store_unit: UnitConfig,
    pub rob_entries: usize,
    pub cdb_buffer_entries: usize,
}

impl SimConfig {
    /// Reservation stations per class are sized to the ROB: an
    /// instruction can never be issued without a ROB slot, so a RS pool
    /// larger than the ROB can never fill any faster than the ROB does.
    pub fn reservation_stations_per_class(&self) -> usize {
        self.rob_entries
    }
}
