// rat.rs
//
// Register alias table: each of the 64 architectural registers maps to
// either itself (value lives in the ARF) or a ROB tag (value is still in
// flight). Cloning the whole table is how branch checkpoints work -- see
// core::branch -- so this stays a flat, cheaply-copyable array rather than
// a HashMap.

use crate::arch::registers::RegName;
use crate::core::rob::RobTag;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatEntry {
    Committed,
    InFlight(RobTag),
}

#[derive(Debug, Clone)]
pub struct RegisterAliasTable {
    ints: [RatEntry; 32],
    floats: [RatEntry; 32],
}

impl Default for RegisterAliasTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterAliasTable {
    pub fn new() -> Self {
        Self {
            ints: [RatEntry::Committed; 32],
            floats: [RatEntry::Committed; 32],
        }
    }

    fn slot(&self, reg: RegName) -> &RatEntry {
        match reg {
            RegName::Int(n) => &self.ints[n as usize],
            RegName::Float(n) => &self.floats[n as usize],
        }
    }

    fn slot_mut(&mut self, reg: RegName) -> &mut RatEntry {
        match reg {
            RegName::Int(n) => &mut self.ints[n as usize],
            RegName::Float(n) => &mut self.floats[n as usize],
        }
    }

    pub fn get(&self, reg: RegName) -> RatEntry {
        *self.slot(reg)
    }

    pub fn rename(&mut self, reg: RegName, tag: RobTag) {
        *self.slot_mut(reg) = RatEntry::InFlight(tag);
    }

    /// Clear the mapping back to "committed" only if it still points at
    /// `tag` -- a later instruction to the same register may already have
    /// renamed over it, in which case this is a no-op.
    pub fn clear_if(&mut self, reg: RegName, tag: RobTag) {
        if let RatEntry::InFlight(current) = self.get(reg) {
            if current == tag {
                *self.slot_mut(reg) = RatEntry::Committed;
            }
        }
    }

    pub fn restore(&mut self, snapshot: &RegisterAliasTable) {
        *self = snapshot.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_then_clear_restores_committed() {
        let mut rat = RegisterAliasTable::new();
        rat.rename(RegName::Int(3), RobTag(5));
        assert_eq!(rat.get(RegName::Int(3)), RatEntry::InFlight(RobTag(5)));
        rat.clear_if(RegName::Int(3), RobTag(5));
        assert_eq!(rat.get(RegName::Int(3)), RatEntry::Committed);
    }

    #[test]
    fn clear_is_noop_if_superseded() {
        let mut rat = RegisterAliasTable::new();
        rat.rename(RegName::Int(3), RobTag(5));
        rat.rename(RegName::Int(3), RobTag(9)); // a later instruction renamed over it
        rat.clear_if(RegName::Int(3), RobTag(5)); // stale commit shouldn't clobber it
        assert_eq!(rat.get(RegName::Int(3)), RatEntry::InFlight(RobTag(9)));
    }
}
