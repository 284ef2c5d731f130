//! The offload decision policy: the pluggable strategy object the
//! Co-Simulation mode consults at each `ROI_BEGIN`, plus the region-nesting
//! bookkeeping shared by every mode.
//!
//! Per the Design Notes, the decision rule is exposed as a trait object
//! rather than hard-coded so an RL-style controller can be swapped in
//! without touching the tick engine. The shipped policy, [`MemVsNonMem`],
//! reproduces the source's `MemoryInstructions > NonMemoryInstructions`
//! rule exactly and ignores live telemetry — an Open Question decision
//! recorded in DESIGN.md, not an oversight.

use std::collections::HashMap;

use crate::bb_info::BasicBlockInfo;

/// Live system telemetry available to an offload decision, alongside
/// per-region BB-info. The shipped policy does not consume this; it exists
/// so a different policy can.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTelemetry {
    /// Instructions per second, most recent measurement window.
    pub ips: f64,
    /// Energy consumed per unit simulated time.
    pub energy_per_time: f64,
    /// LLC miss rate, most recent measurement window.
    pub llc_miss_rate: f64,
    /// Off-chip (memory) transactions per retired instruction.
    pub off_chip_txn_per_inst: f64,
}

/// A pluggable offload decision function: given the BB-info for a region (if
/// any was loaded) and live telemetry, decide whether to offload.
pub trait OffloadDecision {
    /// Returns true if region entry should be offloaded to NMP/NLP.
    fn should_offload(&self, block: Option<&BasicBlockInfo>, telemetry: &SystemTelemetry) -> bool;
}

/// The source's decision rule: offload iff the region's basic block has more
/// memory instructions than non-memory instructions. A region with no
/// BB-info available (missing descriptor file, or unknown block ID) never
/// offloads, matching the compiler annotation contract's documented
/// degradation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemVsNonMem;

impl OffloadDecision for MemVsNonMem {
    fn should_offload(&self, block: Option<&BasicBlockInfo>, _telemetry: &SystemTelemetry) -> bool {
        match block {
            Some(b) => b.memory_instructions > b.non_memory_instructions,
            None => false,
        }
    }
}

/// The set of currently-active offload region IDs at a Host core, as a
/// multiset: nesting is permitted (the same region ID may be entered more
/// than once before any exit), and each `ROI_END(r)` removes exactly one
/// occurrence rather than clearing the region outright.
#[derive(Debug, Clone, Default)]
pub struct OffloadRegionSet {
    counts: HashMap<u64, u32>,
}

impl OffloadRegionSet {
    /// Builds an empty region set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more active entry into `region_id`.
    pub fn enter(&mut self, region_id: u64) {
        *self.counts.entry(region_id).or_insert(0) += 1;
    }

    /// Removes exactly one active entry for `region_id`, if any is present.
    pub fn leave(&mut self, region_id: u64) {
        if let Some(count) = self.counts.get_mut(&region_id) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&region_id);
            }
        }
    }

    /// True if `region_id` has at least one active entry.
    pub fn contains(&self, region_id: u64) -> bool {
        self.counts.get(&region_id).is_some_and(|&c| c > 0)
    }

    /// True if no region is currently active.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_vs_non_mem_offloads_when_memory_heavy() {
        let policy = MemVsNonMem;
        let block = BasicBlockInfo {
            basic_block_id: 1,
            basic_block_name: "bb".into(),
            memory_instructions: 10,
            non_memory_instructions: 3,
            arithmetic_instructions: 1,
            total_instructions: 13,
            total_memory_consumption: 640,
        };
        assert!(policy.should_offload(Some(&block), &SystemTelemetry::default()));
    }

    #[test]
    fn missing_bb_info_never_offloads() {
        let policy = MemVsNonMem;
        assert!(!policy.should_offload(None, &SystemTelemetry::default()));
    }

    #[test]
    fn nested_entry_requires_matching_exit_count() {
        let mut set = OffloadRegionSet::new();
        set.enter(7);
        set.enter(7);
        assert!(set.contains(7));
        set.leave(7);
        assert!(set.contains(7));
        set.leave(7);
        assert!(!set.contains(7));
    }
}
