//! Processor: owns one domain's cores and the `CacheSystem` shared by their
//! cache chains.
//!
//! Per the Design Notes ("the Processor has three behavioral modes... a
//! tagged-variant role enum"), one `Processor` type serves the Host, NMP, and
//! NLP roles; [`crate::sim::Simulator`] drives the role-specific tick control
//! flow (it alone can borrow two Processors and the shared LLC at once). This
//! type itself holds only what is genuinely local: the core vector and the
//! `CacheSystem` that chain sends schedule completions into.

use crate::cache_system::CacheSystem;
use crate::core_model::{Core, CoreRole};

/// One execution domain: its cores and their shared completion-scheduling system.
pub struct Processor {
    /// Execution domain these cores belong to.
    pub role: CoreRole,
    /// This domain's cores, indexed by core ID.
    pub cores: Vec<Core>,
    /// Shared wait/hit completion queues for every chain this domain's cores assemble.
    pub cache_system: CacheSystem,
}

impl Processor {
    /// Builds an empty processor for the given role; cores are pushed by the
    /// caller (`Simulator::new`) once their private caches and trace/queue
    /// inputs are constructed.
    pub fn new(role: CoreRole) -> Self {
        Self {
            role,
            cores: Vec::new(),
            cache_system: CacheSystem::new(),
        }
    }

    /// True once every core has exhausted its input and drained its in-flight work.
    pub fn is_complete(&self) -> bool {
        self.cores.iter().all(|c| !c.more_reqs && c.current.is_none())
    }

    /// True if any core has more work to do.
    pub fn any_active(&self) -> bool {
        self.cores.iter().any(|c| c.more_reqs || c.current.is_some())
    }

    /// True if every core belonging to `process_id` is locally quiescent
    /// (empty reorder window and, when `deep_debug`, empty cache retry/MSHR
    /// state) — the per-Processor half of `can_context_switch` (§4.7); the
    /// memory and cache-system halves are checked by the caller, which alone
    /// holds those shared resources.
    pub fn locally_quiescent_for(&self, process_id: u64, deep_debug: bool) -> bool {
        self.cores
            .iter()
            .filter(|c| c.process_id == process_id)
            .all(|c| c.is_locally_quiescent(deep_debug))
    }

    /// True if no private cache in this domain holds a dirty line.
    pub fn has_no_dirty_lines(&self) -> bool {
        self.cores.iter().all(Core::private_has_no_dirty_lines)
    }

    /// Flushes every dirty line out of every core's private caches (the
    /// whole-cache, not per-core, flush the Design Notes call for on a
    /// Host->NMP transition with `nlp_facility=off`).
    pub fn flush_all_private_caches(&mut self) {
        for core in &mut self.cores {
            core.flush_private();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreOrg;

    #[test]
    fn empty_processor_is_complete() {
        let mut p = Processor::new(CoreRole::Nmp);
        p.cores.push(Core::new(0, CoreRole::Nmp, CoreOrg::OutOrder, 4, None));
        p.cores[0].more_reqs = false;
        assert!(p.is_complete());
    }

    #[test]
    fn quiescence_filters_by_process_id() {
        let mut p = Processor::new(CoreRole::Host);
        let mut c0 = Core::new(0, CoreRole::Host, CoreOrg::OutOrder, 4, None);
        c0.process_id = 1;
        let mut c1 = Core::new(1, CoreRole::Host, CoreOrg::OutOrder, 4, None);
        c1.process_id = 2;
        c1.window = Some(crate::reorder_window::ReorderWindow::new(4, 4));
        c1.window.as_mut().unwrap().insert(false, 0x40);
        p.cores.push(c0);
        p.cores.push(c1);
        assert!(p.locally_quiescent_for(1, true));
        assert!(!p.locally_quiescent_for(2, true));
    }
}
