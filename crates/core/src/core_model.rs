//! The trace-driven core execution model: per-core state shared by the
//! Host, NMP, and NLP roles, and the bounded FIFO scheduling queue NMP/NLP
//! cores (and Host peer-thread redirection) draw work from.
//!
//! Per the Design Notes ("the Processor has three behavioral modes... a
//! tagged-variant role enum in a rewrite"), a single [`Core`] type serves
//! all three roles, tagged by [`CoreRole`]. The tick-by-tick control flow
//! (fetch, issue, offload routing, context-switch quiescence) lives on
//! [`crate::sim::Simulator`] rather than on `Core` or `Processor` directly:
//! it needs simultaneous access to sibling cores, the shared LLC, and the
//! memory model, which a method taking only `&mut self` on a owning type
//! cannot borrow at once. `Core` itself stays a plain data holder plus the
//! handful of operations that are genuinely local.

use std::collections::VecDeque;

use crate::cache::Cache;
use crate::config::CoreOrg;
use crate::offload::OffloadRegionSet;
use crate::reorder_window::ReorderWindow;
use crate::trace::{TraceReader, TraceRecord};

/// Which of the three execution domains a [`Core`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRole {
    /// General-purpose core with a private L1/L2 and access to the shared LLC.
    Host,
    /// Memory-side processing unit, one per vault, private L1 only.
    Nmp,
    /// LLC-side processing unit, no private cache, the shared LLC is its
    /// backing store.
    Nlp,
}

/// A bounded (or unbounded, if `capacity` is `None`) FIFO of trace records,
/// used as an NMP/NLP core's instruction input queue and as a Host core's
/// peer-thread redirection queue.
#[derive(Debug, Default)]
pub struct ScheduleQueue {
    queue: VecDeque<TraceRecord>,
    capacity: Option<usize>,
}

impl ScheduleQueue {
    /// Builds a queue with the given capacity; `None` means unbounded
    /// (`mcp_core_queue_max_size == 0`).
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
        }
    }

    /// True if the queue is at its configured capacity.
    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.queue.len() >= cap)
    }

    /// Pushes a record, incrementing the queue counter. Caller must have
    /// checked [`Self::is_full`] first; this never silently drops a record.
    pub fn push(&mut self, record: TraceRecord) {
        self.queue.push_back(record);
    }

    /// Pops the next record in FIFO order.
    pub fn pop(&mut self) -> Option<TraceRecord> {
        self.queue.pop_front()
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if no records are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// One core's full execution state: identity, private cache(s), reorder
/// window (out-of-order only), trace/queue input, in-flight bookkeeping, and
/// (Host only) offload policy state.
pub struct Core {
    /// Stable index into the owning [`crate::processor::Processor`]'s core vector.
    pub id: u32,
    /// Execution domain.
    pub role: CoreRole,
    /// In-order or out-of-order issue/retirement.
    pub org: CoreOrg,
    /// Reorder window retirement width.
    pub ipc: usize,
    /// Private cache levels, most-private first: empty, `[L1]`, or `[L1, L2]`.
    pub private: Vec<Cache>,
    /// Out-of-order retirement window; `None` for in-order cores (§4.4
    /// "In-order specifics: no window").
    pub window: Option<ReorderWindow>,

    /// Master trace reader, Host cores that own a `--trace` file only.
    pub trace: Option<TraceReader>,
    /// Originating process ID (selects BB-info and quiescence grouping).
    pub process_id: u64,
    /// This core's own thread ID, used to detect peer-redirected records.
    pub thread_id: u64,
    /// Peer-redirection queue (Host) or dispatch queue (NMP/NLP).
    pub queue: ScheduleQueue,

    /// The record currently being fetched/routed/issued, if any.
    pub current: Option<TraceRecord>,
    /// True once `current`'s offload disposition (local-exec vs. bypass vs.
    /// deferred) has been decided for this record.
    pub current_routed: bool,
    /// True once `current`'s retirement has been counted into stats, so a
    /// multi-tick issue does not double-count.
    pub current_counted: bool,
    /// Remaining non-memory ("bubble") cycles for `current`, `None` until
    /// first computed.
    pub bubble_remaining: Option<u64>,
    /// Addresses from `current.source_addr` not yet successfully issued as READs.
    pub pending_loads: Vec<u64>,
    /// Addresses from `current.dest_addr` not yet successfully issued as WRITEs.
    pub pending_stores: Vec<u64>,

    /// True while a blocking instruction-fetch request is outstanding.
    pub inst_fetch_outstanding: bool,
    /// True while the trace is exhausted and all in-flight work has drained.
    pub more_reqs: bool,
    /// True if this core's trace file failed to open; it contributes no work.
    pub unassigned: bool,
    /// True once `expected_limit_insts` has been reached.
    pub reached_limit: bool,

    /// True while an offload decision is in progress (overhead debt being
    /// paid, or NMP/NLP engaged on behalf of this core).
    pub locked: bool,
    /// Remaining per-offload-decision overhead cycles to charge.
    pub decision_overhead_remaining: u64,
    /// True once overhead has been paid and this core is polling
    /// `can_context_switch` each tick until the gate opens.
    pub awaiting_switch: bool,
    /// Active offload regions (Host only; nesting permitted).
    pub offload_regions: OffloadRegionSet,
    /// True while any offload region is active.
    pub inside_region: bool,
    /// Round-robin cursor over NLP cores for dirty-hit routing.
    pub nlp_round_robin: u32,
    /// True while stalled waiting for NMP/NLP to quiesce before resuming a
    /// non-offloaded record that followed offloaded ones (§4.6 step 3).
    pub wait_for_nmp_finish: bool,
    /// A bypass record that could not be enqueued last tick (target queue
    /// full); retried before any other work resumes.
    pub pending_bypass: Option<TraceRecord>,
}

impl Core {
    /// Builds a core with empty/default transient state; callers fill in
    /// `private`, `window`, `trace`, and identity fields as the role requires.
    pub fn new(id: u32, role: CoreRole, org: CoreOrg, ipc: usize, queue_capacity: Option<usize>) -> Self {
        Self {
            id,
            role,
            org,
            ipc,
            private: Vec::new(),
            window: None,
            trace: None,
            process_id: 0,
            thread_id: u64::from(id),
            queue: ScheduleQueue::new(queue_capacity),
            current: None,
            current_routed: false,
            current_counted: false,
            bubble_remaining: None,
            pending_loads: Vec::new(),
            pending_stores: Vec::new(),
            inst_fetch_outstanding: false,
            more_reqs: true,
            unassigned: false,
            reached_limit: false,
            locked: false,
            decision_overhead_remaining: 0,
            awaiting_switch: false,
            offload_regions: OffloadRegionSet::new(),
            inside_region: false,
            nlp_round_robin: 0,
            wait_for_nmp_finish: false,
            pending_bypass: None,
        }
    }

    /// True if this core's private caches and (if out-of-order) reorder
    /// window are quiescent: no in-flight work of its own.
    pub fn is_locally_quiescent(&self, deep_debug: bool) -> bool {
        let window_empty = self.window.as_ref().is_none_or(ReorderWindow::is_empty);
        let caches_quiescent = !deep_debug || self.private.iter().all(Cache::is_quiescent);
        window_empty && caches_quiescent
    }

    /// True if no private level holds a dirty line.
    pub fn private_has_no_dirty_lines(&self) -> bool {
        self.private.iter().all(Cache::has_no_dirty_lines)
    }

    /// Flushes every dirty line out of this core's private levels.
    pub fn flush_private(&mut self) {
        for level in &mut self.private {
            let _ = level.flush_all_dirty_lines();
        }
    }

    /// Resets all per-record transient state once a record is fully issued
    /// (or skipped as a marker), ready to fetch the next one.
    pub fn finish_current(&mut self) {
        self.current = None;
        self.current_routed = false;
        self.current_counted = false;
        self.bubble_remaining = None;
        self.pending_loads.clear();
        self.pending_stores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_queue_respects_capacity() {
        let mut q = ScheduleQueue::new(Some(1));
        assert!(!q.is_full());
        q.push(TraceRecord::marker("ADD", 0, 0));
        assert!(q.is_full());
    }

    #[test]
    fn unbounded_queue_never_reports_full() {
        let mut q = ScheduleQueue::new(None);
        for _ in 0..1000 {
            q.push(TraceRecord::marker("ADD", 0, 0));
        }
        assert!(!q.is_full());
    }
}
