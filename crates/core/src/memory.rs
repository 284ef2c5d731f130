//! Memory request model and the DRAM timing model contract.
//!
//! The DRAM timing model (channel/vault controllers, command scheduling,
//! refresh) is an external collaborator referenced only by contract (see the
//! memory model contract section). This module defines that contract as the
//! [`Memory`] trait plus one in-crate implementation, [`LatencyMemory`], a
//! fixed-latency stand-in sufficient to drive and test the co-simulation
//! engine end to end. It is not a DRAM model.

use std::collections::VecDeque;

use crate::common::PhysAddr;

/// Direction of a memory request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// A load.
    Read,
    /// A store.
    Write,
}

/// A single in-flight memory request.
///
/// Request objects are owned by whichever cache level currently holds them;
/// `arrive`/`depart` are stamped by the component that schedules completion
/// (a `Cache`'s hit-list, or `CacheSystem`'s wait-list).
#[derive(Clone, Debug)]
pub struct Request {
    /// Target address.
    pub addr: PhysAddr,
    /// Read or write.
    pub kind: AccessKind,
    /// Owning core ID, for MSHR bookkeeping and per-core quiescence checks.
    pub core_id: u32,
    /// True if issued on behalf of an NMP core.
    pub is_nmp: bool,
    /// True if this is a blocking instruction-fetch request rather than a
    /// data access.
    pub instruction_request: bool,
    /// Tick at which this request was accepted by its current owner.
    pub arrive: u64,
    /// Tick at which this request is scheduled to complete.
    pub depart: u64,
}

impl Request {
    /// Builds a new data request with `arrive`/`depart` both set to `now`;
    /// the owning component updates `depart` once it knows the latency.
    pub fn new(addr: PhysAddr, kind: AccessKind, core_id: u32, is_nmp: bool, now: u64) -> Self {
        Self {
            addr,
            kind,
            core_id,
            is_nmp,
            instruction_request: false,
            arrive: now,
            depart: now,
        }
    }
}

/// The DRAM timing model contract. Implementations model, or stand in for,
/// channel/vault controllers, command scheduling, and refresh.
pub trait Memory {
    /// Synchronous accept/refuse, matching the `Cache::send` contract
    /// exactly: a refusal never panics and never blocks, the caller
    /// re-queues on its own retry list. On acceptance, `req.depart` is
    /// stamped with the tick at which the access will complete.
    fn send_request(&mut self, req: &mut Request, now_cycle: u64) -> bool;

    /// Advances the model's internal state by one `mem_tick` period,
    /// invoking any due callbacks.
    fn tick(&mut self, now_cycle: u64);

    /// Pops the next completed request ready for its callback to fire, if any.
    fn poll_completed(&mut self) -> Option<Request>;

    /// Outstanding accepted-but-not-yet-completed request count; read by the
    /// quiescence gate.
    fn pending_request_count(&self) -> u64;

    /// Outstanding link-packet count; read by the quiescence gate. The
    /// stand-in model has no link layer and always reports zero.
    fn pending_link_packet_count(&self) -> u64 {
        0
    }

    /// The model's own tick period, in nanoseconds, used only for stats and
    /// energy reporting — never for scheduling (the scheduler owns its own
    /// `mem_tick` period independently).
    fn clk_ns(&self) -> f64;

    /// Deterministic virtual-to-physical translation, called once per trace
    /// record read. The stand-in model is an identity mapping; a real DRAM
    /// timing model owns the authoritative version out of scope.
    fn page_allocator(&mut self, vaddr: u64, _core_id: u32) -> u64 {
        vaddr
    }
}

/// Fixed-latency stand-in memory model: every access completes exactly
/// `latency_cycles` after it is accepted, with no row-buffer, channel, or
/// refresh modeling. Acceptance is refused only once `max_in_flight`
/// outstanding requests are already queued, giving the quiescence and retry
/// paths something real to exercise in tests.
pub struct LatencyMemory {
    latency_cycles: u64,
    clk_ns: f64,
    max_in_flight: usize,
    in_flight: VecDeque<Request>,
    completed: VecDeque<Request>,
}

impl LatencyMemory {
    /// Builds a stand-in model with the given fixed per-access latency.
    pub fn new(latency_cycles: u64, clk_ns: f64, max_in_flight: usize) -> Self {
        Self {
            latency_cycles,
            clk_ns,
            max_in_flight,
            in_flight: VecDeque::new(),
            completed: VecDeque::new(),
        }
    }
}

impl Memory for LatencyMemory {
    fn send_request(&mut self, req: &mut Request, now_cycle: u64) -> bool {
        if self.in_flight.len() >= self.max_in_flight {
            return false;
        }
        req.arrive = now_cycle;
        req.depart = now_cycle + self.latency_cycles;
        self.in_flight.push_back(req.clone());
        true
    }

    fn tick(&mut self, now_cycle: u64) {
        while self.in_flight.front().is_some_and(|front| front.depart <= now_cycle) {
            if let Some(req) = self.in_flight.pop_front() {
                self.completed.push_back(req);
            }
        }
    }

    fn poll_completed(&mut self) -> Option<Request> {
        self.completed.pop_front()
    }

    fn pending_request_count(&self) -> u64 {
        (self.in_flight.len() + self.completed.len()) as u64
    }

    fn clk_ns(&self) -> f64 {
        self.clk_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_complete_after_fixed_latency() {
        let mut mem = LatencyMemory::new(10, 1.0, 4);
        let mut req = Request::new(PhysAddr::new(0x100), AccessKind::Read, 0, false, 0);
        assert!(mem.send_request(&mut req, 0));
        assert_eq!(req.depart, 10);
        mem.tick(5);
        assert!(mem.poll_completed().is_none());
        mem.tick(10);
        assert!(mem.poll_completed().is_some());
    }

    #[test]
    fn refuses_beyond_capacity() {
        let mut mem = LatencyMemory::new(10, 1.0, 1);
        let mut req1 = Request::new(PhysAddr::new(0x100), AccessKind::Read, 0, false, 0);
        let mut req2 = Request::new(PhysAddr::new(0x200), AccessKind::Read, 0, false, 0);
        assert!(mem.send_request(&mut req1, 0));
        assert!(!mem.send_request(&mut req2, 0));
    }
}
