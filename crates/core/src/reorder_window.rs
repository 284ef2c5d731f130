//! Fixed-capacity out-of-order retirement window with address-masked ready
//! signalling.
//!
//! A circular `[head, tail)` buffer over parallel `ready`/`addr` arrays.
//! Non-memory ("bubble") slots insert already ready; memory slots insert
//! not-ready and record their block-aligned address so a later
//! [`ReorderWindow::set_ready`] call — driven by a cache callback — can find
//! every live slot whose address matches and mark it retirable.

/// Out-of-order retirement window. Invariant: `0 <= load <= depth`; the tail
/// advances only while the head entry is ready, bounded by `ipc` retirements
/// per call to [`ReorderWindow::retire`].
pub struct ReorderWindow {
    depth: usize,
    ipc: usize,
    ready: Vec<bool>,
    addr: Vec<u64>,
    head: usize,
    load: usize,
}

impl ReorderWindow {
    /// Builds an empty window with the given depth and per-tick retirement
    /// width.
    pub fn new(depth: usize, ipc: usize) -> Self {
        Self {
            depth: depth.max(1),
            ipc: ipc.max(1),
            ready: vec![false; depth.max(1)],
            addr: vec![0; depth.max(1)],
            head: 0,
            load: 0,
        }
    }

    /// Current occupancy.
    pub fn load(&self) -> usize {
        self.load
    }

    /// Window capacity.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.load == 0
    }

    /// True if the window is at capacity; callers must stall issue rather
    /// than insert.
    pub fn is_full(&self) -> bool {
        self.load >= self.depth
    }

    /// Inserts a new tail slot. `ready=true` for a bubble/non-memory
    /// instruction (immediately retirable); `ready=false` for a memory
    /// access, recording its block-aligned `addr` for later
    /// [`Self::set_ready`]. Returns `false` without mutating state if the
    /// window is already full.
    pub fn insert(&mut self, ready: bool, addr: u64) -> bool {
        if self.is_full() {
            return false;
        }
        let slot = (self.head + self.load) % self.depth;
        self.ready[slot] = ready;
        self.addr[slot] = addr;
        self.load += 1;
        true
    }

    /// Marks every live slot whose `addr & mask` equals `addr_val & mask` as
    /// ready. Used when a cache fill completes and the owning core does not
    /// know in advance which window slot(s) that fill satisfies (a store and
    /// a later load to the same block may both be waiting on one fill).
    pub fn set_ready(&mut self, addr_val: u64, mask: u64) {
        let masked = addr_val & mask;
        for i in 0..self.load {
            let slot = (self.head + i) % self.depth;
            if self.addr[slot] & mask == masked {
                self.ready[slot] = true;
            }
        }
    }

    /// Retires up to `ipc` ready entries starting at the head, stopping at
    /// the first not-ready entry. Returns the number retired this call.
    pub fn retire(&mut self) -> usize {
        let mut retired = 0;
        while retired < self.ipc && self.load > 0 && self.ready[self.head] {
            self.head = (self.head + 1) % self.depth;
            self.load -= 1;
            retired += 1;
        }
        retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_never_exceeds_depth() {
        let mut w = ReorderWindow::new(2, 4);
        assert!(w.insert(true, 0));
        assert!(w.insert(true, 0));
        assert!(!w.insert(true, 0));
        assert_eq!(w.load(), 2);
    }

    #[test]
    fn retire_stops_at_first_not_ready() {
        let mut w = ReorderWindow::new(4, 4);
        w.insert(true, 0);
        w.insert(false, 0x40);
        w.insert(true, 0);
        assert_eq!(w.retire(), 1);
        assert_eq!(w.load(), 2);
    }

    #[test]
    fn set_ready_matches_masked_address() {
        let mut w = ReorderWindow::new(4, 4);
        w.insert(false, 0x1000);
        w.insert(false, 0x1004);
        w.set_ready(0x1000, !0x3f);
        assert_eq!(w.retire(), 2);
    }

    #[test]
    fn retire_is_bounded_by_ipc_per_call() {
        let mut w = ReorderWindow::new(8, 2);
        for _ in 0..5 {
            w.insert(true, 0);
        }
        assert_eq!(w.retire(), 2);
        assert_eq!(w.load(), 3);
    }
}
