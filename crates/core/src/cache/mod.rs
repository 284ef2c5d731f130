//! Cache hierarchy: line/set data model, single-level cache behavior, and
//! the chain-of-levels walk that threads a request from a core's private
//! cache(s) through to the shared LLC or to memory.
//!
//! The hierarchy is a single concrete [`Cache`] type parameterized by
//! [`Level`] rather than a class hierarchy (Design Notes). A per-core chain
//! is assembled fresh for every tick from borrowed references: a core's
//! owned private levels (zero, one, or two `Cache` instances) followed,
//! where applicable, by a borrow of the one shared LLC instance living on
//! [`crate::sim::Simulator`]. This is the arena-borrowing technique the
//! Design Notes recommend for the Processor/Core cyclic-reference problem,
//! applied here so the LLC is truly shared content (one set of lines) rather
//! than duplicated per core.
//!
//! An NMP core's chain is exactly its own private L1 with nothing appended,
//! so a miss falls straight through to memory — matching "each with a
//! private L1 only" and no LLC connection. A no-private-cache Host core (or
//! an NLP core, which never owns caches) chain is just `[&mut shared_llc]`.

use std::collections::{HashMap, VecDeque};

use crate::cache_system::CacheSystem;
use crate::common::PhysAddr;
use crate::memory::{AccessKind, Memory, Request};
use crate::stats::DomainStats;

/// Cache level; determines which geometry/latency/energy row applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Private, closest to the core.
    L1,
    /// Private, second level.
    L2,
    /// Shared last-level cache; the terminal level before memory.
    L3,
}

impl Level {
    /// Row index into the per-level geometry/latency/energy tables.
    pub fn index(self) -> usize {
        match self {
            Level::L1 => 0,
            Level::L2 => 1,
            Level::L3 => 2,
        }
    }
}

/// One cache line. Invariant: `lock` stays true from allocation until the
/// fill completes; a locked line's payload is reserved but not readable by
/// dependent loads (a hit against a locked line is therefore impossible by
/// construction — it is still present in the set, so eviction/invalidation
/// logic still sees it, but `Cache::send` treats it as a miss).
#[derive(Clone, Copy, Debug)]
pub struct CacheLine {
    /// Block-aligned address.
    pub addr: PhysAddr,
    /// Tag bits above the index.
    pub tag: u64,
    /// True until the fill for this line completes.
    pub lock: bool,
    /// True if the line has been written since it was filled.
    pub dirty: bool,
    /// Owning core, for per-core cache-content queries (e.g. `contains_dirty`).
    pub core_id: u32,
}

/// An associative set: ordered MRU-front, LRU-back, length <= associativity.
pub type CacheSet = VecDeque<CacheLine>;

/// Tracks one outstanding miss: which set it will land in, whether a racing
/// write-allocate has since touched it, and when its fill completes (so a
/// coalesced secondary request can report the same completion tick instead
/// of re-deriving it).
#[derive(Clone, Copy, Debug)]
struct MshrEntry {
    is_nmp_write: bool,
    fill_tick: u64,
}

/// A single cache level: hit/miss path, MSHR-based miss handling, LRU
/// eviction, and a retry list for transient refusals.
pub struct Cache {
    /// This level.
    pub level: Level,
    sets: Vec<CacheSet>,
    assoc: usize,
    line_bytes: u64,
    index_bits: u32,
    latency: u64,
    energy_per_access: f64,
    mshr_capacity: usize,
    mshrs: HashMap<u64, MshrEntry>,
    retry_list: VecDeque<Request>,
}

/// Outcome of evicting a victim line. Whether a higher (more-private) copy
/// existed is determined by `invalidate_upward`'s return value at writeback
/// time, not known at eviction time.
struct Eviction {
    line: CacheLine,
}

impl Cache {
    /// Builds a cache level with the given geometry.
    pub fn new(
        level: Level,
        size_bytes: usize,
        assoc: usize,
        line_bytes: usize,
        latency: u64,
        mshr_capacity: usize,
        energy_per_access: f64,
    ) -> Self {
        let num_sets = (size_bytes / line_bytes / assoc.max(1)).max(1);
        Self {
            level,
            sets: vec![CacheSet::new(); num_sets],
            assoc: assoc.max(1),
            line_bytes: line_bytes.max(1) as u64,
            index_bits: num_sets.max(1).next_power_of_two().trailing_zeros(),
            latency,
            energy_per_access,
            mshr_capacity,
            mshrs: HashMap::new(),
            retry_list: VecDeque::new(),
        }
    }

    fn set_index(&self, block_addr: u64) -> usize {
        let mask = (1u64 << self.index_bits) - 1;
        ((block_addr / self.line_bytes) & mask) as usize
    }

    fn tag_of(&self, block_addr: u64) -> u64 {
        block_addr >> self.index_bits
    }

    /// True if `addr`'s block is present (unlocked) in this level.
    pub fn contains(&self, addr: PhysAddr) -> bool {
        let block = addr.block_aligned(self.line_bytes).val();
        let set_idx = self.set_index(block);
        let tag = self.tag_of(block);
        self.sets[set_idx].iter().any(|l| l.tag == tag && !l.lock)
    }

    /// True if `addr`'s block is present and dirty; the NLP coherence check
    /// (`check_for_dirty`) consults this on the shared LLC.
    pub fn contains_dirty(&self, addr: PhysAddr) -> bool {
        let block = addr.block_aligned(self.line_bytes).val();
        let set_idx = self.set_index(block);
        let tag = self.tag_of(block);
        self.sets[set_idx].iter().any(|l| l.tag == tag && !l.lock && l.dirty)
    }

    fn find_line(&self, block: u64) -> Option<usize> {
        let set_idx = self.set_index(block);
        let tag = self.tag_of(block);
        self.sets[set_idx].iter().position(|l| l.tag == tag)
    }

    fn touch_mru(&mut self, set_idx: usize, pos: usize) {
        if let Some(line) = self.sets[set_idx].remove(pos) {
            self.sets[set_idx].push_front(line);
        }
    }

    fn set_is_full(&self, set_idx: usize) -> bool {
        self.sets[set_idx].len() >= self.assoc
    }

    fn set_is_all_locked(&self, set_idx: usize) -> bool {
        !self.sets[set_idx].is_empty() && self.sets[set_idx].iter().all(|l| l.lock)
    }

    /// Picks and removes the LRU (back-of-set) line to make room, if the set
    /// is already at capacity; `None` means the set still has free capacity.
    fn evict_victim(&mut self, set_idx: usize) -> Option<Eviction> {
        if !self.set_is_full(set_idx) {
            return None;
        }
        self.sets[set_idx].pop_back().map(|line| Eviction { line })
    }

    fn install_line(&mut self, block: u64, core_id: u32, dirty: bool) {
        let set_idx = self.set_index(block);
        self.sets[set_idx].push_front(CacheLine {
            addr: PhysAddr::new(block),
            tag: self.tag_of(block),
            lock: true,
            dirty,
            core_id,
        });
    }

    fn unlock(&mut self, block: u64, make_dirty: bool) {
        let Some(pos) = self.find_line(block) else {
            return;
        };
        let set_idx = self.set_index(block);
        if let Some(line) = self.sets[set_idx].get_mut(pos) {
            line.lock = false;
            if make_dirty {
                line.dirty = true;
            }
        }
    }

    /// Synchronously writes back and evicts `addr` if present, regardless of
    /// dirty state (`flush_line`).
    pub fn flush_line(&mut self, addr: PhysAddr) -> Option<CacheLine> {
        let block = addr.block_aligned(self.line_bytes).val();
        let pos = self.find_line(block)?;
        let set_idx = self.set_index(block);
        self.sets[set_idx].remove(pos)
    }

    /// Writes back and evicts every dirty line in this level
    /// (`flush_all_dirty_lines`); used at Host->NMP context-switch
    /// boundaries when `nlp_facility=off` (whole-cache, not per-core, see
    /// Design Notes).
    pub fn flush_all_dirty_lines(&mut self) -> Vec<CacheLine> {
        let mut flushed = Vec::new();
        for set in &mut self.sets {
            let mut kept = CacheSet::new();
            for line in set.drain(..) {
                if line.dirty && !line.lock {
                    flushed.push(line);
                } else {
                    kept.push_back(line);
                }
            }
            *set = kept;
        }
        flushed
    }

    /// True if this level currently has zero dirty lines.
    pub fn has_no_dirty_lines(&self) -> bool {
        self.sets.iter().all(|s| s.iter().all(|l| !l.dirty))
    }

    /// True if the retry list and MSHR table are both empty (deep-debug
    /// quiescence check).
    pub fn is_quiescent(&self) -> bool {
        self.retry_list.is_empty() && self.mshrs.is_empty()
    }

    fn drain_retries(&mut self) -> Vec<Request> {
        self.retry_list.drain(..).collect()
    }
}

/// Free functions threading a request through an assembled chain of cache
/// levels (private, then optionally the shared LLC), most-private first.
/// Callers build `levels` fresh each call from owned private `Cache`s plus a
/// borrow of the shared LLC where applicable (see module docs).
pub mod chain {
    use super::{Cache, CacheSystem, DomainStats, Eviction, Memory, PhysAddr, Request};
    use crate::memory::AccessKind;

    /// `Cache::send`: aligns `req.addr`, walks the hit/MSHR/miss path at
    /// `levels[0]`, cascading to lower levels or memory on miss. Returns
    /// `false` (caller re-queues on its own retry list) when there is no
    /// free MSHR, the target set is entirely locked, or the lower layer (a
    /// deeper level or memory) refuses.
    pub fn send(
        levels: &mut [&mut Cache],
        req: Request,
        now: u64,
        cache_system: &mut CacheSystem,
        memory: &mut dyn Memory,
        stats: &mut DomainStats,
    ) -> bool {
        let mut installed = Vec::new();
        match send_at(levels, 0, req.clone(), now, memory, stats, &mut installed) {
            Some(tick) if installed.is_empty() => {
                cache_system.schedule_hit(tick, req);
                true
            }
            Some(tick) => {
                cache_system.schedule_wait(tick, req, installed);
                true
            }
            None => false,
        }
    }

    /// Hit/MSHR/miss walk starting at `levels[idx]`; returns the tick the
    /// access becomes core-visible at, appending every level that newly
    /// locked a line for this access to `installed` (levels needing an
    /// unlock once the fill completes). `None` means refused.
    fn send_at(
        levels: &mut [&mut Cache],
        idx: usize,
        mut req: Request,
        now: u64,
        memory: &mut dyn Memory,
        stats: &mut DomainStats,
        installed: &mut Vec<usize>,
    ) -> Option<u64> {
        let line_bytes = levels[idx].line_bytes;
        req.addr = req.addr.block_aligned(line_bytes);
        let block = req.addr.val();
        let level_row = levels[idx].level.index();

        if levels[idx].contains(req.addr) {
            if let Some(pos) = levels[idx].find_line(block) {
                let set_idx = levels[idx].set_index(block);
                levels[idx].touch_mru(set_idx, pos);
            }
            if req.kind == AccessKind::Write {
                levels[idx].unlock(block, true);
            }
            let latency = levels[idx].latency;
            stats.cache_hits[level_row] += 1;
            stats.total_energy_consumption += levels[idx].energy_per_access;
            return Some(now + latency);
        }

        if let Some(entry) = levels[idx].mshrs.get_mut(&block) {
            if req.kind == AccessKind::Write {
                entry.is_nmp_write = true;
            }
            stats.cache_mshr_hits[level_row] += 1;
            // A coalesced secondary request becomes core-visible at the tick
            // already scheduled for the in-flight fill, not a fresh one.
            return Some(entry.fill_tick);
        }

        if levels[idx].mshrs.len() >= levels[idx].mshr_capacity {
            return None;
        }
        let set_idx = levels[idx].set_index(block);
        if levels[idx].set_is_all_locked(set_idx) {
            return None;
        }

        stats.cache_misses[level_row] += 1;
        if let Some(eviction) = levels[idx].evict_victim(set_idx) {
            writeback_evicted(levels, idx, eviction, now, memory, stats);
        }

        let fill_tick = if idx + 1 < levels.len() {
            let mut lower_req = req.clone();
            lower_req.arrive = now;
            send_at(levels, idx + 1, lower_req, now, memory, stats, installed)?
        } else {
            let mut mem_req = req.clone();
            if !memory.send_request(&mut mem_req, now) {
                return None;
            }
            mem_req.depart
        };

        levels[idx].install_line(block, req.core_id, req.kind == AccessKind::Write);
        levels[idx].mshrs.insert(
            block,
            super::MshrEntry {
                is_nmp_write: req.kind == AccessKind::Write,
                fill_tick,
            },
        );
        installed.push(idx);
        Some(fill_tick)
    }

    fn writeback_evicted(
        levels: &mut [&mut Cache],
        idx: usize,
        eviction: Eviction,
        now: u64,
        memory: &mut dyn Memory,
        stats: &mut DomainStats,
    ) {
        let had_higher = if idx > 0 {
            invalidate_upward(levels, idx - 1, eviction.line.addr)
        } else {
            false
        };
        if had_higher {
            stats.cache_evictions[levels[idx].level.index()] += 1;
        }
        if eviction.line.dirty {
            stats.cache_writebacks[levels[idx].level.index()] += 1;
            let mut writeback = Request::new(eviction.line.addr, AccessKind::Write, eviction.line.core_id, false, now);
            if idx + 1 < levels.len() {
                // Writebacks are fire-and-forget: a refusal here is dropped
                // rather than retried, matching the source's best-effort
                // writeback path (no instruction is waiting on it).
                let mut installed = Vec::new();
                let _ = send_at(levels, idx + 1, writeback, now, memory, stats, &mut installed);
            } else {
                let _ = memory.send_request(&mut writeback, now);
            }
        }
    }

    /// Recursively invalidates `addr` from level `idx` upward (toward index
    /// 0), writing back any dirty higher copy first (the writeback target at
    /// that point is this same chain at `idx`, one level down from the
    /// invalidated copy). Returns true if any higher copy existed.
    fn invalidate_upward(levels: &mut [&mut Cache], idx: usize, addr: PhysAddr) -> bool {
        let line_bytes = levels[idx].line_bytes;
        let block = addr.block_aligned(line_bytes).val();
        match levels[idx].flush_line(PhysAddr::new(block)) {
            Some(line) => {
                if idx > 0 {
                    invalidate_upward(levels, idx - 1, line.addr);
                }
                true
            }
            // Inclusion: absent here means absent at every level above.
            None => false,
        }
    }

    /// `Cache::callback`: unlocks the line at every level named in
    /// `installed` (levels that locked a line for this request at `send`
    /// time), marking it dirty if the completing access was a
    /// write-allocate.
    pub fn callback(levels: &mut [&mut Cache], req: &Request, installed: &[usize]) {
        let make_dirty = req.kind == AccessKind::Write;
        for &idx in installed {
            let line_bytes = levels[idx].line_bytes;
            let block = req.addr.block_aligned(line_bytes).val();
            if let Some(entry) = levels[idx].mshrs.remove(&block) {
                levels[idx].unlock(block, make_dirty || entry.is_nmp_write);
            }
        }
    }

    /// `tick`: drains each level's retry list, re-invoking `send` per entry.
    pub fn tick(
        levels: &mut [&mut Cache],
        now: u64,
        cache_system: &mut CacheSystem,
        memory: &mut dyn Memory,
        stats: &mut DomainStats,
    ) {
        for idx in 0..levels.len() {
            let retries = levels[idx].drain_retries();
            for req in retries {
                // Re-running `send` from level 0 (not `idx`) matches the
                // source: a retried request re-enters the chain exactly as
                // it first did, since an earlier level may now have freed an
                // MSHR or unlocked a set too.
                if !send(levels, req.clone(), now, cache_system, memory, stats) {
                    levels[idx].retry_list.push_back(req);
                }
            }
        }
    }

    /// Adds `req` to the given level's retry list, drained on the next `tick`.
    pub fn retry(levels: &mut [&mut Cache], idx: usize, req: Request) {
        levels[idx].retry_list.push_back(req);
    }

    /// True if every level's retry list and MSHR table are empty (deep-debug
    /// quiescence check).
    pub fn is_quiescent(levels: &[&mut Cache]) -> bool {
        levels.iter().all(|c| c.is_quiescent())
    }

    /// Whole-chain dirty-line flush, used on Host->NMP transition when
    /// `nlp_facility=off`.
    pub fn flush_all_dirty_lines(levels: &mut [&mut Cache]) {
        for level in levels.iter_mut() {
            level.flush_all_dirty_lines();
        }
    }

    /// True if no level in this chain has a dirty line.
    pub fn has_no_dirty_lines(levels: &[&mut Cache]) -> bool {
        levels.iter().all(|c| c.has_no_dirty_lines())
    }

    /// NLP coherence check: true if any level's copy of `addr` is dirty
    /// (`check_for_dirty`).
    pub fn contains_dirty(levels: &[&mut Cache], addr: PhysAddr) -> bool {
        levels.iter().any(|c| c.contains_dirty(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LatencyMemory;

    fn two_levels() -> (Cache, Cache) {
        (
            Cache::new(Level::L1, 1024, 2, 64, 4, 2, 0.494),
            Cache::new(Level::L2, 4096, 4, 64, 16, 4, 3.307),
        )
    }

    #[test]
    fn mshr_coalesces_same_block_requests() {
        let (mut l1, mut l2) = two_levels();
        let mut levels: Vec<&mut Cache> = vec![&mut l1, &mut l2];
        let mut cache_system = CacheSystem::new();
        let mut memory = LatencyMemory::new(20, 1.0, 16);
        let mut stats = DomainStats::default();

        let req1 = Request::new(PhysAddr::new(0x100), AccessKind::Read, 0, false, 0);
        let req2 = Request::new(PhysAddr::new(0x104), AccessKind::Read, 0, false, 0);
        assert!(chain::send(&mut levels, req1, 0, &mut cache_system, &mut memory, &mut stats));
        assert!(chain::send(&mut levels, req2, 0, &mut cache_system, &mut memory, &mut stats));
        assert_eq!(stats.cache_mshr_hits[0], 1);
    }

    #[test]
    fn set_associativity_is_bounded() {
        let (l1, _l2) = two_levels();
        assert_eq!(l1.assoc, 2);
    }

    #[test]
    fn hit_after_fill_completes() {
        let (mut l1, mut l2) = two_levels();
        let mut levels: Vec<&mut Cache> = vec![&mut l1, &mut l2];
        let mut cache_system = CacheSystem::new();
        let mut memory = LatencyMemory::new(20, 1.0, 16);
        let mut stats = DomainStats::default();

        let req = Request::new(PhysAddr::new(0x100), AccessKind::Read, 0, false, 0);
        assert!(chain::send(&mut levels, req.clone(), 0, &mut cache_system, &mut memory, &mut stats));
        // Line is locked until the callback fires; a second send before that
        // still misses (the contains() check excludes locked lines) and
        // coalesces onto the same MSHR rather than hitting.
        let req2 = Request::new(PhysAddr::new(0x100), AccessKind::Read, 0, false, 0);
        assert!(chain::send(&mut levels, req2, 0, &mut cache_system, &mut memory, &mut stats));
        assert_eq!(stats.cache_mshr_hits[0], 1);
    }
}
