//! Top-level co-simulation engine: owns every Host/NMP/NLP processor, the
//! shared LLC, the memory model, and drives the multi-clock tick scheduler.
//!
//! Per the Design Notes ("indices into a top-level arena"), `Simulator` is
//! that arena: it is the only type that ever holds the Host processor, the
//! NMP processor, the optional NLP processor, and the shared LLC
//! simultaneously, so it alone can assemble the borrowed cache chains and
//! cross-processor routing a tick requires. `Processor` and `Core` stay plain
//! data holders (see their module docs); every control-flow function below is
//! a free function taking exactly the fields it needs, so the borrow checker
//! sees them as disjoint borrows of `self`'s fields rather than reentrant
//! calls through `&mut self`.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::bb_info::BbInfo;
use crate::cache::{chain, Cache, Level};
use crate::cache_system::CacheSystem;
use crate::common::{AddressMapper, PhysAddr, SimError};
use crate::config::{Config, CoreOrg, McpCacheTopology, SimMode};
use crate::core_model::{Core, CoreRole};
use crate::memory::{AccessKind, Memory, Request};
use crate::offload::{OffloadDecision, SystemTelemetry};
use crate::opcode_table::OpcodeTable;
use crate::processor::Processor;
use crate::reorder_window::ReorderWindow;
use crate::stats::{DomainStats, StatsRegistry};
use crate::trace::{TraceReader, TraceRecord};

fn build_cache(level: Level, config: &Config) -> Cache {
    let levels = Config::cache_levels();
    let (size, latency) = levels[level.index()];
    Cache::new(
        level,
        size,
        config.assoc(),
        config.line_bytes(),
        latency,
        config.mshr_count(),
        Config::energy_per_access()[level.index()],
    )
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a.max(1)
    } else {
        gcd(b, a % b)
    }
}

/// Per-clock step counts derived from the configured Host/NMP/memory
/// frequencies, expressed as multiples of their greatest common divisor
/// (§4.8).
struct TickPlan {
    cpu_step: u64,
    nmp_step: u64,
    mem_step: u64,
}

/// Owns the whole co-simulated system and drives it tick by tick.
pub struct Simulator {
    config: Config,
    host: Processor,
    nmp: Processor,
    nlp: Option<Processor>,
    llc: Cache,
    memory: Box<dyn Memory>,
    stats: StatsRegistry,
    address_mapper: AddressMapper,
    opcodes: OpcodeTable,
    policy: Box<dyn OffloadDecision>,
    bb_info: HashMap<u64, BbInfo>,
    cur_tick: u64,
}

impl Simulator {
    /// Builds a `Simulator` from a loaded config, one trace file per
    /// intended Host core (file 0 seeds core 0, by position, per the Open
    /// Question decision recorded in DESIGN.md), a loaded opcode-cycle
    /// table, the offload decision policy, any loaded per-process BB-info,
    /// and a memory model.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if `config.validate()` fails, or
    /// `SimError::NoTraceAssigned` if every named trace file failed to open.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        traces: Vec<PathBuf>,
        opcodes: OpcodeTable,
        policy: Box<dyn OffloadDecision>,
        bb_info: HashMap<u64, BbInfo>,
        memory: Box<dyn Memory>,
    ) -> Result<Self, SimError> {
        config.validate()?;

        let llc = build_cache(Level::L3, &config);

        let mut host = Processor::new(CoreRole::Host);
        let mut assigned = 0usize;
        for i in 0..config.number_cores {
            let mut core = Core::new(i, CoreRole::Host, config.core_org, config.window_ipc(), None);
            core.process_id = u64::from(i);
            if config.has_core_caches() {
                core.private.push(build_cache(Level::L1, &config));
                core.private.push(build_cache(Level::L2, &config));
            }
            if config.core_org == CoreOrg::OutOrder {
                core.window = Some(ReorderWindow::new(config.window_depth(), config.window_ipc()));
            }
            match traces.get(i as usize) {
                Some(path) => match TraceReader::open(path) {
                    Ok(reader) => {
                        core.trace = Some(reader);
                        assigned += 1;
                    }
                    Err(err) => {
                        warn!(core = i, path = %path.display(), error = %err, "trace file failed to open; core left unassigned");
                        core.unassigned = true;
                        core.more_reqs = false;
                    }
                },
                None => {
                    core.unassigned = true;
                    core.more_reqs = false;
                }
            }
            host.cores.push(core);
        }
        if assigned == 0 {
            return Err(SimError::NoTraceAssigned {
                count: host.cores.len(),
            });
        }

        let queue_cap = if config.mcp_core_queue_max_size == 0 {
            None
        } else {
            Some(config.mcp_core_queue_max_size as usize)
        };

        let mut nmp = Processor::new(CoreRole::Nmp);
        for i in 0..config.number_mcp_cores {
            let mut core = Core::new(i, CoreRole::Nmp, config.mcp_core_org, config.window_ipc(), queue_cap);
            if config.mcp_cache == McpCacheTopology::L1 {
                core.private.push(build_cache(Level::L1, &config));
            }
            if config.mcp_core_org == CoreOrg::OutOrder {
                core.window = Some(ReorderWindow::new(config.window_depth(), config.window_ipc()));
            }
            nmp.cores.push(core);
        }

        let nlp = if config.nlp_facility.is_on() {
            let mut p = Processor::new(CoreRole::Nlp);
            for i in 0..config.llc_slice {
                let mut core = Core::new(i, CoreRole::Nlp, config.mcp_core_org, config.window_ipc(), queue_cap);
                if config.mcp_core_org == CoreOrg::OutOrder {
                    core.window = Some(ReorderWindow::new(config.window_depth(), config.window_ipc()));
                }
                p.cores.push(core);
            }
            Some(p)
        } else {
            None
        };

        let address_mapper = AddressMapper::new(
            config.max_address_bits(),
            config.tx_bits(),
            config.flit_num_bits(),
            config.number_mcp_cores.max(1),
        );

        info!(
            host_cores = host.cores.len(),
            nmp_cores = nmp.cores.len(),
            nlp_cores = nlp.as_ref().map_or(0, |p| p.cores.len()),
            sim_mode = ?config.sim_mode,
            "simulator constructed"
        );

        Ok(Self {
            config,
            host,
            nmp,
            nlp,
            llc,
            memory,
            stats: StatsRegistry::default(),
            address_mapper,
            opcodes,
            policy,
            bb_info,
            cur_tick: 0,
        })
    }

    /// Read-only access to the statistics registry, for the CLI's reporting step.
    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    fn build_tick_plan(&self) -> TickPlan {
        let cpu_period = (1_000_000.0 / self.config.cpu_frequency).round().max(1.0) as u64;
        let nmp_period = (1_000_000.0 / self.config.mcp_frequency).round().max(1.0) as u64;
        let mem_period = (self.memory.clk_ns() * 1000.0).round().max(1.0) as u64;
        let g = gcd(gcd(cpu_period, nmp_period), mem_period);
        TickPlan {
            cpu_step: cpu_period / g,
            nmp_step: nmp_period / g,
            mem_step: mem_period / g,
        }
    }

    fn is_complete(&self) -> bool {
        let host_done = self.host.cores.iter().all(|c| core_finished(c));
        let nmp_done = self.nmp.cores.iter().all(|c| core_finished(c));
        let nlp_done = self.nlp.as_ref().is_none_or(|p| p.cores.iter().all(|c| core_finished(c)));

        if self.config.early_exit.is_on() {
            self.host.cores.iter().any(core_finished)
                || self.nmp.cores.iter().any(core_finished)
                || self.nlp.as_ref().is_some_and(|p| p.cores.iter().any(core_finished))
        } else {
            host_done && nmp_done && nlp_done
        }
    }

    /// Runs the warmup (Host + memory only) phase followed by the full
    /// multi-clock tick scheduler (§4.8) to completion.
    pub fn run_to_completion(&mut self) -> Result<(), SimError> {
        let plan = self.build_tick_plan();
        info!(cpu_step = plan.cpu_step, nmp_step = plan.nmp_step, mem_step = plan.mem_step, "starting run");

        let mut i: u64 = 0;
        let mut next_cpu = plan.cpu_step;
        let mut next_mem = plan.mem_step;

        if self.config.simulated_warmup_insts > 0 {
            loop {
                i += 1;
                if i >= next_cpu {
                    self.tick_host();
                    next_cpu += plan.cpu_step;
                }
                if i >= next_mem {
                    self.memory.tick(self.cur_tick);
                    drain_memory_completions(self.memory.as_mut());
                    next_mem += plan.mem_step;
                }
                if self.stats.host.total_cpu_instructions >= self.config.simulated_warmup_insts {
                    break;
                }
                if !self.host.any_active() {
                    break;
                }
            }
            info!(warmup_insts = self.stats.host.total_cpu_instructions, "warmup phase complete");
        }

        let mut next_nmp = plan.nmp_step;
        loop {
            i += 1;
            let mut host_ticked = false;
            let mut nmp_ticked = false;

            if i >= next_cpu {
                self.tick_host();
                next_cpu += plan.cpu_step;
                host_ticked = true;
            }
            if i >= next_nmp && self.config.sim_mode != SimMode::HostOnly {
                self.tick_nmp();
                if self.nlp.is_some() {
                    self.tick_nlp();
                }
                next_nmp += plan.nmp_step;
                nmp_ticked = true;
            }
            if i >= next_mem {
                self.memory.tick(self.cur_tick);
                drain_memory_completions(self.memory.as_mut());
                next_mem += plan.mem_step;
            }
            self.cur_tick += 1;

            if host_ticked || nmp_ticked {
                if self.is_complete() {
                    break;
                }
            }
        }

        self.stats.total_time_ns = (self.cur_tick as f64 * (1_000_000.0 / self.config.cpu_frequency)) as u64;
        info!(
            ticks = self.cur_tick,
            host_insts = self.stats.host.total_cpu_instructions,
            nmp_insts = self.stats.nmp.total_cpu_instructions,
            nlp_insts = self.stats.nlp.total_cpu_instructions,
            "run complete"
        );
        Ok(())
    }

    fn tick_host(&mut self) {
        tick_host_impl(
            &mut self.host,
            &mut self.nmp,
            self.nlp.as_mut(),
            &mut self.llc,
            self.memory.as_mut(),
            &mut self.stats,
            &self.opcodes,
            self.policy.as_ref(),
            &self.bb_info,
            &self.config,
            &self.address_mapper,
            self.cur_tick,
        );
    }

    fn tick_nmp(&mut self) {
        tick_nmp_impl(
            &mut self.nmp,
            self.nlp.as_ref(),
            self.memory.as_mut(),
            &mut self.stats.nmp,
            &self.opcodes,
            self.cur_tick,
            self.config.line_bytes() as u64,
        );
    }

    fn tick_nlp(&mut self) {
        if let Some(nlp) = self.nlp.as_mut() {
            tick_nlp_impl(
                nlp,
                &mut self.llc,
                self.memory.as_mut(),
                &mut self.stats.nlp,
                &self.opcodes,
                self.cur_tick,
                self.config.line_bytes() as u64,
            );
        }
    }
}

fn core_finished(core: &Core) -> bool {
    !core.more_reqs
        && core.current.is_none()
        && core.queue.is_empty()
        && core.window.as_ref().is_none_or(ReorderWindow::is_empty)
}

fn drain_memory_completions(memory: &mut dyn Memory) {
    while memory.poll_completed().is_some() {}
}

/// Assembles the cache chain for `core`: its own private levels, then the
/// shared LLC appended unless `core` is an NMP core (which never connects to
/// the LLC, per §4.1).
fn build_chain<'a>(core: &'a mut Core, llc: &'a mut Cache) -> Vec<&'a mut Cache> {
    let mut levels: Vec<&mut Cache> = core.private.iter_mut().collect();
    if core.role != CoreRole::Nmp {
        levels.push(llc);
    }
    levels
}

fn can_context_switch(host: &Processor, llc: &Cache, memory: &dyn Memory, process_id: u64, deep_debug: bool) -> bool {
    if !host.locally_quiescent_for(process_id, deep_debug) {
        return false;
    }
    if deep_debug {
        if !llc.is_quiescent() {
            return false;
        }
        let wait_list_drained = host
            .cores
            .iter()
            .filter(|c| c.process_id == process_id)
            .all(|c| host.cache_system.is_wait_list_empty(c.id, c.role != CoreRole::Host));
        if !wait_list_drained {
            return false;
        }
    }
    memory.pending_request_count() == 0 && memory.pending_link_packet_count() == 0
}

/// The symmetric gate (§4.7) between the NMP and NLP sides: true once every
/// core belonging to `process_id` on both domains is locally quiescent, each
/// side's cache-system wait_list has drained, and memory has drained.
fn can_nmp_switch(nmp: &Processor, nlp: Option<&Processor>, memory: &dyn Memory, process_id: u64, deep_debug: bool) -> bool {
    if !nmp.locally_quiescent_for(process_id, deep_debug) {
        return false;
    }
    if let Some(nlp) = nlp {
        if !nlp.locally_quiescent_for(process_id, deep_debug) {
            return false;
        }
    }
    if deep_debug {
        let nmp_wait_drained = nmp
            .cores
            .iter()
            .filter(|c| c.process_id == process_id)
            .all(|c| nmp.cache_system.is_wait_list_empty(c.id, c.role != CoreRole::Host));
        if !nmp_wait_drained {
            return false;
        }
        if let Some(nlp) = nlp {
            let nlp_wait_drained = nlp
                .cores
                .iter()
                .filter(|c| c.process_id == process_id)
                .all(|c| nlp.cache_system.is_wait_list_empty(c.id, c.role != CoreRole::Host));
            if !nlp_wait_drained {
                return false;
            }
        }
    }
    memory.pending_request_count() == 0 && memory.pending_link_packet_count() == 0
}

/// §4.5: pops a core's own redirection queue first, otherwise reads the next
/// record from its trace file, translating addresses via
/// `memory.page_allocator` and redirecting any record whose `thread_id`
/// names a different core into that core's queue before trying again.
fn fetch_next(cores: &mut [Core], idx: usize, memory: &mut dyn Memory) -> Option<TraceRecord> {
    loop {
        if let Some(rec) = cores[idx].queue.pop() {
            return Some(rec);
        }
        let mut trace = cores[idx].trace.take()?;
        let result = trace.next_record();
        cores[idx].trace = Some(trace);
        match result {
            Ok(Some(mut rec)) => {
                for addr in rec.source_addr.iter_mut().chain(rec.dest_addr.iter_mut()) {
                    if *addr != 0 {
                        *addr = memory.page_allocator(*addr, idx as u32);
                    }
                }
                if rec.inst_pointer != 0 {
                    rec.inst_pointer = memory.page_allocator(rec.inst_pointer, idx as u32);
                }
                let own_thread = cores[idx].thread_id;
                if rec.thread_id != own_thread {
                    if let Some(dest) = cores.iter().position(|c| c.thread_id == rec.thread_id) {
                        if dest != idx {
                            cores[dest].queue.push(rec);
                            continue;
                        }
                    }
                }
                return Some(rec);
            }
            Ok(None) => return None,
            Err(_) => {
                cores[idx].unassigned = true;
                cores[idx].trace = None;
                return None;
            }
        }
    }
}

/// §4.6 `instruction_bypass`: routes `record` to an NLP core on a dirty-line
/// coherence hit, otherwise to the NMP core owning `instPointer`'s vault.
/// Returns false (leave `pending_bypass` set) if the chosen queue is full.
#[allow(clippy::too_many_arguments)]
fn instruction_bypass(
    core: &mut Core,
    record: &TraceRecord,
    nmp: &mut Processor,
    nlp: Option<&mut Processor>,
    llc: &Cache,
    mapper: &AddressMapper,
    nlp_enabled: bool,
    stats: &mut DomainStats,
) -> bool {
    let _ = stats;
    if nlp_enabled {
        if let Some(nlp) = nlp {
            let dirty = record
                .source_addr
                .iter()
                .chain(record.dest_addr.iter())
                .chain(std::iter::once(&record.inst_pointer))
                .filter(|&&a| a != 0)
                .any(|&a| llc.contains_dirty(PhysAddr::new(a)));
            if dirty && !nlp.cores.is_empty() {
                let target = (core.nlp_round_robin as usize) % nlp.cores.len();
                core.nlp_round_robin = core.nlp_round_robin.wrapping_add(1);
                if nlp.cores[target].queue.is_full() {
                    return false;
                }
                nlp.cores[target].queue.push(record.clone());
                // §4.6: "while NLP is engaged, lock all NMP cores" — held
                // until the NLP side quiesces (`can_nmp_switch`).
                for nmp_core in &mut nmp.cores {
                    nmp_core.locked = true;
                }
                return true;
            }
        }
    }
    if nmp.cores.is_empty() {
        return false;
    }
    let vault = mapper.vault_target(PhysAddr::new(record.inst_pointer)) as usize % nmp.cores.len();
    if nmp.cores[vault].queue.is_full() {
        return false;
    }
    nmp.cores[vault].queue.push(record.clone());
    true
}

/// §4.6 step 1: decides whether a freshly-seen `ROI_BEGIN` should enter
/// offload mode for this core, charging the per-decision overhead and
/// locking the core when it does.
fn handle_roi_begin(
    core: &mut Core,
    record: &TraceRecord,
    config: &Config,
    policy: &dyn OffloadDecision,
    bb_info: &HashMap<u64, BbInfo>,
    stats: &mut DomainStats,
) {
    stats.record_region_count += 1;
    let enter = match config.sim_mode {
        SimMode::HostOnly => false,
        SimMode::AllOffload | SimMode::McpOnly => true,
        SimMode::CoSimulation => {
            let block = bb_info.get(&core.process_id).and_then(|info| info.block(record.region_id));
            policy.should_offload(block, &SystemTelemetry::default())
        }
    };
    if enter {
        core.offload_regions.enter(record.region_id);
        core.inside_region = true;
        core.locked = true;
        core.decision_overhead_remaining = config.overhead_cycle;
        stats.record_offload_region_count += 1;
    }
}

fn check_instruction_limit(host: &mut Processor, nmp: &mut Processor, nlp: Option<&mut Processor>, config: &Config, stats: &mut StatsRegistry) {
    if config.expected_limit_insts == 0 || stats.host.record_insts.is_some() {
        return;
    }
    let total = stats.host.total_cpu_instructions + stats.nmp.total_cpu_instructions + stats.nlp.total_cpu_instructions;
    if total < config.expected_limit_insts {
        return;
    }
    stats.host.record_cycs = Some(stats.host.cpu_cycles);
    stats.host.record_insts = Some(total);
    for core in &mut host.cores {
        core.reached_limit = true;
        core.more_reqs = false;
    }
    for core in &mut nmp.cores {
        core.reached_limit = true;
        core.more_reqs = false;
    }
    if let Some(nlp) = nlp {
        for core in &mut nlp.cores {
            core.reached_limit = true;
            core.more_reqs = false;
        }
    }
}

/// Shared local-execution step (§4.4 "Execution"): blocking I-fetch (Host
/// only, when enabled), bubble-cycle drain, then in-order load/store issue.
/// Each call advances `core.current` by as much as can be issued this tick;
/// callers re-invoke it next tick if `core.current` is still `Some` after
/// returning.
#[allow(clippy::too_many_arguments)]
fn drive_core_local(
    core: &mut Core,
    now: u64,
    levels: &mut [&mut Cache],
    cache_system: &mut CacheSystem,
    memory: &mut dyn Memory,
    stats: &mut DomainStats,
    opcodes: &OpcodeTable,
    consider_inst_fetching: bool,
    line_bytes: u64,
) {
    let Some(record) = core.current.clone() else {
        return;
    };

    if consider_inst_fetching && core.role == CoreRole::Host && record.inst_pointer != 0 && !core.current_counted {
        let mut req = Request::new(PhysAddr::new(record.inst_pointer), AccessKind::Read, core.id, false, now);
        req.instruction_request = true;
        if chain::send(levels, req, now, cache_system, memory, stats) {
            core.inst_fetch_outstanding = true;
            stats.total_cpu_instructions += 1;
            if record.has_memory_operand() {
                stats.total_memory_instructions += 1;
            }
            core.current_counted = true;
        } else {
            stats.total_idle_cycles += 1;
        }
        return;
    }

    if !core.current_counted {
        stats.total_cpu_instructions += 1;
        if record.has_memory_operand() {
            stats.total_memory_instructions += 1;
        }
        core.current_counted = true;
    }

    if core.bubble_remaining.is_none() {
        core.bubble_remaining = Some(opcodes.bubble_cycles(record.opcode_str()));
        core.pending_loads = record.source_addr.iter().copied().filter(|&a| a != 0).collect();
        core.pending_stores = record.dest_addr.iter().copied().filter(|&a| a != 0).collect();
    }

    if let Some(remaining) = core.bubble_remaining {
        if remaining > 0 {
            core.bubble_remaining = Some(remaining - 1);
            return;
        }
    }

    let is_nmp = core.role != CoreRole::Host;
    let mask = !(line_bytes.max(1) - 1);

    // Shared issue budget for this tick: at most `ipc` loads and stores
    // combined, whatever is left un-issued rolls over to the next tick.
    let mut slots = core.ipc;

    while slots > 0 {
        let Some(&addr) = core.pending_loads.first() else {
            break;
        };
        if core.org == CoreOrg::OutOrder {
            if let Some(window) = core.window.as_ref() {
                if window.is_full() {
                    stats.total_idle_cycles += 1;
                    return;
                }
            }
        }
        let req = Request::new(PhysAddr::new(addr), AccessKind::Read, core.id, is_nmp, now);
        if chain::send(levels, req, now, cache_system, memory, stats) {
            core.pending_loads.remove(0);
            if core.org == CoreOrg::OutOrder {
                if let Some(window) = core.window.as_mut() {
                    let _ = window.insert(false, addr & mask);
                }
            }
            slots -= 1;
        } else {
            stats.total_idle_cycles += 1;
            return;
        }
    }

    // Stores never occupy the ready window, in-order or out-of-order alike
    // (fire-and-forget with respect to retirement).
    while slots > 0 {
        let Some(&addr) = core.pending_stores.first() else {
            break;
        };
        let req = Request::new(PhysAddr::new(addr), AccessKind::Write, core.id, is_nmp, now);
        if chain::send(levels, req, now, cache_system, memory, stats) {
            core.pending_stores.remove(0);
            slots -= 1;
        } else {
            stats.total_idle_cycles += 1;
            return;
        }
    }

    if core.pending_loads.is_empty() && core.pending_stores.is_empty() {
        core.finish_current();
    }
}

/// Drains a domain's `CacheSystem` completions, routing the chain callback
/// and (for data reads) the reorder-window `set_ready` to the owning core.
fn drain_completions(cores: &mut [Core], llc: &mut Cache, cache_system: &mut CacheSystem, now: u64, mask: u64) {
    let completions = cache_system.tick(now);
    for (req, installed) in completions {
        if let Some(core) = cores.iter_mut().find(|c| c.id == req.core_id) {
            let mut levels = build_chain(core, llc);
            chain::callback(&mut levels, &req, &installed);
            if req.instruction_request {
                core.inst_fetch_outstanding = false;
            } else if req.kind == AccessKind::Read {
                if let Some(window) = core.window.as_mut() {
                    window.set_ready(req.addr.val(), mask);
                }
            }
        }
    }
}

/// The Host Processor's tick body: §4.4's shared preamble plus offload
/// routing (§4.6) and quiescence gating (§4.7), driven for every Host core
/// in turn.
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
fn tick_host_impl(
    host: &mut Processor,
    nmp: &mut Processor,
    mut nlp: Option<&mut Processor>,
    llc: &mut Cache,
    memory: &mut dyn Memory,
    stats: &mut StatsRegistry,
    opcodes: &OpcodeTable,
    policy: &dyn OffloadDecision,
    bb_info: &HashMap<u64, BbInfo>,
    config: &Config,
    address_mapper: &AddressMapper,
    now: u64,
) {
    let consider_inst_fetching = config.consider_inst_fetching.is_on();
    let line_bytes = config.line_bytes() as u64;
    let mask = !(line_bytes.max(1) - 1);
    let nlp_enabled = config.nlp_facility.is_on();
    let deep_debug = true;

    stats.host.cpu_cycles += 1;

    for core in &mut host.cores {
        let mut levels = build_chain(core, llc);
        chain::tick(&mut levels, now, &mut host.cache_system, memory, &mut stats.host);
    }
    drain_completions(&mut host.cores, llc, &mut host.cache_system, now, mask);

    for idx in 0..host.cores.len() {
        if host.cores[idx].org == CoreOrg::OutOrder {
            if let Some(window) = host.cores[idx].window.as_mut() {
                let _ = window.retire();
            }
        }

        if !host.cores[idx].more_reqs {
            stats.host.total_idle_cycles += 1;
            continue;
        }
        if host.cores[idx].inst_fetch_outstanding {
            continue;
        }

        if host.cores[idx].locked {
            if host.cores[idx].decision_overhead_remaining > 0 {
                host.cores[idx].decision_overhead_remaining -= 1;
                stats.host.total_overhead_cycles += 1;
                continue;
            }
            if !host.cores[idx].awaiting_switch {
                host.cores[idx].awaiting_switch = true;
                if !nlp_enabled {
                    // Whole-cache flush (§4.7, DESIGN.md): every Host core's
                    // private dirty lines are flushed, not just the core
                    // initiating the switch.
                    host.flush_all_private_caches();
                    llc.flush_all_dirty_lines();
                    debug_assert!(host.has_no_dirty_lines() && llc.has_no_dirty_lines());
                }
            }
            let process_id = host.cores[idx].process_id;
            if can_context_switch(host, llc, memory, process_id, deep_debug) {
                host.cores[idx].locked = false;
                host.cores[idx].awaiting_switch = false;
            } else {
                stats.host.total_overhead_cycles += 1;
                continue;
            }
        }

        if let Some(record) = host.cores[idx].pending_bypass.take() {
            let accepted = instruction_bypass(
                &mut host.cores[idx],
                &record,
                nmp,
                nlp.as_deref_mut(),
                llc,
                address_mapper,
                nlp_enabled,
                &mut stats.host,
            );
            if accepted {
                host.cores[idx].finish_current();
            } else {
                host.cores[idx].pending_bypass = Some(record);
            }
            continue;
        }

        if host.cores[idx].wait_for_nmp_finish {
            let process_id = host.cores[idx].process_id;
            if can_nmp_switch(nmp, nlp.as_deref(), memory, process_id, deep_debug) {
                host.cores[idx].wait_for_nmp_finish = false;
            } else {
                continue;
            }
        }

        if host.cores[idx].current.is_none() {
            match fetch_next(&mut host.cores, idx, memory) {
                Some(record) => {
                    host.cores[idx].current = Some(record);
                    host.cores[idx].current_routed = false;
                }
                None => {
                    host.cores[idx].more_reqs = false;
                    stats.host.total_idle_cycles += 1;
                    continue;
                }
            }
        }

        if !host.cores[idx].current_routed {
            let record = host.cores[idx].current.clone().unwrap_or_else(|| unreachable!("current just set"));
            if record.is_roi_begin() {
                handle_roi_begin(&mut host.cores[idx], &record, config, policy, bb_info, &mut stats.host);
                host.cores[idx].finish_current();
                continue;
            }
            if record.is_roi_end() {
                host.cores[idx].offload_regions.leave(record.region_id);
                if host.cores[idx].offload_regions.is_empty() {
                    host.cores[idx].inside_region = false;
                }
                host.cores[idx].finish_current();
                continue;
            }

            let force_bypass = config.sim_mode == SimMode::McpOnly;
            let in_active_region = host.cores[idx].offload_regions.contains(record.region_id);
            if force_bypass || in_active_region {
                let accepted = instruction_bypass(
                    &mut host.cores[idx],
                    &record,
                    nmp,
                    nlp.as_deref_mut(),
                    llc,
                    address_mapper,
                    nlp_enabled,
                    &mut stats.host,
                );
                if accepted {
                    host.cores[idx].finish_current();
                } else {
                    host.cores[idx].pending_bypass = Some(record);
                    host.cores[idx].current = None;
                }
                continue;
            }
            if !host.cores[idx].offload_regions.is_empty() {
                debug!(core = idx, region = record.region_id, "non-offloaded record stalls for in-flight offload work to drain");
                host.cores[idx].wait_for_nmp_finish = true;
                continue;
            }
            host.cores[idx].current_routed = true;
        }

        let mut levels = build_chain(&mut host.cores[idx], llc);
        drive_core_local(
            &mut host.cores[idx],
            now,
            &mut levels,
            &mut host.cache_system,
            memory,
            &mut stats.host,
            opcodes,
            consider_inst_fetching,
            line_bytes,
        );
    }

    check_instruction_limit(host, nmp, nlp, config, stats);
}

/// The NMP Processor's tick body: preamble plus a plain dispatch-queue pop
/// and local execution, with no offload routing of its own.
///
/// §4.6: while an NLP dispatch is in flight (a dirty-line coherence hit
/// routed a bypassed record to NLP instead), every NMP core is locked —
/// `instruction_bypass` sets `core.locked` on all of them. The lock is
/// released here, the moment `can_nmp_switch` reports the NLP side (and this
/// domain's own in-flight work) has quiesced.
fn tick_nmp_impl(nmp: &mut Processor, nlp: Option<&Processor>, memory: &mut dyn Memory, stats: &mut DomainStats, opcodes: &OpcodeTable, now: u64, line_bytes: u64) {
    let mask = !(line_bytes.max(1) - 1);
    stats.cpu_cycles += 1;

    for core in &mut nmp.cores {
        let mut levels: Vec<&mut Cache> = core.private.iter_mut().collect();
        chain::tick(&mut levels, now, &mut nmp.cache_system, memory, stats);
    }

    let completions = nmp.cache_system.tick(now);
    for (req, installed) in completions {
        if let Some(core) = nmp.cores.iter_mut().find(|c| c.id == req.core_id) {
            let mut levels: Vec<&mut Cache> = core.private.iter_mut().collect();
            chain::callback(&mut levels, &req, &installed);
            if req.kind == AccessKind::Read {
                if let Some(window) = core.window.as_mut() {
                    window.set_ready(req.addr.val(), mask);
                }
            }
        }
    }

    if nmp.cores.iter().any(|c| c.locked) && can_nmp_switch(nmp, nlp, memory, 0, true) {
        for core in &mut nmp.cores {
            core.locked = false;
        }
    }

    for core in &mut nmp.cores {
        if core.locked {
            stats.total_idle_cycles += 1;
            continue;
        }
        if core.org == CoreOrg::OutOrder {
            if let Some(window) = core.window.as_mut() {
                let _ = window.retire();
            }
        }
        if core.current.is_none() {
            match core.queue.pop() {
                Some(record) => {
                    core.current = Some(record);
                    core.current_routed = true;
                }
                None => {
                    stats.total_idle_cycles += 1;
                    continue;
                }
            }
        }
        let mut levels: Vec<&mut Cache> = core.private.iter_mut().collect();
        drive_core_local(core, now, &mut levels, &mut nmp.cache_system, memory, stats, opcodes, false, line_bytes);
    }
}

/// The NLP Processor's tick body: identical shape to the NMP tick, but its
/// chain is always just the shared LLC (NLP cores never own a private cache).
fn tick_nlp_impl(nlp: &mut Processor, llc: &mut Cache, memory: &mut dyn Memory, stats: &mut DomainStats, opcodes: &OpcodeTable, now: u64, line_bytes: u64) {
    let mask = !(line_bytes.max(1) - 1);
    stats.cpu_cycles += 1;

    for core in &mut nlp.cores {
        let mut levels = build_chain(core, llc);
        chain::tick(&mut levels, now, &mut nlp.cache_system, memory, stats);
    }
    drain_completions(&mut nlp.cores, llc, &mut nlp.cache_system, now, mask);

    for idx in 0..nlp.cores.len() {
        if nlp.cores[idx].org == CoreOrg::OutOrder {
            if let Some(window) = nlp.cores[idx].window.as_mut() {
                let _ = window.retire();
            }
        }
        if nlp.cores[idx].current.is_none() {
            match nlp.cores[idx].queue.pop() {
                Some(record) => {
                    nlp.cores[idx].current = Some(record);
                    nlp.cores[idx].current_routed = true;
                }
                None => {
                    stats.total_idle_cycles += 1;
                    continue;
                }
            }
        }
        let mut levels = build_chain(&mut nlp.cores[idx], llc);
        drive_core_local(&mut nlp.cores[idx], now, &mut levels, &mut nlp.cache_system, memory, stats, opcodes, false, line_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::memory::LatencyMemory;
    use crate::offload::MemVsNonMem;
    use crate::trace::TraceWriter;

    fn write_trace(records: &[TraceRecord]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = TraceWriter::create(file.path()).unwrap();
        for record in records {
            writer.write_record(record).unwrap();
        }
        file
    }

    fn host_only_config() -> Config {
        let mut config = Config::default();
        config.simulated_warmup_insts = 0;
        config.expected_limit_insts = 0;
        config
    }

    #[test]
    fn gcd_of_equal_periods_is_the_period() {
        assert_eq!(gcd(250, 250), 250);
    }

    #[test]
    fn gcd_reduces_to_a_common_step() {
        assert_eq!(gcd(250, 625), 125);
    }

    #[test]
    fn single_host_core_with_no_trace_is_unassigned_error() {
        let config = host_only_config();
        let result = Simulator::new(
            config,
            vec![PathBuf::from("/nonexistent/path/to/trace")],
            OpcodeTable::empty(),
            Box::new(MemVsNonMem),
            HashMap::new(),
            Box::new(LatencyMemory::new(20, 1.0, 64)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn core_finished_requires_drained_queue_and_window() {
        let mut core = Core::new(0, CoreRole::Host, CoreOrg::OutOrder, 4, None);
        core.more_reqs = false;
        assert!(core_finished(&core));
        core.queue.push(TraceRecord::marker("ADD", 0, 0));
        assert!(!core_finished(&core));
    }

    #[test]
    fn host_only_trace_runs_to_completion_and_retires_instructions() {
        let mut load = TraceRecord::marker("LOAD", 0, 0);
        load.source_addr[0] = 0x1000;
        let mut store = TraceRecord::marker("STORE", 0, 0);
        store.dest_addr[0] = 0x2000;
        let bubble = TraceRecord::marker("ADD", 0, 0);
        let trace = write_trace(&[load, store, bubble]);

        let config = host_only_config();
        let mut simulator = Simulator::new(
            config,
            vec![trace.path().to_path_buf()],
            OpcodeTable::empty(),
            Box::new(MemVsNonMem),
            HashMap::new(),
            Box::new(LatencyMemory::new(20, 1.0, 64)),
        )
        .unwrap();

        simulator.run_to_completion().unwrap();
        assert_eq!(simulator.stats().host.total_cpu_instructions, 3);
        assert!(simulator.stats().host.cpu_cycles > 0);
    }

    #[test]
    fn vault_routing_dispatches_by_inst_pointer_without_advancing_nmp() {
        let roi_begin = TraceRecord::marker(crate::trace::OPCODE_ROI_BEGIN, 5, 0);
        let mut load_a = TraceRecord::marker("LOAD", 5, 0);
        load_a.inst_pointer = 0x000;
        load_a.source_addr[0] = 0x10;
        let mut load_b = TraceRecord::marker("LOAD", 5, 0);
        load_b.inst_pointer = 0x200;
        load_b.source_addr[0] = 0x20;
        let roi_end = TraceRecord::marker(crate::trace::OPCODE_ROI_END, 5, 0);
        let trace = write_trace(&[roi_begin, load_a, load_b, roi_end]);

        let mut config = host_only_config();
        config.sim_mode = SimMode::AllOffload;
        config.number_mcp_cores = 4;

        let mut simulator = Simulator::new(
            config,
            vec![trace.path().to_path_buf()],
            OpcodeTable::empty(),
            Box::new(MemVsNonMem),
            HashMap::new(),
            Box::new(LatencyMemory::new(20, 1.0, 64)),
        )
        .unwrap();

        // ROI_BEGIN (1 tick) + overhead_cycle drain (100 ticks) + two
        // bypassed dispatches + ROI_END, driven without ever calling
        // `tick_nmp`, so the per-vault queue lengths below are exact.
        for _ in 0..104 {
            simulator.tick_host();
        }

        assert_eq!(simulator.stats().host.total_cpu_instructions, 0);
        assert_eq!(simulator.nmp.cores[0].queue.len(), 1);
        assert_eq!(simulator.nmp.cores[2].queue.len(), 1);
        assert_eq!(simulator.nmp.cores[1].queue.len(), 0);
        assert_eq!(simulator.nmp.cores[3].queue.len(), 0);
    }

    #[test]
    fn dirty_llc_line_routes_the_bypass_to_nlp_instead_of_nmp() {
        let mut config = host_only_config();
        config.sim_mode = SimMode::AllOffload;
        config.number_mcp_cores = 1;
        config.nlp_facility = crate::config::Toggle::On;
        config.llc_slice = 1;

        let roi_begin = TraceRecord::marker(crate::trace::OPCODE_ROI_BEGIN, 7, 0);
        let mut load = TraceRecord::marker("LOAD", 7, 0);
        load.source_addr[0] = 0x1000;
        let trace = write_trace(&[roi_begin, load]);

        let mut simulator = Simulator::new(
            config,
            vec![trace.path().to_path_buf()],
            OpcodeTable::empty(),
            Box::new(MemVsNonMem),
            HashMap::new(),
            Box::new(LatencyMemory::new(5, 1.0, 64)),
        )
        .unwrap();

        // Prime a dirty LLC line at 0x1000 by hand: send a write miss,
        // advance the clock to its fill tick, and run the callback that
        // unlocks and dirties it — deterministic, with none of the
        // scheduler-timing fragility a full write-then-reread trace would need.
        let write = Request::new(PhysAddr::new(0x1000), AccessKind::Write, 0, false, 0);
        assert!(chain::send(&mut [&mut simulator.llc], write, 0, &mut simulator.host.cache_system, simulator.memory.as_mut(), &mut simulator.stats.host));
        simulator.memory.tick(5);
        let completions = simulator.host.cache_system.tick(5);
        assert_eq!(completions.len(), 1);
        let (req, installed) = &completions[0];
        chain::callback(&mut [&mut simulator.llc], req, installed);
        while simulator.memory.poll_completed().is_some() {}
        assert!(simulator.llc.contains_dirty(PhysAddr::new(0x1000)));

        for _ in 0..102 {
            simulator.tick_host();
        }

        assert_eq!(simulator.nmp.cores[0].queue.len(), 0);
        let nlp = simulator.nlp.as_ref().expect("nlp facility enabled");
        assert_eq!(nlp.cores[0].queue.len(), 1);
        // §4.6 scenario 3: dispatching to NLP locks every NMP core.
        assert!(simulator.nmp.cores[0].locked);
    }

    #[test]
    fn nmp_cores_unlock_once_nlp_quiesces() {
        let mut nmp = Processor::new(CoreRole::Nmp);
        let mut nmp_core = Core::new(0, CoreRole::Nmp, CoreOrg::InOrder, 1, None);
        nmp_core.locked = true;
        nmp_core.more_reqs = false;
        nmp.cores.push(nmp_core);

        let mut nlp = Processor::new(CoreRole::Nlp);
        nlp.cores.push(Core::new(0, CoreRole::Nlp, CoreOrg::InOrder, 1, None));

        let mut memory = LatencyMemory::new(5, 1.0, 64);
        let mut stats = DomainStats::default();
        let opcodes = OpcodeTable::empty();

        tick_nmp_impl(&mut nmp, Some(&nlp), &mut memory, &mut stats, &opcodes, 0, 64);

        assert!(!nmp.cores[0].locked, "nmp core should unlock once the nlp side is quiescent");
    }

    #[test]
    fn nmp_cores_stay_locked_while_nlp_has_pending_work() {
        let mut nmp = Processor::new(CoreRole::Nmp);
        let mut nmp_core = Core::new(0, CoreRole::Nmp, CoreOrg::InOrder, 1, None);
        nmp_core.locked = true;
        nmp_core.more_reqs = false;
        nmp.cores.push(nmp_core);

        let mut nlp = Processor::new(CoreRole::Nlp);
        let mut nlp_core = Core::new(0, CoreRole::Nlp, CoreOrg::OutOrder, 4, None);
        nlp_core.window = Some(ReorderWindow::new(4, 4));
        if let Some(window) = nlp_core.window.as_mut() {
            window.insert(false, 0x40);
        }
        nlp.cores.push(nlp_core);

        let mut memory = LatencyMemory::new(5, 1.0, 64);
        let mut stats = DomainStats::default();
        let opcodes = OpcodeTable::empty();

        tick_nmp_impl(&mut nmp, Some(&nlp), &mut memory, &mut stats, &opcodes, 0, 64);

        assert!(nmp.cores[0].locked, "nmp core must stay locked while nlp still has in-flight work");
    }

    #[test]
    fn issue_width_is_capped_at_ipc_per_tick() {
        let mut record = TraceRecord::marker("VECOP", 0, 0);
        record.source_addr = [0x1000, 0x2000, 0x3000, 0x4000];
        record.dest_addr = [0x5000, 0x6000, 0x7000, 0x8000];
        let trace = write_trace(&[record]);

        let config = host_only_config();
        let mut simulator = Simulator::new(
            config,
            vec![trace.path().to_path_buf()],
            OpcodeTable::empty(),
            Box::new(MemVsNonMem),
            HashMap::new(),
            Box::new(LatencyMemory::new(1, 1.0, 64)),
        )
        .unwrap();

        simulator.tick_host();

        assert_eq!(simulator.host.cores[0].pending_loads.len(), 0, "all 4 loads fit the ipc budget");
        assert_eq!(simulator.host.cores[0].pending_stores.len(), 4, "stores wait for the next tick's budget");
        assert!(simulator.host.cores[0].current.is_some(), "record not finished while stores are still pending");

        simulator.tick_host();

        assert_eq!(simulator.host.cores[0].pending_stores.len(), 0);
        assert!(simulator.host.cores[0].current.is_none(), "record finishes once both lists drain");
    }
}
