//! Statistics registry for the co-simulation engine.
//!
//! The statistics list is conceptually process-wide in the source model;
//! here it is an explicit [`StatsRegistry`] owned by the top-level
//! `Simulator` and threaded by mutable reference into every `Processor`/
//! `Core` tick, rather than a global singleton.

use std::time::Instant;

/// Per-domain (Host, NMP, or NLP) performance counters.
#[derive(Debug, Clone)]
pub struct DomainStats {
    /// Cycles elapsed for this domain.
    pub cpu_cycles: u64,
    /// Instructions retired (data + non-memory) on this domain.
    pub total_cpu_instructions: u64,
    /// Instructions retired that touched memory.
    pub total_memory_instructions: u64,
    /// Idle cycles (no instruction issued) accumulated this domain.
    pub total_idle_cycles: u64,
    /// Cycles spent paying the offload decision overhead.
    pub total_overhead_cycles: u64,
    /// ROI regions entered.
    pub record_region_count: u64,
    /// ROI regions that were actually offloaded.
    pub record_offload_region_count: u64,
    /// Energy attributed to cache accesses on this domain, in nanojoules.
    pub total_energy_consumption: f64,
    /// Cycle-count snapshot taken when `expected_limit_insts` is reached.
    pub record_cycs: Option<u64>,
    /// Instruction-count snapshot taken when `expected_limit_insts` is reached.
    pub record_insts: Option<u64>,

    /// Per-level cache hit counters: `[L1, L2, L3]`.
    pub cache_hits: [u64; 3],
    /// Per-level cache miss counters: `[L1, L2, L3]`.
    pub cache_misses: [u64; 3],
    /// Per-level MSHR-hit (coalesced miss) counters: `[L1, L2, L3]`.
    pub cache_mshr_hits: [u64; 3],
    /// Per-level eviction counters: `[L1, L2, L3]`.
    pub cache_evictions: [u64; 3],
    /// Per-level writeback counters: `[L1, L2, L3]`.
    pub cache_writebacks: [u64; 3],
}

impl Default for DomainStats {
    fn default() -> Self {
        Self {
            cpu_cycles: 0,
            total_cpu_instructions: 0,
            total_memory_instructions: 0,
            total_idle_cycles: 0,
            total_overhead_cycles: 0,
            record_region_count: 0,
            record_offload_region_count: 0,
            total_energy_consumption: 0.0,
            record_cycs: None,
            record_insts: None,
            cache_hits: [0; 3],
            cache_misses: [0; 3],
            cache_mshr_hits: [0; 3],
            cache_evictions: [0; 3],
            cache_writebacks: [0; 3],
        }
    }
}

impl DomainStats {
    /// Instructions retired per cycle, 0 if no cycles have elapsed.
    pub fn ipc(&self) -> f64 {
        if self.cpu_cycles == 0 {
            0.0
        } else {
            self.total_cpu_instructions as f64 / self.cpu_cycles as f64
        }
    }

    /// Mean idle-cycle length, 0 if no instructions retired.
    pub fn average_idle_cycles(&self) -> f64 {
        if self.total_cpu_instructions == 0 {
            0.0
        } else {
            self.total_idle_cycles as f64 / self.total_cpu_instructions as f64
        }
    }
}

/// Section names accepted by [`StatsRegistry::print_sections`].
pub const STATS_SECTIONS: &[&str] = &["summary", "host", "nmp", "nlp", "cache", "offload"];

/// Top-level statistics registry, one per [`crate::sim::Simulator`] run.
///
/// Never a singleton (see Design Notes): constructed once by the CLI and
/// passed by mutable reference through the tick loop.
#[derive(Debug, Clone)]
pub struct StatsRegistry {
    start_time: Instant,
    /// Host-domain counters.
    pub host: DomainStats,
    /// NMP-domain counters.
    pub nmp: DomainStats,
    /// NLP-domain counters.
    pub nlp: DomainStats,
    /// Wall-clock simulated time, in nanoseconds, at the last tick.
    pub total_time_ns: u64,
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            host: DomainStats::default(),
            nmp: DomainStats::default(),
            nlp: DomainStats::default(),
            total_time_ns: 0,
        }
    }
}

impl StatsRegistry {
    /// Instructions per second across all domains, from wall-clock
    /// `total_time_ns`. A genuine computation (see Design Notes: the
    /// source's equivalent accumulator is never assigned, a latent bug not
    /// reproduced here).
    pub fn ips(&self) -> f64 {
        let total_insts = self.host.total_cpu_instructions
            + self.nmp.total_cpu_instructions
            + self.nlp.total_cpu_instructions;
        if self.total_time_ns == 0 {
            0.0
        } else {
            total_insts as f64 / (self.total_time_ns as f64 / 1e9)
        }
    }

    /// Renders only the requested statistics sections as text.
    ///
    /// Pass an empty slice to render every section (equivalent to [`Self::render`]).
    ///
    /// # Panics
    ///
    /// This function never panics: every ratio below guards its denominator
    /// with a zero check before dividing.
    pub fn render_sections(&self, sections: &[String]) -> String {
        use std::fmt::Write as _;

        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let host_seconds = self.start_time.elapsed().as_secs_f64();
        let mut out = String::new();

        if want("summary") {
            let _ = writeln!(out, "==========================================================");
            let _ = writeln!(out, "MCPSIM CO-SIMULATION STATISTICS");
            let _ = writeln!(out, "==========================================================");
            let _ = writeln!(out, "host_seconds             {host_seconds:.4} s");
            let _ = writeln!(out, "sim_time_ns              {}", self.total_time_ns);
            let _ = writeln!(out, "sim_ips                  {:.2}", self.ips());
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("host") {
            Self::render_domain(&mut out, "HOST", &self.host);
        }
        if want("nmp") {
            Self::render_domain(&mut out, "NMP", &self.nmp);
        }
        if want("nlp") {
            Self::render_domain(&mut out, "NLP", &self.nlp);
        }
        if want("cache") {
            let _ = writeln!(out, "CACHE HIERARCHY (host domain)");
            for (level, name) in ["L1", "L2", "L3"].into_iter().enumerate() {
                let hits = self.host.cache_hits[level];
                let misses = self.host.cache_misses[level];
                let total = hits + misses;
                let rate = if total == 0 {
                    0.0
                } else {
                    100.0 * hits as f64 / total as f64
                };
                let _ = writeln!(
                    out,
                    "  {name:<3} accesses: {total:<10} hits: {hits:<10} hit_rate: {rate:.2}% mshr_hits: {}",
                    self.host.cache_mshr_hits[level]
                );
            }
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("offload") {
            let _ = writeln!(out, "OFFLOAD");
            let _ = writeln!(out, "  regions_entered        {}", self.host.record_region_count);
            let _ = writeln!(
                out,
                "  regions_offloaded      {}",
                self.host.record_offload_region_count
            );
        }
        let _ = writeln!(out, "==========================================================");
        out
    }

    fn render_domain(out: &mut String, label: &str, d: &DomainStats) {
        use std::fmt::Write as _;
        let _ = writeln!(out, "{label} DOMAIN");
        let _ = writeln!(out, "  cycles                 {}", d.cpu_cycles);
        let _ = writeln!(out, "  instructions           {}", d.total_cpu_instructions);
        let _ = writeln!(out, "  memory_instructions    {}", d.total_memory_instructions);
        let _ = writeln!(out, "  ipc                    {:.4}", d.ipc());
        let _ = writeln!(out, "  idle_cycles            {}", d.total_idle_cycles);
        let _ = writeln!(out, "  average_idle_cycles    {:.4}", d.average_idle_cycles());
        let _ = writeln!(out, "  overhead_cycles        {}", d.total_overhead_cycles);
        let _ = writeln!(out, "  energy_nj              {:.4}", d.total_energy_consumption);
        let _ = writeln!(out, "----------------------------------------------------------");
    }

    /// Renders every statistics section. Equivalent to `render_sections(&[])`.
    pub fn render(&self) -> String {
        self.render_sections(&[])
    }

    /// Prints only the requested statistics sections to stdout.
    pub fn print_sections(&self, sections: &[String]) {
        print!("{}", self.render_sections(sections));
    }

    /// Prints every statistics section to stdout. Equivalent to
    /// `print_sections(&[])`.
    pub fn print(&self) {
        print!("{}", self.render());
    }

    /// Writes every statistics section to `path`, for the CLI's `--stats` flag.
    pub fn write_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        std::fs::write(path, self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_and_ips_guard_zero_cycles() {
        let stats = StatsRegistry::default();
        assert_eq!(stats.host.ipc(), 0.0);
        assert_eq!(stats.ips(), 0.0);
    }

    #[test]
    fn ipc_reflects_retired_instructions() {
        let mut domain = DomainStats::default();
        domain.cpu_cycles = 100;
        domain.total_cpu_instructions = 400;
        assert!((domain.ipc() - 4.0).abs() < f64::EPSILON);
    }
}
